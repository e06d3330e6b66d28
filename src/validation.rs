//! Field validation shared by the request payloads.
//!
//! Payload structs derive [`validator::Validate`]; handlers call [`check`] which
//! turns the validator output into [`FieldErrors`], the typed failure value the
//! API reports back as `{"fields": {name: [messages]}}`.

use std::borrow::Cow;
use std::collections::BTreeMap;

use chrono::Datelike;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::ApiError;

pub type FieldErrors = BTreeMap<String, Vec<String>>;

pub const SCORE_MIN: i32 = 1;
pub const SCORE_MAX: i32 = 10;

/// Username that would shadow the `/users/me` route.
pub const RESERVED_USERNAME: &str = "me";

pub fn check<T: Validate>(payload: &T) -> Result<(), ApiError> {
    payload.validate().map_err(|e| ApiError::Validation(into_field_errors(&e)))
}

pub fn into_field_errors(errors: &ValidationErrors) -> FieldErrors {
    let mut out = FieldErrors::new();
    for (field, errs) in errors.field_errors() {
        let messages = out.entry(field.to_string()).or_default();
        for e in errs {
            let msg = e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string());
            messages.push(msg);
        }
    }
    out
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(Cow::Borrowed(message));
    e
}

/// Letters, digits and `@ . + - _`; never the reserved `me`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username == RESERVED_USERNAME {
        return Err(invalid("reserved", "username 'me' is reserved"));
    }
    let ok = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'));
    if !ok {
        return Err(invalid("username_chars", "only letters, digits and @/./+/-/_ are allowed"));
    }
    Ok(())
}

pub fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    if slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        Ok(())
    } else {
        Err(invalid("slug", "slug may contain only latin letters, digits, '-' and '_'"))
    }
}

pub fn validate_year(year: i32) -> Result<(), ValidationError> {
    if year > chrono::Utc::now().year() {
        return Err(invalid("year_in_future", "year cannot be later than the current year"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("a.l+i-c_e@x").is_ok());
        assert!(validate_username("me").is_err());
        assert!(validate_username("with space").is_err());
        assert!(validate_username("semi;colon").is_err());
    }

    #[test]
    fn slug_rules() {
        assert!(validate_slug("sci-fi_2").is_ok());
        assert!(validate_slug("no spaces").is_err());
        assert!(validate_slug("кино").is_err());
    }

    #[test]
    fn year_cannot_be_in_future() {
        let this_year = chrono::Utc::now().year();
        assert!(validate_year(this_year).is_ok());
        assert!(validate_year(1895).is_ok());
        assert!(validate_year(this_year + 1).is_err());
    }
}
