use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::Role;

pub type Id = i64;

// ---------------- users ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
    pub deactivated_at: Option<DateTime<Utc>>, // soft delete marker
}

impl User {
    pub fn is_active(&self) -> bool { self.deactivated_at.is_none() }
}

/// Admin-side user creation; signup goes through [`SignupRequest`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 30, message = "username must be 1-30 characters"), custom(function = "crate::validation::validate_username"))]
    pub username: String,
    #[validate(email(message = "enter a valid email address"), length(max = 254))]
    pub email: String,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[serde(default)]
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
}

/// Partial update. Username is immutable: it is the token subject and the
/// author key on reviews and comments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateUser {
    #[validate(email(message = "enter a valid email address"), length(max = 254))]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub bio: Option<String>,
    #[validate(length(max = 150))]
    pub first_name: Option<String>,
    #[validate(length(max = 150))]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 30, message = "username must be 1-30 characters"), custom(function = "crate::validation::validate_username"))]
    pub username: String,
    #[validate(email(message = "enter a valid email address"), length(max = 254))]
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct TokenRequest {
    #[validate(length(min = 1, max = 30, message = "username must be 1-30 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 64, message = "confirmation_code must be 1-64 characters"))]
    pub confirmation_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

/// Stored form of an issued confirmation code; the plain code only ever
/// leaves the process through the mailer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationCode {
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
}

// ---------------- catalog ----------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Genre {
    pub name: String,
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 50), custom(function = "crate::validation::validate_slug"))]
    pub slug: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewGenre {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(length(min = 1, max = 50), custom(function = "crate::validation::validate_slug"))]
    pub slug: String,
}

/// Title as persisted: category and genres are referenced by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    pub id: Id,
    pub name: String,
    pub year: i32,
    pub description: Option<String>,
    pub category: Option<String>,
    pub genres: Vec<String>,
}

/// Title as returned to clients, with its derived rating.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TitleView {
    pub id: Id,
    pub name: String,
    pub year: i32,
    pub rating: Option<f64>,
    pub description: Option<String>,
    pub genre: Vec<Genre>,
    pub category: Option<Category>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewTitle {
    #[validate(length(min = 1, max = 256))]
    pub name: String,
    #[validate(custom(function = "crate::validation::validate_year"))]
    pub year: i32,
    #[serde(default)]
    pub description: Option<String>,
    /// Genre slugs.
    #[serde(default)]
    pub genre: Vec<String>,
    /// Category slug.
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateTitle {
    #[validate(length(min = 1, max = 256))]
    pub name: Option<String>,
    #[validate(custom(function = "crate::validation::validate_year"))]
    pub year: Option<i32>,
    pub description: Option<String>,
    pub genre: Option<Vec<String>>,
    pub category: Option<String>,
}

/// Query filters for title listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TitleFilter {
    pub category: Option<String>,
    pub genre: Option<String>,
    pub name: Option<String>,
    pub year: Option<i32>,
}

impl TitleFilter {
    pub fn matches(&self, t: &Title) -> bool {
        if let Some(ref c) = self.category {
            if t.category.as_deref() != Some(c.as_str()) { return false; }
        }
        if let Some(ref g) = self.genre {
            if !t.genres.iter().any(|s| s == g) { return false; }
        }
        if let Some(ref n) = self.name {
            if !t.name.to_lowercase().contains(&n.to_lowercase()) { return false; }
        }
        if let Some(y) = self.year {
            if t.year != y { return false; }
        }
        true
    }
}

// ---------------- reviews & comments ----------------

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Review {
    pub id: Id,
    pub title_id: Id,
    pub author: String,
    pub text: String,
    pub score: i32,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewReview {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: String,
    #[validate(range(min = 1, max = 10, message = "score must be between 1 and 10"))]
    pub score: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateReview {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: Option<String>,
    #[validate(range(min = 1, max = 10, message = "score must be between 1 and 10"))]
    pub score: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub review_id: Id,
    pub author: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, Validate)]
pub struct UpdateComment {
    #[validate(length(min = 1, message = "text must not be empty"))]
    pub text: Option<String>,
}

/// `?search=` on list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::{check, SCORE_MAX, SCORE_MIN};

    #[test]
    fn review_score_bounds() {
        let ok = |score| check(&NewReview { text: "fine".into(), score }).is_ok();
        assert!(ok(SCORE_MIN));
        assert!(ok(SCORE_MAX));
        assert!(!ok(SCORE_MIN - 1));
        assert!(!ok(SCORE_MAX + 1));
    }

    #[test]
    fn signup_rejects_me_and_bad_email() {
        assert!(check(&SignupRequest { username: "me".into(), email: "me@x.com".into() }).is_err());
        assert!(check(&SignupRequest { username: "alice".into(), email: "not-an-email".into() }).is_err());
        assert!(check(&SignupRequest { username: "alice".into(), email: "a@x.com".into() }).is_ok());
    }

    #[test]
    fn title_filter_combines_criteria() {
        let t = Title {
            id: 1,
            name: "The Godfather".into(),
            year: 1972,
            description: None,
            category: Some("movie".into()),
            genres: vec!["drama".into(), "crime".into()],
        };
        assert!(TitleFilter::default().matches(&t));
        assert!(TitleFilter { name: Some("godf".into()), genre: Some("crime".into()), ..Default::default() }.matches(&t));
        assert!(!TitleFilter { category: Some("book".into()), ..Default::default() }.matches(&t));
        assert!(!TitleFilter { year: Some(1974), ..Default::default() }.matches(&t));
    }
}
