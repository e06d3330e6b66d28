//! Authorization policy.
//!
//! A pure decision over (subject, verb, resource, ownership). Handlers resolve
//! the subject and whether it authored the target object, then call [`authorize`];
//! nothing here touches request objects or storage.

use actix_web::http::Method;

use crate::auth::Role;
use crate::error::ApiError;
use crate::models::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Categories, genres and titles.
    Catalog,
    /// Reviews and comments.
    Authored,
    /// `/users` and `/users/{username}`.
    UserAdmin,
    /// `/users/me`.
    OwnProfile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Unauthenticated,
    Forbidden,
}

impl Decision {
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Unauthenticated => Err(ApiError::Unauthorized),
            Decision::Forbidden => Err(ApiError::Forbidden),
        }
    }
}

pub fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// `is_author` is only consulted for unsafe, non-create verbs on [`Resource::Authored`].
pub fn decide(role: Option<Role>, method: &Method, resource: Resource, is_author: bool) -> Decision {
    let safe = is_safe(method);
    if safe && matches!(resource, Resource::Catalog | Resource::Authored) {
        return Decision::Allow;
    }
    let Some(role) = role else { return Decision::Unauthenticated };
    let allowed = match resource {
        Resource::Catalog | Resource::UserAdmin => role == Role::Admin,
        Resource::OwnProfile => true,
        Resource::Authored if *method == Method::POST => true,
        Resource::Authored => is_author || matches!(role, Role::Moderator | Role::Admin),
    };
    if allowed { Decision::Allow } else { Decision::Forbidden }
}

/// [`decide`] for an optional authenticated user; authorship is by username.
pub fn authorize(user: Option<&User>, method: &Method, resource: Resource, author: Option<&str>) -> Result<(), ApiError> {
    let is_author = matches!((user, author), (Some(u), Some(a)) if u.username == a);
    let decision = decide(user.map(|u| u.role), method, resource, is_author);
    if decision != Decision::Allow {
        log::debug!(
            "denied {method} on {resource:?} for {}",
            user.map(|u| u.username.as_str()).unwrap_or("<anonymous>")
        );
    }
    decision.into_result()
}
