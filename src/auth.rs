use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::User;
use crate::repo::RepoError;
use crate::routes::AppState;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "moderator" => Ok(Role::Moderator),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username.
    pub sub: String,
    pub iat: usize,
    pub exp: usize,
}

/// HS256 signing material plus the access-token lifetime.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: chrono::Duration,
}

impl JwtKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::hours(ttl_hours),
        }
    }

    /// Create an access token for a user.
    pub fn issue(&self, username: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            iat: now.timestamp() as usize,
            exp: (now + self.ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Validate a JWT and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Ok(decode::<Claims>(token, &self.decoding, &validation)?.claims)
    }
}

/// Extractor yielding the authenticated, still-active user.
///
/// The role is read from the repository on every request, so an admin's role
/// change takes effect without reissuing tokens.
pub struct CurrentUser(pub User);

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let bearer = BearerAuth::from_request(req, pl).into_inner();
        let state = req.app_data::<web::Data<AppState>>().cloned();
        Box::pin(async move {
            let bearer = bearer.map_err(|_| ApiError::Unauthorized)?;
            let state = state.ok_or_else(|| {
                log::error!("AppState missing from app data");
                ApiError::Internal
            })?;
            let claims = state.jwt.verify(bearer.token()).map_err(|e| {
                log::debug!("rejected bearer token: {e}");
                ApiError::Unauthorized
            })?;
            let user = state.repo.get_user(&claims.sub).await.map_err(subject_lookup_error)?;
            if !user.is_active() {
                return Err(ApiError::Unauthorized);
            }
            Ok(CurrentUser(user))
        })
    }
}

/// A token whose subject no longer exists is a bad credential; any other
/// storage failure is reported as such.
fn subject_lookup_error(e: RepoError) -> ApiError {
    match e {
        RepoError::NotFound => ApiError::Unauthorized,
        other => other.into(),
    }
}
