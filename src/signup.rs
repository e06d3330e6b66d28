//! Passwordless signup.
//!
//! `signup` binds a (username, email) pair to an account and mails it a
//! confirmation code; `exchange` trades the most recently issued code for an
//! access token. Codes are stored hashed, expire after a configurable TTL and
//! are consumed by a successful exchange.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::auth::JwtKeys;
use crate::error::ApiError;
use crate::mailer::{Mailer, Message};
use crate::models::{ConfirmationCode, NewUser, SignupRequest, TokenRequest, User};
use crate::repo::{Repo, RepoError};
use crate::validation;

#[derive(Debug, Clone)]
pub struct CodeSettings {
    pub mail_from: String,
    pub ttl: Duration,
}

impl Default for CodeSettings {
    fn default() -> Self {
        Self { mail_from: "noreply@yamdb.local".into(), ttl: Duration::hours(24) }
    }
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.as_bytes()))
}

fn expired(issued_at: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    now - issued_at > ttl
}

pub async fn signup(
    repo: &dyn Repo,
    mailer: &dyn Mailer,
    settings: &CodeSettings,
    req: SignupRequest,
) -> Result<User, ApiError> {
    validation::check(&req)?;

    let by_name = match repo.get_user(&req.username).await {
        Ok(u) => Some(u),
        Err(RepoError::NotFound) => None,
        Err(e) => return Err(e.into()),
    };
    let by_email = repo.find_user_by_email(&req.email).await?;

    // each side of the pair must either be free or belong to the other side
    if let Some(ref u) = by_name {
        if !u.email.eq_ignore_ascii_case(&req.email) {
            return Err(ApiError::field("username", "username is registered with a different email"));
        }
    }
    if let Some(ref u) = by_email {
        if u.username != req.username {
            return Err(ApiError::field("email", "email is registered with a different username"));
        }
    }

    let user = match by_name {
        Some(u) if !u.is_active() => {
            return Err(ApiError::field("username", "account is deactivated"));
        }
        Some(u) => u,
        None => {
            let created = repo
                .create_user(NewUser {
                    username: req.username,
                    email: req.email,
                    role: None,
                    bio: None,
                    first_name: None,
                    last_name: None,
                })
                .await?;
            log::info!("registered user '{}'", created.username);
            created
        }
    };

    let code = issue_code(repo, &user.username).await?;
    mailer
        .send(Message {
            from: settings.mail_from.clone(),
            to: user.email.clone(),
            subject: "Confirmation code".into(),
            body: format!("Your confirmation code:\n{code}"),
        })
        .await
        .map_err(|e| {
            log::error!("could not deliver confirmation code to '{}': {e}", user.username);
            ApiError::Internal
        })?;
    Ok(user)
}

/// Store a fresh code for `username`, replacing any earlier one, and return it
/// in plain text.
pub async fn issue_code(repo: &dyn Repo, username: &str) -> Result<String, ApiError> {
    let code = Uuid::new_v4().to_string();
    repo.put_code(username, ConfirmationCode { code_hash: hash_code(&code), issued_at: Utc::now() })
        .await?;
    Ok(code)
}

pub async fn exchange(
    repo: &dyn Repo,
    jwt: &JwtKeys,
    settings: &CodeSettings,
    req: TokenRequest,
) -> Result<String, ApiError> {
    validation::check(&req)?;
    let user = repo.get_user(&req.username).await?;
    if !user.is_active() {
        return Err(ApiError::NotFound);
    }

    let presented = hash_code(req.confirmation_code.trim());
    let current = match repo.get_code(&user.username).await? {
        Some(c) => c.code_hash == presented && !expired(c.issued_at, settings.ttl, Utc::now()),
        None => false,
    };
    if !current || !repo.consume_code(&user.username, &presented).await? {
        log::info!("rejected confirmation code for '{}'", user.username);
        return Err(ApiError::field("confirmation_code", "invalid or expired confirmation code"));
    }

    jwt.issue(&user.username).map_err(|e| {
        log::error!("token signing failed: {e}");
        ApiError::Internal
    })
}

#[cfg(all(test, feature = "inmem-store"))]
mod tests {
    use super::*;
    use crate::mailer::MemoryMailer;
    use crate::repo::inmem::InMemRepo;
    use crate::repo::UserRepo;

    fn keys() -> JwtKeys { JwtKeys::new("test-secret-must-be-32-bytes-long!!", 1) }

    fn code_for(mailer: &MemoryMailer, email: &str) -> String {
        let msg = mailer.last_to(email).expect("mail sent");
        msg.body.lines().last().unwrap().to_string()
    }

    fn signup_req(u: &str, e: &str) -> SignupRequest { SignupRequest { username: u.into(), email: e.into() } }
    fn token_req(u: &str, c: &str) -> TokenRequest { TokenRequest { username: u.into(), confirmation_code: c.into() } }

    #[tokio::test]
    async fn signup_then_exchange() {
        let repo = InMemRepo::new();
        let mailer = MemoryMailer::new();
        let s = CodeSettings::default();

        let user = signup(&repo, &mailer, &s, signup_req("alice", "a@x.com")).await.unwrap();
        assert_eq!(user.username, "alice");
        let c1 = code_for(&mailer, "a@x.com");

        assert!(matches!(exchange(&repo, &keys(), &s, token_req("alice", "wrong")).await, Err(ApiError::Validation(_))));
        let token = exchange(&repo, &keys(), &s, token_req("alice", &c1)).await.unwrap();
        assert_eq!(keys().verify(&token).unwrap().sub, "alice");

        // single use
        assert!(exchange(&repo, &keys(), &s, token_req("alice", &c1)).await.is_err());
    }

    #[tokio::test]
    async fn reissue_invalidates_previous_code() {
        let repo = InMemRepo::new();
        let mailer = MemoryMailer::new();
        let s = CodeSettings::default();

        signup(&repo, &mailer, &s, signup_req("bob", "b@x.com")).await.unwrap();
        let c1 = code_for(&mailer, "b@x.com");
        signup(&repo, &mailer, &s, signup_req("bob", "b@x.com")).await.unwrap();
        let c2 = code_for(&mailer, "b@x.com");
        assert_ne!(c1, c2);

        assert!(exchange(&repo, &keys(), &s, token_req("bob", &c1)).await.is_err());
        assert!(exchange(&repo, &keys(), &s, token_req("bob", &c2)).await.is_ok());
        assert_eq!(repo.list_users(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reserved_and_mismatched_pairs_rejected() {
        let repo = InMemRepo::new();
        let mailer = MemoryMailer::new();
        let s = CodeSettings::default();

        for email in ["me@x.com", "other@y.org"] {
            assert!(matches!(signup(&repo, &mailer, &s, signup_req("me", email)).await, Err(ApiError::Validation(_))));
        }

        signup(&repo, &mailer, &s, signup_req("carol", "c@x.com")).await.unwrap();
        signup(&repo, &mailer, &s, signup_req("dave", "d@x.com")).await.unwrap();

        // username taken with another email
        assert!(signup(&repo, &mailer, &s, signup_req("carol", "new@x.com")).await.is_err());
        // email taken by another username
        assert!(signup(&repo, &mailer, &s, signup_req("erin", "c@x.com")).await.is_err());
        // both exist but belong to different accounts
        assert!(signup(&repo, &mailer, &s, signup_req("carol", "d@x.com")).await.is_err());
    }

    #[tokio::test]
    async fn expired_code_rejected() {
        let repo = InMemRepo::new();
        let mailer = MemoryMailer::new();
        let s = CodeSettings { ttl: Duration::seconds(-1), ..CodeSettings::default() };

        signup(&repo, &mailer, &s, signup_req("frank", "f@x.com")).await.unwrap();
        let code = code_for(&mailer, "f@x.com");
        assert!(exchange(&repo, &keys(), &s, token_req("frank", &code)).await.is_err());
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let repo = InMemRepo::new();
        let r = exchange(&repo, &keys(), &CodeSettings::default(), token_req("ghost", "x")).await;
        assert!(matches!(r, Err(ApiError::NotFound)));
    }
}
