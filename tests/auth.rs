#![cfg(feature = "inmem-store")]

use actix_web::{dev::Payload, test, web, FromRequest};
use std::sync::Arc;
use yamdb::{
    auth::{CurrentUser, JwtKeys, Role},
    mailer::MemoryMailer,
    models::NewUser,
    repo::{inmem::InMemRepo, UserRepo},
    signup::CodeSettings,
    AppState,
};

const SECRET: &str = "test-secret-must-be-32-bytes-long!!";

async fn state_with_user(username: &str, role: Role) -> web::Data<AppState> {
    let repo = InMemRepo::new();
    repo.create_user(NewUser {
        username: username.into(),
        email: format!("{username}@example.com"),
        role: Some(role),
        bio: None,
        first_name: None,
        last_name: None,
    })
    .await
    .unwrap();
    web::Data::new(AppState {
        repo: Arc::new(repo),
        mailer: Arc::new(MemoryMailer::new()),
        jwt: JwtKeys::new(SECRET, 1),
        codes: CodeSettings::default(),
        rate_limiter: None,
    })
}

async fn extract(state: &web::Data<AppState>, auth_header: Option<String>) -> Result<CurrentUser, yamdb::error::ApiError> {
    let mut req = test::TestRequest::default().app_data(state.clone());
    if let Some(h) = auth_header {
        req = req.insert_header(("Authorization", h));
    }
    let req = req.to_http_request();
    CurrentUser::from_request(&req, &mut Payload::None).await
}

#[actix_web::test]
async fn valid_token_resolves_current_role() {
    let state = state_with_user("tester", Role::User).await;
    let token = state.jwt.issue("tester").unwrap();

    let me = extract(&state, Some(format!("Bearer {token}"))).await.expect("extract");
    assert_eq!(me.0.username, "tester");
    assert_eq!(me.0.role, Role::User);

    // role comes from storage, not the token
    state
        .repo
        .update_user("tester", yamdb::models::UpdateUser { role: Some(Role::Admin), ..Default::default() })
        .await
        .unwrap();
    let me = extract(&state, Some(format!("Bearer {token}"))).await.unwrap();
    assert_eq!(me.0.role, Role::Admin);
}

#[actix_web::test]
async fn missing_or_invalid_token_rejected() {
    let state = state_with_user("tester", Role::User).await;
    assert!(extract(&state, None).await.is_err());
    assert!(extract(&state, Some("Bearer notatoken".into())).await.is_err());

    let foreign = JwtKeys::new("another-secret-that-is-32-bytes-long", 1).issue("tester").unwrap();
    assert!(extract(&state, Some(format!("Bearer {foreign}"))).await.is_err());
}

#[actix_web::test]
async fn unknown_or_deactivated_subject_rejected() {
    let state = state_with_user("tester", Role::User).await;
    let ghost = state.jwt.issue("ghost").unwrap();
    assert!(extract(&state, Some(format!("Bearer {ghost}"))).await.is_err());

    let token = state.jwt.issue("tester").unwrap();
    state.repo.deactivate_user("tester").await.unwrap();
    assert!(extract(&state, Some(format!("Bearer {token}"))).await.is_err());
}
