#![cfg(feature = "inmem-store")]

use actix_web::{test, web, App};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use yamdb::auth::JwtKeys;
use yamdb::mailer::MemoryMailer;
use yamdb::rate_limit::{RateLimitConfig, RateLimiterFacade};
use yamdb::repo::inmem::InMemRepo;
use yamdb::signup::CodeSettings;
use yamdb::{config, AppState};

fn state(cfg: RateLimitConfig) -> web::Data<AppState> {
    state_with_mailer(cfg, Arc::new(MemoryMailer::new()))
}

fn state_with_mailer(cfg: RateLimitConfig, mailer: Arc<MemoryMailer>) -> web::Data<AppState> {
    web::Data::new(AppState {
        repo: Arc::new(InMemRepo::new()),
        mailer,
        jwt: JwtKeys::new("test-secret-must-be-32-bytes-long!!", 1),
        codes: CodeSettings::default(),
        rate_limiter: Some(RateLimiterFacade::new(cfg)),
    })
}

#[actix_web::test]
async fn rate_limit_signup_per_client() {
    // only 2 signups per large window so the third is denied
    let cfg = RateLimitConfig { signup_limit: 2, signup_window: Duration::from_secs(300), ..Default::default() };
    let app = test::init_service(App::new().app_data(state(cfg)).configure(config)).await;

    for (i, expected) in [200u16, 200, 429].into_iter().enumerate() {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/signup")
            .peer_addr("10.0.0.1:4000".parse().unwrap())
            .set_json(json!({"username": format!("user{i}"), "email": format!("u{i}@x.com")}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), expected, "signup #{i}");
    }

    // another client is unaffected
    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup")
        .peer_addr("10.0.0.2:4000".parse().unwrap())
        .set_json(json!({"username": "other", "email": "other@x.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn rate_limit_token_guessing_per_client_and_account() {
    let cfg = RateLimitConfig { token_limit: 3, token_window: Duration::from_secs(300), ..Default::default() };
    let app = test::init_service(App::new().app_data(state(cfg)).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup")
        .set_json(json!({"username": "alice", "email": "a@x.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);

    let mut statuses = Vec::new();
    for _ in 0..4 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/token")
            .set_json(json!({"username": "alice", "confirmation_code": "guess"}))
            .to_request();
        statuses.push(test::call_service(&app, req).await.status().as_u16());
    }
    assert_eq!(statuses, vec![400, 400, 400, 429]);
}

#[actix_web::test]
async fn failures_from_another_client_do_not_lock_out_the_owner() {
    let mailer = Arc::new(MemoryMailer::new());
    let cfg = RateLimitConfig { token_limit: 3, token_window: Duration::from_secs(300), ..Default::default() };
    let app = test::init_service(App::new().app_data(state_with_mailer(cfg, mailer.clone())).configure(config)).await;

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/signup")
        .peer_addr("10.0.0.1:4000".parse().unwrap())
        .set_json(json!({"username": "alice", "email": "a@x.com"}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
    let code = mailer.last_to("a@x.com").unwrap().body.lines().last().unwrap().to_string();

    for _ in 0..10 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/token")
            .peer_addr("203.0.113.9:5000".parse().unwrap())
            .set_json(json!({"username": "alice", "confirmation_code": "guess"}))
            .to_request();
        test::call_service(&app, req).await;
    }

    let req = test::TestRequest::post()
        .uri("/api/v1/auth/token")
        .peer_addr("10.0.0.1:4000".parse().unwrap())
        .set_json(json!({"username": "alice", "confirmation_code": code}))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 200);
}

#[actix_web::test]
async fn oversized_username_rejected_before_limiter() {
    let cfg = RateLimitConfig { token_limit: 1, ..Default::default() };
    let app = test::init_service(App::new().app_data(state(cfg)).configure(config)).await;
    for _ in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/token")
            .set_json(json!({"username": "a".repeat(10_000), "confirmation_code": "x"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["fields"]["username"].is_array());
    }
}

#[actix_web::test]
async fn disabled_limiter_allows_everything() {
    let cfg = RateLimitConfig { enabled: false, signup_limit: 1, ..Default::default() };
    let app = test::init_service(App::new().app_data(state(cfg)).configure(config)).await;
    for i in 0..3 {
        let req = test::TestRequest::post()
            .uri("/api/v1/auth/signup")
            .set_json(json!({"username": format!("u{i}"), "email": format!("u{i}@x.com")}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
