#![cfg(feature = "inmem-store")]

use actix_web::{http::header, test, web, App, HttpResponse};
use std::sync::Arc;
use yamdb::auth::JwtKeys;
use yamdb::mailer::MemoryMailer;
use yamdb::repo::inmem::InMemRepo;
use yamdb::signup::CodeSettings;
use yamdb::{config, AppState, SecurityHeaders};

fn state() -> web::Data<AppState> {
    web::Data::new(AppState {
        repo: Arc::new(InMemRepo::new()),
        mailer: Arc::new(MemoryMailer::new()),
        jwt: JwtKeys::new("test-secret-must-be-32-bytes-long!!", 1),
        codes: CodeSettings::default(),
        rate_limiter: None,
    })
}

#[actix_web::test]
async fn test_security_headers_present() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).app_data(state()).configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let headers = resp.headers();
    assert_eq!(headers.get("content-security-policy").unwrap(), "default-src 'none'; frame-ancestors 'none'");
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("strict-transport-security").is_none()); // not enabled
    assert!(headers.get("cache-control").is_none()); // anonymous request
}

#[actix_web::test]
async fn test_hsts_enabled_via_builder() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default().with_hsts(true)).app_data(state()).configure(config),
    )
    .await;
    let req = test::TestRequest::get().uri("/api/v1/genres").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.headers().get("strict-transport-security").is_some(), "HSTS header missing");
}

#[actix_web::test]
async fn test_authenticated_responses_not_cached() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).app_data(state()).configure(config),
    )
    .await;
    // rejected credentials still must not be cached
    let req = test::TestRequest::get()
        .uri("/api/v1/users/me")
        .insert_header(("Authorization", "Bearer notatoken"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
}

#[actix_web::test]
async fn test_existing_headers_preserved() {
    let app = test::init_service(
        App::new().wrap(SecurityHeaders::default()).route(
            "/custom",
            web::get().to(|| async {
                HttpResponse::Ok()
                    .insert_header((header::CONTENT_SECURITY_POLICY, "custom-src 'none'"))
                    .finish()
            }),
        ),
    )
    .await;
    let req = test::TestRequest::get().uri("/custom").to_request();
    let resp = test::call_service(&app, req).await;
    let csp = resp.headers().get("content-security-policy").unwrap().to_str().unwrap();
    assert_eq!(csp, "custom-src 'none'");
}
