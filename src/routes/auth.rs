use actix_web::{web, HttpRequest, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::{client_ip, AppState};
use crate::error::ApiError;
use crate::models::{SignupRequest, TokenRequest, TokenResponse};
use crate::signup;
use crate::validation;

#[derive(Debug, Serialize, ToSchema)]
pub struct SignupResponse {
    pub username: String,
    pub email: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 200, description = "Confirmation code sent", body = SignupResponse),
        (status = 400, description = "Invalid or conflicting username/email"),
        (status = 429, description = "Too many signup attempts")
    ),
    tag = "auth"
)]
pub async fn signup(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse, ApiError> {
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_signup(&client_ip(&req)) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let user = signup::signup(data.repo.as_ref(), data.mailer.as_ref(), &data.codes, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(SignupResponse { username: user.username, email: user.email }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/token",
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Access token", body = TokenResponse),
        (status = 400, description = "Invalid, used or expired confirmation code"),
        (status = 404, description = "Unknown username"),
        (status = 429, description = "Too many attempts for this account from this client")
    ),
    tag = "auth"
)]
pub async fn token(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<TokenRequest>,
) -> Result<HttpResponse, ApiError> {
    let payload = payload.into_inner();
    validation::check(&payload)?;
    if let Some(rl) = &data.rate_limiter {
        if !rl.allow_token(&client_ip(&req), &payload.username) {
            return Err(ApiError::TooManyRequests);
        }
    }
    let token = signup::exchange(data.repo.as_ref(), &data.jwt, &data.codes, payload).await?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}
