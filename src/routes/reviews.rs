use actix_web::{http::Method, web, HttpResponse};

use super::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::*;
use crate::policy::{authorize, Resource};
use crate::validation::check;

// ---------------- reviews ----------------

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = Id, Path, description = "Title id")),
    responses((status = 200, description = "Reviews of the title", body = [Review]), (status = 404, description = "Title not found")),
    tag = "reviews"
)]
pub async fn list_reviews(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_reviews(path.into_inner()).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(("title_id" = Id, Path, description = "Title id"), ("review_id" = Id, Path, description = "Review id")),
    responses((status = 200, description = "Review", body = Review), (status = 404, description = "Title or review not found")),
    tag = "reviews"
)]
pub async fn get_review(data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(data.repo.get_review(title_id, review_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews",
    params(("title_id" = Id, Path, description = "Title id")),
    request_body = NewReview,
    responses(
        (status = 201, description = "Review created", body = Review),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Title not found"),
        (status = 409, description = "Caller already reviewed this title")
    ),
    tag = "reviews"
)]
pub async fn create_review(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReview>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::POST, Resource::Authored, None)?;
    let title_id = path.into_inner();
    let new = payload.into_inner();
    check(&new)?;
    data.repo.get_title(title_id).await?;
    if data.repo.has_review(title_id, &me.0.username).await? {
        return Err(ApiError::Conflict("you have already reviewed this title".into()));
    }
    let review = data.repo.create_review(title_id, &me.0.username, new).await?;
    Ok(HttpResponse::Created().json(review))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(("title_id" = Id, Path, description = "Title id"), ("review_id" = Id, Path, description = "Review id")),
    request_body = UpdateReview,
    responses(
        (status = 200, description = "Review updated", body = Review),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Title or review not found")
    ),
    tag = "reviews"
)]
pub async fn update_review(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<UpdateReview>,
) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id) = path.into_inner();
    let existing = data.repo.get_review(title_id, review_id).await?;
    authorize(Some(&me.0), &Method::PATCH, Resource::Authored, Some(&existing.author))?;
    let upd = payload.into_inner();
    check(&upd)?;
    Ok(HttpResponse::Ok().json(data.repo.update_review(title_id, review_id, upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}",
    params(("title_id" = Id, Path, description = "Title id"), ("review_id" = Id, Path, description = "Review id")),
    responses(
        (status = 204, description = "Review and its comments deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Title or review not found")
    ),
    tag = "reviews"
)]
pub async fn delete_review(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id) = path.into_inner();
    let existing = data.repo.get_review(title_id, review_id).await?;
    authorize(Some(&me.0), &Method::DELETE, Resource::Authored, Some(&existing.author))?;
    data.repo.delete_review(title_id, review_id).await?;
    if existing.author != me.0.username {
        log::info!("review {review_id} by '{}' removed by '{}'", existing.author, me.0.username);
    }
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- comments ----------------

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(("title_id" = Id, Path, description = "Title id"), ("review_id" = Id, Path, description = "Review id")),
    responses((status = 200, description = "Comments on the review", body = [Comment]), (status = 404, description = "Title or review not found")),
    tag = "comments"
)]
pub async fn list_comments(data: web::Data<AppState>, path: web::Path<(Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(data.repo.list_comments(title_id, review_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = Id, Path, description = "Title id"),
        ("review_id" = Id, Path, description = "Review id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    responses((status = 200, description = "Comment", body = Comment), (status = 404, description = "Not found")),
    tag = "comments"
)]
pub async fn get_comment(data: web::Data<AppState>, path: web::Path<(Id, Id, Id)>) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id, comment_id) = path.into_inner();
    Ok(HttpResponse::Ok().json(data.repo.get_comment(title_id, review_id, comment_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments",
    params(("title_id" = Id, Path, description = "Title id"), ("review_id" = Id, Path, description = "Review id")),
    request_body = NewComment,
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 400, description = "Validation failed"),
        (status = 401, description = "Authentication required"),
        (status = 404, description = "Title or review not found")
    ),
    tag = "comments"
)]
pub async fn create_comment(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::POST, Resource::Authored, None)?;
    let (title_id, review_id) = path.into_inner();
    let new = payload.into_inner();
    check(&new)?;
    let comment = data.repo.create_comment(title_id, review_id, &me.0.username, new).await?;
    Ok(HttpResponse::Created().json(comment))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = Id, Path, description = "Title id"),
        ("review_id" = Id, Path, description = "Review id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    request_body = UpdateComment,
    responses(
        (status = 200, description = "Comment updated", body = Comment),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "comments"
)]
pub async fn update_comment(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id, Id)>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id, comment_id) = path.into_inner();
    let existing = data.repo.get_comment(title_id, review_id, comment_id).await?;
    authorize(Some(&me.0), &Method::PATCH, Resource::Authored, Some(&existing.author))?;
    let upd = payload.into_inner();
    check(&upd)?;
    Ok(HttpResponse::Ok().json(data.repo.update_comment(title_id, review_id, comment_id, upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
    params(
        ("title_id" = Id, Path, description = "Title id"),
        ("review_id" = Id, Path, description = "Review id"),
        ("comment_id" = Id, Path, description = "Comment id")
    ),
    responses(
        (status = 204, description = "Comment deleted"),
        (status = 403, description = "Not the author, a moderator or an admin"),
        (status = 404, description = "Not found")
    ),
    tag = "comments"
)]
pub async fn delete_comment(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id, Id)>,
) -> Result<HttpResponse, ApiError> {
    let (title_id, review_id, comment_id) = path.into_inner();
    let existing = data.repo.get_comment(title_id, review_id, comment_id).await?;
    authorize(Some(&me.0), &Method::DELETE, Resource::Authored, Some(&existing.author))?;
    data.repo.delete_comment(title_id, review_id, comment_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
