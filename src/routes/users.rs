use actix_web::{http::Method, web, HttpResponse};

use super::AppState;
use crate::auth::{CurrentUser, Role};
use crate::error::ApiError;
use crate::models::{NewUser, SearchQuery, UpdateUser, User};
use crate::policy::{authorize, Resource};
use crate::validation::check;

#[utoipa::path(
    get,
    path = "/api/v1/users/me",
    responses((status = 200, description = "Own profile", body = User), (status = 401, description = "Authentication required")),
    tag = "users"
)]
pub async fn get_me(me: CurrentUser) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::GET, Resource::OwnProfile, None)?;
    Ok(HttpResponse::Ok().json(me.0))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/me",
    request_body = UpdateUser,
    responses(
        (status = 200, description = "Updated profile; role changes are ignored unless the caller is an admin", body = User),
        (status = 400, description = "Validation failed"), (status = 401, description = "Authentication required"), (status = 409, description = "Email already registered")
    ),
    tag = "users"
)]
pub async fn update_me(
    me: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<UpdateUser>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::PATCH, Resource::OwnProfile, None)?;
    let mut upd = payload.into_inner();
    check(&upd)?;
    if me.0.role != Role::Admin {
        upd.role = None;
    }
    let user = data.repo.update_user(&me.0.username, upd).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users",
    params(("search" = Option<String>, Query, description = "Username substring")),
    responses((status = 200, description = "Active users", body = [User]), (status = 401, description = "Authentication required"), (status = 403, description = "Admins only")),
    tag = "users"
)]
pub async fn list_users(
    me: CurrentUser,
    data: web::Data<AppState>,
    q: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::GET, Resource::UserAdmin, None)?;
    let users = data.repo.list_users(q.search.as_deref()).await?;
    Ok(HttpResponse::Ok().json(users))
}

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 400, description = "Validation failed"), (status = 401, description = "Authentication required"), (status = 403, description = "Admins only"),
        (status = 409, description = "Username or email taken")
    ),
    tag = "users"
)]
pub async fn create_user(
    me: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::POST, Resource::UserAdmin, None)?;
    let new = payload.into_inner();
    check(&new)?;
    let user = data.repo.create_user(new).await?;
    log::info!("admin '{}' created user '{}'", me.0.username, user.username);
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses((status = 200, description = "User", body = User), (status = 401, description = "Authentication required"), (status = 403, description = "Admins only"), (status = 404, description = "User not found")),
    tag = "users"
)]
pub async fn get_user(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::GET, Resource::UserAdmin, None)?;
    let user = data.repo.get_user(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    patch,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    request_body = UpdateUser,
    responses((status = 200, description = "Updated user", body = User), (status = 400, description = "Validation failed"), (status = 401, description = "Authentication required"), (status = 403, description = "Admins only"), (status = 404, description = "User not found"), (status = 409, description = "Email already registered")),
    tag = "users"
)]
pub async fn update_user(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
    payload: web::Json<UpdateUser>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::PATCH, Resource::UserAdmin, None)?;
    let upd = payload.into_inner();
    check(&upd)?;
    let username = path.into_inner();
    if let Some(role) = upd.role {
        log::info!("admin '{}' set role of '{username}' to {role}", me.0.username);
    }
    let user = data.repo.update_user(&username, upd).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[utoipa::path(
    delete,
    path = "/api/v1/users/{username}",
    params(("username" = String, Path, description = "Username")),
    responses((status = 204, description = "User deactivated"), (status = 401, description = "Authentication required"), (status = 403, description = "Admins only"), (status = 404, description = "User not found")),
    tag = "users"
)]
pub async fn delete_user(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    authorize(Some(&me.0), &Method::DELETE, Resource::UserAdmin, None)?;
    let username = path.into_inner();
    data.repo.deactivate_user(&username).await?;
    log::info!("admin '{}' deactivated user '{username}'", me.0.username);
    Ok(HttpResponse::NoContent().finish())
}
