use actix_web::{http::Method, web, HttpResponse};

use super::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;
use crate::models::*;
use crate::policy::{authorize, Resource};
use crate::validation::{check, FieldErrors};

fn admin(me: &CurrentUser, method: Method) -> Result<(), ApiError> {
    authorize(Some(&me.0), &method, Resource::Catalog, None)
}

// ---------------- categories ----------------

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    params(("search" = Option<String>, Query, description = "Name substring, case-insensitive")),
    responses((status = 200, description = "Categories", body = [Category])),
    tag = "catalog"
)]
pub async fn list_categories(data: web::Data<AppState>, q: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_categories(q.search.as_deref()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name or slug taken")
    ),
    tag = "catalog"
)]
pub async fn create_category(
    me: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::POST)?;
    let new = payload.into_inner();
    check(&new)?;
    Ok(HttpResponse::Created().json(data.repo.create_category(new).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/categories/{slug}",
    params(("slug" = String, Path, description = "Category slug")),
    responses(
        (status = 204, description = "Deleted; titles in it are left without a category"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Category not found")
    ),
    tag = "catalog"
)]
pub async fn delete_category(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::DELETE)?;
    data.repo.delete_category(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- genres ----------------

#[utoipa::path(
    get,
    path = "/api/v1/genres",
    params(("search" = Option<String>, Query, description = "Name substring, case-insensitive")),
    responses((status = 200, description = "Genres", body = [Genre])),
    tag = "catalog"
)]
pub async fn list_genres(data: web::Data<AppState>, q: web::Query<SearchQuery>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_genres(q.search.as_deref()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/genres",
    request_body = NewGenre,
    responses(
        (status = 201, description = "Genre created", body = Genre),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Admins only"),
        (status = 409, description = "Name or slug taken")
    ),
    tag = "catalog"
)]
pub async fn create_genre(
    me: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<NewGenre>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::POST)?;
    let new = payload.into_inner();
    check(&new)?;
    Ok(HttpResponse::Created().json(data.repo.create_genre(new).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/genres/{slug}",
    params(("slug" = String, Path, description = "Genre slug")),
    responses(
        (status = 204, description = "Deleted and unlinked from titles"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Genre not found")
    ),
    tag = "catalog"
)]
pub async fn delete_genre(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::DELETE)?;
    data.repo.delete_genre(&path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- titles ----------------

/// Unknown category/genre slugs become field errors on `category` / `genre`.
async fn check_refs(data: &AppState, category: Option<&str>, genres: &[String]) -> Result<(), ApiError> {
    let (cat, unknown) = data.repo.missing_refs(category, genres).await?;
    let mut fields = FieldErrors::new();
    if let Some(c) = cat {
        fields.entry("category".into()).or_default().push(format!("unknown category '{c}'"));
    }
    for g in unknown {
        fields.entry("genre".into()).or_default().push(format!("unknown genre '{g}'"));
    }
    if fields.is_empty() { Ok(()) } else { Err(ApiError::Validation(fields)) }
}

#[utoipa::path(
    get,
    path = "/api/v1/titles",
    params(
        ("category" = Option<String>, Query, description = "Category slug"),
        ("genre" = Option<String>, Query, description = "Genre slug"),
        ("name" = Option<String>, Query, description = "Name substring"),
        ("year" = Option<i32>, Query, description = "Exact year")
    ),
    responses((status = 200, description = "Titles ordered by name", body = [TitleView])),
    tag = "catalog"
)]
pub async fn list_titles(data: web::Data<AppState>, q: web::Query<TitleFilter>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.list_titles(&q).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = Id, Path, description = "Title id")),
    responses((status = 200, description = "Title with its rating", body = TitleView), (status = 404, description = "Title not found")),
    tag = "catalog"
)]
pub async fn get_title(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.repo.get_title(path.into_inner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/titles",
    request_body = NewTitle,
    responses(
        (status = 201, description = "Title created", body = TitleView),
        (status = 400, description = "Validation failed or unknown category/genre"),
        (status = 403, description = "Admins only")
    ),
    tag = "catalog"
)]
pub async fn create_title(
    me: CurrentUser,
    data: web::Data<AppState>,
    payload: web::Json<NewTitle>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::POST)?;
    let new = payload.into_inner();
    check(&new)?;
    check_refs(&data, new.category.as_deref(), &new.genre).await?;
    Ok(HttpResponse::Created().json(data.repo.create_title(new).await?))
}

#[utoipa::path(
    patch,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = Id, Path, description = "Title id")),
    request_body = UpdateTitle,
    responses(
        (status = 200, description = "Title updated", body = TitleView),
        (status = 400, description = "Validation failed or unknown category/genre"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Title not found")
    ),
    tag = "catalog"
)]
pub async fn update_title(
    me: CurrentUser,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateTitle>,
) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::PATCH)?;
    let id = path.into_inner();
    data.repo.get_title(id).await?;
    let upd = payload.into_inner();
    check(&upd)?;
    let genres = upd.genre.as_deref().unwrap_or_default();
    check_refs(&data, upd.category.as_deref(), genres).await?;
    Ok(HttpResponse::Ok().json(data.repo.update_title(id, upd).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/titles/{title_id}",
    params(("title_id" = Id, Path, description = "Title id")),
    responses(
        (status = 204, description = "Title and its reviews deleted"),
        (status = 403, description = "Admins only"),
        (status = 404, description = "Title not found")
    ),
    tag = "catalog"
)]
pub async fn delete_title(me: CurrentUser, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    admin(&me, Method::DELETE)?;
    data.repo.delete_title(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}
