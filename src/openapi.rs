use crate::auth::Role;
use crate::models::*;
use crate::routes::{auth, catalog, reviews, users};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup,
        auth::token,
        users::get_me,
        users::update_me,
        users::list_users,
        users::create_user,
        users::get_user,
        users::update_user,
        users::delete_user,
        catalog::list_categories,
        catalog::create_category,
        catalog::delete_category,
        catalog::list_genres,
        catalog::create_genre,
        catalog::delete_genre,
        catalog::list_titles,
        catalog::get_title,
        catalog::create_title,
        catalog::update_title,
        catalog::delete_title,
        reviews::list_reviews,
        reviews::get_review,
        reviews::create_review,
        reviews::update_review,
        reviews::delete_review,
        reviews::list_comments,
        reviews::get_comment,
        reviews::create_comment,
        reviews::update_comment,
        reviews::delete_comment,
    ),
    components(schemas(
        Role, User, NewUser, UpdateUser,
        SignupRequest, auth::SignupResponse, TokenRequest, TokenResponse,
        Category, NewCategory, Genre, NewGenre,
        TitleView, NewTitle, UpdateTitle,
        Review, NewReview, UpdateReview,
        Comment, NewComment, UpdateComment,
    )),
    modifiers(&BearerScheme),
    tags(
        (name = "auth", description = "Signup and token exchange"),
        (name = "users", description = "Profiles and user administration"),
        (name = "catalog", description = "Categories, genres and titles"),
        (name = "reviews", description = "Reviews of titles"),
        (name = "comments", description = "Comments on reviews"),
    )
)]
pub struct ApiDoc;

struct BearerScheme;

impl Modify for BearerScheme {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/auth/signup",
            "/api/v1/auth/token",
            "/api/v1/users/me",
            "/api/v1/users/{username}",
            "/api/v1/titles/{title_id}/reviews/{review_id}/comments/{comment_id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert!(doc.components.unwrap().security_schemes.contains_key("bearer"));
    }
}
