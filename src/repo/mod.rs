use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict: {0}")] Conflict(String),
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Active users ordered by id; `search` matches a username substring.
    async fn list_users(&self, search: Option<&str>) -> RepoResult<Vec<User>>;
    /// Looks up deactivated users too.
    async fn get_user(&self, username: &str) -> RepoResult<User>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn update_user(&self, username: &str, upd: UpdateUser) -> RepoResult<User>;
    async fn deactivate_user(&self, username: &str) -> RepoResult<()>;
}

/// Confirmation codes keyed by username; one active code per user.
#[async_trait]
pub trait CodeRepo: Send + Sync {
    async fn put_code(&self, username: &str, code: ConfirmationCode) -> RepoResult<()>;
    async fn get_code(&self, username: &str) -> RepoResult<Option<ConfirmationCode>>;
    /// Removes the stored code if it still carries `code_hash`. Returns whether
    /// it did, so two exchanges racing on one code cannot both succeed.
    async fn consume_code(&self, username: &str, code_hash: &str) -> RepoResult<bool>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self, search: Option<&str>) -> RepoResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn delete_category(&self, slug: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait GenreRepo: Send + Sync {
    async fn list_genres(&self, search: Option<&str>) -> RepoResult<Vec<Genre>>;
    async fn create_genre(&self, new: NewGenre) -> RepoResult<Genre>;
    async fn delete_genre(&self, slug: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait TitleRepo: Send + Sync {
    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<TitleView>>;
    async fn get_title(&self, id: Id) -> RepoResult<TitleView>;
    /// Returns the slugs among `category`/`genres` that do not exist.
    async fn missing_refs(&self, category: Option<&str>, genres: &[String]) -> RepoResult<(Option<String>, Vec<String>)>;
    async fn create_title(&self, new: NewTitle) -> RepoResult<TitleView>;
    async fn update_title(&self, id: Id, upd: UpdateTitle) -> RepoResult<TitleView>;
    async fn delete_title(&self, id: Id) -> RepoResult<()>;
}

/// Review lookups are scoped by title: a review id under the wrong title is
/// not found.
#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn list_reviews(&self, title_id: Id) -> RepoResult<Vec<Review>>;
    async fn get_review(&self, title_id: Id, review_id: Id) -> RepoResult<Review>;
    async fn has_review(&self, title_id: Id, author: &str) -> RepoResult<bool>;
    /// Fails with `Conflict` when `author` already reviewed the title.
    async fn create_review(&self, title_id: Id, author: &str, new: NewReview) -> RepoResult<Review>;
    async fn update_review(&self, title_id: Id, review_id: Id, upd: UpdateReview) -> RepoResult<Review>;
    async fn delete_review(&self, title_id: Id, review_id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn list_comments(&self, title_id: Id, review_id: Id) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<Comment>;
    async fn create_comment(&self, title_id: Id, review_id: Id, author: &str, new: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, title_id: Id, review_id: Id, comment_id: Id, upd: UpdateComment) -> RepoResult<Comment>;
    async fn delete_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<()>;
}

pub trait Repo: UserRepo + CodeRepo + CategoryRepo + GenreRepo + TitleRepo + ReviewRepo + CommentRepo {}

impl<T> Repo for T where T: UserRepo + CodeRepo + CategoryRepo + GenreRepo + TitleRepo + ReviewRepo + CommentRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem;

#[cfg(feature = "postgres-store")]
pub mod pg;
