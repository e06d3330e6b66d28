use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use super::*;
use crate::auth::Role;

#[derive(Clone)]
pub struct PgRepo { pool: Pool<Postgres> }

impl PgRepo {
    pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    async fn title_exists(&self, title_id: Id) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM titles WHERE id = $1)")
            .bind(title_id)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn ensure_review_in_title(&self, title_id: Id, review_id: Id) -> RepoResult<()> {
        let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM reviews WHERE id = $1 AND title_id = $2)")
            .bind(review_id).bind(title_id)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        if found { Ok(()) } else { Err(RepoError::NotFound) }
    }

    async fn attach_genres(&self, rows: Vec<TitleRow>) -> RepoResult<Vec<TitleView>> {
        let ids: Vec<Id> = rows.iter().map(|r| r.id).collect();
        let links = sqlx::query_as::<_, GenreLink>(r#"
            SELECT tg.title_id, g.name, g.slug
            FROM title_genres tg JOIN genres g ON g.id = tg.genre_id
            WHERE tg.title_id = ANY($1)
            ORDER BY g.name
        "#)
            .bind(ids)
            .fetch_all(&self.pool).await.map_err(db_err)?;
        let mut by_title: HashMap<Id, Vec<Genre>> = HashMap::new();
        for l in links {
            by_title.entry(l.title_id).or_default().push(Genre { name: l.name, slug: l.slug });
        }
        Ok(rows
            .into_iter()
            .map(|r| TitleView {
                id: r.id,
                name: r.name,
                year: r.year,
                rating: r.rating,
                description: r.description,
                genre: by_title.remove(&r.id).unwrap_or_default(),
                category: match (r.category_name, r.category_slug) {
                    (Some(name), Some(slug)) => Some(Category { name, slug }),
                    _ => None,
                },
            })
            .collect())
    }
}

/// Map sqlx failures onto repository errors. Unique violations (23505) become
/// conflicts, foreign-key violations (23503) mean a referenced row is gone.
fn db_err(e: sqlx::Error) -> RepoError {
    match e {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => RepoError::Conflict(conflict_message(db.constraint().unwrap_or_default()).to_string()),
            Some("23503") => RepoError::NotFound,
            _ => RepoError::Internal(db.to_string()),
        },
        other => RepoError::Internal(other.to_string()),
    }
}

fn conflict_message(constraint: &str) -> &'static str {
    match constraint {
        "uq_users_username" => "username already taken",
        "uq_users_email" => "email already registered",
        "uq_categories_slug" => "category slug already exists",
        "uq_categories_name" => "category name already exists",
        "uq_genres_slug" => "genre slug already exists",
        "uq_genres_name" => "genre name already exists",
        "uq_reviews_title_author" => "title already reviewed by this author",
        _ => "duplicate value",
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Id,
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    bio: String,
    role: String,
    deactivated_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = RepoError;
    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = r.role.parse::<Role>().map_err(RepoError::Internal)?;
        Ok(User {
            id: r.id,
            username: r.username,
            email: r.email,
            first_name: r.first_name,
            last_name: r.last_name,
            bio: r.bio,
            role,
            deactivated_at: r.deactivated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TitleRow {
    id: Id,
    name: String,
    year: i32,
    description: Option<String>,
    category_name: Option<String>,
    category_slug: Option<String>,
    rating: Option<f64>,
}

#[derive(sqlx::FromRow)]
struct GenreLink {
    title_id: Id,
    name: String,
    slug: String,
}

const USER_COLUMNS: &str = "id, username, email, first_name, last_name, bio, role, deactivated_at";

const TITLE_SELECT: &str = r#"
    SELECT t.id, t.name, t.year, t.description,
           c.name AS category_name, c.slug AS category_slug,
           (SELECT AVG(r.score)::float8 FROM reviews r WHERE r.title_id = t.id) AS rating
    FROM titles t
    LEFT JOIN categories c ON c.id = t.category_id
"#;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.title_id, u.username AS author, r.text, r.score, r.pub_date
    FROM reviews r JOIN users u ON u.id = r.author_id
"#;

const COMMENT_SELECT: &str = r#"
    SELECT c.id, c.review_id, u.username AS author, c.text, c.pub_date
    FROM comments c JOIN users u ON u.id = c.author_id
"#;

#[async_trait]
impl UserRepo for PgRepo {
    async fn list_users(&self, search: Option<&str>) -> RepoResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE deactivated_at IS NULL AND ($1::text IS NULL OR strpos(lower(username), lower($1)) > 0)
             ORDER BY id"
        ))
            .bind(search)
            .fetch_all(&self.pool).await.map_err(db_err)?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn get_user(&self, username: &str) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        row.try_into()
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"))
            .bind(email)
            .fetch_optional(&self.pool).await.map_err(db_err)?;
        row.map(User::try_from).transpose()
    }

    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (username, email, first_name, last_name, bio, role)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
            .bind(&new.username)
            .bind(&new.email)
            .bind(new.first_name.unwrap_or_default())
            .bind(new.last_name.unwrap_or_default())
            .bind(new.bio.unwrap_or_default())
            .bind(new.role.unwrap_or_default().as_str())
            .fetch_one(&self.pool).await.map_err(db_err)?;
        row.try_into()
    }

    async fn update_user(&self, username: &str, upd: UpdateUser) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET
                email = COALESCE($2, email),
                role = COALESCE($3, role),
                bio = COALESCE($4, bio),
                first_name = COALESCE($5, first_name),
                last_name = COALESCE($6, last_name)
             WHERE username = $1
             RETURNING {USER_COLUMNS}"
        ))
            .bind(username)
            .bind(upd.email.as_deref())
            .bind(upd.role.map(|r| r.as_str()))
            .bind(upd.bio.as_deref())
            .bind(upd.first_name.as_deref())
            .bind(upd.last_name.as_deref())
            .fetch_one(&self.pool).await.map_err(db_err)?;
        row.try_into()
    }

    async fn deactivate_user(&self, username: &str) -> RepoResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let done = sqlx::query("UPDATE users SET deactivated_at = COALESCE(deactivated_at, now()) WHERE username = $1")
            .bind(username)
            .execute(&mut *tx).await.map_err(db_err)?;
        if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
        sqlx::query("DELETE FROM confirmation_codes WHERE username = $1")
            .bind(username)
            .execute(&mut *tx).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)
    }
}

#[async_trait]
impl CodeRepo for PgRepo {
    async fn put_code(&self, username: &str, code: ConfirmationCode) -> RepoResult<()> {
        sqlx::query(
            "INSERT INTO confirmation_codes (username, code_hash, issued_at) VALUES ($1, $2, $3)
             ON CONFLICT (username) DO UPDATE SET code_hash = EXCLUDED.code_hash, issued_at = EXCLUDED.issued_at"
        )
            .bind(username)
            .bind(&code.code_hash)
            .bind(code.issued_at)
            .execute(&self.pool).await.map_err(db_err)?;
        Ok(())
    }

    async fn get_code(&self, username: &str) -> RepoResult<Option<ConfirmationCode>> {
        let row = sqlx::query_as::<_, (String, DateTime<Utc>)>(
            "SELECT code_hash, issued_at FROM confirmation_codes WHERE username = $1"
        )
            .bind(username)
            .fetch_optional(&self.pool).await.map_err(db_err)?;
        Ok(row.map(|(code_hash, issued_at)| ConfirmationCode { code_hash, issued_at }))
    }

    async fn consume_code(&self, username: &str, code_hash: &str) -> RepoResult<bool> {
        let done = sqlx::query("DELETE FROM confirmation_codes WHERE username = $1 AND code_hash = $2")
            .bind(username)
            .bind(code_hash)
            .execute(&self.pool).await.map_err(db_err)?;
        Ok(done.rows_affected() == 1)
    }
}

#[async_trait]
impl CategoryRepo for PgRepo {
    async fn list_categories(&self, search: Option<&str>) -> RepoResult<Vec<Category>> {
        sqlx::query_as::<_, Category>(
            "SELECT name, slug FROM categories WHERE ($1::text IS NULL OR strpos(lower(name), lower($1)) > 0) ORDER BY name"
        )
            .bind(search)
            .fetch_all(&self.pool).await.map_err(db_err)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        sqlx::query_as::<_, Category>("INSERT INTO categories (name, slug) VALUES ($1, $2) RETURNING name, slug")
            .bind(&new.name).bind(&new.slug)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn delete_category(&self, slug: &str) -> RepoResult<()> {
        let done = sqlx::query("DELETE FROM categories WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }
}

#[async_trait]
impl GenreRepo for PgRepo {
    async fn list_genres(&self, search: Option<&str>) -> RepoResult<Vec<Genre>> {
        sqlx::query_as::<_, Genre>(
            "SELECT name, slug FROM genres WHERE ($1::text IS NULL OR strpos(lower(name), lower($1)) > 0) ORDER BY name"
        )
            .bind(search)
            .fetch_all(&self.pool).await.map_err(db_err)
    }

    async fn create_genre(&self, new: NewGenre) -> RepoResult<Genre> {
        sqlx::query_as::<_, Genre>("INSERT INTO genres (name, slug) VALUES ($1, $2) RETURNING name, slug")
            .bind(&new.name).bind(&new.slug)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn delete_genre(&self, slug: &str) -> RepoResult<()> {
        let done = sqlx::query("DELETE FROM genres WHERE slug = $1")
            .bind(slug)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }
}

#[async_trait]
impl TitleRepo for PgRepo {
    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<TitleView>> {
        let rows = sqlx::query_as::<_, TitleRow>(&format!(r#"{TITLE_SELECT}
            WHERE ($1::text IS NULL OR c.slug = $1)
              AND ($2::text IS NULL OR EXISTS (
                    SELECT 1 FROM title_genres tg JOIN genres g ON g.id = tg.genre_id
                    WHERE tg.title_id = t.id AND g.slug = $2))
              AND ($3::text IS NULL OR strpos(lower(t.name), lower($3)) > 0)
              AND ($4::int IS NULL OR t.year = $4)
            ORDER BY t.name, t.id"#))
            .bind(filter.category.as_deref())
            .bind(filter.genre.as_deref())
            .bind(filter.name.as_deref())
            .bind(filter.year)
            .fetch_all(&self.pool).await.map_err(db_err)?;
        self.attach_genres(rows).await
    }

    async fn get_title(&self, id: Id) -> RepoResult<TitleView> {
        let row = sqlx::query_as::<_, TitleRow>(&format!("{TITLE_SELECT} WHERE t.id = $1"))
            .bind(id)
            .fetch_one(&self.pool).await.map_err(db_err)?;
        self.attach_genres(vec![row]).await?.pop().ok_or(RepoError::NotFound)
    }

    async fn missing_refs(&self, category: Option<&str>, genres: &[String]) -> RepoResult<(Option<String>, Vec<String>)> {
        let mut missing_category = None;
        if let Some(slug) = category {
            let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM categories WHERE slug = $1)")
                .bind(slug)
                .fetch_one(&self.pool).await.map_err(db_err)?;
            if !found { missing_category = Some(slug.to_string()); }
        }
        let known: Vec<String> = sqlx::query_scalar("SELECT slug FROM genres WHERE slug = ANY($1)")
            .bind(genres.to_vec())
            .fetch_all(&self.pool).await.map_err(db_err)?;
        let missing_genres = genres.iter().filter(|g| !known.contains(g)).cloned().collect();
        Ok((missing_category, missing_genres))
    }

    async fn create_title(&self, new: NewTitle) -> RepoResult<TitleView> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let id: Id = sqlx::query_scalar(
            "INSERT INTO titles (name, year, description, category_id)
             VALUES ($1, $2, $3, (SELECT id FROM categories WHERE slug = $4))
             RETURNING id"
        )
            .bind(&new.name)
            .bind(new.year)
            .bind(new.description.as_deref())
            .bind(new.category.as_deref())
            .fetch_one(&mut *tx).await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO title_genres (title_id, genre_id)
             SELECT $1, g.id FROM genres g WHERE g.slug = ANY($2)
             ON CONFLICT DO NOTHING"
        )
            .bind(id)
            .bind(new.genre)
            .execute(&mut *tx).await.map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        self.get_title(id).await
    }

    async fn update_title(&self, id: Id, upd: UpdateTitle) -> RepoResult<TitleView> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let done = sqlx::query(
            "UPDATE titles SET
                name = COALESCE($2, name),
                year = COALESCE($3, year),
                description = COALESCE($4, description),
                category_id = COALESCE((SELECT id FROM categories WHERE slug = $5), category_id)
             WHERE id = $1"
        )
            .bind(id)
            .bind(upd.name.as_deref())
            .bind(upd.year)
            .bind(upd.description.as_deref())
            .bind(upd.category.as_deref())
            .execute(&mut *tx).await.map_err(db_err)?;
        if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
        if let Some(genres) = upd.genre {
            sqlx::query("DELETE FROM title_genres WHERE title_id = $1")
                .bind(id)
                .execute(&mut *tx).await.map_err(db_err)?;
            sqlx::query(
                "INSERT INTO title_genres (title_id, genre_id)
                 SELECT $1, g.id FROM genres g WHERE g.slug = ANY($2)"
            )
                .bind(id)
                .bind(genres)
                .execute(&mut *tx).await.map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;
        self.get_title(id).await
    }

    async fn delete_title(&self, id: Id) -> RepoResult<()> {
        let done = sqlx::query("DELETE FROM titles WHERE id = $1")
            .bind(id)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }
}

#[async_trait]
impl ReviewRepo for PgRepo {
    async fn list_reviews(&self, title_id: Id) -> RepoResult<Vec<Review>> {
        if !self.title_exists(title_id).await? { return Err(RepoError::NotFound); }
        sqlx::query_as::<_, Review>(&format!("{REVIEW_SELECT} WHERE r.title_id = $1 ORDER BY r.pub_date, r.id"))
            .bind(title_id)
            .fetch_all(&self.pool).await.map_err(db_err)
    }

    async fn get_review(&self, title_id: Id, review_id: Id) -> RepoResult<Review> {
        sqlx::query_as::<_, Review>(&format!("{REVIEW_SELECT} WHERE r.id = $1 AND r.title_id = $2"))
            .bind(review_id).bind(title_id)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn has_review(&self, title_id: Id, author: &str) -> RepoResult<bool> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM reviews r JOIN users u ON u.id = r.author_id WHERE r.title_id = $1 AND u.username = $2)"
        )
            .bind(title_id).bind(author)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn create_review(&self, title_id: Id, author: &str, new: NewReview) -> RepoResult<Review> {
        // uq_reviews_title_author backs the caller's existence check against races
        let id: Option<Id> = sqlx::query_scalar(
            "INSERT INTO reviews (title_id, author_id, text, score)
             SELECT $1, u.id, $3, $4 FROM users u WHERE u.username = $2
             RETURNING id"
        )
            .bind(title_id)
            .bind(author)
            .bind(&new.text)
            .bind(new.score)
            .fetch_optional(&self.pool).await.map_err(db_err)?;
        let id = id.ok_or(RepoError::NotFound)?;
        self.get_review(title_id, id).await
    }

    async fn update_review(&self, title_id: Id, review_id: Id, upd: UpdateReview) -> RepoResult<Review> {
        let done = sqlx::query(
            "UPDATE reviews SET text = COALESCE($3, text), score = COALESCE($4, score) WHERE id = $1 AND title_id = $2"
        )
            .bind(review_id)
            .bind(title_id)
            .bind(upd.text.as_deref())
            .bind(upd.score)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
        self.get_review(title_id, review_id).await
    }

    async fn delete_review(&self, title_id: Id, review_id: Id) -> RepoResult<()> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1 AND title_id = $2")
            .bind(review_id).bind(title_id)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }
}

#[async_trait]
impl CommentRepo for PgRepo {
    async fn list_comments(&self, title_id: Id, review_id: Id) -> RepoResult<Vec<Comment>> {
        self.ensure_review_in_title(title_id, review_id).await?;
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.review_id = $1 ORDER BY c.pub_date, c.id"))
            .bind(review_id)
            .fetch_all(&self.pool).await.map_err(db_err)
    }

    async fn get_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<Comment> {
        self.ensure_review_in_title(title_id, review_id).await?;
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = $1 AND c.review_id = $2"))
            .bind(comment_id).bind(review_id)
            .fetch_one(&self.pool).await.map_err(db_err)
    }

    async fn create_comment(&self, title_id: Id, review_id: Id, author: &str, new: NewComment) -> RepoResult<Comment> {
        self.ensure_review_in_title(title_id, review_id).await?;
        let id: Option<Id> = sqlx::query_scalar(
            "INSERT INTO comments (review_id, author_id, text)
             SELECT $1, u.id, $3 FROM users u WHERE u.username = $2
             RETURNING id"
        )
            .bind(review_id)
            .bind(author)
            .bind(&new.text)
            .fetch_optional(&self.pool).await.map_err(db_err)?;
        let id = id.ok_or(RepoError::NotFound)?;
        self.get_comment(title_id, review_id, id).await
    }

    async fn update_comment(&self, title_id: Id, review_id: Id, comment_id: Id, upd: UpdateComment) -> RepoResult<Comment> {
        self.ensure_review_in_title(title_id, review_id).await?;
        let done = sqlx::query("UPDATE comments SET text = COALESCE($3, text) WHERE id = $1 AND review_id = $2")
            .bind(comment_id)
            .bind(review_id)
            .bind(upd.text.as_deref())
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { return Err(RepoError::NotFound); }
        self.get_comment(title_id, review_id, comment_id).await
    }

    async fn delete_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<()> {
        self.ensure_review_in_title(title_id, review_id).await?;
        let done = sqlx::query("DELETE FROM comments WHERE id = $1 AND review_id = $2")
            .bind(comment_id).bind(review_id)
            .execute(&self.pool).await.map_err(db_err)?;
        if done.rows_affected() == 0 { Err(RepoError::NotFound) } else { Ok(()) }
    }
}
