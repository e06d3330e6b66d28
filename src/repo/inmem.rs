use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::*;
use crate::rating;

#[derive(Default, Serialize, Deserialize)]
struct State {
    users: BTreeMap<Id, User>,
    codes: HashMap<String, ConfirmationCode>,
    categories: HashMap<String, Category>, // by slug
    genres: HashMap<String, Genre>,        // by slug
    titles: HashMap<Id, Title>,
    reviews: BTreeMap<Id, Review>,
    comments: BTreeMap<Id, Comment>,
    next_id: Id,
}

impl State {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn user_by_name(&self, username: &str) -> Option<&User> {
        self.users.values().find(|u| u.username == username)
    }

    fn view(&self, t: &Title) -> TitleView {
        let mut genre: Vec<Genre> = t.genres.iter().filter_map(|g| self.genres.get(g).cloned()).collect();
        genre.sort_by(|a, b| a.name.cmp(&b.name));
        TitleView {
            id: t.id,
            name: t.name.clone(),
            year: t.year,
            rating: rating::average(self.reviews.values().filter(|r| r.title_id == t.id).map(|r| r.score)),
            description: t.description.clone(),
            genre,
            category: t.category.as_ref().and_then(|c| self.categories.get(c).cloned()),
        }
    }

    fn review_in_title(&self, title_id: Id, review_id: Id) -> RepoResult<&Review> {
        if !self.titles.contains_key(&title_id) { return Err(RepoError::NotFound); }
        self.reviews.get(&review_id).filter(|r| r.title_id == title_id).ok_or(RepoError::NotFound)
    }

    fn remove_reviews_where(&mut self, pred: impl Fn(&Review) -> bool) {
        let gone: Vec<Id> = self.reviews.values().filter(|r| pred(r)).map(|r| r.id).collect();
        for id in &gone { self.reviews.remove(id); }
        self.comments.retain(|_, c| !gone.contains(&c.review_id));
    }
}

fn contains_ci(haystack: &str, needle: Option<&str>) -> bool {
    needle.map_or(true, |n| haystack.to_lowercase().contains(&n.to_lowercase()))
}

/// Repository held in process memory, optionally snapshotted to a JSON file
/// after every write.
#[derive(Clone)]
pub struct InMemRepo {
    state: Arc<RwLock<State>>,
    snapshot_path: Option<Arc<PathBuf>>,
}

impl InMemRepo {
    /// Empty, non-persistent repository.
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(State::default())), snapshot_path: None }
    }

    /// Repository restored from (and persisted to) `<dir>/state.json`.
    pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join("state.json");
        let state = Self::load_state_from(&path);
        Self { state: Arc::new(RwLock::new(state)), snapshot_path: Some(Arc::new(path)) }
    }

    fn load_state_from(path: &Path) -> State {
        match std::fs::read(path) {
            Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                Ok(s) => {
                    log::info!("loaded snapshot '{}'", path.display());
                    s
                }
                Err(e) => {
                    log::warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            },
            Err(e) => {
                log::info!("no snapshot at '{}': {e}. Starting empty.", path.display());
                State::default()
            }
        }
    }

    fn persist(&self) {
        let Some(path) = self.snapshot_path.as_ref() else { return };
        let Ok(state) = self.state.read() else { return };
        let bytes = serde_json::to_vec_pretty(&*state);
        drop(state);
        match bytes {
            Ok(bytes) => {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(path.as_path(), bytes) {
                    log::error!("failed to write snapshot '{}': {e}", path.display());
                }
            }
            Err(e) => log::error!("failed to serialise snapshot: {e}"),
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| RepoError::Internal("state lock poisoned".into()))
    }
}

impl Default for InMemRepo {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl UserRepo for InMemRepo {
    async fn list_users(&self, search: Option<&str>) -> RepoResult<Vec<User>> {
        let s = self.read()?;
        Ok(s.users.values().filter(|u| u.is_active() && contains_ci(&u.username, search)).cloned().collect())
    }

    async fn get_user(&self, username: &str) -> RepoResult<User> {
        self.read()?.user_by_name(username).cloned().ok_or(RepoError::NotFound)
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email.eq_ignore_ascii_case(email)).cloned())
    }

    async fn create_user(&self, new: NewUser) -> RepoResult<User> {
        let mut s = self.write()?;
        if s.user_by_name(&new.username).is_some() {
            return Err(RepoError::Conflict("username already taken".into()));
        }
        if s.users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(RepoError::Conflict("email already registered".into()));
        }
        let id = s.next_id();
        let user = User {
            id,
            username: new.username,
            email: new.email,
            first_name: new.first_name.unwrap_or_default(),
            last_name: new.last_name.unwrap_or_default(),
            bio: new.bio.unwrap_or_default(),
            role: new.role.unwrap_or_default(),
            deactivated_at: None,
        };
        s.users.insert(id, user.clone());
        drop(s);
        self.persist();
        Ok(user)
    }

    async fn update_user(&self, username: &str, upd: UpdateUser) -> RepoResult<User> {
        let mut s = self.write()?;
        let id = s.user_by_name(username).map(|u| u.id).ok_or(RepoError::NotFound)?;

        // uniqueness check before the mutable borrow
        if let Some(ref email) = upd.email {
            if s.users.values().any(|u| u.id != id && u.email.eq_ignore_ascii_case(email)) {
                return Err(RepoError::Conflict("email already registered".into()));
            }
        }

        let user = s.users.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(email) = upd.email { user.email = email; }
        if let Some(role) = upd.role { user.role = role; }
        if let Some(bio) = upd.bio { user.bio = bio; }
        if let Some(first) = upd.first_name { user.first_name = first; }
        if let Some(last) = upd.last_name { user.last_name = last; }
        let updated = user.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn deactivate_user(&self, username: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        let id = s.user_by_name(username).map(|u| u.id).ok_or(RepoError::NotFound)?;
        if let Some(u) = s.users.get_mut(&id) {
            u.deactivated_at.get_or_insert_with(Utc::now);
        }
        s.codes.remove(username);
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl CodeRepo for InMemRepo {
    async fn put_code(&self, username: &str, code: ConfirmationCode) -> RepoResult<()> {
        let mut s = self.write()?;
        if s.user_by_name(username).is_none() { return Err(RepoError::NotFound); }
        s.codes.insert(username.to_string(), code);
        drop(s);
        self.persist();
        Ok(())
    }

    async fn get_code(&self, username: &str) -> RepoResult<Option<ConfirmationCode>> {
        Ok(self.read()?.codes.get(username).cloned())
    }

    async fn consume_code(&self, username: &str, code_hash: &str) -> RepoResult<bool> {
        let mut s = self.write()?;
        let matches = s.codes.get(username).is_some_and(|c| c.code_hash == code_hash);
        if matches {
            s.codes.remove(username);
            drop(s);
            self.persist();
        }
        Ok(matches)
    }
}

#[async_trait]
impl CategoryRepo for InMemRepo {
    async fn list_categories(&self, search: Option<&str>) -> RepoResult<Vec<Category>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.categories.values().filter(|c| contains_ci(&c.name, search)).cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
        let mut s = self.write()?;
        if s.categories.contains_key(&new.slug) {
            return Err(RepoError::Conflict("category slug already exists".into()));
        }
        if s.categories.values().any(|c| c.name == new.name) {
            return Err(RepoError::Conflict("category name already exists".into()));
        }
        let cat = Category { name: new.name, slug: new.slug };
        s.categories.insert(cat.slug.clone(), cat.clone());
        drop(s);
        self.persist();
        Ok(cat)
    }

    async fn delete_category(&self, slug: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        s.categories.remove(slug).ok_or(RepoError::NotFound)?;
        for t in s.titles.values_mut() {
            if t.category.as_deref() == Some(slug) { t.category = None; }
        }
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl GenreRepo for InMemRepo {
    async fn list_genres(&self, search: Option<&str>) -> RepoResult<Vec<Genre>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.genres.values().filter(|g| contains_ci(&g.name, search)).cloned().collect();
        v.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(v)
    }

    async fn create_genre(&self, new: NewGenre) -> RepoResult<Genre> {
        let mut s = self.write()?;
        if s.genres.contains_key(&new.slug) {
            return Err(RepoError::Conflict("genre slug already exists".into()));
        }
        if s.genres.values().any(|g| g.name == new.name) {
            return Err(RepoError::Conflict("genre name already exists".into()));
        }
        let genre = Genre { name: new.name, slug: new.slug };
        s.genres.insert(genre.slug.clone(), genre.clone());
        drop(s);
        self.persist();
        Ok(genre)
    }

    async fn delete_genre(&self, slug: &str) -> RepoResult<()> {
        let mut s = self.write()?;
        s.genres.remove(slug).ok_or(RepoError::NotFound)?;
        for t in s.titles.values_mut() {
            t.genres.retain(|g| g != slug);
        }
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl TitleRepo for InMemRepo {
    async fn list_titles(&self, filter: &TitleFilter) -> RepoResult<Vec<TitleView>> {
        let s = self.read()?;
        let mut v: Vec<_> = s.titles.values().filter(|t| filter.matches(t)).map(|t| s.view(t)).collect();
        v.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_title(&self, id: Id) -> RepoResult<TitleView> {
        let s = self.read()?;
        s.titles.get(&id).map(|t| s.view(t)).ok_or(RepoError::NotFound)
    }

    async fn missing_refs(&self, category: Option<&str>, genres: &[String]) -> RepoResult<(Option<String>, Vec<String>)> {
        let s = self.read()?;
        let cat = category.filter(|c| !s.categories.contains_key(*c)).map(str::to_string);
        let unknown_genres = genres.iter().filter(|g| !s.genres.contains_key(*g)).cloned().collect();
        Ok((cat, unknown_genres))
    }

    async fn create_title(&self, new: NewTitle) -> RepoResult<TitleView> {
        let mut s = self.write()?;
        let id = s.next_id();
        let mut genres = new.genre;
        genres.sort();
        genres.dedup();
        let title = Title { id, name: new.name, year: new.year, description: new.description, category: new.category, genres };
        let view = s.view(&title);
        s.titles.insert(id, title);
        drop(s);
        self.persist();
        Ok(view)
    }

    async fn update_title(&self, id: Id, upd: UpdateTitle) -> RepoResult<TitleView> {
        let mut s = self.write()?;
        let title = s.titles.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(name) = upd.name { title.name = name; }
        if let Some(year) = upd.year { title.year = year; }
        if let Some(d) = upd.description { title.description = Some(d); }
        if let Some(mut g) = upd.genre {
            g.sort();
            g.dedup();
            title.genres = g;
        }
        if let Some(c) = upd.category { title.category = Some(c); }
        let title = title.clone();
        let view = s.view(&title);
        drop(s);
        self.persist();
        Ok(view)
    }

    async fn delete_title(&self, id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.titles.remove(&id).ok_or(RepoError::NotFound)?;
        s.remove_reviews_where(|r| r.title_id == id);
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl ReviewRepo for InMemRepo {
    async fn list_reviews(&self, title_id: Id) -> RepoResult<Vec<Review>> {
        let s = self.read()?;
        if !s.titles.contains_key(&title_id) { return Err(RepoError::NotFound); }
        let mut v: Vec<_> = s.reviews.values().filter(|r| r.title_id == title_id).cloned().collect();
        v.sort_by(|a, b| a.pub_date.cmp(&b.pub_date).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_review(&self, title_id: Id, review_id: Id) -> RepoResult<Review> {
        self.read()?.review_in_title(title_id, review_id).cloned()
    }

    async fn has_review(&self, title_id: Id, author: &str) -> RepoResult<bool> {
        Ok(self.read()?.reviews.values().any(|r| r.title_id == title_id && r.author == author))
    }

    async fn create_review(&self, title_id: Id, author: &str, new: NewReview) -> RepoResult<Review> {
        let mut s = self.write()?;
        if !s.titles.contains_key(&title_id) { return Err(RepoError::NotFound); }
        if s.user_by_name(author).is_none() { return Err(RepoError::NotFound); }
        // checked again under the write lock: this is the storage-level guarantee
        if s.reviews.values().any(|r| r.title_id == title_id && r.author == author) {
            return Err(RepoError::Conflict("title already reviewed by this author".into()));
        }
        let id = s.next_id();
        let review = Review { id, title_id, author: author.to_string(), text: new.text, score: new.score, pub_date: Utc::now() };
        s.reviews.insert(id, review.clone());
        drop(s);
        self.persist();
        Ok(review)
    }

    async fn update_review(&self, title_id: Id, review_id: Id, upd: UpdateReview) -> RepoResult<Review> {
        let mut s = self.write()?;
        s.review_in_title(title_id, review_id)?;
        let review = s.reviews.get_mut(&review_id).ok_or(RepoError::NotFound)?;
        if let Some(text) = upd.text { review.text = text; }
        if let Some(score) = upd.score { review.score = score; }
        let updated = review.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_review(&self, title_id: Id, review_id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.review_in_title(title_id, review_id)?;
        s.remove_reviews_where(|r| r.id == review_id);
        drop(s);
        self.persist();
        Ok(())
    }
}

#[async_trait]
impl CommentRepo for InMemRepo {
    async fn list_comments(&self, title_id: Id, review_id: Id) -> RepoResult<Vec<Comment>> {
        let s = self.read()?;
        s.review_in_title(title_id, review_id)?;
        let mut v: Vec<_> = s.comments.values().filter(|c| c.review_id == review_id).cloned().collect();
        v.sort_by(|a, b| a.pub_date.cmp(&b.pub_date).then(a.id.cmp(&b.id)));
        Ok(v)
    }

    async fn get_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<Comment> {
        let s = self.read()?;
        s.review_in_title(title_id, review_id)?;
        s.comments.get(&comment_id).filter(|c| c.review_id == review_id).cloned().ok_or(RepoError::NotFound)
    }

    async fn create_comment(&self, title_id: Id, review_id: Id, author: &str, new: NewComment) -> RepoResult<Comment> {
        let mut s = self.write()?;
        s.review_in_title(title_id, review_id)?;
        if s.user_by_name(author).is_none() { return Err(RepoError::NotFound); }
        let id = s.next_id();
        let comment = Comment { id, review_id, author: author.to_string(), text: new.text, pub_date: Utc::now() };
        s.comments.insert(id, comment.clone());
        drop(s);
        self.persist();
        Ok(comment)
    }

    async fn update_comment(&self, title_id: Id, review_id: Id, comment_id: Id, upd: UpdateComment) -> RepoResult<Comment> {
        let mut s = self.write()?;
        s.review_in_title(title_id, review_id)?;
        let comment = s.comments.get_mut(&comment_id).filter(|c| c.review_id == review_id).ok_or(RepoError::NotFound)?;
        if let Some(text) = upd.text { comment.text = text; }
        let updated = comment.clone();
        drop(s);
        self.persist();
        Ok(updated)
    }

    async fn delete_comment(&self, title_id: Id, review_id: Id, comment_id: Id) -> RepoResult<()> {
        let mut s = self.write()?;
        s.review_in_title(title_id, review_id)?;
        if !s.comments.get(&comment_id).is_some_and(|c| c.review_id == review_id) {
            return Err(RepoError::NotFound);
        }
        s.comments.remove(&comment_id);
        drop(s);
        self.persist();
        Ok(())
    }
}
