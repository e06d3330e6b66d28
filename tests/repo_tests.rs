#![cfg(feature = "inmem-store")]

use chrono::Utc;
use yamdb::{
    auth::Role,
    models::*,
    repo::{inmem::InMemRepo, RepoError},
};
// Bring trait method namespaces into scope so calls on InMemRepo resolve.
use yamdb::repo::{CategoryRepo, CodeRepo, CommentRepo, GenreRepo, ReviewRepo, TitleRepo, UserRepo};

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.into(),
        email: format!("{username}@example.com"),
        role: None,
        bio: None,
        first_name: None,
        last_name: None,
    }
}

fn new_title(name: &str, category: Option<&str>, genres: &[&str]) -> NewTitle {
    NewTitle {
        name: name.into(),
        year: 1999,
        description: None,
        genre: genres.iter().map(|g| g.to_string()).collect(),
        category: category.map(str::to_string),
    }
}

async fn seeded() -> InMemRepo {
    let r = InMemRepo::new();
    r.create_category(NewCategory { name: "Movie".into(), slug: "movie".into() }).await.unwrap();
    r.create_genre(NewGenre { name: "Drama".into(), slug: "drama".into() }).await.unwrap();
    r.create_genre(NewGenre { name: "Crime".into(), slug: "crime".into() }).await.unwrap();
    for u in ["alice", "bob"] {
        r.create_user(new_user(u)).await.unwrap();
    }
    r
}

#[tokio::test]
async fn user_crud_and_uniqueness() {
    let r = InMemRepo::new();
    let alice = r.create_user(new_user("alice")).await.unwrap();
    assert_eq!(alice.role, Role::User);

    let err = r.create_user(new_user("alice")).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    let mut dup_email = new_user("alice2");
    dup_email.email = "ALICE@example.com".into();
    assert!(matches!(r.create_user(dup_email).await, Err(RepoError::Conflict(_))));

    let updated = r
        .update_user("alice", UpdateUser { role: Some(Role::Moderator), bio: Some("hi".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(updated.role, Role::Moderator);
    assert_eq!(updated.bio, "hi");

    assert!(r.find_user_by_email("alice@EXAMPLE.com").await.unwrap().is_some());
    assert!(matches!(r.get_user("nobody").await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn deactivated_users_hidden_from_list() {
    let r = seeded().await;
    assert_eq!(r.list_users(Some("ali")).await.unwrap().len(), 1);
    r.deactivate_user("alice").await.unwrap();

    let names: Vec<_> = r.list_users(None).await.unwrap().into_iter().map(|u| u.username).collect();
    assert_eq!(names, vec!["bob".to_string()]);
    // still resolvable, just inactive
    assert!(!r.get_user("alice").await.unwrap().is_active());
}

#[tokio::test]
async fn codes_are_replaced_and_consumed_once() {
    let r = seeded().await;
    let code = |h: &str| ConfirmationCode { code_hash: h.into(), issued_at: Utc::now() };

    r.put_code("alice", code("h1")).await.unwrap();
    r.put_code("alice", code("h2")).await.unwrap();
    assert_eq!(r.get_code("alice").await.unwrap().unwrap().code_hash, "h2");

    assert!(!r.consume_code("alice", "h1").await.unwrap());
    assert!(r.consume_code("alice", "h2").await.unwrap());
    assert!(!r.consume_code("alice", "h2").await.unwrap());
    assert!(r.get_code("alice").await.unwrap().is_none());

    assert!(matches!(r.put_code("ghost", code("x")).await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn catalog_search_and_conflicts() {
    let r = seeded().await;
    assert!(matches!(
        r.create_genre(NewGenre { name: "Other".into(), slug: "drama".into() }).await,
        Err(RepoError::Conflict(_))
    ));
    let found = r.list_genres(Some("RIM")).await.unwrap();
    assert_eq!(found, vec![Genre { name: "Crime".into(), slug: "crime".into() }]);
    assert!(matches!(r.delete_category("nope").await, Err(RepoError::NotFound)));
}

#[tokio::test]
async fn titles_filter_sort_and_refs() {
    let r = seeded().await;
    r.create_title(new_title("Zodiac", Some("movie"), &["crime"])).await.unwrap();
    r.create_title(new_title("Amelie", None, &["drama"])).await.unwrap();

    let all = r.list_titles(&TitleFilter::default()).await.unwrap();
    let names: Vec<_> = all.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Amelie", "Zodiac"]);

    let crime = r.list_titles(&TitleFilter { genre: Some("crime".into()), ..Default::default() }).await.unwrap();
    assert_eq!(crime.len(), 1);
    assert_eq!(crime[0].category.as_ref().unwrap().slug, "movie");

    let (cat, genres) = r
        .missing_refs(Some("book"), &["drama".to_string(), "horror".to_string()])
        .await
        .unwrap();
    assert_eq!(cat.as_deref(), Some("book"));
    assert_eq!(genres, vec!["horror".to_string()]);
}

#[tokio::test]
async fn deleting_reference_data_detaches_titles() {
    let r = seeded().await;
    let t = r.create_title(new_title("Heat", Some("movie"), &["crime", "drama"])).await.unwrap();

    r.delete_category("movie").await.unwrap();
    r.delete_genre("crime").await.unwrap();

    let t = r.get_title(t.id).await.unwrap();
    assert!(t.category.is_none());
    assert_eq!(t.genre.iter().map(|g| g.slug.as_str()).collect::<Vec<_>>(), ["drama"]);
}

#[tokio::test]
async fn one_review_per_author_and_rating() {
    let r = seeded().await;
    let t = r.create_title(new_title("Heat", None, &[])).await.unwrap();
    assert_eq!(t.rating, None);

    r.create_review(t.id, "alice", NewReview { text: "great".into(), score: 9 }).await.unwrap();
    assert!(r.has_review(t.id, "alice").await.unwrap());
    let err = r.create_review(t.id, "alice", NewReview { text: "again".into(), score: 1 }).await.unwrap_err();
    assert!(matches!(err, RepoError::Conflict(_)));

    r.create_review(t.id, "bob", NewReview { text: "ok".into(), score: 4 }).await.unwrap();
    assert_eq!(r.get_title(t.id).await.unwrap().rating, Some(6.5));
}

#[tokio::test]
async fn nested_lookups_are_scoped_and_cascade() {
    let r = seeded().await;
    let t1 = r.create_title(new_title("One", None, &[])).await.unwrap();
    let t2 = r.create_title(new_title("Two", None, &[])).await.unwrap();
    let rev = r.create_review(t1.id, "alice", NewReview { text: "x".into(), score: 5 }).await.unwrap();
    let c = r.create_comment(t1.id, rev.id, "bob", NewComment { text: "agree".into() }).await.unwrap();

    // wrong parent title
    assert!(matches!(r.get_review(t2.id, rev.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.get_comment(t2.id, rev.id, c.id).await, Err(RepoError::NotFound)));
    assert!(matches!(r.list_reviews(9999).await, Err(RepoError::NotFound)));

    r.delete_title(t1.id).await.unwrap();
    assert!(matches!(r.list_comments(t1.id, rev.id).await, Err(RepoError::NotFound)));
    assert!(!r.has_review(t1.id, "alice").await.unwrap());
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let r = InMemRepo::with_snapshot_dir(dir.path());
        r.create_user(new_user("carol")).await.unwrap();
        r.create_category(NewCategory { name: "Book".into(), slug: "book".into() }).await.unwrap();
    }
    let r = InMemRepo::with_snapshot_dir(dir.path());
    assert_eq!(r.get_user("carol").await.unwrap().email, "carol@example.com");
    assert_eq!(r.list_categories(None).await.unwrap().len(), 1);

    // ids keep increasing after reload
    let u = r.create_user(new_user("dave")).await.unwrap();
    assert!(u.id > r.get_user("carol").await.unwrap().id);
}
