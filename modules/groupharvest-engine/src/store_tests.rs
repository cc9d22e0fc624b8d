//! Store tests: load/append/rewrite semantics against real files.

use groupharvest_common::{canonicalize_permalink, Post};

use crate::store::ResultStore;

fn sample_post(n: u32) -> Post {
    let (permalink, id) =
        canonicalize_permalink(&format!("https://www.facebook.com/groups/88/posts/{n}/?ref=x"));
    Post {
        author_name: format!("Author {n}"),
        author_url: Some(format!("https://www.facebook.com/author.{n}")),
        author_avatar: None,
        date: "March 3 at 10:14".to_string(),
        permalink,
        id,
        content_text: Some(format!("post body {n}")),
        content_html: Some(format!("<div>post body {n}</div>")),
        images: vec![format!("https://cdn.example.com/{n}.jpg")],
    }
}

#[tokio::test]
async fn round_trip_preserves_content_and_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ResultStore::new(dir.path().join("group.json"));

    let posts = vec![sample_post(3), sample_post(1), sample_post(2)];
    store.save(&posts).await.expect("save");

    assert_eq!(store.load().await, posts);
}

#[tokio::test]
async fn missing_file_loads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ResultStore::new(dir.path().join("never-written.json"));
    assert!(store.load().await.is_empty());
}

#[tokio::test]
async fn malformed_file_loads_as_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("group.json");
    tokio::fs::write(&target, "not json {{{")
        .await
        .expect("write garbage");

    let store = ResultStore::new(&target);
    assert!(store.load().await.is_empty());
}

#[tokio::test]
async fn append_skips_posts_with_same_identity() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ResultStore::new(dir.path().join("group.json"));

    let first = sample_post(1);
    assert!(store.append(&first).await.expect("append"));

    // Same permalink, different surface fields: still the same post.
    let mut duplicate = sample_post(1);
    duplicate.author_name = "Renamed Author".to_string();
    assert!(!store.append(&duplicate).await.expect("append duplicate"));

    let second = sample_post(2);
    assert!(store.append(&second).await.expect("append second"));

    let loaded = store.load().await;
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[0], first);
    assert_eq!(loaded[1], second);
}

#[tokio::test]
async fn output_is_four_space_indented_json_array() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("group.json");
    let store = ResultStore::new(&target);
    store.save(&[sample_post(1)]).await.expect("save");

    let raw = tokio::fs::read_to_string(&target).await.expect("read");
    assert!(raw.starts_with("[\n    {"));
    assert!(raw.contains("\n        \"authorName\""));

    // The temp file used for the atomic rewrite must be gone.
    assert!(!target.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn append_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().expect("tempdir");
    let target = dir.path().join("nested/output/group.json");
    let store = ResultStore::new(&target);

    assert!(store.append(&sample_post(1)).await.expect("append"));
    assert!(target.exists());
}
