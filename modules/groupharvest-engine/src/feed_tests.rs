//! Feed pass tests: both strategies end-to-end over a scripted page,
//! through the public `Session`/`Group` surface.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use groupharvest_common::{HarvestConfig, HarvestError, Post, ScrollStrategy, SelectorCatalog};

use crate::session::Session;
use crate::testing::{handle_marker, post_handle, FakeDriver};

fn config(dir: &Path) -> HarvestConfig {
    HarvestConfig::builder()
        .username("user")
        .password("pass")
        .use_cookies(false)
        .output_dir(dir)
        .build()
}

/// Scripts the tooltip and content evals for one fake post.
fn script_post(driver: FakeDriver, tag: &str, post_id: u32) -> FakeDriver {
    let marker = handle_marker(tag);
    driver
        .on_eval(
            &format!("tooltip:{tag}"),
            &["aria-describedby", &marker],
            json!({
                "date": format!("March {post_id} at 10:14"),
                "href": format!("https://www.facebook.com/groups/88/posts/{post_id}/?ref=feed"),
            }),
        )
        .on_eval(
            &format!("content:{tag}"),
            &["innerHTML", &marker],
            json!({
                "authorName": format!("Author {tag}"),
                "authorUrl": null,
                "authorAvatar": null,
                "contentText": format!("body {tag}"),
                "contentHtml": format!("<div>body {tag}</div>"),
                "images": [],
            }),
        )
}

fn position(calls: &[String], pred: impl Fn(&str) -> bool) -> usize {
    calls
        .iter()
        .position(|c| pred(c))
        .unwrap_or(usize::MAX)
}

#[tokio::test]
async fn mutation_driven_pass_extracts_in_insertion_order_serially() {
    let catalog = SelectorCatalog::desktop();
    let mut driver = FakeDriver::new()
        .with_selector(catalog.feed_container)
        .with_insertions(vec![post_handle("1"), post_handle("2"), post_handle("3")]);
    for (tag, post_id) in [("1", 1001), ("2", 1002), ("3", 1003)] {
        driver = script_post(driver, tag, post_id);
    }
    let driver = Arc::new(driver);

    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::with_driver(driver.clone(), config(dir.path()))
        .await
        .expect("session");

    let posts = session
        .group("88")
        .get_posts(None, None, false)
        .await
        .expect("pass completes");

    let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, ["1001", "1002", "1003"]);

    // Strict serialization: a post's extraction fully completes (its content
    // read is the last step) before the next element is even hovered.
    let calls = driver.calls();
    for (done, next) in [("1", "2"), ("2", "3")] {
        let done_at = position(&calls, |c| c == format!("eval:content:{done}"));
        let next_at = position(&calls, |c| {
            c.starts_with("hover") && c.contains(&format!("[data-gh-ref=\"{next}\"]"))
        });
        assert!(
            done_at < next_at,
            "post {next} hovered before post {done} finished: {calls:?}"
        );
    }

    // Exactly-once: one landed hover per element.
    for tag in ["1", "2", "3"] {
        let hovers = calls
            .iter()
            .filter(|c| c.starts_with("hover:") && c.contains(&format!("[data-gh-ref=\"{tag}\"]")))
            .count();
        assert_eq!(hovers, 1, "element {tag} hovered {hovers} times");
    }
}

#[tokio::test(start_paused = true)]
async fn mutation_driven_pass_ends_after_quiet_period() {
    let catalog = SelectorCatalog::desktop();
    let driver = Arc::new(
        script_post(
            FakeDriver::new()
                .with_selector(catalog.feed_container)
                .with_insertions(vec![post_handle("1")])
                .keep_insertion_channel_open(),
            "1",
            7,
        ),
    );

    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::with_driver(driver.clone(), config(dir.path()))
        .await
        .expect("session");

    // The channel never closes; only the idle window can end the pass.
    let posts = session
        .group("88")
        .get_posts(None, None, false)
        .await
        .expect("pass ends on quiet period");
    assert_eq!(posts.len(), 1);
}

#[tokio::test]
async fn missing_feed_container_aborts_with_feed_not_found() {
    let driver = Arc::new(FakeDriver::new());
    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::with_driver(driver.clone(), config(dir.path()))
        .await
        .expect("session");

    let target = dir.path().join("88.json");
    let err = session
        .group("88")
        .get_posts(Some(target.clone()), None, true)
        .await
        .expect_err("feed never appeared");

    assert!(matches!(err, HarvestError::FeedNotFound { ref group, .. } if group == "88"));
    // No posts were emitted, so nothing was written.
    assert!(!target.exists());
}

#[tokio::test(start_paused = true)]
async fn scroll_until_stable_stops_on_first_pass_without_new_posts() {
    let catalog = SelectorCatalog::desktop();
    let mut driver = FakeDriver::new().with_selector(catalog.feed_container).on_query(
        catalog.post_element,
        vec![
            vec![post_handle("1"), post_handle("2")],
            vec![post_handle("1"), post_handle("2"), post_handle("3")],
            vec![post_handle("1"), post_handle("2"), post_handle("3")],
        ],
    );
    for (tag, post_id) in [("1", 1), ("2", 2), ("3", 3)] {
        driver = script_post(driver, tag, post_id);
    }
    let driver = Arc::new(driver);

    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.scroll_strategy = ScrollStrategy::ScrollUntilStable;
    let session = Session::with_driver(driver.clone(), config)
        .await
        .expect("session");

    let posts = session
        .group("88")
        .get_posts(None, None, false)
        .await
        .expect("pass completes");

    assert_eq!(posts.len(), 3);
    // Elements already seen in an earlier pass are not re-extracted.
    let hovers_of_one = driver
        .calls()
        .iter()
        .filter(|c| c.starts_with("hover:") && c.contains("[data-gh-ref=\"1\"]"))
        .count();
    assert_eq!(hovers_of_one, 1);
}

#[tokio::test]
async fn duplicate_permalinks_are_persisted_once_and_callback_sees_each_unique_post() {
    let catalog = SelectorCatalog::desktop();
    // Two distinct DOM elements resolving to the same permalink.
    let mut driver = FakeDriver::new()
        .with_selector(catalog.feed_container)
        .with_insertions(vec![post_handle("1"), post_handle("2")]);
    driver = script_post(driver, "1", 500);
    driver = script_post(driver, "2", 500);
    let driver = Arc::new(driver);

    let dir = tempfile::tempdir().expect("tempdir");
    let session = Session::with_driver(driver.clone(), config(dir.path()))
        .await
        .expect("session");

    let target = dir.path().join("out.json");
    let mut observed = Vec::new();
    let mut callback = |post: &Post| observed.push(post.id.clone());
    let posts = session
        .group("88")
        .get_posts(Some(target.clone()), Some(&mut callback), true)
        .await
        .expect("pass completes");

    assert_eq!(posts.len(), 1);
    assert_eq!(observed, ["500"]);

    let raw = tokio::fs::read_to_string(&target).await.expect("written");
    let stored: Vec<Post> = serde_json::from_str(&raw).expect("valid result file");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, "500");
}
