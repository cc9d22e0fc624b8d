//! Extractor tests: the two-track procedure against a scripted page.

use serde_json::json;

use groupharvest_common::{HarvestError, RetryPolicy, SelectorCatalog};

use crate::extract::PostExtractor;
use crate::testing::{handle_marker, post_handle, FakeDriver};

fn tooltip_payload(post_id: u32) -> serde_json::Value {
    json!({
        "date": "March 3 at 10:14",
        "href": format!("https://www.facebook.com/groups/88/posts/{post_id}/?comment_tracking=xyz"),
    })
}

fn content_payload(author: &str) -> serde_json::Value {
    json!({
        "authorName": author,
        "authorUrl": "https://www.facebook.com/ann.example?ref=feed",
        "authorAvatar": "https://cdn.example.com/avatar.jpg",
        "contentText": "hello from the group",
        "contentHtml": "<div>hello from the group</div>",
        "images": ["https://cdn.example.com/1.jpg", "https://cdn.example.com/2.jpg"],
    })
}

#[tokio::test(start_paused = true)]
async fn metadata_survives_transient_hover_failures() {
    let marker = handle_marker("1");
    let driver = FakeDriver::new()
        .fail_hover("[data-gh-ref=\"1\"]", 2)
        .on_eval("tooltip:1", &["aria-describedby", &marker], tooltip_payload(4242))
        .on_eval("content:1", &["innerHTML", &marker], content_payload("Ann Example"));
    let catalog = SelectorCatalog::desktop();
    let extractor = PostExtractor::new(&driver, &catalog, RetryPolicy::default());

    let post = extractor
        .extract(&post_handle("1"))
        .await
        .expect("extraction completes despite transient hovers");

    assert_eq!(post.date, "March 3 at 10:14");
    assert_eq!(
        post.permalink,
        "https://www.facebook.com/groups/88/posts/4242"
    );
    assert_eq!(post.id, "4242");

    let calls = driver.calls();
    let failed = calls.iter().filter(|c| c.starts_with("hover_failed:")).count();
    let landed = calls.iter().filter(|c| c.starts_with("hover:")).count();
    assert_eq!(failed, 2);
    assert_eq!(landed, 1);
}

#[tokio::test(start_paused = true)]
async fn metadata_retries_when_tooltip_mutation_misses() {
    let marker = handle_marker("1");
    let driver = FakeDriver::new()
        .on_eval_error(
            "tooltip:1",
            &["aria-describedby", &marker],
            "tooltip mutation never fired",
        )
        .on_eval("tooltip:1", &["aria-describedby", &marker], tooltip_payload(9))
        .on_eval("content:1", &["innerHTML", &marker], content_payload("Ann Example"));
    let catalog = SelectorCatalog::desktop();
    let extractor = PostExtractor::new(&driver, &catalog, RetryPolicy::default());

    let post = extractor
        .extract(&post_handle("1"))
        .await
        .expect("second tooltip attempt succeeds");
    assert_eq!(post.id, "9");

    // The whole track restarts from the pointer reset on retry.
    let resets = driver
        .calls()
        .iter()
        .filter(|c| *c == "mouse_origin")
        .count();
    assert_eq!(resets, 2);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retry_budget_is_a_hard_failure() {
    let driver = FakeDriver::new().fail_hover("[data-gh-ref=\"1\"]", u32::MAX);
    let catalog = SelectorCatalog::desktop();
    let retry = RetryPolicy {
        max_attempts: 3,
        visibility_pause: std::time::Duration::from_millis(10),
    };
    let extractor = PostExtractor::new(&driver, &catalog, retry);

    let err = extractor
        .extract(&post_handle("1"))
        .await
        .expect_err("budget must bound the retry loop");
    assert!(matches!(err, HarvestError::ExtractionTimeout { attempts: 3 }));
}

#[tokio::test]
async fn missing_avatar_is_absent_not_an_error() {
    let marker = handle_marker("1");
    let driver = FakeDriver::new()
        .on_eval("tooltip:1", &["aria-describedby", &marker], tooltip_payload(7))
        .on_eval(
            "content:1",
            &["innerHTML", &marker],
            json!({
                "authorName": "Page Author",
                "authorUrl": null,
                "authorAvatar": null,
                "contentText": null,
                "contentHtml": null,
                "images": [],
            }),
        );
    let catalog = SelectorCatalog::desktop();
    let extractor = PostExtractor::new(&driver, &catalog, RetryPolicy::default());

    let post = extractor.extract(&post_handle("1")).await.expect("extracts");
    assert_eq!(post.author_name, "Page Author");
    assert!(post.author_avatar.is_none());
    assert!(post.author_url.is_none());
    assert!(post.content_text.is_none());
    assert!(post.images.is_empty());
}

#[tokio::test]
async fn author_url_is_query_stripped() {
    let marker = handle_marker("1");
    let driver = FakeDriver::new()
        .on_eval("tooltip:1", &["aria-describedby", &marker], tooltip_payload(7))
        .on_eval("content:1", &["innerHTML", &marker], content_payload("Ann Example"));
    let catalog = SelectorCatalog::desktop();
    let extractor = PostExtractor::new(&driver, &catalog, RetryPolicy::default());

    let post = extractor.extract(&post_handle("1")).await.expect("extracts");
    assert_eq!(
        post.author_url.as_deref(),
        Some("https://www.facebook.com/ann.example")
    );
    assert_eq!(post.images.len(), 2);
}
