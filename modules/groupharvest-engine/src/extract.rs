//! Post extraction: one raw post element in, one complete record out.
//!
//! Two tracks run per post. The metadata track is the fragile one: the site
//! only materializes a post's permalink and timestamp in a tooltip after the
//! link element is hovered, and a hover can silently miss if the element is
//! mid-scroll or a previous tooltip lingers. Every step is therefore under a
//! short timeout and the whole track restarts from the pointer reset on any
//! failure, up to the configured retry budget. The content track is a plain
//! DOM read with one interactive step (expanding truncated text).

use std::future::Future;
use std::time::Duration;

use cdp_client::{ElementRef, PageDriver};
use groupharvest_common::{
    canonicalize_permalink, strip_query, HarvestError, Post, Result, RetryPolicy, SelectorCatalog,
};
use serde::Deserialize;
use tracing::debug;

/// Pointer actions either land immediately or not at all.
const POINTER_TIMEOUT: Duration = Duration::from_millis(200);

/// The tooltip mutation fires shortly after a registered hover or never.
const TOOLTIP_TIMEOUT: Duration = Duration::from_millis(1_000);

/// Awaits the tooltip attribute mutation on the hovered link's parent and
/// resolves with the raw date text and href.
const TOOLTIP_JS: &str = r#"
(async () => {
    const link = document.querySelector(__LINK__);
    if (!link) throw new Error('post link element vanished');
    const span = link.parentElement;
    return await new Promise((resolve, reject) => {
        const observer = new MutationObserver(() => {
            observer.disconnect();
            const tooltipId = span.getAttribute('aria-describedby');
            const tooltip = tooltipId ? document.getElementById(tooltipId) : null;
            if (!tooltip) {
                reject(new Error('tooltip not found'));
                return;
            }
            resolve({ date: tooltip.innerText, href: link.getAttribute('href') });
        });
        observer.observe(span, { attributes: true, attributeFilter: ['aria-describedby'] });
        setTimeout(() => {
            observer.disconnect();
            reject(new Error('tooltip mutation never fired'));
        }, 900);
    });
})()
"#;

/// Reads author, avatar, text, and attachments from a post element,
/// expanding a truncated body first when a see-more control is present.
const CONTENT_JS: &str = r#"
(async () => {
    const post = document.querySelector(__POST__);
    if (!post) throw new Error('post element vanished');

    let authorName = '';
    let authorUrl = null;
    let authorElm = post.querySelector(__AUTHOR__);
    if (authorElm) {
        authorName = authorElm.innerText;
        authorUrl = authorElm.getAttribute('href');
    } else {
        authorElm = post.querySelector(__AUTHOR_FALLBACK__);
        if (authorElm) authorName = authorElm.innerText;
    }

    const avatarElm = post.querySelector(__AVATAR__);
    const authorAvatar = avatarElm ? avatarElm.getAttribute('xlink:href') : null;

    const contentElm = post.querySelector(__CONTENT__);
    let contentText = null;
    let contentHtml = null;
    if (contentElm) {
        const expand = contentElm.querySelector(__EXPAND__);
        if (expand) {
            await new Promise((resolve) => {
                const observer = new MutationObserver(() => {
                    observer.disconnect();
                    resolve();
                });
                observer.observe(contentElm, { childList: true, subtree: true });
                expand.click();
            });
        }
        contentText = contentElm.innerText;
        contentHtml = contentElm.innerHTML;
    }

    const attachmentElm = post.querySelector(contentElm ? __ATTACHMENT__ : __ATTACHMENT_NO_TEXT__);
    const images = [];
    if (attachmentElm) {
        for (const img of attachmentElm.querySelectorAll(__IMAGE__)) {
            const src = img.getAttribute('src');
            if (src) images.push(src);
        }
    }

    return { authorName, authorUrl, authorAvatar, contentText, contentHtml, images };
})()
"#;

#[derive(Debug, Deserialize)]
struct RawMetadata {
    date: String,
    href: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContent {
    #[serde(default)]
    author_name: String,
    #[serde(default)]
    author_url: Option<String>,
    #[serde(default)]
    author_avatar: Option<String>,
    #[serde(default)]
    content_text: Option<String>,
    #[serde(default)]
    content_html: Option<String>,
    #[serde(default)]
    images: Vec<String>,
}

pub struct PostExtractor<'a> {
    driver: &'a dyn PageDriver,
    catalog: &'a SelectorCatalog,
    retry: RetryPolicy,
}

impl<'a> PostExtractor<'a> {
    pub fn new(driver: &'a dyn PageDriver, catalog: &'a SelectorCatalog, retry: RetryPolicy) -> Self {
        Self {
            driver,
            catalog,
            retry,
        }
    }

    /// Both tracks must resolve; there is no partial-post emission.
    pub async fn extract(&self, handle: &ElementRef) -> Result<Post> {
        let (date, href) = self.metadata_track(handle).await?;
        let content = self.content_track(handle).await?;
        let (permalink, id) = canonicalize_permalink(&href);

        Ok(Post {
            author_name: content.author_name,
            author_url: content.author_url.map(|u| strip_query(&u)),
            author_avatar: content.author_avatar,
            date,
            permalink,
            id,
            content_text: content.content_text,
            content_html: content.content_html,
            images: content.images,
        })
    }

    /// Hover-revealed metadata, retried as a unit from the pointer reset.
    async fn metadata_track(&self, post: &ElementRef) -> Result<(String, String)> {
        let link = post.descendant(self.catalog.post_link);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_metadata(&link).await {
                Ok(raw) => return Ok(raw),
                Err(e) => {
                    debug!(attempt, error = %e, "Metadata track attempt failed");
                    if attempt >= self.retry.max_attempts {
                        return Err(HarvestError::ExtractionTimeout { attempts: attempt });
                    }
                    // A hover on a not-yet-visible element can only land
                    // once the element scrolls in; give it a moment.
                    if e.to_string().contains("not visible") {
                        tokio::time::sleep(self.retry.visibility_pause).await;
                    }
                }
            }
        }
    }

    async fn try_metadata(&self, link: &ElementRef) -> Result<(String, String)> {
        step(
            POINTER_TIMEOUT,
            "pointer reset",
            self.driver.move_mouse_origin(),
        )
        .await?;
        step(POINTER_TIMEOUT, "hover", self.driver.hover(link)).await?;

        let js = TOOLTIP_JS.replace("__LINK__", &js_str(link.selector()));
        let value = step(
            TOOLTIP_TIMEOUT,
            "tooltip mutation",
            self.driver.evaluate(&js),
        )
        .await?;
        let raw: RawMetadata = serde_json::from_value(value)
            .map_err(|e| HarvestError::Driver(format!("tooltip payload: {e}")))?;
        Ok((raw.date, raw.href))
    }

    async fn content_track(&self, post: &ElementRef) -> Result<RawContent> {
        let js = CONTENT_JS
            .replace("__POST__", &js_str(post.selector()))
            .replace("__AUTHOR__", &js_str(self.catalog.post_author))
            .replace(
                "__AUTHOR_FALLBACK__",
                &js_str(self.catalog.post_author_fallback),
            )
            .replace("__AVATAR__", &js_str(self.catalog.post_author_avatar))
            .replace("__CONTENT__", &js_str(self.catalog.post_content))
            .replace("__EXPAND__", &js_str(self.catalog.post_content_expand))
            .replace("__ATTACHMENT__", &js_str(self.catalog.post_attachment))
            .replace(
                "__ATTACHMENT_NO_TEXT__",
                &js_str(self.catalog.post_attachment_no_text),
            )
            .replace("__IMAGE__", &js_str(self.catalog.post_image));

        let value = self
            .driver
            .evaluate(&js)
            .await
            .map_err(HarvestError::driver)?;
        serde_json::from_value(value)
            .map_err(|e| HarvestError::Driver(format!("content payload: {e}")))
    }
}

/// Run one micro-step under its timeout, folding both failure shapes into
/// the same retryable error.
async fn step<T>(
    limit: Duration,
    what: &str,
    fut: impl Future<Output = cdp_client::Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(HarvestError::driver),
        Err(_) => Err(HarvestError::Driver(format!("{what} timed out"))),
    }
}

/// Quote a selector as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}
