//! The page-automation capability consumed by the engine.
//!
//! The engine is written entirely against [`PageDriver`]; the only live
//! implementation is the Chromium-backed [`crate::CdpDriver`], and tests
//! substitute scripted fakes. Element handles cross the boundary as
//! [`ElementRef`]: opaque, selector-addressable references that stay valid
//! for as long as the underlying element stays attached.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// Opaque handle to a live DOM element, addressed by a selector the driver
/// guarantees resolves to exactly that element (drivers tag elements with a
/// synthetic attribute to keep references stable across re-queries).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(String);

impl ElementRef {
    pub fn new(selector: impl Into<String>) -> Self {
        Self(selector.into())
    }

    pub fn selector(&self) -> &str {
        &self.0
    }

    /// Reference to a descendant of this element.
    pub fn descendant(&self, child_selector: &str) -> ElementRef {
        ElementRef(format!("{} {}", self.0, child_selector))
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One browser cookie, serialized to disk as part of a JSON array. Field
/// names mirror the protocol's camelCase so saved files round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

/// Everything the engine may do to the single automated tab.
///
/// All waits are cooperative; implementations must not require more than one
/// concurrent caller (the engine serializes interaction by design).
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()>;

    /// Resolve once the selector matches, or time out.
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<ElementRef>;

    /// All current matches, without waiting.
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>>;

    /// Run a script against the live DOM and return its serializable result.
    /// A script that throws (or rejects) surfaces as `Err`.
    async fn evaluate(&self, js: &str) -> Result<serde_json::Value>;

    async fn focus(&self, target: &ElementRef) -> Result<()>;
    async fn click(&self, target: &ElementRef) -> Result<()>;

    /// Type into the currently focused element.
    async fn type_text(&self, text: &str) -> Result<()>;

    /// Move the pointer over the element, firing the site's hover handlers.
    async fn hover(&self, target: &ElementRef) -> Result<()>;

    /// Park the pointer at the viewport origin, clearing residual hover
    /// state left by a previous interaction.
    async fn move_mouse_origin(&self) -> Result<()>;

    async fn current_url(&self) -> Result<String>;
    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()>;

    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;

    async fn cookies(&self) -> Result<Vec<CookieRecord>>;
    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> Result<()>;

    /// Install the request filter that aborts image/media/font/tracking
    /// requests. Everything else passes through unmodified.
    async fn block_asset_requests(&self) -> Result<()>;

    /// Watch `container_selector` for inserted elements matching
    /// `post_selector` and stream them in insertion order. The channel is
    /// bounded; a slow consumer back-pressures the producer rather than
    /// dropping elements. Errors if the container does not exist.
    async fn observe_inserted(
        &self,
        container_selector: &str,
        post_selector: &str,
    ) -> Result<mpsc::Receiver<ElementRef>>;

    /// Release the tab and browsing context. Idempotent, and safe to call
    /// even if initialization only partially completed.
    async fn close(&self) -> Result<()>;
}
