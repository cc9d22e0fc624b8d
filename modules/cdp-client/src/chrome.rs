//! Chromium-backed [`PageDriver`] over the DevTools protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, InsertTextParams,
};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, ErrorReason, ResourceType};
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::driver::{CookieRecord, ElementRef, PageDriver};
use crate::error::{CdpError, Result};

/// How often polling waits re-check the DOM.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How often the insertion bridge drains the page-side queue.
const OBSERVER_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Insertion channel depth. A full channel back-pressures the bridge task,
/// which simply leaves further elements queued on the page side.
const INSERTION_QUEUE_DEPTH: usize = 64;

/// Tags every match of a selector with a stable reference attribute and
/// returns the tag values in document order.
const TAG_MATCHES_JS: &str = r#"
(() => {
    if (!window.__ghRefSeq) window.__ghRefSeq = 0;
    const out = [];
    for (const el of document.querySelectorAll(__SELECTOR__)) {
        if (!el.hasAttribute('data-gh-ref')) {
            el.setAttribute('data-gh-ref', String(++window.__ghRefSeq));
        }
        out.push(el.getAttribute('data-gh-ref'));
    }
    return out;
})()
"#;

/// Installs a MutationObserver on the feed container that tags every newly
/// inserted post-shaped element and queues its tag for the host to drain.
const INSTALL_OBSERVER_JS: &str = r#"
(() => {
    if (window.__ghObserver) return true;
    if (!window.__ghRefSeq) window.__ghRefSeq = 0;
    window.__ghQueue = [];
    const target = document.querySelector(__CONTAINER__);
    if (!target) return false;
    window.__ghObserver = new MutationObserver((mutations) => {
        for (const mutation of mutations) {
            for (const node of mutation.addedNodes) {
                if (!(node instanceof HTMLElement)) continue;
                const post = node.matches(__POST__) ? node : node.querySelector(__POST__);
                if (post && !post.hasAttribute('data-gh-ref')) {
                    post.setAttribute('data-gh-ref', String(++window.__ghRefSeq));
                    window.__ghQueue.push(post.getAttribute('data-gh-ref'));
                }
            }
        }
    });
    window.__ghObserver.observe(target, { childList: true });
    return true;
})()
"#;

const DRAIN_QUEUE_JS: &str = "window.__ghQueue ? window.__ghQueue.splice(0) : []";

/// Quote a selector as a JS string literal.
fn js_str(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub struct CdpDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: JoinHandle<()>,
    // Fresh profile per launch keeps runs isolated; removed on drop.
    _profile_dir: tempfile::TempDir,
    closed: AtomicBool,
}

impl CdpDriver {
    /// Launch an isolated Chromium instance with a throwaway profile and
    /// open the single tab the driver operates on.
    pub async fn launch(headless: bool) -> Result<Self> {
        let profile_dir = tempfile::tempdir().map_err(|e| CdpError::Launch(e.to_string()))?;

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-accelerated-2d-canvas")
            .arg("--disable-gpu")
            .arg("--incognito")
            .arg(format!("--user-data-dir={}", profile_dir.path().display()));
        if !headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(CdpError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| CdpError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| CdpError::Launch(e.to_string()))?;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task,
            _profile_dir: profile_dir,
            closed: AtomicBool::new(false),
        })
    }

    async fn find(&self, target: &ElementRef) -> Result<Element> {
        self.page
            .find_element(target.selector())
            .await
            .map_err(|_| CdpError::NotFound(target.selector().to_string()))
    }

    async fn dispatch_mouse_move(&self, x: f64, y: f64) -> Result<()> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseMoved)
            .x(x)
            .y(y)
            .build()
            .map_err(CdpError::Protocol)?;
        self.page.execute(params).await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        debug!(url, "Navigating");
        tokio::time::timeout(timeout, self.page.goto(url))
            .await
            .map_err(|_| CdpError::Timeout(timeout, format!("navigation to {url}")))??;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<ElementRef> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(ElementRef::new(selector));
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CdpError::Timeout(timeout, format!("selector {selector}")));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementRef>> {
        let js = TAG_MATCHES_JS.replace("__SELECTOR__", &js_str(selector));
        let tags: Vec<String> = self
            .page
            .evaluate(js)
            .await?
            .into_value()
            .unwrap_or_default();
        Ok(tags
            .into_iter()
            .map(|tag| ElementRef::new(format!("[data-gh-ref=\"{tag}\"]")))
            .collect())
    }

    async fn evaluate(&self, js: &str) -> Result<serde_json::Value> {
        let result = self.page.evaluate(js.to_string()).await?;
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn focus(&self, target: &ElementRef) -> Result<()> {
        self.find(target).await?.focus().await?;
        Ok(())
    }

    async fn click(&self, target: &ElementRef) -> Result<()> {
        self.find(target).await?.click().await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let params = InsertTextParams::builder()
            .text(text)
            .build()
            .map_err(CdpError::Protocol)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn hover(&self, target: &ElementRef) -> Result<()> {
        let element = self.find(target).await?;
        element
            .scroll_into_view()
            .await
            .map_err(|e| CdpError::Protocol(e.to_string()))?;
        let point = element
            .clickable_point()
            .await
            .map_err(|e| CdpError::Protocol(e.to_string()))?;
        self.dispatch_mouse_move(point.x, point.y).await
    }

    async fn move_mouse_origin(&self) -> Result<()> {
        self.dispatch_mouse_move(0.0, 0.0).await
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.page.wait_for_navigation())
            .await
            .map_err(|_| CdpError::Timeout(timeout, "navigation".to_string()))??;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page.set_user_agent(user_agent).await?;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<CookieRecord>> {
        let cookies = self.page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieRecord {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> Result<()> {
        let mut params = Vec::with_capacity(cookies.len());
        for cookie in cookies {
            let param = CookieParam::builder()
                .name(cookie.name)
                .value(cookie.value)
                .domain(cookie.domain)
                .path(cookie.path)
                .http_only(cookie.http_only)
                .secure(cookie.secure)
                .build()
                .map_err(CdpError::Protocol)?;
            params.push(param);
        }
        self.page.set_cookies(params).await?;
        Ok(())
    }

    async fn block_asset_requests(&self) -> Result<()> {
        let pattern = RequestPattern::builder().url_pattern("*").build();
        self.page
            .execute(EnableParams::builder().pattern(pattern).build())
            .await?;

        let mut paused = self.page.event_listener::<EventRequestPaused>().await?;
        let page = self.page.clone();
        tokio::spawn(async move {
            let image_url = regex::Regex::new(r"\.((jpe?g)|png|gif)").expect("valid regex");
            while let Some(event) = paused.next().await {
                let blocked_type = matches!(
                    event.resource_type,
                    ResourceType::Image
                        | ResourceType::Media
                        | ResourceType::Font
                        | ResourceType::TextTrack
                        | ResourceType::Ping
                        | ResourceType::CspViolationReport
                );
                let blocked = blocked_type || image_url.is_match(&event.request.url);

                if blocked {
                    let outcome = FailRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .error_reason(ErrorReason::Aborted)
                        .build()
                        .map_err(CdpError::Protocol);
                    match outcome {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                debug!(error = %e, "Request interception response failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "Malformed interception params"),
                    }
                } else {
                    let outcome = ContinueRequestParams::builder()
                        .request_id(event.request_id.clone())
                        .build()
                        .map_err(CdpError::Protocol);
                    match outcome {
                        Ok(params) => {
                            if let Err(e) = page.execute(params).await {
                                debug!(error = %e, "Request interception response failed");
                            }
                        }
                        Err(e) => warn!(error = %e, "Malformed interception params"),
                    }
                }
            }
        });
        Ok(())
    }

    async fn observe_inserted(
        &self,
        container_selector: &str,
        post_selector: &str,
    ) -> Result<mpsc::Receiver<ElementRef>> {
        let js = INSTALL_OBSERVER_JS
            .replace("__CONTAINER__", &js_str(container_selector))
            .replace("__POST__", &js_str(post_selector));
        let installed: bool = self
            .page
            .evaluate(js)
            .await?
            .into_value()
            .unwrap_or(false);
        if !installed {
            return Err(CdpError::NotFound(container_selector.to_string()));
        }

        let (tx, rx) = mpsc::channel(INSERTION_QUEUE_DEPTH);
        let page = self.page.clone();
        tokio::spawn(async move {
            loop {
                let drained = match page.evaluate(DRAIN_QUEUE_JS).await {
                    Ok(result) => result.into_value::<Vec<String>>().unwrap_or_default(),
                    // Page or tab is gone; the stream ends with it.
                    Err(e) => {
                        debug!(error = %e, "Insertion bridge stopped");
                        return;
                    }
                };
                for tag in drained {
                    let handle = ElementRef::new(format!("[data-gh-ref=\"{tag}\"]"));
                    if tx.send(handle).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(OBSERVER_POLL_INTERVAL).await;
            }
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut browser = self.browser.lock().await;
            if let Err(e) = browser.close().await {
                warn!(error = %e, "Browser close reported an error");
            }
        }
        self.handler_task.abort();
        Ok(())
    }
}
