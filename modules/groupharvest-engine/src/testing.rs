//! Test mocks for the engine.
//!
//! One fake matching the single trait boundary: `FakeDriver` implements
//! `PageDriver` over scripted state. Tests follow MOCK → FUNCTION → OUTPUT:
//! script the fake page, call the actual component, assert what came out.
//! Never reach into a component and call its internals.
//!
//! The fake fails waits immediately instead of honoring their timeouts, so
//! absence-paths (missing banner, missing feed) don't stall the suite; the
//! only real sleeps are the ones the engine itself takes, which paused-clock
//! tests advance automatically.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cdp_client::{CdpError, CookieRecord, ElementRef, PageDriver};
use tokio::sync::mpsc;

/// Marker matching the driver-tag attribute of a fake post handle inside
/// generated extraction scripts (the selector is embedded JS-quoted).
pub fn handle_marker(tag: &str) -> String {
    format!("data-gh-ref=\\\"{tag}\\\"")
}

/// A fake post handle, addressed the way real drivers tag elements.
pub fn post_handle(tag: &str) -> ElementRef {
    ElementRef::new(format!("[data-gh-ref=\"{tag}\"]"))
}

pub fn cookie(name: &str, value: &str) -> CookieRecord {
    CookieRecord {
        name: name.to_string(),
        value: value.to_string(),
        domain: ".example.com".to_string(),
        path: "/".to_string(),
        http_only: false,
        secure: true,
    }
}

struct EvalRule {
    name: String,
    markers: Vec<String>,
    results: VecDeque<Result<serde_json::Value, String>>,
}

#[derive(Default)]
struct FakeState {
    selectors: HashSet<String>,
    eval_rules: Vec<EvalRule>,
    query_batches: HashMap<String, VecDeque<Vec<ElementRef>>>,
    hover_failures: HashMap<String, u32>,
    insertions: Option<Vec<ElementRef>>,
    cookies: Vec<CookieRecord>,
    restored_cookies: Vec<CookieRecord>,
    url: String,
    user_agent: Option<String>,
    calls: Vec<String>,
    typed: Vec<String>,
    close_count: u32,
    // Keeping a sender open makes the insertion stream go quiet instead of
    // ending, exercising the quiet-period termination path.
    keep_insertion_channel_open: bool,
    #[allow(dead_code)] // held only to keep the channel from closing
    open_insertion_tx: Option<mpsc::Sender<ElementRef>>,
}

pub struct FakeDriver {
    state: Mutex<FakeState>,
    asset_blocking: AtomicBool,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: "https://www.example.com/".to_string(),
                ..FakeState::default()
            }),
            asset_blocking: AtomicBool::new(false),
        }
    }

    /// Mark a selector as present on the fake page.
    pub fn with_selector(self, selector: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .selectors
            .insert(selector.to_string());
        self
    }

    pub fn with_url(self, url: &str) -> Self {
        self.state.lock().unwrap().url = url.to_string();
        self
    }

    pub fn with_cookies(self, cookies: Vec<CookieRecord>) -> Self {
        self.state.lock().unwrap().cookies = cookies;
        self
    }

    /// Script one `evaluate` result for scripts containing every marker.
    /// Repeated registrations with the same name queue up in order; the
    /// final result repeats once the queue drains.
    pub fn on_eval(self, name: &str, markers: &[&str], result: serde_json::Value) -> Self {
        self.push_eval(name, markers, Ok(result));
        self
    }

    pub fn on_eval_error(self, name: &str, markers: &[&str], message: &str) -> Self {
        self.push_eval(name, markers, Err(message.to_string()));
        self
    }

    fn push_eval(&self, name: &str, markers: &[&str], result: Result<serde_json::Value, String>) {
        let mut state = self.state.lock().unwrap();
        if let Some(rule) = state.eval_rules.iter_mut().find(|r| r.name == name) {
            rule.results.push_back(result);
            return;
        }
        state.eval_rules.push(EvalRule {
            name: name.to_string(),
            markers: markers.iter().map(|m| m.to_string()).collect(),
            results: VecDeque::from([result]),
        });
    }

    /// Script successive `query_all` results for a selector; the final
    /// batch repeats once the queue drains.
    pub fn on_query(self, selector: &str, batches: Vec<Vec<ElementRef>>) -> Self {
        self.state
            .lock()
            .unwrap()
            .query_batches
            .insert(selector.to_string(), VecDeque::from(batches));
        self
    }

    /// Fail the next `times` hovers of elements whose selector contains
    /// `fragment` with the site's not-visible error.
    pub fn fail_hover(self, fragment: &str, times: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .hover_failures
            .insert(fragment.to_string(), times);
        self
    }

    /// Elements the mutation observer will report, in order.
    pub fn with_insertions(self, handles: Vec<ElementRef>) -> Self {
        self.state.lock().unwrap().insertions = Some(handles);
        self
    }

    pub fn keep_insertion_channel_open(self) -> Self {
        self.state.lock().unwrap().keep_insertion_channel_open = true;
        self
    }

    // --- assertions ---

    /// Chronological log of interactions, e.g. `hover:[data-gh-ref="1"] …`.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn typed(&self) -> Vec<String> {
        self.state.lock().unwrap().typed.clone()
    }

    pub fn restored_cookies(&self) -> Vec<CookieRecord> {
        self.state.lock().unwrap().restored_cookies.clone()
    }

    pub fn user_agent(&self) -> Option<String> {
        self.state.lock().unwrap().user_agent.clone()
    }

    pub fn close_count(&self) -> u32 {
        self.state.lock().unwrap().close_count
    }

    pub fn asset_blocking_installed(&self) -> bool {
        self.asset_blocking.load(Ordering::SeqCst)
    }

    fn log(&self, entry: String) {
        self.state.lock().unwrap().calls.push(entry);
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str, _timeout: Duration) -> cdp_client::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("navigate:{url}"));
        Ok(())
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> cdp_client::Result<ElementRef> {
        if self.state.lock().unwrap().selectors.contains(selector) {
            Ok(ElementRef::new(selector))
        } else {
            Err(CdpError::Timeout(timeout, format!("selector {selector}")))
        }
    }

    async fn query_all(&self, selector: &str) -> cdp_client::Result<Vec<ElementRef>> {
        let mut state = self.state.lock().unwrap();
        if let Some(batches) = state.query_batches.get_mut(selector) {
            let batch = if batches.len() > 1 {
                batches.pop_front().unwrap_or_default()
            } else {
                batches.front().cloned().unwrap_or_default()
            };
            return Ok(batch);
        }
        if state.selectors.contains(selector) {
            Ok(vec![ElementRef::new(selector)])
        } else {
            Ok(Vec::new())
        }
    }

    async fn evaluate(&self, js: &str) -> cdp_client::Result<serde_json::Value> {
        // Yield first so serialization violations would surface as
        // interleaved call logs.
        tokio::task::yield_now().await;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let rule = state
            .eval_rules
            .iter_mut()
            .find(|rule| rule.markers.iter().all(|m| js.contains(m.as_str())));
        match rule {
            Some(rule) => {
                let name = rule.name.clone();
                let result = if rule.results.len() > 1 {
                    rule.results.pop_front()
                } else {
                    rule.results.front().cloned()
                };
                state.calls.push(format!("eval:{name}"));
                match result {
                    Some(Ok(value)) => Ok(value),
                    Some(Err(message)) => Err(CdpError::Protocol(message)),
                    None => Ok(serde_json::Value::Null),
                }
            }
            None => {
                state.calls.push("eval:unmatched".to_string());
                Ok(serde_json::Value::Null)
            }
        }
    }

    async fn focus(&self, target: &ElementRef) -> cdp_client::Result<()> {
        self.log(format!("focus:{target}"));
        Ok(())
    }

    async fn click(&self, target: &ElementRef) -> cdp_client::Result<()> {
        self.log(format!("click:{target}"));
        Ok(())
    }

    async fn type_text(&self, text: &str) -> cdp_client::Result<()> {
        self.state.lock().unwrap().typed.push(text.to_string());
        Ok(())
    }

    async fn hover(&self, target: &ElementRef) -> cdp_client::Result<()> {
        tokio::task::yield_now().await;
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let selector = target.selector().to_string();
        let failing = state
            .hover_failures
            .iter_mut()
            .find(|(fragment, remaining)| selector.contains(fragment.as_str()) && **remaining > 0);
        if let Some((_, remaining)) = failing {
            *remaining -= 1;
            state.calls.push(format!("hover_failed:{selector}"));
            return Err(CdpError::Protocol(
                "Node is either not visible or not an HTMLElement".to_string(),
            ));
        }
        state.calls.push(format!("hover:{selector}"));
        Ok(())
    }

    async fn move_mouse_origin(&self) -> cdp_client::Result<()> {
        self.log("mouse_origin".to_string());
        Ok(())
    }

    async fn current_url(&self) -> cdp_client::Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn wait_for_navigation(&self, _timeout: Duration) -> cdp_client::Result<()> {
        self.log("wait_for_navigation".to_string());
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> cdp_client::Result<()> {
        self.state.lock().unwrap().user_agent = Some(user_agent.to_string());
        Ok(())
    }

    async fn cookies(&self) -> cdp_client::Result<Vec<CookieRecord>> {
        Ok(self.state.lock().unwrap().cookies.clone())
    }

    async fn set_cookies(&self, cookies: Vec<CookieRecord>) -> cdp_client::Result<()> {
        self.state.lock().unwrap().restored_cookies = cookies;
        Ok(())
    }

    async fn block_asset_requests(&self) -> cdp_client::Result<()> {
        self.asset_blocking.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn observe_inserted(
        &self,
        container_selector: &str,
        _post_selector: &str,
    ) -> cdp_client::Result<mpsc::Receiver<ElementRef>> {
        let mut state = self.state.lock().unwrap();
        let handles = match state.insertions.take() {
            Some(handles) => handles,
            None => {
                if !state.selectors.contains(container_selector) {
                    return Err(CdpError::NotFound(container_selector.to_string()));
                }
                Vec::new()
            }
        };
        let (tx, rx) = mpsc::channel(handles.len().max(1));
        for handle in handles {
            // Capacity covers every scripted element, so this never blocks.
            let _ = tx.try_send(handle);
        }
        if state.keep_insertion_channel_open {
            state.open_insertion_tx = Some(tx);
        }
        Ok(rx)
    }

    async fn close(&self) -> cdp_client::Result<()> {
        self.state.lock().unwrap().close_count += 1;
        Ok(())
    }
}
