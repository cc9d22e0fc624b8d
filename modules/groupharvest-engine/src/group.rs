//! One group's scrape pass: observer → extractor → store → callback.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cdp_client::{ElementRef, PageDriver};
use groupharvest_common::{HarvestConfig, HarvestError, Post, Result, ScrollStrategy, SelectorCatalog};
use tracing::{debug, info, warn};

use crate::auth::NAVIGATION_TIMEOUT;
use crate::extract::PostExtractor;
use crate::feed::FeedObserver;
use crate::store::ResultStore;

/// The title render doubles as a "page chrome is up" signal; its absence is
/// tolerated because the feed wait below is authoritative.
const GROUP_NAME_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-observed per-post hook.
pub type OnPost<'a> = &'a mut (dyn FnMut(&Post) + Send);

pub struct Group {
    driver: Arc<dyn PageDriver>,
    config: HarvestConfig,
    catalog: SelectorCatalog,
    id: String,
    url: String,
}

impl Group {
    pub(crate) fn new(
        driver: Arc<dyn PageDriver>,
        config: HarvestConfig,
        catalog: SelectorCatalog,
        id: String,
    ) -> Self {
        let url = catalog.group_url(&id);
        Self {
            driver,
            config,
            catalog,
            id,
            url,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Scrape the group's feed once. New unique posts are flushed to the
    /// output target as they are confirmed (crash resilience over batch
    /// efficiency) and handed to `on_post` as they are produced. Returns
    /// the posts extracted in this pass, in DOM insertion order.
    pub async fn get_posts(
        &self,
        output_target: Option<PathBuf>,
        mut on_post: Option<OnPost<'_>>,
        persist: bool,
    ) -> Result<Vec<Post>> {
        let driver = self.driver.as_ref();
        driver
            .navigate(&self.url, NAVIGATION_TIMEOUT)
            .await
            .map_err(HarvestError::driver)?;

        let _ = driver
            .wait_for_selector(self.catalog.group_name, GROUP_NAME_TIMEOUT)
            .await;
        let group_name = driver
            .evaluate("document.title")
            .await
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        info!(group = %self.id, name = %group_name, "Scraping group feed");

        let target = output_target
            .unwrap_or_else(|| self.config.output_dir.join(format!("{}.json", self.id)));
        let store = ResultStore::new(target);
        if self.config.debug {
            let existing = store.load().await;
            info!(group = %self.id, existing = existing.len(), "Prior results loaded");
        }

        let observer = FeedObserver::new(driver, &self.catalog);
        observer.wait_for_feed(&self.id).await?;

        let extractor = PostExtractor::new(driver, &self.catalog, self.config.retry);
        let mut collected: Vec<Post> = Vec::new();

        match self.config.scroll_strategy {
            ScrollStrategy::MutationDriven => {
                observer.seed_scroll().await?;
                let mut inserted = observer.inserted_posts().await?;
                // Single consumer: the next element is popped only after the
                // previous extraction fully completes. Concurrent extraction
                // would corrupt the hover-based metadata capture.
                loop {
                    let handle = match tokio::time::timeout(
                        self.config.feed_quiet_period,
                        inserted.recv(),
                    )
                    .await
                    {
                        Ok(Some(handle)) => handle,
                        Ok(None) => break,
                        Err(_) => {
                            debug!(group = %self.id, "Feed quiet period elapsed, ending pass");
                            break;
                        }
                    };
                    self.handle_post(&extractor, &handle, &store, &mut collected, &mut on_post, persist)
                        .await?;
                }
            }
            ScrollStrategy::ScrollUntilStable => {
                let mut seen = HashSet::new();
                loop {
                    let fresh = observer.scroll_pass(&mut seen).await?;
                    if fresh.is_empty() {
                        break;
                    }
                    for handle in &fresh {
                        self.handle_post(&extractor, handle, &store, &mut collected, &mut on_post, persist)
                            .await?;
                    }
                }
            }
        }

        info!(group = %self.id, posts = collected.len(), "Scrape pass complete");
        Ok(collected)
    }

    async fn handle_post(
        &self,
        extractor: &PostExtractor<'_>,
        handle: &ElementRef,
        store: &ResultStore,
        collected: &mut Vec<Post>,
        on_post: &mut Option<OnPost<'_>>,
        persist: bool,
    ) -> Result<()> {
        let post = match extractor.extract(handle).await {
            Ok(post) => post,
            // A post that exhausts its retry budget is dropped; the rest of
            // the pass is still worth finishing.
            Err(HarvestError::ExtractionTimeout { attempts }) => {
                warn!(handle = %handle, attempts, "Skipping post after exhausted metadata retries");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if collected.iter().any(|p| p.same_post(&post)) {
            debug!(id = %post.id, "Already extracted in this pass");
            return Ok(());
        }

        if let Some(callback) = on_post.as_deref_mut() {
            callback(&post);
        }
        if persist {
            if store.append(&post).await? {
                debug!(id = %post.id, "Post persisted");
            }
        }
        collected.push(post);
        Ok(())
    }
}
