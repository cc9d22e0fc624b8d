//! Feed observation: turning an infinite, mutating feed into a finite,
//! ordered, exactly-once sequence of post elements for one pass.
//!
//! Two pass shapes exist (see `ScrollStrategy`). The scroll-until-stable
//! pass drives loading explicitly; the mutation-driven pass scrolls once and
//! then relies on the per-post hover interaction to keep the feed growing,
//! consuming insertions from the driver's observer channel.

use std::collections::HashSet;
use std::time::Duration;

use cdp_client::{ElementRef, PageDriver};
use groupharvest_common::{HarvestError, Result, SelectorCatalog};
use rand::Rng;
use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::NAVIGATION_TIMEOUT;

/// Randomized settle window between scroll passes.
const SCROLL_SLEEP_MS: std::ops::RangeInclusive<u64> = 1_000..=5_000;

const SCROLL_JS: &str = "window.scrollBy(0, document.body.scrollHeight)";

pub struct FeedObserver<'a> {
    driver: &'a dyn PageDriver,
    catalog: &'a SelectorCatalog,
}

impl<'a> FeedObserver<'a> {
    pub fn new(driver: &'a dyn PageDriver, catalog: &'a SelectorCatalog) -> Self {
        Self { driver, catalog }
    }

    /// Wait for the feed container to render. Posts outside the container
    /// (announcements) are ignored by construction, since they don't follow the
    /// feed's ordering. `FeedNotFound` if it never appears.
    pub async fn wait_for_feed(&self, group_id: &str) -> Result<ElementRef> {
        self.driver
            .wait_for_selector(self.catalog.feed_container, NAVIGATION_TIMEOUT)
            .await
            .map_err(|_| HarvestError::FeedNotFound {
                group: group_id.to_string(),
                timeout_secs: NAVIGATION_TIMEOUT.as_secs(),
            })
    }

    /// One scroll to seed lazy content. Mutation-driven passes rely on the
    /// hover step of each extraction to keep loading more after this.
    pub async fn seed_scroll(&self) -> Result<()> {
        self.driver
            .evaluate(SCROLL_JS)
            .await
            .map_err(HarvestError::driver)?;
        Ok(())
    }

    /// Mutation-driven stream of post elements in insertion order. The
    /// channel is bounded, so extraction speed back-pressures observation.
    pub async fn inserted_posts(&self) -> Result<mpsc::Receiver<ElementRef>> {
        self.driver
            .observe_inserted(self.catalog.feed_container, self.catalog.post_element)
            .await
            .map_err(HarvestError::driver)
    }

    /// One scroll-and-settle pass. Returns the post elements no earlier
    /// pass has seen; an empty return means the feed has stabilized and the
    /// scrape is done.
    pub async fn scroll_pass(&self, seen: &mut HashSet<ElementRef>) -> Result<Vec<ElementRef>> {
        self.driver
            .evaluate(SCROLL_JS)
            .await
            .map_err(HarvestError::driver)?;

        let pause = Duration::from_millis(rand::rng().random_range(SCROLL_SLEEP_MS));
        tokio::time::sleep(pause).await;

        let handles = self
            .driver
            .query_all(self.catalog.post_element)
            .await
            .map_err(HarvestError::driver)?;
        let fresh: Vec<ElementRef> = handles
            .into_iter()
            .filter(|handle| seen.insert(handle.clone()))
            .collect();
        debug!(new_posts = fresh.len(), "Scroll pass settled");
        Ok(fresh)
    }
}
