//! Incremental feed-extraction engine for authenticated group scraping.
//!
//! The engine drives a single automated tab through the [`PageDriver`]
//! capability: it logs in (pausing for a second factor when the site asks
//! for one), watches a group's feed for post elements, extracts each one
//! exactly once, and merges the results into a per-group JSON store.

pub mod auth;
pub mod extract;
pub mod feed;
pub mod group;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod extract_tests;
#[cfg(test)]
mod feed_tests;
#[cfg(test)]
mod store_tests;

pub use group::Group;
pub use session::{Session, SessionState};
pub use store::ResultStore;

pub use cdp_client::{CookieRecord, ElementRef, PageDriver};
pub use groupharvest_common::{
    HarvestConfig, HarvestError, Post, Result, RetryPolicy, ScrollStrategy, SelectorCatalog,
};
