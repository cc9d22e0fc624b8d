use std::path::PathBuf;
use std::time::Duration;

use typed_builder::TypedBuilder;

/// How a scrape pass decides it has seen the whole feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScrollStrategy {
    /// Repeatedly scroll to the bottom, sleep a randomized 1–5 s interval,
    /// re-query post elements, and stop on the first full pass that turns up
    /// zero previously unseen posts.
    ScrollUntilStable,
    /// Scroll once to seed content, then consume a mutation-observer stream
    /// of inserted posts one at a time. Further loading is a side effect of
    /// the per-post hover interaction. The pass ends when the stream stays
    /// quiet for the configured idle period after the last extraction.
    #[default]
    MutationDriven,
}

/// Bounded replacement for the historical retry-forever behavior of the
/// metadata track. Exceeding `max_attempts` fails the post with
/// `ExtractionTimeout` instead of hanging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause taken when a hover fails because the element is not currently
    /// visible, before the track restarts from the pointer reset.
    pub visibility_pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 50,
            visibility_pause: Duration::from_secs(1),
        }
    }
}

/// Caller-owned run configuration. The engine treats this as read-only.
#[derive(Debug, Clone, TypedBuilder)]
pub struct HarvestConfig {
    #[builder(setter(into))]
    pub username: String,
    #[builder(setter(into))]
    pub password: String,

    /// Directory result files are written into; the default target for a
    /// group is `<output_dir>/<group_id>.json`.
    #[builder(default = PathBuf::from("."), setter(into))]
    pub output_dir: PathBuf,

    /// Where cookies are persisted after authentication and restored from
    /// on init. Normalized to a `.json` extension.
    #[builder(default = PathBuf::from("groupharvest_cookies.json"), setter(into))]
    pub cookie_store_path: PathBuf,

    #[builder(default = true)]
    pub headless: bool,

    /// Raises scrape-progress logging from debug to info level detail.
    #[builder(default = false)]
    pub debug: bool,

    #[builder(default = true)]
    pub use_cookies: bool,

    /// Abort image/media/font/tracking requests once authenticated. Purely
    /// a speed-up; extraction must not depend on assets loading.
    #[builder(default = true)]
    pub disable_assets: bool,

    #[builder(default)]
    pub scroll_strategy: ScrollStrategy,

    #[builder(default)]
    pub retry: RetryPolicy,

    /// Idle window that ends a mutation-driven pass.
    #[builder(default = Duration::from_secs(30))]
    pub feed_quiet_period: Duration,
}

impl HarvestConfig {
    /// Cookie store path with a guaranteed `.json` extension, matching how
    /// historical cookie files were named.
    pub fn cookie_file(&self) -> PathBuf {
        self.cookie_store_path.with_extension("json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_shipped_behavior() {
        let config = HarvestConfig::builder()
            .username("user")
            .password("pass")
            .build();
        assert!(config.headless);
        assert!(config.use_cookies);
        assert!(config.disable_assets);
        assert_eq!(config.scroll_strategy, ScrollStrategy::MutationDriven);
        assert_eq!(config.retry.max_attempts, 50);
    }

    #[test]
    fn cookie_file_normalizes_extension() {
        let config = HarvestConfig::builder()
            .username("user")
            .password("pass")
            .cookie_store_path("state/cookies")
            .build();
        assert_eq!(config.cookie_file(), PathBuf::from("state/cookies.json"));

        let config = HarvestConfig::builder()
            .username("user")
            .password("pass")
            .cookie_store_path("state/cookies.json")
            .build();
        assert_eq!(config.cookie_file(), PathBuf::from("state/cookies.json"));
    }
}
