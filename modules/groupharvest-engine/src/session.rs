use std::path::Path;
use std::sync::Arc;

use cdp_client::{CdpDriver, CookieRecord, PageDriver};
use groupharvest_common::{HarvestConfig, HarvestError, Result, SelectorCatalog};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::Authenticator;
use crate::group::Group;

/// Fixed desktop user agent. The selector catalog is written against the
/// desktop markup variant, so every session must request it.
pub const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/68.0.3419.0 Safari/537.36";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AwaitingSecondFactor,
    Authenticated,
    Closed,
}

/// One authenticated browsing session against the site, owning the tab for
/// its whole lifetime. Groups are scraped sequentially on the same tab;
/// run independent sessions (with their own cookie files) for parallelism.
pub struct Session {
    driver: Arc<dyn PageDriver>,
    config: HarvestConfig,
    catalog: SelectorCatalog,
    state: Mutex<SessionState>,
}

impl Session {
    /// Launch an isolated browser and prepare the tab. Fails with
    /// `SessionInit` when the automation engine cannot start at all.
    pub async fn init(config: HarvestConfig) -> Result<Self> {
        let driver = CdpDriver::launch(config.headless)
            .await
            .map_err(|e| HarvestError::SessionInit(e.to_string()))?;
        Self::with_driver(Arc::new(driver), config).await
    }

    /// Prepare a session over an already-running page driver. This is the
    /// seam tests and alternative backends come in through.
    pub async fn with_driver(driver: Arc<dyn PageDriver>, config: HarvestConfig) -> Result<Self> {
        driver
            .set_user_agent(DESKTOP_USER_AGENT)
            .await
            .map_err(HarvestError::driver)?;

        let session = Self {
            driver,
            config,
            catalog: SelectorCatalog::desktop(),
            state: Mutex::new(SessionState::Unauthenticated),
        };
        if session.config.use_cookies {
            session.restore_cookies().await?;
        }
        Ok(session)
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Submit credentials. On a second-factor checkpoint the session is left
    /// in `AwaitingSecondFactor` and `TwoFactorRequired` is returned; the
    /// caller resumes with [`Session::submit_second_factor_code`].
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        if self.state().await == SessionState::Closed {
            return Err(HarvestError::Initialisation);
        }
        let auth = Authenticator::new(self.driver.as_ref(), &self.config, &self.catalog);
        match auth.login(username, password).await {
            Ok(()) => {
                *self.state.lock().await = SessionState::Authenticated;
                Ok(())
            }
            Err(HarvestError::TwoFactorRequired) => {
                *self.state.lock().await = SessionState::AwaitingSecondFactor;
                Err(HarvestError::TwoFactorRequired)
            }
            Err(e) => Err(e),
        }
    }

    /// Valid only from `AwaitingSecondFactor`.
    pub async fn submit_second_factor_code(&self, code: &str) -> Result<()> {
        if self.state().await != SessionState::AwaitingSecondFactor {
            return Err(HarvestError::Initialisation);
        }
        let auth = Authenticator::new(self.driver.as_ref(), &self.config, &self.catalog);
        auth.submit_second_factor_code(code).await?;
        *self.state.lock().await = SessionState::Authenticated;
        Ok(())
    }

    pub fn group(&self, group_id: impl Into<String>) -> Group {
        Group::new(
            Arc::clone(&self.driver),
            self.config.clone(),
            self.catalog.clone(),
            group_id.into(),
        )
    }

    /// Release the tab and browsing context. Safe to call repeatedly and
    /// from any state, including after a partially failed init.
    pub async fn close(&self) -> Result<()> {
        *self.state.lock().await = SessionState::Closed;
        self.driver.close().await.map_err(HarvestError::driver)
    }

    async fn restore_cookies(&self) -> Result<()> {
        let path = self.config.cookie_file();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(_) => {
                debug!(path = %path.display(), "No cookie store to restore");
                return Ok(());
            }
        };
        let cookies: Vec<CookieRecord> = match serde_json::from_str(&raw) {
            Ok(cookies) => cookies,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable cookie store");
                return Ok(());
            }
        };
        info!(count = cookies.len(), "Restoring cookies");
        self.driver
            .set_cookies(cookies)
            .await
            .map_err(HarvestError::driver)
    }
}

/// Snapshot the tab's cookies into the store file.
pub(crate) async fn persist_cookies(driver: &dyn PageDriver, path: &Path) -> Result<()> {
    let cookies = driver.cookies().await.map_err(HarvestError::driver)?;
    let json = serde_json::to_string_pretty(&cookies).map_err(HarvestError::storage)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(HarvestError::storage)?;
        }
    }
    tokio::fs::write(path, json)
        .await
        .map_err(HarvestError::storage)?;
    debug!(count = cookies.len(), path = %path.display(), "Cookies persisted");
    Ok(())
}
