use thiserror::Error;

pub type Result<T> = std::result::Result<T, HarvestError>;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The browser or tab could not be created. Fatal, no retry.
    #[error("Browser session could not be created: {0}")]
    SessionInit(String),

    /// An operation was invoked on a session that was never initialized or
    /// is in the wrong state. Sequencing bug in the caller.
    #[error("Operation invoked before the session was initialised")]
    Initialisation,

    /// Login reached a second-factor checkpoint. Recoverable: submit the
    /// code via `submit_second_factor_code`.
    #[error("Login hit a second-factor checkpoint; submit the code to continue")]
    TwoFactorRequired,

    /// Credential submission reached neither the checkpoint nor the
    /// authenticated-feed marker. Deliberately not classified further.
    #[error("Login failed during {0}")]
    LoginFailed(String),

    /// The feed container never appeared within the navigation timeout.
    /// Other targets may still proceed on the same session.
    #[error("Feed container for group {group} did not appear within {timeout_secs}s")]
    FeedNotFound { group: String, timeout_secs: u64 },

    /// The metadata track exhausted its retry budget.
    #[error("Post metadata extraction gave up after {attempts} attempts")]
    ExtractionTimeout { attempts: u32 },

    #[error("Result store error: {0}")]
    Storage(String),

    #[error("Page driver error: {0}")]
    Driver(String),
}

impl HarvestError {
    pub fn driver(err: impl std::fmt::Display) -> Self {
        HarvestError::Driver(err.to_string())
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        HarvestError::Storage(err.to_string())
    }
}
