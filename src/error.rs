use core::time::Duration;

use compact_str::CompactString;

/// Rejected configuration. Raised before any browser work starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
    #[error("portal url {url:?} is invalid: {reason}")]
    Url { url: String, reason: String },
    #[error("timeout must be positive")]
    ZeroTimeout,
}

/// Pipeline stage an error or event belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Launch,
    Login,
    Collect,
    Classify,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Launch => "launch",
            Self::Login => "login",
            Self::Collect => "collect",
            Self::Classify => "classify",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort the whole acquisition.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("authentication failed: {message}")]
    Authentication { message: String },
    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },
    #[error("cannot start browser: {0:#}")]
    Launch(anyhow::Error),
}

impl PipelineError {
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }
}

/// Why a single view produced no entries.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error, serde::Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ViewError {
    #[error("timed out {attempts} times (limit {after:?} each)")]
    Timeout { attempts: u32, after: Duration },
    #[error("{message}")]
    Collection { message: String },
}

/// A view that failed; recorded next to the records instead of aborting.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct ViewFailure {
    pub view: CompactString,
    pub error: ViewError,
}

impl core::fmt::Display for ViewFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "view {}: {}", self.view, self.error)
    }
}
