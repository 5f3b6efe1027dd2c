//! Process run mode.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which parts of the system a `quill-server` process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Producer REST API and worker pool in one process.
    #[default]
    All,
    /// Producer REST API only.
    Api,
    /// Worker pool only.
    Worker,
}

impl RunMode {
    /// Returns true if this mode serves the REST API.
    #[must_use]
    pub const fn serves_api(&self) -> bool {
        matches!(self, Self::All | Self::Api)
    }

    /// Returns true if this mode runs worker loops.
    #[must_use]
    pub const fn runs_workers(&self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Api => write!(f, "api"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "api" => Ok(Self::Api),
            "worker" => Ok(Self::Worker),
            other => Err(format!("unknown run mode: {other}")),
        }
    }
}
