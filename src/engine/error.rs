//! Engine error types.

use std::time::Duration;

use thiserror::Error;

use super::source::UnitId;

/// Why a handler unit could not be (re)loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read handler source: {0}")]
    Io(#[from] std::io::Error),

    #[error("{unit}: malformed manifest: {source}")]
    Parse {
        unit: UnitId,
        #[source]
        source: toml::de::Error,
    },

    #[error("{unit}: manifest has no name")]
    MissingName { unit: UnitId },

    #[error("{unit}: unknown handler kind \"{kind}\"")]
    UnknownKind { unit: UnitId, kind: String },

    #[error("{unit}: invalid options: {reason:#}")]
    InvalidOptions { unit: UnitId, reason: anyhow::Error },

    #[error("{unit}: trigger \"{trigger}\" is already claimed by {owner}")]
    Conflict {
        unit: UnitId,
        trigger: String,
        owner: UnitId,
    },

    #[error("{unit}: no such handler unit")]
    NotFound { unit: UnitId },
}

/// Failure of one handler entry point.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("{0:#}")]
    Failed(anyhow::Error),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}
