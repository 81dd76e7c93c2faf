//! Error types for map transitions.

use std::time::Duration;
use thiserror::Error;

/// Errors raised while switching maps.
///
/// `DownloadFailed` and `MapRootNotFound` are soft: they are logged and
/// recorded on the run, and the transition carries on. The rest end the run
/// in `Failed` or reject it before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Target map name was empty.
    #[error("Map name must not be empty")]
    EmptyMapName,

    /// A transition is already running.
    #[error("A map transition to '{0}' is already in progress")]
    AlreadyInProgress(String),

    /// The network layer never reported the peer as disconnected.
    #[error("Timed out after {timeout:?} waiting to disconnect from the server")]
    DisconnectTimeout { timeout: Duration },

    /// Asset download reported an error.
    #[error("Failed downloading map '{map}': {details}")]
    DownloadFailed { map: String, details: String },

    /// Additive scene load reported an error.
    #[error("Failed loading map '{map}': {details}")]
    SceneLoadFailed { map: String, details: String },

    /// No object tagged as map root appeared after all attempts.
    #[error("Couldn't find the map root for '{map}' after {attempts} attempts")]
    MapRootNotFound { map: String, attempts: u32 },

    /// Transition was aborted by the caller.
    #[error("Map transition to '{0}' was cancelled")]
    Cancelled(String),
}

impl TransitionError {
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            TransitionError::DownloadFailed { .. } | TransitionError::MapRootNotFound { .. }
        )
    }
}
