//! Error types for the signal path.

use thiserror::Error;

/// Error type for orchestrator-level configuration and lifecycle operations.
///
/// Configuration errors are rejected (or clamped) at the point of request
/// and never propagate as stream-level faults.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("stage '{stage}' has no input stream attached")]
    NotWired { stage: &'static str },

    #[error("invalid configuration for '{stage}': {reason}")]
    InvalidConfig { stage: &'static str, reason: String },

    #[error("failed to spawn worker for '{stage}': {source}")]
    Spawn {
        stage: &'static str,
        source: std::io::Error,
    },
}

/// Error type produced inside a stage's processing loop.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("stream closed, shutting down")]
    Shutdown,

    #[error("stage error: {0}")]
    Stage(String),
}

/// Result type for work functions.
pub type WorkResult<T = ()> = Result<T, WorkError>;

/// Result type for orchestrator operations.
pub type PathResult<T = ()> = Result<T, PathError>;
