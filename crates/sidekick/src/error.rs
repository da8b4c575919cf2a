//
// error.rs
//
// Error types for the code-intelligence worker
//

use thiserror::Error;

/// Failure while retrieving a declaration file from the network.
///
/// Every variant is recoverable: callers log it and continue with a
/// degraded environment.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request for {0} returned status {1}")]
    Status(String, u16),
    #[error("request for {0} timed out")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid declaration url: {0}")]
    InvalidUrl(String),
}

/// Errors raised by an analysis session when a caller violates its contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown virtual file: {0}")]
    UnknownFile(String),
    #[error("offset {offset} out of range for {path} (length {len})")]
    OffsetOutOfRange {
        path: String,
        offset: usize,
        len: usize,
    },
}

/// Errors from composing or decoding change sets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("change set lengths do not line up (expected {expected}, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("malformed change set: {0}")]
    Malformed(String),
}

/// Errors from the durable declaration cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache lock poisoned")]
    Poisoned,
}

/// Errors surfaced to the host through the worker handle.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker has been terminated")]
    Closed,
    #[error(transparent)]
    Patch(#[from] PatchError),
}
