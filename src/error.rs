use thiserror::Error;

/// Errors surfaced by the engine.
///
/// Absent keys are never an error: they are `Ok(None)` (or `Ok(false)` for the conditional
/// predicates). Only I/O failures, detected on-disk corruption, and caller misuse surface here.
#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A chain pointer or rehash split landed outside the invariants the engine maintains.
    /// Fatal: the caller should stop using the engine.
    #[error("corrupt on-disk state: {0}")]
    Corrupt(String),

    /// Caller misuse: an unsupported operation, or invalid configuration.
    #[error("usage error: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
