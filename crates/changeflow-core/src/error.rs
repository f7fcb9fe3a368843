//! Changeflow error type.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ChangeflowError>;

/// Errors surfaced by Changeflow components.
///
/// `InvalidTime` is the only variant that reaches external API callers —
/// everything else is absorbed and logged inside the engine.
#[derive(Debug, thiserror::Error)]
pub enum ChangeflowError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid datetime: {0}")]
    InvalidTime(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
