//! Error types for `subman` core library.

use thiserror::Error;

/// Result type alias using `subman` core Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `subman` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed INI document
    #[error("INI syntax error at line {line}: {reason}")]
    IniSyntax { line: usize, reason: String },
}
