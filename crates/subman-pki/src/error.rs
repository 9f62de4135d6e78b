//! Certificate store error types.

use std::path::PathBuf;

/// Errors from reading, writing and decoding certificates.
#[derive(Debug, thiserror::Error)]
pub enum PkiError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error("Failed to decompress ENTITLEMENT DATA: {0}")]
    Decompression(#[source] std::io::Error),

    #[error("ENTITLEMENT DATA payload does not match the expected structure: {0}")]
    PayloadParse(#[source] serde_json::Error),
}

impl PkiError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is an I/O error caused by a missing file.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Result alias for certificate store operations.
pub type Result<T> = std::result::Result<T, PkiError>;
