//! Client error types.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors raised while talking to the entitlement server or orchestrating
/// registration.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The private CA pool could not be built.
    #[error("Cannot set up trusted CAs from {}: {reason}", path.display())]
    TrustSetup { path: PathBuf, reason: String },

    /// The client certificate or key is unusable.
    #[error("Unable to load client certificate and key: {0}")]
    KeyPair(String),

    #[error("HTTP client setup failed: {0}")]
    ClientSetup(#[source] reqwest::Error),

    #[error("{method} {path} failed: {source}")]
    Transport {
        method: String,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response to {path}: {source}")]
    InvalidResponse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response to {path} lacks {field}")]
    IncompleteResponse { path: String, field: &'static str },

    #[error("Malformed {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Bad combination of command-line arguments or an impossible transition.
    #[error("{0}")]
    Usage(String),

    /// The server granted no entitlement certificates.
    #[error("No entitlement certificates returned for consumer {uuid}")]
    NoEntitlements { uuid: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Pki(#[from] subman_pki::PkiError),

    #[error(transparent)]
    Core(#[from] subman_core::Error),
}

impl ClientError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}
