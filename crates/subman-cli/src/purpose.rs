//! System purpose attributes (`syspurpose.json`).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

/// Intended use of the host, reported at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemPurpose {
    pub role: String,
    pub service_level_agreement: String,
    pub usage: String,
    pub addons: Vec<String>,
}

impl SystemPurpose {
    /// Read and decode the system purpose file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read(path).map_err(|e| ClientError::io(path, e))?;
        serde_json::from_slice(&content).map_err(|source| ClientError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`Self::load`], but an unreadable file yields an empty purpose
    /// plus a warning.
    pub fn load_or_default(path: &Path) -> (Self, Option<String>) {
        match Self::load(path) {
            Ok(purpose) => (purpose, None),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "System purpose not available");
                (Self::default(), Some(format!("System purpose ignored: {e}")))
            }
        }
    }
}
