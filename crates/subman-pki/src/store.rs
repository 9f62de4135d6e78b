//! On-disk certificate and key storage.
//!
//! Consumer identity lives in `<consumer_dir>/cert.pem` + `key.pem`;
//! entitlements live in `<entitlement_dir>/<serial>.pem` + `<serial>-key.pem`.
//! A certificate and its key are always written or removed together.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PkiError, Result};
use crate::identity::{ConsumerIdentity, read_consumer_identity};

/// Consumer certificate filename.
pub const CONSUMER_CERT_FILENAME: &str = "cert.pem";
/// Consumer key filename.
pub const CONSUMER_KEY_FILENAME: &str = "key.pem";

/// Permission bits for certificates.
pub const CERT_MODE: u32 = 0o644;
/// Permission bits for private keys.
pub const KEY_MODE: u32 = 0o600;

/// Paths of one certificate/key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemPair {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Write a PEM file in full, then optionally restrict its permissions.
///
/// Not atomic: a failure mid-write leaves whatever was flushed.
pub fn write_pem_file(path: &Path, content: &str, mode: Option<u32>) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| PkiError::io(path, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| PkiError::io(path, e))?;
    file.flush().map_err(|e| PkiError::io(path, e))?;

    if let Some(mode) = mode {
        restrict_permissions(path, mode)?;
    }
    Ok(())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| PkiError::io(path, e))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Read a PEM file as text.
pub fn read_pem_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| PkiError::io(path, e))
}

/// First well-formed PEM block tagged `tag`, walking blocks in order.
///
/// Blocks are decoded one at a time and the walk stops at the first match,
/// so a malformed block elsewhere in the file does not hide it.
pub fn find_pem_block(pem_text: &str, tag: &str) -> Option<::pem::Pem> {
    const BEGIN: &str = "-----BEGIN ";
    let starts: Vec<usize> = pem_text.match_indices(BEGIN).map(|(i, _)| i).collect();
    starts.iter().enumerate().find_map(|(n, &start)| {
        let end = starts.get(n + 1).copied().unwrap_or(pem_text.len());
        match ::pem::parse(&pem_text[start..end]) {
            Ok(block) if block.tag() == tag => Some(block),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(offset = start, error = %e, "Skipping malformed PEM block");
                None
            }
        }
    })
}

/// Remove a certificate and its key.
///
/// Both removals are attempted; every failure is returned.
pub fn remove_cert_pair(cert_path: &Path, key_path: &Path) -> Vec<PkiError> {
    [cert_path, key_path]
        .into_iter()
        .filter_map(|path| fs::remove_file(path).err().map(|e| PkiError::io(path, e)))
        .collect()
}

/// Outcome of [`CertStore::remove_orphans`].
#[derive(Debug, Default)]
pub struct OrphanSweep {
    pub removed: Vec<PathBuf>,
    pub failures: Vec<PkiError>,
}

/// Certificate directories resolved from configuration.
#[derive(Debug, Clone)]
pub struct CertStore {
    consumer_dir: PathBuf,
    entitlement_dir: PathBuf,
}

impl CertStore {
    pub fn new(consumer_dir: impl Into<PathBuf>, entitlement_dir: impl Into<PathBuf>) -> Self {
        Self {
            consumer_dir: consumer_dir.into(),
            entitlement_dir: entitlement_dir.into(),
        }
    }

    pub fn consumer_dir(&self) -> &Path {
        &self.consumer_dir
    }

    pub fn entitlement_dir(&self) -> &Path {
        &self.entitlement_dir
    }

    pub fn consumer_pair(&self) -> PemPair {
        PemPair {
            cert: self.consumer_dir.join(CONSUMER_CERT_FILENAME),
            key: self.consumer_dir.join(CONSUMER_KEY_FILENAME),
        }
    }

    pub fn entitlement_pair(&self, serial: u64) -> PemPair {
        PemPair {
            cert: self.entitlement_dir.join(format!("{serial}.pem")),
            key: self.entitlement_dir.join(format!("{serial}-key.pem")),
        }
    }

    /// Whether both halves of the consumer identity are present.
    pub fn consumer_pair_exists(&self) -> bool {
        let pair = self.consumer_pair();
        pair.cert.is_file() && pair.key.is_file()
    }

    /// Parse the identity out of the installed consumer certificate.
    ///
    /// Always reads the file; nothing is cached between calls.
    pub fn consumer_identity(&self) -> Result<ConsumerIdentity> {
        read_consumer_identity(&self.consumer_pair().cert)
    }

    /// Persist the consumer identity pair.
    pub fn write_consumer_pair(&self, cert_pem: &str, key_pem: &str) -> Result<PemPair> {
        let pair = self.consumer_pair();
        ensure_dir(&self.consumer_dir)?;
        write_pair(&pair, cert_pem, key_pem)?;
        tracing::info!(cert = %pair.cert.display(), "Consumer certificate installed");
        Ok(pair)
    }

    /// Persist one entitlement pair under its serial number.
    pub fn write_entitlement_pair(&self, serial: u64, cert_pem: &str, key_pem: &str) -> Result<PemPair> {
        let pair = self.entitlement_pair(serial);
        ensure_dir(&self.entitlement_dir)?;
        write_pair(&pair, cert_pem, key_pem)?;
        tracing::info!(serial, cert = %pair.cert.display(), "Entitlement certificate installed");
        Ok(pair)
    }

    /// Remove the consumer identity pair, reporting each failure.
    pub fn remove_consumer_pair(&self) -> Vec<PkiError> {
        let pair = self.consumer_pair();
        remove_cert_pair(&pair.cert, &pair.key)
    }

    /// Serial numbers of the installed entitlement certificates.
    pub fn entitlement_serials(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(&self.entitlement_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PkiError::io(&self.entitlement_dir, e)),
        };
        let mut serials: Vec<u64> = entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let name = name.to_str()?;
                name.strip_suffix(".pem")
                    .filter(|stem| !stem.ends_with("-key"))
                    .and_then(|stem| stem.parse().ok())
            })
            .collect();
        serials.sort_unstable();
        Ok(serials)
    }

    /// Remove every certificate or key whose partner file is missing.
    ///
    /// Covers the consumer pair and each entitlement serial. Returns the
    /// paths removed and the removals that failed.
    pub fn remove_orphans(&self) -> OrphanSweep {
        let mut pairs = vec![self.consumer_pair()];
        match self.entitlement_stems() {
            Ok(serials) => pairs.extend(serials.into_iter().map(|serial| self.entitlement_pair(serial))),
            Err(e) => {
                return OrphanSweep {
                    removed: Vec::new(),
                    failures: vec![e],
                };
            }
        }

        let mut sweep = OrphanSweep::default();
        for pair in pairs {
            let orphan = match (pair.cert.is_file(), pair.key.is_file()) {
                (true, false) => pair.cert,
                (false, true) => pair.key,
                _ => continue,
            };
            match fs::remove_file(&orphan) {
                Ok(()) => {
                    tracing::warn!(path = %orphan.display(), "Removed certificate file without its partner");
                    sweep.removed.push(orphan);
                }
                Err(e) => sweep.failures.push(PkiError::io(orphan, e)),
            }
        }
        sweep
    }

    /// Serials named by any certificate or key file in the entitlement directory.
    fn entitlement_stems(&self) -> Result<BTreeSet<u64>> {
        let entries = match fs::read_dir(&self.entitlement_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => return Err(PkiError::io(&self.entitlement_dir, e)),
        };
        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".pem")?;
                stem.strip_suffix("-key").unwrap_or(stem).parse().ok()
            })
            .collect())
    }

    /// Remove every file in the entitlement directory.
    ///
    /// Returns one error per file that could not be removed, or the
    /// directory read error. A missing directory has nothing to remove.
    pub fn remove_entitlement_files(&self) -> Vec<PkiError> {
        let entries = match fs::read_dir(&self.entitlement_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => return vec![PkiError::io(&self.entitlement_dir, e)],
        };
        let mut failures = Vec::new();
        for entry in entries {
            match entry {
                Ok(entry) => {
                    let path = entry.path();
                    if let Err(e) = fs::remove_file(&path) {
                        failures.push(PkiError::io(path, e));
                    }
                }
                Err(e) => failures.push(PkiError::io(&self.entitlement_dir, e)),
            }
        }
        failures
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PkiError::io(dir, e))
}

/// Write cert then key; if the key fails, remove the orphaned cert.
fn write_pair(pair: &PemPair, cert_pem: &str, key_pem: &str) -> Result<()> {
    write_pem_file(&pair.cert, cert_pem, Some(CERT_MODE))?;
    if let Err(e) = write_pem_file(&pair.key, key_pem, Some(KEY_MODE)) {
        if let Err(rm) = fs::remove_file(&pair.cert) {
            tracing::warn!(
                cert = %pair.cert.display(),
                error = %rm,
                "Failed to remove certificate after key write failed"
            );
        }
        return Err(e);
    }
    Ok(())
}
