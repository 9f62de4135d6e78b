//! Repository definition file generation.
//!
//! Each content set granted by an entitlement certificate becomes one INI
//! section pointing the package manager at the CDN, authenticated with that
//! entitlement's certificate pair.

use std::fs;
use std::path::{Path, PathBuf};

use subman_core::IniDocument;
use subman_pki::{CertStore, ContentDefinition};

use crate::error::{ClientError, Result};

/// Decoded content of one installed entitlement certificate.
#[derive(Debug, Clone)]
pub struct EntitlementContent {
    pub serial: u64,
    pub definitions: Vec<ContentDefinition>,
}

/// Renders content definitions into the repository file.
#[derive(Debug, Clone)]
pub struct RepoGenerator {
    base_url: String,
    repo_ca_cert: PathBuf,
    store: CertStore,
}

impl RepoGenerator {
    pub fn new(base_url: impl Into<String>, repo_ca_cert: impl Into<PathBuf>, store: CertStore) -> Self {
        Self {
            base_url: base_url.into(),
            repo_ca_cert: repo_ca_cert.into(),
            store,
        }
    }

    /// Replace `output` with the sections for a single entitlement.
    pub fn write(&self, serial: u64, definitions: &[ContentDefinition], output: &Path) -> Result<()> {
        let mut doc = IniDocument::new();
        self.add_sections(&mut doc, serial, definitions);
        write_document(&doc, output)
    }

    /// Replace `output` with the union of sections for every entitlement.
    ///
    /// Sections sharing a name are merged, later entitlements winning.
    pub fn write_all(&self, entitlements: &[EntitlementContent], output: &Path) -> Result<()> {
        let doc = self.render(entitlements);
        write_document(&doc, output)
    }

    pub fn render(&self, entitlements: &[EntitlementContent]) -> IniDocument {
        let mut doc = IniDocument::new();
        for entitlement in entitlements {
            self.add_sections(&mut doc, entitlement.serial, &entitlement.definitions);
        }
        doc
    }

    fn add_sections(&self, doc: &mut IniDocument, serial: u64, definitions: &[ContentDefinition]) {
        let pair = self.store.entitlement_pair(serial);
        let ca_cert = self.repo_ca_cert.display().to_string();
        let client_key = pair.key.display().to_string();
        let client_cert = pair.cert.display().to_string();

        for def in definitions {
            let flag = if def.enabled { "1" } else { "0" };
            let section = doc.section_mut(&def.name);
            section
                .set("name", def.name.as_str())
                .set("baseurl", join_url(&self.base_url, &def.path))
                .set("enabled", flag)
                .set("enabled_metadata", flag);
            if let Some(gpg_url) = &def.gpg_url {
                section.set("gpgcheck", "1").set("gpgkey", gpg_url.as_str());
            }
            section
                .set("sslverify", "1")
                .set("sslcacert", ca_cert.as_str())
                .set("sslclientkey", client_key.as_str())
                .set("sslclientcert", client_cert.as_str())
                .set("metadata_expire", def.metadata_expire.to_string());
            if !def.arches.is_empty() {
                // No separator between arches; kept as the installed client writes it.
                section.set("arches", def.arches.concat());
            }
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn write_document(doc: &IniDocument, output: &Path) -> Result<()> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ClientError::io(parent, e))?;
    }
    fs::write(output, doc.to_string()).map_err(|e| ClientError::io(output, e))?;
    tracing::info!(path = %output.display(), sections = doc.sections().len(), "Repository file written");
    Ok(())
}
