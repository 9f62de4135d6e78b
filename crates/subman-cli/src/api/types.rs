//! Wire types of the entitlement server REST API.
//!
//! Only the fields subman reads are modelled; everything else in the
//! server's responses is ignored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use subman_pki::InstalledProduct;

/// Owner content access mode meaning Simple Content Access.
pub const SCA_CONTENT_ACCESS_MODE: &str = "org_environment";

/// Fact key announcing which certificate format the client understands.
pub const CERTIFICATE_VERSION_FACT: &str = "system.certificate_version";
/// Entitlement certificate version requested at registration.
pub const CERTIFICATE_VERSION: &str = "3.2";

/// Body of `POST consumers`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(rename = "type")]
    pub consumer_type: String,
    pub name: String,
    pub facts: BTreeMap<String, String>,
    pub installed_products: Vec<InstalledProduct>,
    pub content_tags: BTreeSet<String>,
    pub role: String,
    pub add_ons: Vec<String>,
    pub usage: String,
    pub service_level: String,
}

impl RegisterRequest {
    /// A `system` consumer named after the host.
    pub fn system(hostname: impl Into<String>) -> Self {
        let facts = BTreeMap::from([(
            CERTIFICATE_VERSION_FACT.to_string(),
            CERTIFICATE_VERSION.to_string(),
        )]);
        Self {
            consumer_type: "system".to_string(),
            name: hostname.into(),
            facts,
            installed_products: Vec::new(),
            content_tags: BTreeSet::new(),
            role: String::new(),
            add_ons: Vec::new(),
            usage: String::new(),
            service_level: String::new(),
        }
    }
}

/// A registered consumer as returned by the server.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Consumer {
    pub uuid: String,
    pub name: String,
    pub owner: Owner,
    /// Identity certificate; present in the registration response.
    pub id_cert: Option<CertificateRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub key: String,
    pub display_name: String,
    pub content_access_mode: String,
}

impl Owner {
    pub fn is_sca(&self) -> bool {
        self.content_access_mode == SCA_CONTENT_ACCESS_MODE
    }
}

/// A certificate, its key and serial.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertificateRecord {
    pub cert: String,
    pub key: String,
    pub serial: CertificateSerial,
}

/// Serial number record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CertificateSerial {
    pub serial: u64,
    pub expiration: String,
    pub revoked: bool,
}

/// `GET consumers/<uuid>/compliance`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComplianceStatus {
    pub status: String,
    pub compliant: bool,
    pub date: String,
}

impl ComplianceStatus {
    /// Simple Content Access reports compliance as `disabled`.
    pub fn is_disabled(&self) -> bool {
        self.status == "disabled"
    }
}

/// `GET consumers/<uuid>/purpose_compliance`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PurposeCompliance {
    pub status: String,
    pub compliant: bool,
}

/// `GET status`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerStatus {
    pub mode: String,
    pub result: bool,
    pub version: String,
    pub release: String,
    pub rules_version: String,
    pub manager_capabilities: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerErrorBody {
    pub display_message: String,
}
