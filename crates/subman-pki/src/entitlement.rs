//! Entitlement certificate content decoding.
//!
//! Besides the certificate itself, an entitlement PEM bundle carries an
//! `ENTITLEMENT DATA` block: zlib-compressed JSON describing the
//! subscription and every content set it grants.

use std::io::Read;

use flate2::read::ZlibDecoder;
use serde::{Deserialize, Serialize};

use crate::error::{PkiError, Result};
use crate::store::find_pem_block;

/// PEM tag of the compressed payload block.
pub const ENTITLEMENT_DATA_TAG: &str = "ENTITLEMENT DATA";

/// Decoded `ENTITLEMENT DATA` payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementPayload {
    pub consumer: String,
    pub subscription: Subscription,
    pub order: Order,
    pub products: Vec<PayloadProduct>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Subscription {
    pub sku: String,
    pub name: String,
}

/// Validity window of the order, as the RFC 3339 strings the server sends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadProduct {
    pub id: String,
    pub name: String,
    pub version: String,
    pub architectures: Vec<String>,
    pub content: Vec<PayloadContent>,
}

/// One content set as the server describes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadContent {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub content_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub path: String,
    /// Absent means enabled.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub arches: Vec<String>,
    #[serde(default, alias = "gpgUrl")]
    pub gpg_url: Option<String>,
    #[serde(default, alias = "metadataExpire")]
    pub metadata_expire: u64,
    #[serde(default, alias = "requiredTags")]
    pub required_tags: Vec<String>,
}

const fn enabled_by_default() -> bool {
    true
}

/// A content set reduced to what repository generation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDefinition {
    pub name: String,
    pub label: String,
    pub path: String,
    pub enabled: bool,
    pub gpg_url: Option<String>,
    pub metadata_expire: u64,
    /// In the order the server listed them.
    pub arches: Vec<String>,
}

impl From<PayloadContent> for ContentDefinition {
    fn from(content: PayloadContent) -> Self {
        Self {
            name: content.name,
            label: content.label,
            path: content.path,
            enabled: content.enabled,
            gpg_url: content.gpg_url.filter(|url| !url.is_empty()),
            metadata_expire: content.metadata_expire,
            arches: content.arches,
        }
    }
}

impl EntitlementPayload {
    /// Every content entry of every product, in payload order.
    pub fn into_content_definitions(self) -> Vec<ContentDefinition> {
        self.products
            .into_iter()
            .flat_map(|product| product.content)
            .map(ContentDefinition::from)
            .collect()
    }
}

/// Decode the content definitions of an entitlement PEM bundle.
///
/// A bundle without an `ENTITLEMENT DATA` block grants nothing and yields
/// an empty list.
pub fn decode(pem_text: &str) -> Result<Vec<ContentDefinition>> {
    Ok(decode_payload(pem_text)?
        .map(EntitlementPayload::into_content_definitions)
        .unwrap_or_default())
}

/// Decode the full payload of an entitlement PEM bundle, if it has one.
pub fn decode_payload(pem_text: &str) -> Result<Option<EntitlementPayload>> {
    let Some(block) = find_pem_block(pem_text, ENTITLEMENT_DATA_TAG) else {
        tracing::debug!("Entitlement certificate has no {ENTITLEMENT_DATA_TAG} block");
        return Ok(None);
    };

    let mut json = Vec::new();
    ZlibDecoder::new(block.contents())
        .read_to_end(&mut json)
        .map_err(PkiError::Decompression)?;
    let payload = serde_json::from_slice(&json).map_err(PkiError::PayloadParse)?;
    Ok(Some(payload))
}
