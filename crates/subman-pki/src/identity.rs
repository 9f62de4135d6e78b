//! Consumer identity extraction.
//!
//! The server issues the consumer certificate with the consumer UUID as the
//! subject Common Name and the owning organization as the subject `O`.

use std::path::Path;

use x509_parser::prelude::*;

use crate::error::{PkiError, Result};
use crate::store::read_pem_file;

/// PEM tag of an X.509 certificate block.
pub const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Identity of this host as a registered consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerIdentity {
    pub uuid: String,
    /// Organization key, when the certificate carries one.
    pub organization: Option<String>,
}

/// Read the consumer UUID (subject CN) from a certificate file.
pub fn read_consumer_uuid(cert_path: &Path) -> Result<String> {
    read_consumer_identity(cert_path).map(|identity| identity.uuid)
}

/// Read the full consumer identity from a certificate file.
pub fn read_consumer_identity(cert_path: &Path) -> Result<ConsumerIdentity> {
    let content = read_pem_file(cert_path)?;
    parse_consumer_identity(&content, &cert_path.display().to_string())
}

/// Parse the consumer identity out of PEM text.
///
/// Only the first PEM block is considered and it must be a `CERTIFICATE`.
pub fn parse_consumer_identity(pem_text: &str, context: &str) -> Result<ConsumerIdentity> {
    let block = ::pem::parse(pem_text)
        .map_err(|e| PkiError::parse(context, format!("no PEM block found: {e}")))?;
    if block.tag() != CERTIFICATE_TAG {
        return Err(PkiError::parse(
            context,
            format!("expected {CERTIFICATE_TAG} block, found {}", block.tag()),
        ));
    }

    let (_, cert) = X509Certificate::from_der(block.contents())
        .map_err(|e| PkiError::parse(context, format!("invalid X.509 certificate: {e}")))?;

    let subject = cert.subject();
    let uuid = subject
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .ok_or_else(|| PkiError::parse(context, "certificate subject has no Common Name"))?
        .to_string();
    let organization = subject
        .iter_organization()
        .next()
        .and_then(|o| o.as_str().ok())
        .map(ToString::to_string);

    Ok(ConsumerIdentity { uuid, organization })
}
