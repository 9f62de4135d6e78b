//! Certificate fixtures for tests.
//!
//! Minted with rcgen at test time so the files exercise the same parsing
//! paths as certificates issued by a real entitlement server.

#![allow(clippy::expect_used)]

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use rcgen::{CertificateParams, CustomExtension, DnType, Issuer, KeyPair};

use crate::entitlement::ENTITLEMENT_DATA_TAG;

/// OID arc of product attributes, as integer components.
const PRODUCT_ARC: [u64; 9] = [1, 3, 6, 1, 4, 1, 2312, 9, 1];

/// A certificate and its private key, PEM-encoded.
#[derive(Debug, Clone)]
pub struct CertPair {
    pub cert_pem: String,
    pub key_pem: String,
}

/// A private CA able to issue leaf certificates.
pub struct TestCa {
    pub cert_pem: String,
    params: CertificateParams,
    key_pair: KeyPair,
}

impl TestCa {
    pub fn new(common_name: &str) -> Self {
        let key_pair = KeyPair::generate().expect("generate CA key");
        let mut params = CertificateParams::default();
        params.distinguished_name.push(DnType::CommonName, common_name);
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key_pair).expect("self-sign CA");
        Self {
            cert_pem: cert.pem(),
            params,
            key_pair,
        }
    }

    /// Issue a server certificate for the given DNS names.
    pub fn issue_server(&self, names: &[&str]) -> CertPair {
        let params = CertificateParams::new(names.iter().map(ToString::to_string).collect::<Vec<_>>())
            .expect("server params");
        self.sign(params)
    }

    /// Issue a consumer identity certificate (`CN=<uuid>`, `O=<org>`).
    pub fn issue_consumer(&self, uuid: &str, org: &str) -> CertPair {
        self.sign(consumer_params(uuid, org))
    }

    fn sign(&self, params: CertificateParams) -> CertPair {
        let issuer = Issuer::from_params(&self.params, &self.key_pair);
        let key = KeyPair::generate().expect("generate leaf key");
        let cert = params.signed_by(&key, &issuer).expect("sign leaf");
        CertPair {
            cert_pem: cert.pem(),
            key_pem: key.serialize_pem(),
        }
    }
}

fn consumer_params(uuid: &str, org: &str) -> CertificateParams {
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::OrganizationName, org);
    params.distinguished_name.push(DnType::CommonName, uuid);
    params
}

/// Self-signed consumer certificate.
pub fn consumer_pair(uuid: &str, org: &str) -> CertPair {
    let key = KeyPair::generate().expect("generate consumer key");
    let cert = consumer_params(uuid, org)
        .self_signed(&key)
        .expect("self-sign consumer");
    CertPair {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}

/// One private extension of a product certificate.
#[derive(Debug, Clone)]
pub struct ProductExtension {
    pub oid: Vec<u64>,
    /// DER-encoded extension value.
    pub der: Vec<u8>,
}

impl ProductExtension {
    pub fn raw(product_id: &str, attribute: u64, der: Vec<u8>) -> Self {
        let mut oid = PRODUCT_ARC.to_vec();
        oid.push(product_id.parse().expect("numeric product id"));
        oid.push(attribute);
        Self { oid, der }
    }

    pub fn utf8(product_id: &str, attribute: u64, value: &str) -> Self {
        Self::raw(product_id, attribute, utf8_der(value))
    }

    pub fn octet(product_id: &str, attribute: u64, value: &str) -> Self {
        Self::raw(product_id, attribute, der_tlv(0x04, value.as_bytes()))
    }
}

/// DER `UTF8String`.
pub fn utf8_der(value: &str) -> Vec<u8> {
    der_tlv(0x0c, value.as_bytes())
}

fn der_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    let len = content.len();
    if len < 0x80 {
        out.push(u8::try_from(len).expect("short length"));
    } else {
        let bytes = len.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count();
        out.push(0x80 | u8::try_from(bytes.len() - skip).expect("length of length"));
        out.extend_from_slice(&bytes[skip..]);
    }
    out.extend_from_slice(content);
    out
}

/// Self-signed product certificate carrying the given extensions.
pub fn product_certificate(extensions: &[ProductExtension]) -> String {
    let key = KeyPair::generate().expect("generate product key");
    let mut params = CertificateParams::default();
    params.distinguished_name.push(DnType::CommonName, "Product certificate");
    for ext in extensions {
        params
            .custom_extensions
            .push(CustomExtension::from_oid_content(&ext.oid, ext.der.clone()));
    }
    params.self_signed(&key).expect("self-sign product").pem()
}

/// PEM-encode raw bytes under an arbitrary tag.
pub fn pem_block(tag: &str, contents: &[u8]) -> String {
    ::pem::encode(&::pem::Pem::new(tag, contents.to_vec()))
}

/// Zlib-compress a payload.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("compress");
    encoder.finish().expect("finish compression")
}

/// Entitlement bundle: a certificate followed by its compressed payload.
pub fn entitlement_bundle(payload_json: &[u8]) -> String {
    let cert = consumer_pair("entitlement", "test");
    format!(
        "{}{}",
        cert.cert_pem,
        pem_block(ENTITLEMENT_DATA_TAG, &compress(payload_json))
    )
}
