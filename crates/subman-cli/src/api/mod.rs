//! Entitlement server REST API.

mod client;
pub mod types;

pub use client::{Credentials, ProtocolClient, check_status};
pub use types::{
    CertificateRecord, CertificateSerial, ComplianceStatus, Consumer, Owner, PurposeCompliance,
    RegisterRequest, ServerStatus,
};
