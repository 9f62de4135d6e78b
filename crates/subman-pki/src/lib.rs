//! Certificate store for subman.
//!
//! - **store**: PEM files on disk (consumer identity, entitlements)
//! - **identity**: consumer UUID and organization from the identity certificate
//! - **product**: installed products from private X.509 extensions
//! - **entitlement**: content sets from the compressed `ENTITLEMENT DATA` block

pub mod entitlement;
pub mod error;
pub mod identity;
pub mod product;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use entitlement::{ContentDefinition, EntitlementPayload, decode, decode_payload};
pub use error::{PkiError, Result};
pub use identity::{ConsumerIdentity, read_consumer_identity, read_consumer_uuid};
pub use product::{
    InstalledProduct, ProductScan, collect_content_tags, parse_product_certificate,
    read_all_product_certificates,
};
pub use store::{
    CertStore, OrphanSweep, PemPair, find_pem_block, read_pem_file, remove_cert_pair,
    write_pem_file,
};
