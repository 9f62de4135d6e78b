//! subman client library
//!
//! Registers a host with a subscription-entitlement server, installs the
//! certificates it grants and turns their content into repository
//! definitions.

pub mod api;
pub mod connection;
pub mod error;
pub mod info_cmd;
pub mod purpose;
pub mod register_cmd;
pub mod repo_file;
pub mod session;
pub mod tls;

pub use connection::{Connector, HttpsConnector};
pub use error::{ClientError, Result};
pub use session::{Session, SessionSettings, SessionState};
