//! `subman` Core Library
//!
//! Shared functionality for `subman` components:
//! - Configuration loading (`rhsm.conf`) with defaults and env overrides
//! - INI document parsing and rendering
//! - Tracing initialisation
//! - Common error types

pub mod config;
pub mod error;
pub mod ini;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use ini::IniDocument;
