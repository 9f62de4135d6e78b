//! Read-only subcommands: status, identity, version, config.
//!
//! User-facing output uses writeln! to stdout.

use std::io::{self, Write};

use subman_core::Config;

use crate::connection::{Connector, USER_AGENT};
use crate::session::Session;

/// Print overall and system purpose compliance.
pub async fn status<C: Connector>(session: &Session<C>) -> anyhow::Result<()> {
    let status = session.status().await?;
    let mut out = io::stdout();
    writeln!(out, "Overall Status: {}", status.overall)?;
    writeln!(out, "System Purpose Status: {}", status.purpose)?;
    Ok(())
}

/// Print the consumer identity as the server knows it.
pub async fn identity<C: Connector>(session: &Session<C>) -> anyhow::Result<()> {
    let identity = session.identity().await?;
    let mut out = io::stdout();
    writeln!(out, "system identity: {}", identity.uuid)?;
    writeln!(out, "name: {}", identity.name)?;
    writeln!(out, "org name: {}", identity.org_name)?;
    writeln!(out, "org ID: {}", identity.org_key)?;
    Ok(())
}

/// Print client and server versions.
///
/// An unreachable server is reported as `Unknown` rather than failing.
pub async fn version<C: Connector>(session: &Session<C>) -> anyhow::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "client version: {USER_AGENT}")?;
    match session.server_status().await {
        Ok(status) => {
            writeln!(out, "server version: {}-{}", status.version, status.release)?;
            writeln!(out, "server rules version: {}", status.rules_version)?;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Server status unavailable");
            writeln!(out, "server version: Unknown")?;
            writeln!(out, "server rules version: Unknown")?;
        }
    }
    Ok(())
}

/// Print the effective configuration as JSON.
pub fn config(config: &Config) -> anyhow::Result<()> {
    let mut out = io::stdout();
    writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
    Ok(())
}
