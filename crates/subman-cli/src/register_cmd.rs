//! Registration subcommands: register, unregister, refresh.
//!
//! User-facing output uses writeln! to stdout; warnings go to stderr.

use std::io::{self, Write};

use crate::api::Credentials;
use crate::connection::Connector;
use crate::error::ClientError;
use crate::session::{ActivationReport, ServerDeletion, Session};

/// Arguments of `subman register`.
#[derive(clap::Args, Debug, Default)]
pub struct RegisterArgs {
    /// Username to register with.
    #[arg(short, long)]
    pub username: Option<String>,
    /// Password for the username.
    #[arg(short, long, env = "SUBMAN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Organization to register the system to.
    #[arg(short, long = "organization")]
    pub org: Option<String>,
    /// Activation key; may be repeated.
    #[arg(long = "activationkey")]
    pub activation_keys: Vec<String>,
    /// Name to register the system under instead of the host name.
    #[arg(long)]
    pub name: Option<String>,
}

/// Registration request with its credentials already validated.
#[derive(Debug)]
pub struct Registration {
    pub credentials: Credentials,
    pub org: Option<String>,
    pub name: Option<String>,
}

impl RegisterArgs {
    /// Check the credential combination without touching the network.
    pub fn validate(self) -> Result<Registration, ClientError> {
        let credentials = Credentials::from_args(self.username, self.password, self.activation_keys)?;
        Ok(Registration {
            credentials,
            org: self.org,
            name: self.name,
        })
    }
}

/// Register the system and activate content when the owner allows it.
pub async fn register<C: Connector>(session: &mut Session<C>, registration: Registration) -> anyhow::Result<()> {
    if registration.name.is_some() {
        session.set_consumer_name(registration.name);
    }
    let report = session
        .register(registration.credentials, registration.org.as_deref())
        .await?;

    let mut out = io::stdout();
    writeln!(out, "The system has been registered with ID: {}", report.uuid)?;
    writeln!(out, "The registered system name is: {}", report.name)?;
    print_warnings(&report.warnings)?;
    match &report.activation {
        Some(activation) => print_activation(activation)?,
        None if !report.sca => writeln!(
            out,
            "Organization {} does not use Simple Content Access; no content was enabled",
            report.owner
        )?,
        None => {}
    }
    Ok(())
}

/// Remove the system from the server and erase local certificates.
pub async fn unregister<C: Connector>(session: &mut Session<C>) -> anyhow::Result<()> {
    let report = session.unregister().await?;

    let mut out = io::stdout();
    print_warnings(&report.warnings)?;
    match &report.server {
        ServerDeletion::Deleted => writeln!(out, "Unregistering from server: {}", report.uuid)?,
        ServerDeletion::AlreadyGone(reason) => {
            writeln!(out, "Consumer {} was already removed: {reason}", report.uuid)?;
        }
        ServerDeletion::Failed(reason) => anyhow::bail!(
            "Local data removed, but the server did not remove consumer {}: {reason}",
            report.uuid
        ),
    }
    writeln!(out, "System has been unregistered.")?;
    Ok(())
}

/// Re-fetch entitlement certificates and regenerate the repository file.
pub async fn refresh<C: Connector>(session: &mut Session<C>) -> anyhow::Result<()> {
    let report = session.enable_content().await?;
    print_activation(&report)?;
    let mut out = io::stdout();
    writeln!(out, "All local data refreshed")?;
    Ok(())
}

fn print_activation(report: &ActivationReport) -> anyhow::Result<()> {
    let mut out = io::stdout();
    for serial in &report.serials {
        writeln!(out, "Installed entitlement certificate {serial}")?;
    }
    if let Some(path) = &report.repo_file {
        writeln!(
            out,
            "Wrote {} content sets to {}",
            report.content_sets,
            path.display()
        )?;
    }
    print_warnings(&report.warnings)
}

fn print_warnings(warnings: &[String]) -> anyhow::Result<()> {
    let mut err = io::stderr();
    for warning in warnings {
        writeln!(err, "Warning: {warning}")?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(username: Option<&str>, password: Option<&str>, keys: &[&str]) -> RegisterArgs {
        RegisterArgs {
            username: username.map(str::to_string),
            password: password.map(str::to_string),
            org: Some("acme".into()),
            activation_keys: keys.iter().map(|k| (*k).to_string()).collect(),
            name: None,
        }
    }

    #[test]
    fn missing_credentials_fail_before_any_connection() {
        let err = args(None, None, &[]).validate().unwrap_err();
        assert!(matches!(err, ClientError::Usage(_)));
    }

    #[test]
    fn username_without_password_is_usage_error() {
        let err = args(Some("admin"), None, &[]).validate().unwrap_err();
        assert!(err.to_string().contains("--password is required"));
    }

    #[test]
    fn activation_keys_are_kept() {
        let registration = args(None, None, &["k1", "k2"]).validate().unwrap();
        assert!(matches!(
            registration.credentials,
            Credentials::ActivationKeys(ref keys) if keys.len() == 2
        ));
        assert_eq!(registration.org.as_deref(), Some("acme"));
    }
}
