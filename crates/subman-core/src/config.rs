//! Configuration resolution for subman.
//!
//! Resolution order:
//! 1. Built-in defaults (matching the upstream `rhsm.conf` defaults)
//! 2. The INI configuration file (`/etc/rhsm/rhsm.conf` unless overridden)
//! 3. Environment variables (highest priority)
//!
//! The resulting [`Config`] is read once at startup and never mutated.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ini::IniDocument;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rhsm/rhsm.conf";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_PATH_ENV: &str = "SUBMAN_CONFIG";

/// Complete subman configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub rhsm: RhsmConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

/// Section `[server]`: where the entitlement server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub hostname: String,
    pub prefix: String,
    pub port: u16,
    /// Skip server certificate verification (development only).
    pub insecure: bool,
    /// Request timeout in seconds.
    pub server_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "subscription.rhsm.redhat.com".to_string(),
            prefix: "/subscription".to_string(),
            port: 443,
            insecure: false,
            server_timeout: 180,
        }
    }
}

/// Section `[rhsm]`: certificate directories and content settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RhsmConfig {
    pub ca_cert_dir: PathBuf,
    pub consumer_cert_dir: PathBuf,
    pub entitlement_cert_dir: PathBuf,
    pub product_cert_dir: PathBuf,
    /// Base URL that content paths are joined onto.
    pub base_url: String,
    /// CA certificate used by the package manager to verify the CDN.
    pub repo_ca_cert: PathBuf,
}

impl Default for RhsmConfig {
    fn default() -> Self {
        Self {
            ca_cert_dir: PathBuf::from("/etc/rhsm/ca/"),
            consumer_cert_dir: PathBuf::from("/etc/pki/consumer"),
            entitlement_cert_dir: PathBuf::from("/etc/pki/entitlement"),
            product_cert_dir: PathBuf::from("/etc/pki/product"),
            base_url: "https://cdn.redhat.com".to_string(),
            repo_ca_cert: PathBuf::from("/etc/rhsm/ca/redhat-uep.pem"),
        }
    }
}

/// Section `[subman]`: local paths that upstream hard-codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Pre-installed product certificates shipped with the OS image.
    pub default_product_cert_dir: PathBuf,
    /// Generated repository definition file.
    pub repo_file: PathBuf,
    /// System purpose attributes (`role`, `usage`, ...).
    pub syspurpose_file: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            default_product_cert_dir: PathBuf::from("/etc/pki/product-default"),
            repo_file: PathBuf::from("/etc/yum.repos.d/redhat.repo"),
            syspurpose_file: PathBuf::from("/etc/rhsm/syspurpose/syspurpose.json"),
        }
    }
}

/// Resolve which configuration file to read.
///
/// An explicit path wins, then `SUBMAN_CONFIG`, then [`DEFAULT_CONFIG_PATH`].
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(
        || {
            std::env::var_os(CONFIG_PATH_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
        },
        Path::to_path_buf,
    )
}

/// Load configuration with defaults, file values and env overrides.
///
/// A missing file is not an error: the defaults are used.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let path = config_path(explicit);
    let mut config = if path.exists() {
        load_config_file(&path)?
    } else {
        tracing::debug!(path = %path.display(), "Config file not found, using defaults");
        Config::default()
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    let doc = IniDocument::parse(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })?;
    Config::from_ini(&doc)
}

impl Config {
    /// Build a configuration from an already parsed INI document.
    ///
    /// Keys that are absent keep their default; unknown keys are ignored.
    pub fn from_ini(doc: &IniDocument) -> Result<Self> {
        let mut config = Self::default();

        let server = &mut config.server;
        if let Some(v) = non_empty(doc.get("server", "hostname")) {
            server.hostname = v.to_string();
        }
        if let Some(v) = non_empty(doc.get("server", "prefix")) {
            server.prefix = v.to_string();
        }
        if let Some(v) = non_empty(doc.get("server", "port")) {
            server.port = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid [server] port: {v}")))?;
        }
        if let Some(v) = non_empty(doc.get("server", "insecure")) {
            server.insecure = parse_bool(v)
                .ok_or_else(|| Error::Config(format!("Invalid [server] insecure: {v}")))?;
        }
        if let Some(v) = non_empty(doc.get("server", "server_timeout")) {
            server.server_timeout = v
                .parse()
                .map_err(|_| Error::Config(format!("Invalid [server] server_timeout: {v}")))?;
        }

        let rhsm = &mut config.rhsm;
        if let Some(v) = non_empty(doc.get("rhsm", "ca_cert_dir")) {
            rhsm.ca_cert_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("rhsm", "consumercertdir")) {
            rhsm.consumer_cert_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("rhsm", "entitlementcertdir")) {
            rhsm.entitlement_cert_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("rhsm", "productcertdir")) {
            rhsm.product_cert_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("rhsm", "baseurl")) {
            rhsm.base_url = v.to_string();
        }
        if let Some(v) = non_empty(doc.get("rhsm", "repo_ca_cert")) {
            // upstream files commonly write `%(ca_cert_dir)sredhat-uep.pem`
            let ca_dir = rhsm.ca_cert_dir.to_string_lossy().into_owned();
            rhsm.repo_ca_cert = PathBuf::from(v.replace("%(ca_cert_dir)s", &ca_dir));
        }

        let local = &mut config.local;
        if let Some(v) = non_empty(doc.get("subman", "default_product_cert_dir")) {
            local.default_product_cert_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("subman", "repo_file")) {
            local.repo_file = PathBuf::from(v);
        }
        if let Some(v) = non_empty(doc.get("subman", "syspurpose_file")) {
            local.syspurpose_file = PathBuf::from(v);
        }

        Ok(config)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Apply `SUBMAN_SERVER_*` overrides read through `lookup`.
///
/// A value that does not parse is a configuration error, as in the file.
fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = lookup("SUBMAN_SERVER_HOSTNAME") {
        config.server.hostname = val;
    }
    if let Some(val) = lookup("SUBMAN_SERVER_PORT") {
        config.server.port = val
            .parse()
            .map_err(|_| Error::Config(format!("Invalid SUBMAN_SERVER_PORT: {val}")))?;
    }
    if let Some(val) = lookup("SUBMAN_SERVER_PREFIX") {
        config.server.prefix = val;
    }
    if let Some(val) = lookup("SUBMAN_SERVER_INSECURE") {
        config.server.insecure = parse_bool(&val)
            .ok_or_else(|| Error::Config(format!("Invalid SUBMAN_SERVER_INSECURE: {val}")))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_upstream() {
        let config = Config::default();
        assert_eq!(config.server.hostname, "subscription.rhsm.redhat.com");
        assert_eq!(config.server.port, 443);
        assert_eq!(config.server.prefix, "/subscription");
        assert!(!config.server.insecure);
        assert_eq!(config.rhsm.consumer_cert_dir, PathBuf::from("/etc/pki/consumer"));
        assert_eq!(
            config.local.default_product_cert_dir,
            PathBuf::from("/etc/pki/product-default")
        );
    }

    #[test]
    fn file_values_override_defaults() {
        let doc = IniDocument::parse(
            "[server]\nhostname = centos8\nport = 8443\nprefix = /candlepin\ninsecure = 1\n\
             [rhsm]\nconsumercertdir = /tmp/consumer\nbaseurl = https://cdn.test\n",
        )
        .unwrap();
        let config = Config::from_ini(&doc).unwrap();
        assert_eq!(config.server.hostname, "centos8");
        assert_eq!(config.server.port, 8443);
        assert_eq!(config.server.prefix, "/candlepin");
        assert!(config.server.insecure);
        assert_eq!(config.rhsm.consumer_cert_dir, PathBuf::from("/tmp/consumer"));
        assert_eq!(config.rhsm.base_url, "https://cdn.test");
        // untouched keys keep defaults
        assert_eq!(config.rhsm.product_cert_dir, PathBuf::from("/etc/pki/product"));
    }

    #[test]
    fn empty_values_keep_defaults() {
        let doc = IniDocument::parse("[server]\nhostname =\n").unwrap();
        let config = Config::from_ini(&doc).unwrap();
        assert_eq!(config.server.hostname, "subscription.rhsm.redhat.com");
    }

    #[test]
    fn invalid_port_is_config_error() {
        let doc = IniDocument::parse("[server]\nport = https\n").unwrap();
        assert!(matches!(Config::from_ini(&doc), Err(Error::Config(_))));
    }

    #[test]
    fn repo_ca_cert_interpolates_ca_dir() {
        let doc = IniDocument::parse(
            "[rhsm]\nca_cert_dir = /opt/ca/\nrepo_ca_cert = %(ca_cert_dir)sredhat-uep.pem\n",
        )
        .unwrap();
        let config = Config::from_ini(&doc).unwrap();
        assert_eq!(config.rhsm.repo_ca_cert, PathBuf::from("/opt/ca/redhat-uep.pem"));
    }

    #[test]
    fn load_config_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rhsm.conf");
        std::fs::write(&path, "[server]\nhostname = from-file\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.hostname, "from-file");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.conf"))).unwrap();
        assert_eq!(config.rhsm.base_url, "https://cdn.redhat.com");
    }

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_overrides_win_over_file() {
        let doc = IniDocument::parse("[server]\nhostname = from-file\nport = 8443\n").unwrap();
        let mut config = Config::from_ini(&doc).unwrap();
        apply_env_overrides(
            &mut config,
            env(&[
                ("SUBMAN_SERVER_HOSTNAME", "from-env"),
                ("SUBMAN_SERVER_PORT", "9443"),
                ("SUBMAN_SERVER_PREFIX", "/candlepin"),
                ("SUBMAN_SERVER_INSECURE", "yes"),
            ]),
        )
        .unwrap();
        assert_eq!(config.server.hostname, "from-env");
        assert_eq!(config.server.port, 9443);
        assert_eq!(config.server.prefix, "/candlepin");
        assert!(config.server.insecure);
    }

    #[test]
    fn unset_env_keeps_file_values() {
        let doc = IniDocument::parse("[server]\nhostname = from-file\n").unwrap();
        let mut config = Config::from_ini(&doc).unwrap();
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert_eq!(config.server.hostname, "from-file");
        assert_eq!(config.server.port, 443);
    }

    #[test]
    fn invalid_env_port_is_config_error() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env(&[("SUBMAN_SERVER_PORT", "https")])).unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains("SUBMAN_SERVER_PORT")));
        assert_eq!(config.server.port, 443);
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
