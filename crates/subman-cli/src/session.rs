//! Registration state machine.
//!
//! A [`Session`] owns the connections to the entitlement server and moves
//! the host between states:
//!
//! ```text
//! Unregistered --register--> Registered(NoContent) --enable_content--> Registered(ScaContent)
//!      ^                                                                        |
//!      +------------------------------- unregister ----------------------------+
//! ```
//!
//! Best-effort steps (product scans, entitlement persistence and decoding,
//! cleanup) never abort a transition; their failures are returned as
//! warnings in the operation's report.

use std::path::PathBuf;

use subman_core::Config;
use subman_pki::{
    CertStore, ConsumerIdentity, InstalledProduct, PkiError, collect_content_tags,
    read_all_product_certificates,
};

use crate::api::{Credentials, ProtocolClient, RegisterRequest, ServerStatus};
use crate::connection::{AuthMode, Connector};
use crate::error::{ClientError, Result};
use crate::purpose::SystemPurpose;
use crate::repo_file::{EntitlementContent, RepoGenerator};

/// Filesystem locations a session works with.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub store: CertStore,
    /// Scanned in order for installed product certificates.
    pub product_dirs: Vec<PathBuf>,
    pub repo_file: PathBuf,
    pub syspurpose_file: PathBuf,
    pub base_url: String,
    pub repo_ca_cert: PathBuf,
    /// Consumer name sent at registration; the host name when unset.
    pub consumer_name: Option<String>,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: CertStore::new(
                &config.rhsm.consumer_cert_dir,
                &config.rhsm.entitlement_cert_dir,
            ),
            product_dirs: vec![
                config.rhsm.product_cert_dir.clone(),
                config.local.default_product_cert_dir.clone(),
            ],
            repo_file: config.local.repo_file.clone(),
            syspurpose_file: config.local.syspurpose_file.clone(),
            base_url: config.rhsm.base_url.clone(),
            repo_ca_cert: config.rhsm.repo_ca_cert.clone(),
            consumer_name: None,
        }
    }
}

/// Content activated for a registered consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentState {
    NoContent,
    /// Simple Content Access certificates installed under these serials.
    ScaContent { serials: Vec<u64> },
}

/// Where the host stands with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unregistered {
        /// Consumer UUID this host last had, if any.
        last_known: Option<String>,
    },
    Registered {
        identity: ConsumerIdentity,
        content: ContentState,
    },
}

/// Outcome of [`Session::register`].
#[derive(Debug)]
pub struct RegistrationReport {
    pub uuid: String,
    pub name: String,
    pub owner: String,
    /// Whether the owner uses Simple Content Access.
    pub sca: bool,
    /// Present when content was activated as part of registration.
    pub activation: Option<ActivationReport>,
    pub warnings: Vec<String>,
}

/// Outcome of [`Session::enable_content`].
#[derive(Debug, Default)]
pub struct ActivationReport {
    /// Serials whose certificate pair was installed.
    pub serials: Vec<u64>,
    /// Repository file written, if any content was decoded.
    pub repo_file: Option<PathBuf>,
    pub content_sets: usize,
    pub warnings: Vec<String>,
}

/// What the server said to the consumer deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerDeletion {
    Deleted,
    /// The server no longer knew the consumer (404 or 410).
    AlreadyGone(String),
    Failed(String),
}

/// Outcome of [`Session::unregister`].
#[derive(Debug)]
pub struct UnregisterReport {
    pub uuid: String,
    pub server: ServerDeletion,
    pub warnings: Vec<String>,
}

impl UnregisterReport {
    /// Whether the server side of the unregistration is settled.
    pub const fn server_confirmed(&self) -> bool {
        !matches!(self.server, ServerDeletion::Failed(_))
    }
}

/// Compliance summary for `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub overall: String,
    pub purpose: String,
}

/// Identity summary for `identity`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReport {
    pub uuid: String,
    pub name: String,
    pub org_key: String,
    pub org_name: String,
}

const UNKNOWN: &str = "unknown";

/// Connections and local state for one invocation.
pub struct Session<C: Connector> {
    connector: C,
    settings: SessionSettings,
    no_auth: C::Conn,
    consumer: Option<C::Conn>,
    state: SessionState,
    warnings: Vec<String>,
}

impl<C: Connector> Session<C> {
    /// Build the connections and derive the state from the files on disk.
    ///
    /// A certificate or key left without its partner is removed first, so
    /// a consumer connection exists only when the whole consumer pair is
    /// present and usable.
    pub fn open(connector: C, settings: SessionSettings) -> Result<Self> {
        let no_auth = connector.no_auth()?;
        let store = &settings.store;

        let identity = match store.consumer_identity() {
            Ok(identity) => Some(identity),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                tracing::warn!(error = %e, "Consumer certificate unreadable");
                None
            }
        };

        let sweep = store.remove_orphans();
        let mut warnings: Vec<String> = sweep
            .removed
            .iter()
            .map(|path| format!("Removed {} whose certificate pair was incomplete", path.display()))
            .collect();
        warnings.extend(sweep.failures.iter().map(ToString::to_string));

        let mut consumer = None;
        if store.consumer_pair_exists() {
            match connector.cert_auth(AuthMode::ConsumerCert, &store.consumer_pair()) {
                Ok(conn) => consumer = Some(conn),
                Err(e) => tracing::warn!(error = %e, "Consumer certificate pair unusable"),
            }
        }

        let state = match identity {
            Some(identity) if consumer.is_some() => {
                let serials = store.entitlement_serials().unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "Cannot list entitlement certificates");
                    warnings.push(e.to_string());
                    Vec::new()
                });
                let content = if serials.is_empty() {
                    ContentState::NoContent
                } else {
                    ContentState::ScaContent { serials }
                };
                SessionState::Registered { identity, content }
            }
            other => SessionState::Unregistered {
                last_known: other.map(|identity| identity.uuid),
            },
        };
        tracing::debug!(?state, "Session opened");

        Ok(Self {
            connector,
            settings,
            no_auth,
            consumer,
            state,
            warnings,
        })
    }

    /// Problems found and repaired while opening the session.
    pub fn open_warnings(&self) -> &[String] {
        &self.warnings
    }

    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    pub const fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Register under `name` instead of the host name.
    pub fn set_consumer_name(&mut self, name: Option<String>) {
        self.settings.consumer_name = name;
    }

    pub const fn is_registered(&self) -> bool {
        matches!(self.state, SessionState::Registered { .. })
    }

    pub const fn consumer_connection(&self) -> Option<&C::Conn> {
        self.consumer.as_ref()
    }

    /// Connection authenticated with an installed entitlement certificate.
    pub fn entitlement_connection(&self, serial: u64) -> Result<C::Conn> {
        let pair = self.settings.store.entitlement_pair(serial);
        if !pair.cert.is_file() || !pair.key.is_file() {
            return Err(ClientError::usage(format!(
                "No entitlement certificate installed for serial {serial}"
            )));
        }
        self.connector.cert_auth(AuthMode::EntitlementCert, &pair)
    }

    fn consumer_client(&self) -> Result<ProtocolClient<'_, C::Conn>> {
        self.consumer
            .as_ref()
            .map(ProtocolClient::new)
            .ok_or_else(|| ClientError::usage("This system is not yet registered"))
    }

    /// UUID from the consumer certificate, read fresh from disk.
    fn current_uuid(&self) -> Result<String> {
        Ok(self.settings.store.consumer_identity()?.uuid)
    }

    /// Register this host as a consumer of `org`.
    ///
    /// Content is activated right away when the owner uses Simple Content
    /// Access; otherwise the host is left registered without content.
    pub async fn register(
        &mut self,
        credentials: Credentials,
        org: Option<&str>,
    ) -> Result<RegistrationReport> {
        if let SessionState::Registered { identity, .. } = &self.state {
            return Err(ClientError::usage(format!(
                "This system is already registered as {}",
                identity.uuid
            )));
        }
        if matches!(credentials, Credentials::ActivationKeys(_)) && org.is_none() {
            return Err(ClientError::usage(
                "--organization is required when registering with activation keys",
            ));
        }

        let mut warnings = Vec::new();
        let body = self.registration_body(&mut warnings)?;
        let consumer = ProtocolClient::new(&self.no_auth)
            .register(&body, &credentials, org)
            .await?;
        let id_cert = consumer.id_cert.ok_or(ClientError::IncompleteResponse {
            path: "consumers".to_string(),
            field: "idCert",
        })?;

        let store = &self.settings.store;
        let pair = store.write_consumer_pair(&id_cert.cert, &id_cert.key)?;
        let identity = store.consumer_identity()?;
        self.consumer = Some(self.connector.cert_auth(AuthMode::ConsumerCert, &pair)?);
        tracing::info!(uuid = %identity.uuid, owner = %consumer.owner.key, "System registered");

        let uuid = identity.uuid.clone();
        self.state = SessionState::Registered {
            identity,
            content: ContentState::NoContent,
        };

        let sca = consumer.owner.is_sca();
        let activation = if sca {
            Some(self.enable_content().await?)
        } else {
            tracing::info!(
                owner = %consumer.owner.key,
                mode = %consumer.owner.content_access_mode,
                "Owner does not use Simple Content Access, content not activated"
            );
            None
        };

        Ok(RegistrationReport {
            uuid,
            name: consumer.name,
            owner: consumer.owner.key,
            sca,
            activation,
            warnings,
        })
    }

    fn registration_body(&self, warnings: &mut Vec<String>) -> Result<RegisterRequest> {
        let name = match &self.settings.consumer_name {
            Some(name) => name.clone(),
            None => hostname()?,
        };
        let mut body = RegisterRequest::system(name);

        body.installed_products = self.installed_products(warnings);
        body.content_tags = collect_content_tags(&body.installed_products);

        let (purpose, warning) = SystemPurpose::load_or_default(&self.settings.syspurpose_file);
        warnings.extend(warning);
        body.role = purpose.role;
        body.usage = purpose.usage;
        body.service_level = purpose.service_level_agreement;
        body.add_ons = purpose.addons;
        Ok(body)
    }

    fn installed_products(&self, warnings: &mut Vec<String>) -> Vec<InstalledProduct> {
        let mut products = Vec::new();
        for dir in &self.settings.product_dirs {
            match read_all_product_certificates(dir) {
                Ok(scan) => {
                    products.extend(scan.products);
                    warnings.extend(scan.failures.iter().map(ToString::to_string));
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(dir = %dir.display(), "No product certificate directory");
                }
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "Cannot scan product certificates");
                    warnings.push(e.to_string());
                }
            }
        }
        products
    }

    /// Fetch, install and decode the consumer's entitlement certificates and
    /// regenerate the repository file.
    pub async fn enable_content(&mut self) -> Result<ActivationReport> {
        let client = self.consumer_client()?;
        let uuid = self.current_uuid()?;
        let records = client.entitlement_certificates(&uuid).await?;
        if records.is_empty() {
            return Err(ClientError::NoEntitlements { uuid });
        }
        if records.len() > 1 {
            tracing::info!(count = records.len(), "More than one entitlement certificate returned");
        }

        let store = &self.settings.store;
        let mut report = ActivationReport::default();
        let mut contents = Vec::new();
        for record in records {
            let serial = record.serial.serial;
            if let Err(e) = store.write_entitlement_pair(serial, &record.cert, &record.key) {
                tracing::warn!(serial, error = %e, "Entitlement certificate not installed");
                report.warnings.push(format!("Entitlement {serial} not installed: {e}"));
                continue;
            }
            report.serials.push(serial);

            match subman_pki::decode(&record.cert) {
                Ok(definitions) => contents.push(EntitlementContent {
                    serial,
                    definitions,
                }),
                Err(e) => {
                    tracing::warn!(serial, error = %e, "Entitlement content not decoded");
                    report.warnings.push(format!("Entitlement {serial} content skipped: {e}"));
                }
            }
        }

        report.content_sets = contents.iter().map(|c| c.definitions.len()).sum();
        if contents.is_empty() {
            report
                .warnings
                .push("No entitlement content decoded; repository file left unchanged".to_string());
        } else {
            let generator = RepoGenerator::new(
                self.settings.base_url.clone(),
                self.settings.repo_ca_cert.clone(),
                store.clone(),
            );
            generator.write_all(&contents, &self.settings.repo_file)?;
            report.repo_file = Some(self.settings.repo_file.clone());
        }

        if let SessionState::Registered { content, .. } = &mut self.state {
            *content = ContentState::ScaContent {
                serials: report.serials.clone(),
            };
        }
        tracing::info!(serials = ?report.serials, content_sets = report.content_sets, "Content enabled");
        Ok(report)
    }

    /// Delete the consumer on the server and erase local identity and
    /// content.
    ///
    /// Local cleanup runs whatever the server answers. Fails only when no
    /// consumer UUID can be found or the consumer certificate survives; a
    /// rejected deletion is reported through [`UnregisterReport::server_confirmed`].
    pub async fn unregister(&mut self) -> Result<UnregisterReport> {
        let uuid = match self.current_uuid() {
            Ok(uuid) => uuid,
            Err(e) => match self.last_known_uuid() {
                Some(uuid) => {
                    tracing::debug!(error = %e, %uuid, "Using last known consumer UUID");
                    uuid
                }
                None => return Err(e),
            },
        };

        let conn = self.consumer.as_ref().unwrap_or(&self.no_auth);
        let server = match ProtocolClient::new(conn).delete_consumer(&uuid).await {
            Ok(()) => ServerDeletion::Deleted,
            Err(ClientError::Server {
                status: 404 | 410,
                message,
            }) => {
                tracing::info!(%uuid, %message, "Consumer already removed on the server");
                ServerDeletion::AlreadyGone(message)
            }
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "Server did not delete consumer");
                ServerDeletion::Failed(e.to_string())
            }
        };
        self.consumer = None;

        let store = &self.settings.store;
        let mut warnings: Vec<String> = Vec::new();
        let mut record = |e: PkiError| {
            tracing::warn!(error = %e, "Cleanup step failed");
            warnings.push(e.to_string());
        };
        store.remove_consumer_pair().into_iter().for_each(&mut record);
        store.remove_entitlement_files().into_iter().for_each(&mut record);
        match std::fs::remove_file(&self.settings.repo_file) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.settings.repo_file.display(), error = %e, "Cleanup step failed");
                warnings.push(format!("{}: {e}", self.settings.repo_file.display()));
            }
            Ok(()) => {}
        }

        let cert = store.consumer_pair().cert;
        if cert.exists() {
            return Err(ClientError::io(
                cert,
                std::io::Error::other("consumer certificate could not be removed"),
            ));
        }

        self.state = SessionState::Unregistered {
            last_known: Some(uuid.clone()),
        };
        tracing::info!(%uuid, "System unregistered");
        Ok(UnregisterReport {
            uuid,
            server,
            warnings,
        })
    }

    fn last_known_uuid(&self) -> Option<String> {
        match &self.state {
            SessionState::Registered { identity, .. } => Some(identity.uuid.clone()),
            SessionState::Unregistered { last_known } => last_known.clone(),
        }
    }

    /// Overall and system purpose compliance.
    ///
    /// An unregistered host reports `unknown` for both without contacting
    /// the server.
    pub async fn status(&self) -> Result<SystemStatus> {
        let (Some(conn), Ok(uuid)) = (self.consumer.as_ref(), self.current_uuid()) else {
            return Ok(SystemStatus {
                overall: UNKNOWN.to_string(),
                purpose: UNKNOWN.to_string(),
            });
        };
        let client = ProtocolClient::new(conn);
        let compliance = client.compliance(&uuid).await?;
        let purpose = if compliance.is_disabled() {
            compliance.status.clone()
        } else {
            client.purpose_compliance(&uuid).await?.status
        };
        Ok(SystemStatus {
            overall: compliance.status,
            purpose,
        })
    }

    /// Consumer identity as the server knows it.
    pub async fn identity(&self) -> Result<IdentityReport> {
        let client = self.consumer_client()?;
        let uuid = self.current_uuid()?;
        let consumer = client.consumer(&uuid).await?;
        Ok(IdentityReport {
            uuid: consumer.uuid,
            name: consumer.name,
            org_key: consumer.owner.key,
            org_name: consumer.owner.display_name,
        })
    }

    /// Server status, over the consumer connection when there is one.
    pub async fn server_status(&self) -> Result<ServerStatus> {
        let conn = self.consumer.as_ref().unwrap_or(&self.no_auth);
        ProtocolClient::new(conn).server_status().await
    }
}

fn hostname() -> Result<String> {
    let name = nix::unistd::gethostname()
        .map_err(|errno| ClientError::io("hostname", std::io::Error::from(errno)))?;
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use reqwest::Method;
    use subman_pki::{PemPair, testing};

    use super::*;
    use crate::connection::{ApiRequest, ApiResponse, Transport};

    /// Canned responses keyed by method and path; anything else is a 404.
    #[derive(Default)]
    struct Routes {
        responses: HashMap<(Method, String), (u16, String)>,
        sent: Vec<(AuthMode, ApiRequest)>,
    }

    #[derive(Clone, Default)]
    struct FakeConnector(Arc<Mutex<Routes>>);

    impl FakeConnector {
        fn route(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
            self.0
                .lock()
                .unwrap()
                .responses
                .insert((method, path.to_string()), (status, body.into()));
        }

        fn sent(&self) -> Vec<(AuthMode, ApiRequest)> {
            self.0.lock().unwrap().sent.clone()
        }
    }

    struct FakeConn {
        mode: AuthMode,
        routes: Arc<Mutex<Routes>>,
    }

    impl Transport for FakeConn {
        fn auth_mode(&self) -> AuthMode {
            self.mode
        }

        async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
            let mut routes = self.routes.lock().unwrap();
            let key = (request.method.clone(), request.path.clone());
            let (status, body) = routes
                .responses
                .get(&key)
                .cloned()
                .unwrap_or((404, r#"{"displayMessage": "not found"}"#.to_string()));
            routes.sent.push((self.mode, request));
            Ok(ApiResponse {
                status,
                body: body.into_bytes(),
            })
        }
    }

    impl Connector for FakeConnector {
        type Conn = FakeConn;

        fn no_auth(&self) -> Result<FakeConn> {
            Ok(FakeConn {
                mode: AuthMode::NoAuth,
                routes: Arc::clone(&self.0),
            })
        }

        fn cert_auth(&self, auth_mode: AuthMode, _pair: &PemPair) -> Result<FakeConn> {
            Ok(FakeConn {
                mode: auth_mode,
                routes: Arc::clone(&self.0),
            })
        }
    }

    const UUID: &str = "0f5d5f5e-2a49-4c8e-9b0a-6f1c3c1e7d11";

    fn settings(root: &std::path::Path) -> SessionSettings {
        SessionSettings {
            store: CertStore::new(root.join("consumer"), root.join("entitlement")),
            product_dirs: vec![root.join("product"), root.join("product-default")],
            repo_file: root.join("yum.repos.d/redhat.repo"),
            syspurpose_file: root.join("syspurpose.json"),
            base_url: "https://cdn.example.com".to_string(),
            repo_ca_cert: root.join("ca/redhat-uep.pem"),
            consumer_name: Some("host.example.com".to_string()),
        }
    }

    fn install_consumer(settings: &SessionSettings) {
        let pair = testing::consumer_pair(UUID, "acme");
        settings
            .store
            .write_consumer_pair(&pair.cert_pem, &pair.key_pem)
            .unwrap();
    }

    fn password() -> Credentials {
        Credentials::Password {
            username: "alice".to_string(),
            password: "pw".to_string(),
        }
    }

    fn register_response(mode: &str) -> String {
        let pair = testing::consumer_pair(UUID, "acme");
        serde_json::json!({
            "uuid": UUID,
            "name": "host.example.com",
            "owner": {"key": "acme", "displayName": "ACME", "contentAccessMode": mode},
            "idCert": {"cert": pair.cert_pem, "key": pair.key_pem, "serial": {"serial": 11}},
        })
        .to_string()
    }

    #[tokio::test]
    async fn fresh_host_is_unregistered_and_status_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        let session = Session::open(connector.clone(), settings(dir.path())).unwrap();

        assert_eq!(session.state(), &SessionState::Unregistered { last_known: None });
        assert!(session.consumer_connection().is_none());

        let status = session.status().await.unwrap();
        assert_eq!(status.overall, "unknown");
        assert_eq!(status.purpose, "unknown");
        assert!(connector.sent().is_empty());
    }

    #[test]
    fn installed_pair_means_registered() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);

        let session = Session::open(FakeConnector::default(), settings).unwrap();
        let SessionState::Registered { identity, content } = session.state() else {
            panic!("expected registered state");
        };
        assert_eq!(identity.uuid, UUID);
        assert_eq!(content, &ContentState::NoContent);
        assert_eq!(
            session.consumer_connection().map(Transport::auth_mode),
            Some(AuthMode::ConsumerCert)
        );
    }

    #[test]
    fn certificate_without_key_is_removed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let pair = settings.store.consumer_pair();
        std::fs::remove_file(&pair.key).unwrap();

        let session = Session::open(FakeConnector::default(), settings).unwrap();
        assert_eq!(
            session.state(),
            &SessionState::Unregistered {
                last_known: Some(UUID.to_string())
            }
        );
        assert!(session.consumer_connection().is_none());
        assert!(!pair.cert.exists());
        assert_eq!(session.open_warnings().len(), 1);
    }

    #[test]
    fn key_without_certificate_is_removed_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let pair = settings.store.consumer_pair();
        std::fs::remove_file(&pair.cert).unwrap();
        settings.store.write_entitlement_pair(3, "CERT", "KEY").unwrap();
        std::fs::remove_file(settings.store.entitlement_pair(3).key).unwrap();

        let session = Session::open(FakeConnector::default(), settings).unwrap();
        assert_eq!(session.state(), &SessionState::Unregistered { last_known: None });
        assert!(!pair.key.exists());
        assert!(!session.settings().store.entitlement_pair(3).cert.exists());
        assert_eq!(session.open_warnings().len(), 2);
    }

    #[tokio::test]
    async fn registering_twice_is_rejected_before_any_request() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let connector = FakeConnector::default();
        let mut session = Session::open(connector.clone(), settings).unwrap();

        let err = session.register(password(), Some("acme")).await.unwrap_err();
        assert!(matches!(err, ClientError::Usage(_)));
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn activation_keys_need_an_organization() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        let mut session = Session::open(connector.clone(), settings(dir.path())).unwrap();

        let keys = Credentials::ActivationKeys(vec!["key1".to_string()]);
        let err = session.register(keys, None).await.unwrap_err();
        assert!(matches!(err, ClientError::Usage(_)));
        assert!(connector.sent().is_empty());
    }

    #[tokio::test]
    async fn non_sca_owner_registers_without_content() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        connector.route(Method::POST, "consumers", 200, register_response("entitlement"));
        let mut session = Session::open(connector.clone(), settings(dir.path())).unwrap();

        let report = session.register(password(), Some("acme")).await.unwrap();
        assert_eq!(report.uuid, UUID);
        assert!(!report.sca);
        assert!(report.activation.is_none());
        assert!(session.is_registered());
        assert!(!session.settings().repo_file.exists());

        let sent = connector.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, AuthMode::NoAuth);
    }

    #[tokio::test]
    async fn missing_identity_certificate_in_response_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        connector.route(
            Method::POST,
            "consumers",
            200,
            r#"{"uuid": "u", "owner": {"key": "acme"}}"#,
        );
        let mut session = Session::open(connector, settings(dir.path())).unwrap();

        let err = session.register(password(), None).await.unwrap_err();
        assert!(matches!(err, ClientError::IncompleteResponse { field: "idCert", .. }));
        assert!(!session.is_registered());
    }

    #[tokio::test]
    async fn enable_content_with_no_certificates_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let connector = FakeConnector::default();
        connector.route(Method::GET, &format!("consumers/{UUID}/certificates"), 200, "[]");
        let mut session = Session::open(connector, settings).unwrap();

        let err = session.enable_content().await.unwrap_err();
        assert!(matches!(err, ClientError::NoEntitlements { uuid } if uuid == UUID));
    }

    #[tokio::test]
    async fn undecodable_entitlement_is_installed_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let connector = FakeConnector::default();
        let bad = testing::entitlement_bundle(br#"{"products": "none"}"#);
        let body = serde_json::json!([{"cert": bad, "key": "KEY", "serial": {"serial": 5}}]);
        connector.route(
            Method::GET,
            &format!("consumers/{UUID}/certificates"),
            200,
            body.to_string(),
        );
        let mut session = Session::open(connector, settings).unwrap();

        let report = session.enable_content().await.unwrap();
        assert_eq!(report.serials, [5]);
        assert!(report.repo_file.is_none());
        assert_eq!(report.warnings.len(), 2);
        assert!(session.settings().store.entitlement_pair(5).cert.is_file());
        let SessionState::Registered { content, .. } = session.state() else {
            panic!("expected registered state");
        };
        assert_eq!(content, &ContentState::ScaContent { serials: vec![5] });
    }

    #[tokio::test]
    async fn status_skips_purpose_when_compliance_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let connector = FakeConnector::default();
        connector.route(
            Method::GET,
            &format!("consumers/{UUID}/compliance"),
            200,
            r#"{"status": "disabled", "compliant": true}"#,
        );
        let session = Session::open(connector.clone(), settings).unwrap();

        let status = session.status().await.unwrap();
        assert_eq!(status.overall, "disabled");
        assert_eq!(status.purpose, "disabled");
        assert_eq!(connector.sent().len(), 1);
    }

    #[tokio::test]
    async fn status_queries_purpose_compliance() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        let connector = FakeConnector::default();
        connector.route(
            Method::GET,
            &format!("consumers/{UUID}/compliance"),
            200,
            r#"{"status": "valid"}"#,
        );
        connector.route(
            Method::GET,
            &format!("consumers/{UUID}/purpose_compliance"),
            200,
            r#"{"status": "matched"}"#,
        );
        let session = Session::open(connector, settings).unwrap();

        let status = session.status().await.unwrap();
        assert_eq!(status.overall, "valid");
        assert_eq!(status.purpose, "matched");
    }

    #[test]
    fn entitlement_connection_needs_installed_pair() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        install_consumer(&settings);
        settings.store.write_entitlement_pair(9, "CERT", "KEY").unwrap();
        let session = Session::open(FakeConnector::default(), settings).unwrap();

        let conn = session.entitlement_connection(9).unwrap();
        assert_eq!(conn.auth_mode(), AuthMode::EntitlementCert);
        assert!(matches!(
            session.entitlement_connection(10),
            Err(ClientError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn unregister_without_any_identity_fails() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::default();
        let mut session = Session::open(connector.clone(), settings(dir.path())).unwrap();

        assert!(session.unregister().await.is_err());
        assert!(connector.sent().is_empty());
    }
}
