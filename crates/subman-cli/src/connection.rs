//! Connections to the entitlement server.
//!
//! A [`Connection`] pairs an HTTPS client with the way it authenticates.
//! Requests go through the [`Transport`] trait so orchestration code can be
//! driven by an in-memory server in tests.

use std::future::Future;
use std::time::Duration;

use reqwest::Method;
use subman_core::Config;
use subman_core::config::ServerConfig;
use subman_pki::PemPair;

use crate::error::{ClientError, Result};
use crate::tls::{ClientAuth, TrustContext, build_client};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("subman/", env!("CARGO_PKG_VERSION"));

/// Pseudo-headers turned into HTTP Basic auth on unauthenticated connections.
pub const USERNAME_HEADER: &str = "username";
pub const PASSWORD_HEADER: &str = "password";

/// How a connection proves its identity to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// No client certificate; may carry Basic auth per request.
    NoAuth,
    /// Consumer identity certificate.
    ConsumerCert,
    /// Entitlement certificate, for content delivery endpoints.
    EntitlementCert,
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::NoAuth => "no-auth",
            Self::ConsumerCert => "consumer-cert",
            Self::EntitlementCert => "entitlement-cert",
        };
        f.write_str(name)
    }
}

/// Where the server lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoint {
    pub hostname: String,
    pub port: u16,
    pub prefix: String,
    pub insecure: bool,
}

impl ServerEndpoint {
    pub fn from_config(server: &ServerConfig) -> Self {
        Self {
            hostname: server.hostname.clone(),
            port: server.port,
            prefix: server.prefix.clone(),
            insecure: server.insecure,
        }
    }

    /// Full URL for an API path, with the prefix's slashes normalised.
    pub fn url(&self, path: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        let path = path.trim_start_matches('/');
        if prefix.is_empty() {
            format!("https://{}:{}/{path}", self.hostname, self.port)
        } else {
            format!("https://{}:{}/{prefix}/{path}", self.hostname, self.port)
        }
    }
}

/// One API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Attach a JSON body and the matching content type.
    pub fn json<T: serde::Serialize>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body).map_err(subman_core::Error::from)?;
        self.body = Some(bytes);
        Ok(self.header("Content-Type", "application/json"))
    }
}

/// Status and raw body of a response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Something able to carry an [`ApiRequest`] to the server.
pub trait Transport {
    fn auth_mode(&self) -> AuthMode;

    fn send(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send;
}

/// Headers after default merging and credential extraction.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PreparedHeaders {
    pub basic_auth: Option<(String, String)>,
    pub headers: Vec<(String, String)>,
}

/// Merge defaults into caller headers and pull out Basic auth credentials.
///
/// The `username`/`password` pseudo-headers are never sent as headers; they
/// become Basic auth only on [`AuthMode::NoAuth`] and only when both are set.
pub fn prepare_headers(auth_mode: AuthMode, headers: Vec<(String, String)>) -> PreparedHeaders {
    let mut username = None;
    let mut password = None;
    let mut out = Vec::with_capacity(headers.len() + 2);
    for (key, value) in headers {
        if key.eq_ignore_ascii_case(USERNAME_HEADER) {
            username = Some(value);
        } else if key.eq_ignore_ascii_case(PASSWORD_HEADER) {
            password = Some(value);
        } else {
            out.push((key, value));
        }
    }

    if !out.iter().any(|(k, _)| k.eq_ignore_ascii_case("accept")) {
        out.push(("Accept".to_string(), "application/json".to_string()));
    }
    if !out.iter().any(|(k, _)| k.eq_ignore_ascii_case("user-agent")) {
        out.push(("User-Agent".to_string(), USER_AGENT.to_string()));
    }

    let basic_auth = match (auth_mode, username, password) {
        (AuthMode::NoAuth, Some(user), Some(pass)) => Some((user, pass)),
        _ => None,
    };
    PreparedHeaders {
        basic_auth,
        headers: out,
    }
}

/// An HTTPS client bound to one authentication mode.
#[derive(Debug, Clone)]
pub struct Connection {
    auth_mode: AuthMode,
    endpoint: ServerEndpoint,
    http: reqwest::Client,
}

impl Connection {
    /// Connection without a client certificate.
    pub fn no_auth(trust: &TrustContext, endpoint: ServerEndpoint, timeout: Duration) -> Result<Self> {
        let http = build_client(trust, None, endpoint.insecure, timeout)?;
        Ok(Self {
            auth_mode: AuthMode::NoAuth,
            endpoint,
            http,
        })
    }

    /// Connection presenting a certificate pair.
    pub fn cert_auth(
        auth_mode: AuthMode,
        trust: &TrustContext,
        endpoint: ServerEndpoint,
        client_auth: ClientAuth<'_>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = build_client(trust, Some(client_auth), endpoint.insecure, timeout)?;
        Ok(Self {
            auth_mode,
            endpoint,
            http,
        })
    }

    pub fn endpoint(&self) -> &ServerEndpoint {
        &self.endpoint
    }
}

impl Transport for Connection {
    fn auth_mode(&self) -> AuthMode {
        self.auth_mode
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = self.endpoint.url(&request.path);
        let prepared = prepare_headers(self.auth_mode, request.headers);
        let transport_err = |source| ClientError::Transport {
            method: request.method.to_string(),
            path: request.path.clone(),
            source,
        };

        let mut builder = self.http.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (key, value) in &prepared.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some((user, pass)) = &prepared.basic_auth {
            builder = builder.basic_auth(user, Some(pass));
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::debug!(method = %request.method, %url, auth = %self.auth_mode, "Request");
        let response = builder.send().await.map_err(transport_err)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(transport_err)?.to_vec();
        tracing::debug!(method = %request.method, %url, status, len = body.len(), "Response");

        Ok(ApiResponse { status, body })
    }
}

/// Builds the connections a session needs.
pub trait Connector {
    type Conn: Transport;

    /// Connection without a client certificate.
    fn no_auth(&self) -> Result<Self::Conn>;

    /// Connection presenting the given certificate pair.
    fn cert_auth(&self, auth_mode: AuthMode, pair: &PemPair) -> Result<Self::Conn>;
}

/// [`Connector`] producing real HTTPS connections.
#[derive(Debug, Clone)]
pub struct HttpsConnector {
    trust: TrustContext,
    endpoint: ServerEndpoint,
    timeout: Duration,
}

impl HttpsConnector {
    pub const fn new(trust: TrustContext, endpoint: ServerEndpoint, timeout: Duration) -> Self {
        Self {
            trust,
            endpoint,
            timeout,
        }
    }

    /// Load the CA directory and server settings from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let trust = TrustContext::load(&config.rhsm.ca_cert_dir)?;
        Ok(Self::new(
            trust,
            ServerEndpoint::from_config(&config.server),
            Duration::from_secs(config.server.server_timeout),
        ))
    }
}

impl Connector for HttpsConnector {
    type Conn = Connection;

    fn no_auth(&self) -> Result<Connection> {
        Connection::no_auth(&self.trust, self.endpoint.clone(), self.timeout)
    }

    fn cert_auth(&self, auth_mode: AuthMode, pair: &PemPair) -> Result<Connection> {
        let client_auth = ClientAuth {
            cert: &pair.cert,
            key: &pair.key,
        };
        Connection::cert_auth(
            auth_mode,
            &self.trust,
            self.endpoint.clone(),
            client_auth,
            self.timeout,
        )
    }
}
