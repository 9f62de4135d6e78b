//! Typed operations over a [`Transport`].

use reqwest::Method;
use serde::de::DeserializeOwned;

use super::types::{
    CertificateRecord, CertificateSerial, ComplianceStatus, Consumer, PurposeCompliance,
    RegisterRequest, ServerErrorBody, ServerStatus,
};
use crate::connection::{ApiRequest, ApiResponse, PASSWORD_HEADER, Transport, USERNAME_HEADER};
use crate::error::{ClientError, Result};

/// How a host proves it may register.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Password { username: String, password: String },
    ActivationKeys(Vec<String>),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::ActivationKeys(keys) => f.debug_tuple("ActivationKeys").field(&keys.len()).finish(),
        }
    }
}

impl Credentials {
    /// Validate a command-line combination of credentials.
    ///
    /// Exactly one of username/password or activation keys must be given.
    pub fn from_args(
        username: Option<String>,
        password: Option<String>,
        activation_keys: Vec<String>,
    ) -> Result<Self> {
        let has_keys = !activation_keys.is_empty();
        match (username, password, has_keys) {
            (Some(username), Some(password), false) => Ok(Self::Password { username, password }),
            (None, None, true) => Ok(Self::ActivationKeys(activation_keys)),
            (None, None, false) => Err(ClientError::usage(
                "Either --username and --password or --activationkey is required",
            )),
            (_, _, true) => Err(ClientError::usage(
                "--activationkey cannot be combined with --username or --password",
            )),
            (Some(_), None, false) => Err(ClientError::usage("--password is required with --username")),
            (None, Some(_), false) => Err(ClientError::usage("--username is required with --password")),
        }
    }
}

/// Typed entitlement server API on top of one connection.
#[derive(Debug)]
pub struct ProtocolClient<'a, T> {
    transport: &'a T,
}

impl<'a, T: Transport> ProtocolClient<'a, T> {
    pub const fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Raw request; the body is returned undecoded.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport.send(request).await
    }

    async fn call<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        let path = request.path.clone();
        let response = self.transport.send(request).await?;
        check_status(&response)?;
        serde_json::from_slice(&response.body)
            .map_err(|source| ClientError::InvalidResponse { path, source })
    }

    /// `POST consumers`: create a consumer for this host.
    pub async fn register(
        &self,
        body: &RegisterRequest,
        credentials: &Credentials,
        owner: Option<&str>,
    ) -> Result<Consumer> {
        let mut request = ApiRequest::new(Method::POST, "consumers").json(body)?;
        if let Some(owner) = owner {
            request = request.query("owner", owner);
        }
        match credentials {
            Credentials::Password { username, password } => {
                request = request
                    .header(USERNAME_HEADER, username.as_str())
                    .header(PASSWORD_HEADER, password.as_str());
            }
            Credentials::ActivationKeys(keys) => {
                request = request.query("activation_keys", keys.join(","));
            }
        }
        self.call(request).await
    }

    /// `GET consumers/<uuid>`.
    pub async fn consumer(&self, uuid: &str) -> Result<Consumer> {
        self.call(ApiRequest::get(format!("consumers/{uuid}"))).await
    }

    /// `DELETE consumers/<uuid>`.
    pub async fn delete_consumer(&self, uuid: &str) -> Result<()> {
        let response = self
            .transport
            .send(ApiRequest::new(Method::DELETE, format!("consumers/{uuid}")))
            .await?;
        check_status(&response)
    }

    /// `GET consumers/<uuid>/certificates`.
    pub async fn entitlement_certificates(&self, uuid: &str) -> Result<Vec<CertificateRecord>> {
        self.call(ApiRequest::get(format!("consumers/{uuid}/certificates")))
            .await
    }

    /// `GET consumers/<uuid>/certificates/serials`.
    pub async fn certificate_serials(&self, uuid: &str) -> Result<Vec<CertificateSerial>> {
        self.call(ApiRequest::get(format!("consumers/{uuid}/certificates/serials")))
            .await
    }

    /// `GET consumers/<uuid>/compliance`.
    pub async fn compliance(&self, uuid: &str) -> Result<ComplianceStatus> {
        self.call(ApiRequest::get(format!("consumers/{uuid}/compliance")))
            .await
    }

    /// `GET consumers/<uuid>/purpose_compliance`.
    pub async fn purpose_compliance(&self, uuid: &str) -> Result<PurposeCompliance> {
        self.call(ApiRequest::get(format!("consumers/{uuid}/purpose_compliance")))
            .await
    }

    /// `GET status`; answered on any connection.
    pub async fn server_status(&self) -> Result<ServerStatus> {
        self.call(ApiRequest::get("status")).await
    }
}

/// Map a non-2xx response to [`ClientError::Server`].
///
/// The message is the server's `displayMessage` when the body carries one.
pub fn check_status(response: &ApiResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    let message = serde_json::from_slice::<ServerErrorBody>(&response.body)
        .map(|body| body.display_message)
        .unwrap_or_else(|_| {
            reqwest::StatusCode::from_u16(response.status)
                .ok()
                .and_then(|status| status.canonical_reason())
                .unwrap_or("Unknown")
                .to_string()
        });
    Err(ClientError::Server {
        status: response.status,
        message,
    })
}
