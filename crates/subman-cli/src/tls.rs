//! TLS client construction for the entitlement server.
//!
//! Trust comes exclusively from the PEM files in the configured CA
//! directory; the platform root store is never consulted.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, RootCertStore};

use crate::error::{ClientError, Result};

/// Private CA pool loaded once per process.
#[derive(Debug, Clone)]
pub struct TrustContext {
    roots: Arc<RootCertStore>,
    dir: PathBuf,
}

impl TrustContext {
    /// Load every file in `ca_dir` into a fresh root store.
    ///
    /// Each file must contain at least one PEM certificate.
    pub fn load(ca_dir: &Path) -> Result<Self> {
        let setup_err = |path: &Path, reason: String| ClientError::TrustSetup {
            path: path.to_path_buf(),
            reason,
        };

        let entries = fs::read_dir(ca_dir).map_err(|e| setup_err(ca_dir, e.to_string()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut roots = RootCertStore::empty();
        for path in &paths {
            let data = fs::read(path).map_err(|e| setup_err(path, e.to_string()))?;
            let certs = CertificateDer::pem_slice_iter(&data)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| setup_err(path, format!("invalid PEM: {e}")))?;
            if certs.is_empty() {
                return Err(setup_err(path, "no certificates found".into()));
            }
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| setup_err(path, e.to_string()))?;
            }
        }
        tracing::debug!(dir = %ca_dir.display(), anchors = roots.len(), "Loaded trusted CAs");

        Ok(Self {
            roots: Arc::new(roots),
            dir: ca_dir.to_path_buf(),
        })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Client certificate and key presented during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct ClientAuth<'a> {
    pub cert: &'a Path,
    pub key: &'a Path,
}

/// Build an HTTPS client trusting only `trust`.
///
/// With `client_auth` the client presents that certificate (mutual TLS).
/// `insecure` skips server certificate verification and nothing else.
pub fn build_client(
    trust: &TrustContext,
    client_auth: Option<ClientAuth<'_>>,
    insecure: bool,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let tls = build_tls_config(trust, client_auth, insecure)?;
    reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .timeout(timeout)
        .build()
        .map_err(ClientError::ClientSetup)
}

/// Assemble the rustls configuration used by [`build_client`].
pub fn build_tls_config(
    trust: &TrustContext,
    client_auth: Option<ClientAuth<'_>>,
    insecure: bool,
) -> Result<ClientConfig> {
    // reqwest is built without a provider; an `Err` only means one is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let builder = if insecure {
        tracing::warn!("Server certificate verification is disabled");
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
    } else {
        ClientConfig::builder().with_root_certificates(Arc::clone(&trust.roots))
    };

    match client_auth {
        Some(auth) => {
            let (chain, key) = load_key_pair(auth)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| ClientError::KeyPair(format!("{}: {e}", auth.cert.display())))
        }
        None => Ok(builder.with_no_client_auth()),
    }
}

fn load_key_pair(
    auth: ClientAuth<'_>,
) -> Result<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)> {
    let chain = CertificateDer::pem_file_iter(auth.cert)
        .and_then(|certs| certs.collect::<std::result::Result<Vec<_>, _>>())
        .map_err(|e| ClientError::KeyPair(format!("{}: {e}", auth.cert.display())))?;
    if chain.is_empty() {
        return Err(ClientError::KeyPair(format!(
            "{}: no certificate found",
            auth.cert.display()
        )));
    }
    let key = PrivateKeyDer::from_pem_file(auth.key)
        .map_err(|e| ClientError::KeyPair(format!("{}: {e}", auth.key.display())))?;
    Ok((chain, key))
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use rustls::client::ResolvesClientCert;
    use subman_pki::testing::{TestCa, consumer_pair};

    fn ca_dir_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn every_ca_file_is_trusted() {
        let first = TestCa::new("First CA");
        let second = TestCa::new("Second CA");
        let dir = ca_dir_with(&[("a.pem", first.cert_pem.as_str()), ("b.pem", second.cert_pem.as_str())]);
        let trust = TrustContext::load(dir.path()).unwrap();
        assert_eq!(trust.len(), 2);
    }

    #[test]
    fn unreadable_ca_dir_is_trust_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrustContext::load(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, ClientError::TrustSetup { .. }));
    }

    #[test]
    fn ca_file_without_certificates_is_trust_error() {
        let dir = ca_dir_with(&[("junk.pem", "not a certificate\n")]);
        let err = TrustContext::load(dir.path()).unwrap_err();
        assert!(
            matches!(&err, ClientError::TrustSetup { path, .. } if path.ends_with("junk.pem"))
        );
    }

    #[test]
    fn client_auth_requires_a_readable_key() {
        let ca = TestCa::new("CA");
        let dir = ca_dir_with(&[("ca.pem", ca.cert_pem.as_str())]);
        let trust = TrustContext::load(dir.path()).unwrap();

        let pair = ca.issue_consumer("uuid", "org");
        let cert = dir.path().join("cert.pem");
        fs::write(&cert, &pair.cert_pem).unwrap();
        let auth = ClientAuth {
            cert: &cert,
            key: &dir.path().join("missing-key.pem"),
        };
        let err = build_tls_config(&trust, Some(auth), false).unwrap_err();
        assert!(matches!(err, ClientError::KeyPair(_)));
    }

    #[test]
    fn mismatched_pair_is_key_pair_error() {
        let ca = TestCa::new("CA");
        let dir = ca_dir_with(&[("ca.pem", ca.cert_pem.as_str())]);
        let trust = TrustContext::load(dir.path()).unwrap();

        let first = consumer_pair("uuid-1", "org");
        let second = consumer_pair("uuid-2", "org");
        let cert = dir.path().join("cert.pem");
        let key = dir.path().join("key.pem");
        fs::write(&cert, &first.cert_pem).unwrap();
        fs::write(&key, &second.key_pem).unwrap();

        let auth = ClientAuth { cert: &cert, key: &key };
        let err = build_tls_config(&trust, Some(auth), false).unwrap_err();
        assert!(matches!(err, ClientError::KeyPair(_)));
    }

    #[test]
    fn matching_pair_builds_mutual_tls_config() {
        let ca = TestCa::new("CA");
        let dir = ca_dir_with(&[("ca.pem", ca.cert_pem.as_str())]);
        let trust = TrustContext::load(dir.path()).unwrap();

        let pair = consumer_pair("uuid", "org");
        let keys = tempfile::tempdir().unwrap();
        let cert = keys.path().join("cert.pem");
        let key = keys.path().join("key.pem");
        fs::write(&cert, &pair.cert_pem).unwrap();
        fs::write(&key, &pair.key_pem).unwrap();

        let auth = ClientAuth { cert: &cert, key: &key };
        let config = build_tls_config(&trust, Some(auth), false).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());

        let insecure = build_tls_config(&trust, Some(auth), true).unwrap();
        assert!(insecure.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn no_client_auth_presents_nothing() {
        let ca = TestCa::new("CA");
        let dir = ca_dir_with(&[("ca.pem", ca.cert_pem.as_str())]);
        let trust = TrustContext::load(dir.path()).unwrap();
        let config = build_tls_config(&trust, None, false).unwrap();
        assert!(!config.client_auth_cert_resolver.has_certs());
    }
}
