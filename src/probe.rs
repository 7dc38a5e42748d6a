// src/probe.rs
//! TLS endpoint prober
//!
//! Opens a TCP connection, performs a TLS handshake and extracts the leaf
//! certificate's metadata. The whole probe (DNS, connect, handshake) shares a
//! single deadline.

use async_trait::async_trait;
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{WebPkiSupportedAlgorithms, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::cert_parser::{CertInfo, CertificateParser};
use crate::error::ProbeError;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads certificate metadata from a live endpoint
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> Result<CertInfo, ProbeError>;
}

/// Strip scheme prefixes and any path, query or fragment from a domain entry
///
/// `https://Example.com/login?x=1` becomes `example.com`; a bare hostname is
/// returned trimmed and lowercased.
pub fn normalize_host(input: &str) -> String {
    let mut host = input.trim();

    for scheme in ["https://", "http://"] {
        if host.get(..scheme.len()).is_some_and(|p| p.eq_ignore_ascii_case(scheme)) {
            host = &host[scheme.len()..];
            break;
        }
    }

    let end = host.find(['/', '?', '#']).unwrap_or(host.len());
    host[..end].trim().to_ascii_lowercase()
}

/// Production prober over tokio-rustls
pub struct TlsProber {
    connector: TlsConnector,
    timeout: Duration,
}

impl TlsProber {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let provider = rustls::crypto::ring::default_provider();
        let verifier = MetadataOnlyVerifier {
            algorithms: provider.signature_verification_algorithms,
        };

        let config = ClientConfig::builder_with_provider(Arc::new(provider))
            .with_safe_default_protocol_versions()?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            timeout,
        })
    }

    fn timed_out(&self, stage: &'static str) -> ProbeError {
        ProbeError::Timeout {
            stage,
            secs: self.timeout.as_secs().max(1),
        }
    }
}

#[async_trait]
impl Prober for TlsProber {
    async fn probe(&self, host: &str, port: u16) -> Result<CertInfo, ProbeError> {
        let host = normalize_host(host);
        if host.is_empty() {
            return Err(ProbeError::InvalidHost(host));
        }

        let server_name = ServerName::try_from(host.clone())
            .map_err(|_| ProbeError::InvalidHost(host.clone()))?;
        let deadline = Instant::now() + self.timeout;

        let addrs: Vec<_> = timeout_at(deadline, tokio::net::lookup_host((host.as_str(), port)))
            .await
            .map_err(|_| self.timed_out("DNS lookup"))?
            .map_err(|e| ProbeError::Dns {
                host: host.clone(),
                reason: e.to_string(),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ProbeError::Dns {
                host,
                reason: "no addresses returned".to_string(),
            });
        }

        let tcp = timeout_at(deadline, TcpStream::connect(&addrs[..]))
            .await
            .map_err(|_| self.timed_out("TCP connect"))?
            .map_err(|e| ProbeError::Connect {
                addr: format!("{}:{}", host, port),
                reason: e.to_string(),
            })?;

        let tls_stream = timeout_at(deadline, self.connector.connect(server_name, tcp))
            .await
            .map_err(|_| self.timed_out("TLS handshake"))?
            .map_err(|e| ProbeError::Handshake {
                host: host.clone(),
                reason: e.to_string(),
            })?;

        let (_, conn) = tls_stream.get_ref();
        let leaf = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or(ProbeError::NoCertificate)?;

        let info = CertificateParser::parse_der(leaf.as_ref())?;
        debug!("Probed {}:{} -> CN={} notAfter={}", host, port, info.common_name, info.not_after);

        Ok(info)
    }
}

/// Accepts any presented chain so expired or self-signed certificates can
/// still be read. Handshake signatures are verified normally.
#[derive(Debug)]
struct MetadataOnlyVerifier {
    algorithms: WebPkiSupportedAlgorithms,
}

impl ServerCertVerifier for MetadataOnlyVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.algorithms.supported_schemes()
    }
}
