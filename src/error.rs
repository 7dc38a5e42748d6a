// src/error.rs
//! Error taxonomy for probing, storage, scanning and registration

use crate::types::DomainId;

/// Why a probe could not produce certificate metadata
///
/// Probe failures are never fatal; the record stays due and is retried on the
/// next run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error("invalid host '{0}'")]
    InvalidHost(String),

    #[error("DNS resolution failed for {host}: {reason}")]
    Dns { host: String, reason: String },

    #[error("TCP connection to {addr} failed: {reason}")]
    Connect { addr: String, reason: String },

    #[error("TLS handshake with {host} failed: {reason}")]
    Handshake { host: String, reason: String },

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    #[error("peer presented no certificate")]
    NoCertificate,

    #[error("certificate has no subject common name")]
    MissingSubject,

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
}

/// Persistence layer failures
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("domain record {0} not found")]
    NotFound(DomainId),
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Batch-level scan failures, surfaced to the trigger
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("another scan run is in progress")]
    RunInProgress,

    #[error("no monitored domain named '{0}'")]
    DomainNotFound(String),
}

/// Registration failures
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("cannot read certificate for {domain}: {source}")]
    Probe {
        domain: String,
        #[source]
        source: ProbeError,
    },

    #[error("team {0} does not exist")]
    UnknownTeam(i64),

    #[error("plan limit reached: {0}")]
    PlanLimitReached(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
