// src/cert_parser.rs
use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use x509_parser::extensions::ParsedExtension;
use x509_parser::prelude::*;

use crate::error::ProbeError;

/// Metadata extracted from a server's leaf certificate
#[derive(Debug, Clone, PartialEq)]
pub struct CertInfo {
    pub common_name: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub issuer: Option<String>,
    pub fingerprint: String,
}

impl CertInfo {
    pub fn valid_from(&self) -> NaiveDate {
        self.not_before.date_naive()
    }

    pub fn valid_until(&self) -> NaiveDate {
        self.not_after.date_naive()
    }
}

/// Parser for DER-encoded leaf certificates
pub struct CertificateParser;

impl CertificateParser {
    /// Parse a DER certificate into [`CertInfo`]
    pub fn parse_der(der_bytes: &[u8]) -> Result<CertInfo, ProbeError> {
        let fingerprint = {
            let mut hasher = Sha256::new();
            hasher.update(der_bytes);
            hex::encode(hasher.finalize())
        };

        let (_, cert) = X509Certificate::from_der(der_bytes)
            .map_err(|e| ProbeError::InvalidCertificate(format!("{:?}", e)))?;

        let common_name = Self::extract_cn(&cert)
            .or_else(|| Self::first_dns_name(&cert))
            .ok_or(ProbeError::MissingSubject)?;

        let not_before = Self::to_utc(cert.validity().not_before.timestamp())?;
        let not_after = Self::to_utc(cert.validity().not_after.timestamp())?;

        Ok(CertInfo {
            common_name,
            not_before,
            not_after,
            issuer: Self::extract_issuer(&cert),
            fingerprint,
        })
    }

    fn to_utc(timestamp: i64) -> Result<DateTime<Utc>, ProbeError> {
        DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
            ProbeError::InvalidCertificate(format!("validity timestamp {} out of range", timestamp))
        })
    }

    /// First Common Name (CN) of the certificate subject
    fn extract_cn(cert: &X509Certificate) -> Option<String> {
        cert.subject()
            .iter_common_name()
            .filter_map(|attr| attr.as_str().ok())
            .map(str::trim)
            .find(|cn| !cn.is_empty())
            .map(str::to_string)
    }

    /// First DNS name from the Subject Alternative Name extension
    fn first_dns_name(cert: &X509Certificate) -> Option<String> {
        for ext in cert.extensions() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
                for general_name in &san.general_names {
                    if let GeneralName::DNSName(dns_name) = general_name {
                        return Some(dns_name.to_string());
                    }
                }
            }
        }
        None
    }

    fn extract_issuer(cert: &X509Certificate) -> Option<String> {
        let cn = cert
            .issuer()
            .iter_common_name()
            .filter_map(|attr| attr.as_str().ok())
            .next()
            .map(str::to_string);

        // Fallback: full issuer DN
        cn.or_else(|| Some(cert.issuer().to_string()))
    }
}
