// src/license.rs
//! Signed plan licenses
//!
//! A license is base64 of `{"payload": "<b64 json>", "sig": "<b64 ed25519>"}`.
//! The payload carries `tier`, `max_sites` and an optional RFC 3339 `exp`.

use anyhow::Context;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use ring::signature::{ED25519, UnparsedPublicKey};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Envelope {
    payload: String,
    sig: String,
}

fn default_tier() -> String {
    "pro".to_string()
}

fn default_max_sites() -> i64 {
    100
}

/// Terms granted by a verified license
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct License {
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default = "default_max_sites")]
    pub max_sites: i64,
    #[serde(default)]
    pub exp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub name: Option<String>,
}

impl License {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| now > exp)
    }

    pub fn is_pro(&self) -> bool {
        self.tier.eq_ignore_ascii_case("pro")
    }

    /// Domain cap, never below one
    pub fn max_domains(&self) -> usize {
        usize::try_from(self.max_sites.max(1)).unwrap_or(usize::MAX)
    }
}

/// Check the signature on `license_b64` against `public_key_b64` and parse it
pub fn verify(license_b64: &str, public_key_b64: &str) -> anyhow::Result<License> {
    let envelope = STANDARD
        .decode(license_b64.trim())
        .context("license is not valid base64")?;
    let envelope: Envelope =
        serde_json::from_slice(&envelope).context("license envelope is not valid JSON")?;

    let payload = STANDARD
        .decode(envelope.payload)
        .context("license payload is not valid base64")?;
    let signature = STANDARD
        .decode(envelope.sig)
        .context("license signature is not valid base64")?;
    let public_key = STANDARD
        .decode(public_key_b64.trim())
        .context("license public key is not valid base64")?;

    UnparsedPublicKey::new(&ED25519, &public_key)
        .verify(&payload, &signature)
        .map_err(|_| anyhow::anyhow!("license signature does not match"))?;

    serde_json::from_slice(&payload).context("license payload is not valid JSON")
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_verify_valid_license() {
        let keys = key_pair(7);
        let license = sign(
            &keys,
            r#"{"tier":"pro","max_sites":40,"exp":"2026-01-01T00:00:00+00:00","name":"Buyer"}"#,
        );

        let parsed = verify(&license, &public_key(&keys)).unwrap();
        assert!(parsed.is_pro());
        assert_eq!(parsed.max_domains(), 40);
        assert_eq!(parsed.name.as_deref(), Some("Buyer"));

        let before = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert!(!parsed.is_expired(before));
        assert!(parsed.is_expired(after));
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let license = sign(&key_pair(7), r#"{"tier":"pro"}"#);
        assert!(verify(&license, &public_key(&key_pair(8))).is_err());
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let keys = key_pair(7);
        assert!(verify("not base64!", &public_key(&keys)).is_err());
        assert!(verify(&STANDARD.encode("{}"), &public_key(&keys)).is_err());
    }

    #[test]
    fn test_payload_defaults_and_clamp() {
        let keys = key_pair(3);
        let parsed = verify(&sign(&keys, r#"{"max_sites":0}"#), &public_key(&keys)).unwrap();
        assert!(parsed.is_pro());
        assert_eq!(parsed.max_domains(), 1);
        assert!(parsed.exp.is_none());
    }
}
