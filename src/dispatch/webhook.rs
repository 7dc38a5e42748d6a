// src/dispatch/webhook.rs
//! Webhook dispatcher - sends alerts as signed HTTP POST requests

use crate::config::WebhookConfig;
use crate::dispatch::AlertDispatcher;
use crate::types::AlertPayload;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-CertPatrol-Signature";

/// Webhook alert dispatcher
pub struct WebhookDispatcher {
    client: Client,
    config: WebhookConfig,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    domain: &'a str,
    common_name: &'a str,
    expires_on: String,
    status: &'static str,
    days_remaining: i64,
    recipients: &'a [String],
}

impl<'a> From<&'a AlertPayload> for WebhookPayload<'a> {
    fn from(alert: &'a AlertPayload) -> Self {
        Self {
            event: "certificate_expiring",
            domain: &alert.domain,
            common_name: &alert.common_name,
            expires_on: alert.expires_on.format("%Y-%m-%d").to_string(),
            status: alert.status.as_str(),
            days_remaining: alert.days_remaining,
            recipients: &alert.recipients,
        }
    }
}

impl WebhookDispatcher {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Hex HMAC-SHA256 of `body` under `secret`
    pub fn sign(secret: &str, body: &[u8]) -> anyhow::Result<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| anyhow::anyhow!("HMAC init error: {:?}", e))?;
        mac.update(body);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl AlertDispatcher for WebhookDispatcher {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&WebhookPayload::from(alert))?;

        let timeout_secs = self.config.timeout_secs.unwrap_or(5);
        let mut req = self
            .client
            .post(&self.config.url)
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .header("Content-Type", "application/json");

        if let Some(secret) = &self.config.secret {
            req = req.header(SIGNATURE_HEADER, Self::sign(secret, &body)?);
        }

        let resp = req.body(body).send().await?;
        resp.error_for_status()?; // non-2xx -> error

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CertStatus;
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn alert() -> AlertPayload {
        AlertPayload {
            domain: "example.com".to_string(),
            common_name: "*.example.com".to_string(),
            expires_on: NaiveDate::from_ymd_opt(2025, 1, 11).unwrap(),
            status: CertStatus::Expiring,
            days_remaining: 10,
            recipients: vec!["ops@example.com".to_string()],
        }
    }

    fn config(url: String, secret: Option<&str>, timeout_secs: u64) -> WebhookConfig {
        WebhookConfig {
            url,
            secret: secret.map(str::to_string),
            timeout_secs: Some(timeout_secs),
        }
    }

    #[tokio::test]
    async fn test_webhook_send_success() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("Content-Type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dispatcher = WebhookDispatcher::new(config(mock_server.uri(), None, 5));
        assert!(dispatcher.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_payload_structure() {
        let mock_server = MockServer::start().await;

        let expected_json = serde_json::json!({
            "event": "certificate_expiring",
            "domain": "example.com",
            "common_name": "*.example.com",
            "expires_on": "2025-01-11",
            "status": "expiring",
            "days_remaining": 10,
            "recipients": ["ops@example.com"]
        });

        Mock::given(method("POST"))
            .and(body_json(expected_json))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dispatcher = WebhookDispatcher::new(config(mock_server.uri(), None, 5));
        assert!(dispatcher.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_signature_header_matches_body() {
        let mock_server = MockServer::start().await;
        let secret = "test_secret_key";

        let body = serde_json::to_vec(&WebhookPayload::from(&alert())).unwrap();
        let expected_sig = WebhookDispatcher::sign(secret, &body).unwrap();
        assert_eq!(expected_sig.len(), 64);

        Mock::given(method("POST"))
            .and(header_exists(SIGNATURE_HEADER))
            .and(header(SIGNATURE_HEADER, expected_sig.as_str()))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let dispatcher = WebhookDispatcher::new(config(mock_server.uri(), Some(secret), 5));
        assert!(dispatcher.send(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_server_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let dispatcher = WebhookDispatcher::new(config(mock_server.uri(), None, 5));
        assert!(dispatcher.send(&alert()).await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_timeout() {
        let mock_server = MockServer::start().await;

        // Delay response longer than timeout
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(10)),
            )
            .mount(&mock_server)
            .await;

        let dispatcher = WebhookDispatcher::new(config(mock_server.uri(), None, 1));
        assert!(dispatcher.send(&alert()).await.is_err());
    }
}
