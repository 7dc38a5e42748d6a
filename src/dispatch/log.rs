// src/dispatch/log.rs
//! Dispatcher that only writes alerts to the log

use crate::dispatch::AlertDispatcher;
use crate::types::AlertPayload;
use async_trait::async_trait;

/// Always delivers; used when no outbound channel is configured
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        tracing::warn!(
            domain = %alert.domain,
            common_name = %alert.common_name,
            expires_on = %alert.expires_on,
            status = %alert.status,
            days_remaining = alert.days_remaining,
            recipients = %alert.recipients.join(","),
            "Certificate expiring: {}",
            alert.domain
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
