// src/dispatch/email.rs
//! Email dispatcher over SMTP

use crate::config::{SmtpConfig, SmtpSecurity};
use crate::dispatch::AlertDispatcher;
use crate::types::AlertPayload;
use anyhow::Context;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::debug;

/// Email alert dispatcher
pub struct EmailDispatcher {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailDispatcher {
    /// Build the SMTP transport; no connection is opened until the first send
    pub fn new(config: &SmtpConfig, from_address: &str) -> anyhow::Result<Self> {
        let from: Mailbox = from_address
            .parse()
            .with_context(|| format!("Invalid sender address '{}'", from_address))?;

        let mut builder = match config.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        }
        .port(config.port);

        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Some(Duration::from_secs(secs)));
        }

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    /// Build the alert email
    pub fn build_message(from: &Mailbox, alert: &AlertPayload) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(from.clone())
            .subject(format!("Certificate expiring: {}", alert.domain));

        for to_addr in &alert.recipients {
            let mailbox: Mailbox = to_addr
                .parse()
                .with_context(|| format!("Invalid recipient '{}'", to_addr))?;
            builder = builder.to(mailbox);
        }

        let message = builder
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(Self::format_text_body(alert)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(Self::format_html_body(alert)),
                    ),
            )
            .context("Failed to build alert email")?;

        Ok(message)
    }

    fn days_phrase(days: i64) -> String {
        match days {
            d if d < 0 => format!("expired {} day(s) ago", -d),
            0 => "expires today".to_string(),
            d => format!("expires in {} day(s)", d),
        }
    }

    fn format_text_body(alert: &AlertPayload) -> String {
        format!(
            "The TLS certificate for {domain} {phrase}.\n\n\
            Common name: {cn}\n\
            Expiry date: {expires}\n\
            Status: {status}\n\
            Days remaining: {days}\n\n\
            Renew the certificate before it expires to avoid outages.\n",
            domain = alert.domain,
            phrase = Self::days_phrase(alert.days_remaining),
            cn = alert.common_name,
            expires = alert.expires_on.format("%Y-%m-%d"),
            status = alert.status,
            days = alert.days_remaining,
        )
    }

    fn format_html_body(alert: &AlertPayload) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; color: #333;">
    <h2>Certificate expiring: {domain}</h2>
    <p>The TLS certificate for <strong>{domain}</strong> {phrase}.</p>
    <table>
        <tr><td><strong>Common name</strong></td><td>{cn}</td></tr>
        <tr><td><strong>Expiry date</strong></td><td>{expires}</td></tr>
        <tr><td><strong>Status</strong></td><td>{status}</td></tr>
        <tr><td><strong>Days remaining</strong></td><td>{days}</td></tr>
    </table>
</body>
</html>"#,
            domain = alert.domain,
            phrase = Self::days_phrase(alert.days_remaining),
            cn = alert.common_name,
            expires = alert.expires_on.format("%Y-%m-%d"),
            status = alert.status,
            days = alert.days_remaining,
        )
    }
}

#[async_trait]
impl AlertDispatcher for EmailDispatcher {
    async fn send(&self, alert: &AlertPayload) -> anyhow::Result<()> {
        if alert.recipients.is_empty() {
            anyhow::bail!("no recipients for {}", alert.domain);
        }

        let message = Self::build_message(&self.from, alert)?;
        self.transport
            .send(message)
            .await
            .with_context(|| format!("SMTP delivery failed for {}", alert.domain))?;

        debug!("Sent alert email for {} to {} recipient(s)", alert.domain, alert.recipients.len());
        Ok(())
    }

    fn name(&self) -> &str {
        "email"
    }
}
