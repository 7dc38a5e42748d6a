// src/config.rs

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_port")]
    pub default_port: u16,
}

fn default_tick_secs() -> u64 { 60 }
fn default_max_concurrent() -> usize { 16 }
fn default_probe_timeout() -> u64 { 5 }
fn default_port() -> u16 { 443 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            max_concurrent: default_max_concurrent(),
            probe_timeout_secs: default_probe_timeout(),
            default_port: default_port(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    #[serde(default = "default_alert_days")]
    pub default_alert_days: u32,
    /// From address for email alerts, also the recipient of last resort
    #[serde(default = "default_sender")]
    pub default_sender: String,
}

fn default_alert_days() -> u32 { 15 }
fn default_sender() -> String { "noreply@localhost".to_string() }

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            default_alert_days: default_alert_days(),
            default_sender: default_sender(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,  // "file" or "database"
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

fn default_backend() -> String { "file".to_string() }
fn default_state_file() -> String { "cert-patrol-state.toml".to_string() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            state_file: default_state_file(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub enabled: bool,
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_url() -> String {
    "postgresql://localhost/certpatrol".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlanConfig {
    #[serde(default = "default_tier")]
    pub tier: String,
    #[serde(default)]
    pub max_domains: Option<usize>,
    /// Signed license (base64), required for the pro tier
    #[serde(default)]
    pub license: Option<String>,
    /// Base64 ed25519 key the license must be signed with
    #[serde(default)]
    pub public_key: Option<String>,
}

fn default_tier() -> String { "free".to_string() }

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            tier: default_tier(),
            max_domains: None,
            license: None,
            public_key: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SmtpSecurity {
    #[default]
    Starttls,
    Tls,
    None,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default)]
    pub security: SmtpSecurity,
    pub timeout_secs: Option<u64>,
}

fn default_smtp_port() -> u16 { 587 }

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub export_path: Option<String>,  // None = stdout
    #[serde(default = "default_export_interval")]
    pub export_interval_secs: u64,
}

fn default_export_interval() -> u64 { 60 }

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            export_path: None,
            export_interval_secs: default_export_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub plan: PlanConfig,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: Config = toml::from_str(contents).context("Failed to parse config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.scheduler.max_concurrent == 0 {
            anyhow::bail!("scheduler.max_concurrent must be at least 1");
        }
        if self.scheduler.probe_timeout_secs == 0 {
            anyhow::bail!("scheduler.probe_timeout_secs must be at least 1");
        }
        if self.scheduler.tick_secs == 0 {
            anyhow::bail!("scheduler.tick_secs must be at least 1");
        }
        if !crate::recipients::is_valid_address(self.alerts.default_sender.trim()) {
            anyhow::bail!(
                "alerts.default_sender '{}' is not a valid email address",
                self.alerts.default_sender
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_from_valid_toml() {
        let toml_content = r#"
[scheduler]
tick_secs = 30
max_concurrent = 4
probe_timeout_secs = 3

[alerts]
default_alert_days = 20
default_sender = "certs@example.com"

[store]
backend = "database"

[database]
enabled = true
url = "postgresql://db.internal/certs"

[plan]
tier = "pro"
max_domains = 50

[webhook]
url = "https://example.com/webhook"
secret = "test_secret"
timeout_secs = 5

[smtp]
host = "smtp.example.com"
port = 465
username = "mailer"
password = "hunter2"
security = "tls"

[logging]
level = "debug"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::from_file(temp_file.path()).unwrap();

        assert_eq!(config.scheduler.tick_secs, 30);
        assert_eq!(config.scheduler.max_concurrent, 4);
        assert_eq!(config.scheduler.probe_timeout_secs, 3);
        assert_eq!(config.scheduler.default_port, 443);
        assert_eq!(config.alerts.default_alert_days, 20);
        assert_eq!(config.alerts.default_sender, "certs@example.com");
        assert_eq!(config.store.backend, "database");
        assert!(config.database.enabled);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.plan.max_domains, Some(50));
        let webhook = config.webhook.as_ref().unwrap();
        assert_eq!(webhook.secret, Some("test_secret".to_string()));
        let smtp = config.smtp.as_ref().unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.security, SmtpSecurity::Tls);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_minimal_toml() {
        let config = Config::from_toml("[logging]\nlevel = \"info\"\n").unwrap();

        assert_eq!(config.scheduler.tick_secs, 60);
        assert_eq!(config.scheduler.max_concurrent, 16);
        assert_eq!(config.scheduler.probe_timeout_secs, 5);
        assert_eq!(config.alerts.default_alert_days, 15);
        assert_eq!(config.store.backend, "file");
        assert_eq!(config.store.state_file, "cert-patrol-state.toml");
        assert_eq!(config.plan.tier, "free");
        assert!(!config.database.enabled);
        assert!(config.webhook.is_none());
        assert!(config.smtp.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_config_smtp_defaults() {
        let config = Config::from_toml(
            "[smtp]\nhost = \"localhost\"\n\n[logging]\nlevel = \"info\"\n",
        )
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.security, SmtpSecurity::Starttls);
    }

    #[test]
    fn test_config_invalid_toml() {
        assert!(Config::from_toml("invalid toml content {{{").is_err());
    }

    #[test]
    fn test_config_missing_logging_section() {
        assert!(Config::from_toml("[scheduler]\ntick_secs = 10\n").is_err());
    }

    #[test]
    fn test_config_rejects_zero_concurrency() {
        let result = Config::from_toml(
            "[scheduler]\nmax_concurrent = 0\n\n[logging]\nlevel = \"info\"\n",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_config_rejects_malformed_default_sender() {
        let result = Config::from_toml(
            "[alerts]\ndefault_sender = \"certs at example\"\n\n[logging]\nlevel = \"info\"\n",
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("default_sender"), "{}", err);
    }

    #[test]
    fn test_config_nonexistent_file() {
        let result = Config::from_file(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }
}
