// Test configuration loading
use cert_patrol::config::{Config, SmtpSecurity};
use cert_patrol::plan::Plan;
use cert_patrol::scanner::ScanSettings;
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

#[test]
fn test_load_test_config() {
    let config_path = Path::new("tests/test_config.toml");
    let config = Config::from_file(config_path).expect("Failed to load test config");

    // Scheduler
    assert_eq!(config.scheduler.tick_secs, 30);
    assert_eq!(config.scheduler.max_concurrent, 8);
    assert_eq!(config.scheduler.probe_timeout_secs, 5);

    // Alerts
    assert_eq!(config.alerts.default_alert_days, 15);
    assert_eq!(config.alerts.default_sender, "certs@example.com");

    // Store
    assert_eq!(config.store.backend, "file");
    assert_eq!(config.store.state_file, "cert-patrol-state.toml");

    // Webhook config
    let webhook = config.webhook.as_ref().unwrap();
    assert_eq!(webhook.url, "https://example.com/webhook");
    assert_eq!(webhook.secret, Some("test_secret_key".to_string()));
    assert_eq!(webhook.timeout_secs, Some(10));

    // SMTP config
    let smtp = config.smtp.as_ref().unwrap();
    assert_eq!(smtp.host, "smtp.example.com");
    assert_eq!(smtp.port, 587);
    assert_eq!(smtp.security, SmtpSecurity::Starttls);

    // Logging config
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_plan_and_settings_from_config() {
    let config = Config::from_file(Path::new("tests/test_config.toml")).unwrap();

    // Pro tier without a signed license stays on the free plan
    assert_eq!(config.plan.max_domains, Some(25));
    assert!(config.plan.license.is_none());
    let plan = Plan::from_config(&config.plan, Utc::now()).unwrap();
    assert_eq!(plan, Plan::Free);

    let settings = ScanSettings::from_config(&config);
    assert_eq!(settings.tick, Duration::from_secs(30));
    assert_eq!(settings.max_concurrent, 8);
    assert_eq!(settings.default_sender, "certs@example.com");
}
