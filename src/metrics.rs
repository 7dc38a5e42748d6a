//! Prometheus metrics for cert-patrol
//!
//! Counts probes, alerts and scan runs; exported periodically as text.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use tracing::warn;

use crate::config::MetricsConfig;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Probe attempts
    /// Labels: outcome="success|failure"
    pub static ref PROBES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "certpatrol_probes_total",
            "Total number of certificate probes"
        ),
        &["outcome"]
    ).expect("metric cannot be created");

    /// Probe duration in seconds
    pub static ref PROBE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "certpatrol_probe_duration_seconds",
            "Duration of certificate probes in seconds"
        )
        .buckets(vec![
            0.010, 0.025, 0.050, 0.100, 0.250,  // 10ms to 250ms
            0.500, 1.0, 2.5, 5.0, 10.0          // 500ms to 10s
        ])
    ).expect("metric cannot be created");

    /// Alert deliveries
    /// Labels: outcome="delivered|failed|skipped"
    pub static ref ALERTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "certpatrol_alerts_total",
            "Total number of alert decisions"
        ),
        &["outcome"]
    ).expect("metric cannot be created");

    /// Scan runs
    /// Labels: outcome="completed|failed|busy"
    pub static ref SCAN_RUNS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "certpatrol_scan_runs_total",
            "Total number of scheduled scan runs"
        ),
        &["outcome"]
    ).expect("metric cannot be created");

    /// Records selected by the last run
    pub static ref DOMAINS_DUE: IntGauge = IntGauge::new(
        "certpatrol_domains_due",
        "Number of domains due in the last scan run"
    ).expect("metric cannot be created");
}

/// Initialize metrics registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(PROBES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROBE_DURATION.clone()))?;
    REGISTRY.register(Box::new(ALERTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SCAN_RUNS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DOMAINS_DUE.clone()))?;

    Ok(())
}

/// Export metrics in Prometheus text format
pub fn export_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}

/// Background task for periodic metrics export
pub async fn metrics_exporter_task(config: MetricsConfig) {
    use tokio::time::{Duration, interval};

    let mut ticker = interval(Duration::from_secs(config.export_interval_secs.max(1)));

    loop {
        ticker.tick().await;

        let metrics_text = export_metrics();

        match &config.export_path {
            None => {
                println!("\n# Prometheus Metrics");
                println!("{}", metrics_text);
            }
            Some(path) => {
                if let Err(e) = tokio::fs::write(path, metrics_text.as_bytes()).await {
                    warn!("Failed to write metrics to file {}: {}", path, e);
                }
            }
        }
    }
}
