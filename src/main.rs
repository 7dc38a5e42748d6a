// src/main.rs
use anyhow::Context;
use cert_patrol::cli::{Cli, Command};
use cert_patrol::config::Config;
use cert_patrol::dispatch::{
    AlertDispatcher, DispatchManager, EmailDispatcher, LogDispatcher, WebhookDispatcher,
};
use cert_patrol::metrics;
use cert_patrol::output;
use cert_patrol::plan::Plan;
use cert_patrol::probe::TlsProber;
use cert_patrol::registration::Registrar;
use cert_patrol::scanner::{ScanScheduler, ScanSettings};
use cert_patrol::store::{DomainStore, FileStore, PostgresStore};
use chrono::Utc;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Validate arguments
    cli.validate()?;

    // Load config file
    let config = Config::from_file(Path::new(&cli.config))?;

    // Initialize logging
    let log_level = cli.log_level_override().unwrap_or(config.logging.level.as_str());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();

    tracing::debug!("Loaded configuration from {}", cli.config);

    let store = open_store(&config).await?;

    match &cli.command {
        Command::Run => run_daemon(&config, store).await,
        Command::Scan { domain } => {
            let scheduler = build_scheduler(&config, store)?;
            let report = scheduler
                .run_scheduled_scan(Utc::now(), domain.as_deref())
                .await?;

            println!(
                "Scanned {} domain(s): {} updated, {} probe failure(s), {} store failure(s)",
                report.due, report.updated, report.probe_failures, report.store_failures
            );
            if let Some(alerts) = &report.alerts {
                println!(
                    "Alerts: {} delivered, {} failed, {} skipped",
                    alerts.delivered, alerts.dispatch_failures, alerts.skipped
                );
            }
            if report.has_store_failures() {
                anyhow::bail!("scan finished with store failures");
            }
            Ok(())
        }
        Command::Alerts => {
            let scheduler = build_scheduler(&config, store)?;
            let report = scheduler.run_alert_pass(Utc::now()).await?;
            println!(
                "Alerts: {} candidate(s), {} delivered, {} failed, {} skipped",
                report.candidates, report.delivered, report.dispatch_failures, report.skipped
            );
            if report.store_failures > 0 {
                anyhow::bail!("alert pass finished with store failures");
            }
            Ok(())
        }
        command @ Command::Add { .. } => {
            let Some(request) = command.registration_request() else {
                anyhow::bail!("missing registration details");
            };
            let plan = Plan::from_config(&config.plan, Utc::now())?;
            let prober = TlsProber::new(Duration::from_secs(config.scheduler.probe_timeout_secs))?;
            let registrar = Registrar::new(
                store,
                Arc::new(prober),
                Arc::new(plan),
                config.scheduler.default_port,
            );

            let outcome = registrar.register(request, Utc::now()).await?;
            let verb = if outcome.created { "Added" } else { "Updated" };
            let record = &outcome.record;
            println!(
                "{} {} (CN={}, expires {}, {} days remaining)",
                verb,
                record.domain,
                record.common_name,
                record
                    .valid_until
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                record.days_remaining.unwrap_or_default()
            );
            Ok(())
        }
        command @ Command::Team { .. } => {
            let Some(team) = command.team() else {
                anyhow::bail!("missing team details");
            };
            let team = store.upsert_team(team).await?;
            println!("Saved team {} ({})", team.id, team.name);
            Ok(())
        }
        command @ Command::List { .. } => {
            let records = store.find_all().await?;
            let mut stdout = std::io::stdout().lock();
            let use_colors = is_terminal::is_terminal(std::io::stdout());
            output::write_records(&mut stdout, &records, command.output_format(), use_colors)
        }
    }
}

/// Open the configured store backend
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DomainStore>> {
    match config.store.backend.as_str() {
        "database" => {
            if !config.database.enabled {
                anyhow::bail!(
                    "store backend is set to 'database' but database is not enabled. \
                    Either enable database or use backend='file'"
                );
            }

            tracing::info!("Database enabled, connecting to PostgreSQL...");
            let postgres =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;

            // Run migrations
            postgres.migrate().await?;
            tracing::info!("Database initialized and migrated successfully");

            Ok(Arc::new(postgres))
        }
        "file" => {
            tracing::info!("Using file-based domain store: {}", config.store.state_file);
            let store = FileStore::open(PathBuf::from(&config.store.state_file))
                .await
                .context("Failed to open state file")?;
            Ok(Arc::new(store))
        }
        other => {
            anyhow::bail!("Invalid store backend '{}'. Must be 'file' or 'database'", other);
        }
    }
}

/// Dispatchers from config; alerts are only logged when none is configured
fn build_dispatcher(config: &Config) -> anyhow::Result<Arc<dyn AlertDispatcher>> {
    let mut manager = DispatchManager::new();

    if let Some(ref webhook_config) = config.webhook {
        manager.add_dispatcher(Arc::new(WebhookDispatcher::new(webhook_config.clone())));
        tracing::info!("Webhook alerts enabled: {}", webhook_config.url);
    }

    if let Some(ref smtp_config) = config.smtp {
        let email = EmailDispatcher::new(smtp_config, &config.alerts.default_sender)?;
        manager.add_dispatcher(Arc::new(email));
        tracing::info!("Email alerts enabled via {}:{}", smtp_config.host, smtp_config.port);
    }

    if manager.is_empty() {
        tracing::warn!("No alert channel configured, alerts will only be logged");
        manager.add_dispatcher(Arc::new(LogDispatcher));
    }

    Ok(Arc::new(manager))
}

fn build_scheduler(config: &Config, store: Arc<dyn DomainStore>) -> anyhow::Result<ScanScheduler> {
    let prober = TlsProber::new(Duration::from_secs(config.scheduler.probe_timeout_secs))?;
    let dispatcher = build_dispatcher(config)?;

    Ok(ScanScheduler::new(
        store,
        Arc::new(prober),
        dispatcher,
        ScanSettings::from_config(config),
    ))
}

async fn run_daemon(config: &Config, store: Arc<dyn DomainStore>) -> anyhow::Result<()> {
    tracing::info!("Starting cert-patrol...");

    store.ping().await.context("Domain store is not reachable")?;

    if config.metrics.enabled {
        if let Err(e) = metrics::init_metrics() {
            tracing::warn!("Failed to register metrics: {}", e);
        }
        tokio::spawn(metrics::metrics_exporter_task(config.metrics.clone()));
        tracing::info!(
            "Metrics export every {}s to {}",
            config.metrics.export_interval_secs,
            config.metrics.export_path.as_deref().unwrap_or("stdout")
        );
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested, finishing in-flight records...");
            shutdown_tx.send(true).ok();
        }
    });

    let scheduler = build_scheduler(config, store)?.with_shutdown(shutdown_rx);
    scheduler.run().await;

    tracing::info!("cert-patrol stopped");
    Ok(())
}
