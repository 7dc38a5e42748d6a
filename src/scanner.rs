// src/scanner.rs
//! Scan scheduler
//!
//! Each run selects the due records (or one forced record), probes them in a
//! bounded worker pool, writes the new certificate state back and then runs
//! the alert pass over every record that has a status but no alert yet.

use chrono::{DateTime, NaiveDate, Utc};
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, warn};

use crate::classify::{classify, days_until, status_for_days};
use crate::config::Config;
use crate::dispatch::AlertDispatcher;
use crate::error::ScanError;
use crate::metrics;
use crate::probe::{Prober, normalize_host};
use crate::recipients;
use crate::schedule::next_check_at;
use crate::store::DomainStore;
use crate::types::{AlertPayload, CertStatus, DomainPatch, MonitoredDomain, Team, TeamId};

/// Knobs the scheduler needs from the configuration
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub tick: Duration,
    pub max_concurrent: usize,
    pub default_alert_days: u32,
    pub default_sender: String,
}

impl ScanSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            tick: Duration::from_secs(cfg.scheduler.tick_secs),
            max_concurrent: cfg.scheduler.max_concurrent,
            default_alert_days: cfg.alerts.default_alert_days,
            default_sender: cfg.alerts.default_sender.clone(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            max_concurrent: 16,
            default_alert_days: 15,
            default_sender: "noreply@localhost".to_string(),
        }
    }
}

/// Summary of one scheduled scan run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub due: usize,
    pub updated: usize,
    pub probe_failures: usize,
    pub store_failures: usize,
    /// Records not started because shutdown was requested
    pub cancelled: usize,
    pub alerts: Option<AlertReport>,
}

impl ScanReport {
    /// Any record (or the chained alert pass) hit a store failure
    pub fn has_store_failures(&self) -> bool {
        self.store_failures > 0 || self.alerts.as_ref().is_some_and(|a| a.store_failures > 0)
    }
}

/// Summary of one alert pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertReport {
    pub candidates: usize,
    pub delivered: usize,
    pub dispatch_failures: usize,
    /// Days remaining unknown or above the effective threshold
    pub skipped: usize,
    pub store_failures: usize,
    pub cancelled: usize,
}

enum RecordOutcome {
    Updated,
    ProbeFailed,
    StoreFailed,
    Cancelled,
}

/// Alert threshold for a record: its own override, then the team default
pub fn effective_alert_days(record: &MonitoredDomain, team: Option<&Team>, default_days: u32) -> u32 {
    record
        .custom_alert_days
        .or_else(|| team.and_then(|t| t.default_alert_days))
        .unwrap_or(default_days)
}

/// Status and days remaining at `now`
///
/// A probe taken the same UTC day stands; otherwise the count is recomputed
/// from the stored expiry date so records probed weekly or monthly still cross
/// their threshold on time.
fn days_as_of(
    record: &MonitoredDomain,
    stored_days: i64,
    expires_on: NaiveDate,
    now: DateTime<Utc>,
) -> (CertStatus, i64) {
    let today = now.date_naive();
    match (record.status, record.last_checked_at) {
        (Some(status), Some(checked)) if checked.date_naive() == today => (status, stored_days),
        _ => classify(expires_on, today),
    }
}

pub struct ScanScheduler {
    store: Arc<dyn DomainStore>,
    prober: Arc<dyn Prober>,
    dispatcher: Arc<dyn AlertDispatcher>,
    settings: ScanSettings,
    run_lock: Mutex<()>,
    shutdown: watch::Receiver<bool>,
}

impl ScanScheduler {
    pub fn new(
        store: Arc<dyn DomainStore>,
        prober: Arc<dyn Prober>,
        dispatcher: Arc<dyn AlertDispatcher>,
        settings: ScanSettings,
    ) -> Self {
        let (_tx, shutdown) = watch::channel(false);
        Self {
            store,
            prober,
            dispatcher,
            settings,
            run_lock: Mutex::new(()),
            shutdown,
        }
    }

    /// Stop between records once `true` is sent on this channel
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Probe every due record (or only `force_domain`, due or not)
    ///
    /// Probe and per-record store failures are counted in the report; only a
    /// store that cannot list records fails the run.
    pub async fn run_scheduled_scan(
        &self,
        now: DateTime<Utc>,
        force_domain: Option<&str>,
    ) -> Result<ScanReport, ScanError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            metrics::SCAN_RUNS_TOTAL.with_label_values(&["busy"]).inc();
            return Err(ScanError::RunInProgress);
        };

        let result = self.scan_locked(now, force_domain).await;
        let outcome = if result.is_ok() { "completed" } else { "failed" };
        metrics::SCAN_RUNS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    /// Alert pass on its own, without probing
    ///
    /// Days remaining are counted from `now`, not taken from the last probe.
    pub async fn run_alert_pass(&self, now: DateTime<Utc>) -> Result<AlertReport, ScanError> {
        let Ok(_guard) = self.run_lock.try_lock() else {
            return Err(ScanError::RunInProgress);
        };

        let candidates = self
            .store
            .find_alert_candidates()
            .await
            .map_err(ScanError::StoreUnavailable)?;
        Ok(self.alert_pass(candidates, now).await)
    }

    async fn scan_locked(
        &self,
        now: DateTime<Utc>,
        force_domain: Option<&str>,
    ) -> Result<ScanReport, ScanError> {
        let records = match force_domain {
            Some(domain) => {
                let host = normalize_host(domain);
                let record = self
                    .store
                    .find_by_domain(&host)
                    .await
                    .map_err(ScanError::StoreUnavailable)?
                    .ok_or_else(|| ScanError::DomainNotFound(host.clone()))?;
                info!("Forced scan of {}", record.domain);
                vec![record]
            }
            None => self
                .store
                .find_due(now)
                .await
                .map_err(ScanError::StoreUnavailable)?,
        };

        metrics::DOMAINS_DUE.set(records.len() as i64);
        let mut report = ScanReport {
            due: records.len(),
            ..Default::default()
        };

        if records.is_empty() {
            self.log_next_check().await;
        } else {
            info!("Scanning {} due domain(s)", records.len());
        }

        let outcomes: Vec<RecordOutcome> = stream::iter(records)
            .map(|record| self.scan_record(record, now))
            .buffer_unordered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RecordOutcome::Updated => report.updated += 1,
                RecordOutcome::ProbeFailed => report.probe_failures += 1,
                RecordOutcome::StoreFailed => report.store_failures += 1,
                RecordOutcome::Cancelled => report.cancelled += 1,
            }
        }

        if report.cancelled > 0 || self.shutdown_requested() {
            info!("Shutdown requested, skipping alert pass");
        } else {
            match self.store.find_alert_candidates().await {
                Ok(candidates) if !candidates.is_empty() => {
                    report.alerts = Some(self.alert_pass(candidates, now).await);
                }
                Ok(_) => debug!("No alert candidates"),
                Err(e) => {
                    error!("Failed to load alert candidates: {}", e);
                    report.store_failures += 1;
                }
            }
        }

        info!(
            "Scan run finished: {} due, {} updated, {} probe failure(s), {} store failure(s)",
            report.due, report.updated, report.probe_failures, report.store_failures
        );
        Ok(report)
    }

    async fn log_next_check(&self) {
        match self.store.find_next_scheduled().await {
            Ok(Some(next)) => info!(
                "No domains due; next check is {} at {}",
                next.domain,
                next.next_check_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            Ok(None) => info!("No domains registered"),
            Err(e) => warn!("Failed to look up next scheduled check: {}", e),
        }
    }

    async fn scan_record(&self, record: MonitoredDomain, now: DateTime<Utc>) -> RecordOutcome {
        if self.shutdown_requested() {
            return RecordOutcome::Cancelled;
        }

        let timer = metrics::PROBE_DURATION.start_timer();
        let probed = self.prober.probe(&record.domain, record.port).await;
        timer.observe_duration();

        let info = match probed {
            Ok(info) => {
                metrics::PROBES_TOTAL.with_label_values(&["success"]).inc();
                info
            }
            Err(e) => {
                metrics::PROBES_TOTAL.with_label_values(&["failure"]).inc();
                warn!("Probe of {}:{} failed: {}", record.domain, record.port, e);
                return RecordOutcome::ProbeFailed;
            }
        };

        let days_remaining = days_until(info.not_after, now);
        let status = status_for_days(days_remaining);
        let patch = DomainPatch {
            common_name: Some(info.common_name.clone()),
            valid_from: Some(info.valid_from()),
            valid_until: Some(info.valid_until()),
            days_remaining: Some(days_remaining),
            status: Some(status),
            last_checked_at: Some(now),
            next_check_at: Some(next_check_at(record.check_frequency, now)),
            notified: None,
            rearm_on_renewal: true,
        };

        match self.store.update_fields(record.id, &patch).await {
            Ok(()) => {
                info!("{}: {} ({} days remaining)", record.domain, status, days_remaining);
                RecordOutcome::Updated
            }
            Err(e) => {
                error!("Failed to store scan result for {}: {}", record.domain, e);
                RecordOutcome::StoreFailed
            }
        }
    }

    async fn alert_pass(&self, candidates: Vec<MonitoredDomain>, now: DateTime<Utc>) -> AlertReport {
        let mut report = AlertReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        let mut teams: HashMap<TeamId, Option<Team>> = HashMap::new();

        for record in candidates {
            if self.shutdown_requested() {
                report.cancelled += 1;
                continue;
            }

            let (Some(stored_days), Some(expires_on)) = (record.days_remaining, record.valid_until)
            else {
                debug!("{}: days remaining unknown, not alerting", record.domain);
                report.skipped += 1;
                continue;
            };
            let (status, days) = days_as_of(&record, stored_days, expires_on, now);

            let team = match record.team_id {
                Some(id) => match teams.get(&id) {
                    Some(cached) => cached.clone(),
                    None => match self.store.get_team(id).await {
                        Ok(team) => {
                            teams.insert(id, team.clone());
                            team
                        }
                        Err(e) => {
                            error!("Failed to load team {} for {}: {}", id, record.domain, e);
                            report.store_failures += 1;
                            continue;
                        }
                    },
                },
                None => None,
            };

            let threshold =
                effective_alert_days(&record, team.as_ref(), self.settings.default_alert_days);
            if days > i64::from(threshold) {
                debug!("{}: {} days left, threshold {}", record.domain, days, threshold);
                metrics::ALERTS_TOTAL.with_label_values(&["skipped"]).inc();
                report.skipped += 1;
                continue;
            }

            let team_emails = team.as_ref().map(|t| t.default_emails.as_slice()).unwrap_or(&[]);
            let payload = AlertPayload {
                domain: record.domain.clone(),
                common_name: record.common_name.clone(),
                expires_on,
                status,
                days_remaining: days,
                recipients: recipients::resolve(
                    &record.custom_emails,
                    team_emails,
                    &self.settings.default_sender,
                ),
            };

            if let Err(e) = self.dispatcher.send(&payload).await {
                metrics::ALERTS_TOTAL.with_label_values(&["failed"]).inc();
                warn!("Alert for {} not delivered: {:#}", record.domain, e);
                report.dispatch_failures += 1;
                continue;
            }

            metrics::ALERTS_TOTAL.with_label_values(&["delivered"]).inc();
            match self.store.update_fields(record.id, &DomainPatch::notified(true)).await {
                Ok(()) => {
                    info!("Alert sent for {} ({} days remaining)", record.domain, days);
                    report.delivered += 1;
                }
                Err(e) => {
                    error!("Alert sent for {} but marking it notified failed: {}", record.domain, e);
                    report.store_failures += 1;
                }
            }
        }

        info!(
            "Alert pass finished: {} candidate(s), {} delivered, {} failed, {} skipped",
            report.candidates, report.delivered, report.dispatch_failures, report.skipped
        );
        report
    }

    /// Run a scan every tick until shutdown is signalled
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.settings.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        // Without a live sender nobody can ask us to stop
        let mut watching = true;

        info!("Scheduler started (tick every {:?})", self.settings.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed(), if watching => {
                    match changed {
                        Ok(()) if *shutdown.borrow() => break,
                        Ok(()) => {}
                        Err(_) => watching = false,
                    }
                    continue;
                }
            }

            if self.shutdown_requested() {
                break;
            }

            match self.run_scheduled_scan(Utc::now(), None).await {
                Ok(report) if report.has_store_failures() => {
                    warn!("Scan run completed with store failures: {:?}", report);
                }
                Ok(_) => {}
                Err(ScanError::RunInProgress) => debug!("Previous run still in progress"),
                Err(e) => error!("Scan run failed: {}", e),
            }
        }

        info!("Scheduler stopped");
    }
}
