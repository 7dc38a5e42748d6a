// Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use cert_patrol::cert_parser::CertInfo;
use cert_patrol::dispatch::AlertDispatcher;
use cert_patrol::error::{ProbeError, StoreError};
use cert_patrol::plan::PlanGate;
use cert_patrol::probe::Prober;
use cert_patrol::store::{DomainStore, FileStore, Registration};
use cert_patrol::types::{AlertPayload, DomainId, DomainPatch, MonitoredDomain, Team, TeamId};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fixed "now" used across tests
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// Certificate valid from 60 days ago until `not_after`
pub fn cert(common_name: &str, not_after: DateTime<Utc>) -> CertInfo {
    CertInfo {
        common_name: common_name.to_string(),
        not_before: not_after - Duration::days(90),
        not_after,
        issuer: Some("Test CA".to_string()),
        fingerprint: "00".repeat(32),
    }
}

/// Prober answering from a script keyed by host
pub struct ScriptedProber {
    answers: Mutex<HashMap<String, Result<CertInfo, ProbeError>>>,
    calls: Mutex<Vec<String>>,
    delay: Option<std::time::Duration>,
}

impl ScriptedProber {
    pub fn new() -> Self {
        Self {
            answers: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Every probe sleeps this long before answering
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn answer(&self, host: &str, result: Result<CertInfo, ProbeError>) {
        self.answers.lock().unwrap().insert(host.to_string(), result);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, host: &str, _port: u16) -> Result<CertInfo, ProbeError> {
        self.calls.lock().unwrap().push(host.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answers
            .lock()
            .unwrap()
            .get(host)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProbeError::Dns {
                    host: host.to_string(),
                    reason: "not scripted".to_string(),
                })
            })
    }
}

/// Dispatcher that records payloads and can be switched to failing
pub struct RecordingDispatcher {
    sent: Mutex<Vec<AlertPayload>>,
    attempts: AtomicUsize,
    fail: AtomicBool,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<AlertPayload> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertDispatcher for RecordingDispatcher {
    async fn send(&self, payload: &AlertPayload) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("smtp unreachable");
        }
        self.sent.lock().unwrap().push(payload.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// FileStore wrapper that can be made to fail selected operations
pub struct FlakyStore {
    inner: FileStore,
    fail_listing: AtomicBool,
    fail_updates_for: Mutex<HashSet<DomainId>>,
}

impl FlakyStore {
    pub fn new(inner: FileStore) -> Self {
        Self {
            inner,
            fail_listing: AtomicBool::new(false),
            fail_updates_for: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn fail_updates_for(&self, id: DomainId) {
        self.fail_updates_for.lock().unwrap().insert(id);
    }

    fn unavailable() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk gone"))
    }
}

#[async_trait]
impl DomainStore for FlakyStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredDomain>, StoreError> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.inner.find_due(now).await
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<MonitoredDomain>, StoreError> {
        self.inner.find_by_domain(domain).await
    }

    async fn find_all(&self) -> Result<Vec<MonitoredDomain>, StoreError> {
        self.inner.find_all().await
    }

    async fn find_next_scheduled(&self) -> Result<Option<MonitoredDomain>, StoreError> {
        self.inner.find_next_scheduled().await
    }

    async fn upsert(&self, record: MonitoredDomain) -> Result<MonitoredDomain, StoreError> {
        self.inner.upsert(record).await
    }

    async fn update_fields(&self, id: DomainId, patch: &DomainPatch) -> Result<(), StoreError> {
        if self.fail_updates_for.lock().unwrap().contains(&id) {
            return Err(Self::unavailable());
        }
        self.inner.update_fields(id, patch).await
    }

    async fn find_alert_candidates(&self) -> Result<Vec<MonitoredDomain>, StoreError> {
        self.inner.find_alert_candidates().await
    }

    async fn get_team(&self, id: TeamId) -> Result<Option<Team>, StoreError> {
        self.inner.get_team(id).await
    }

    async fn upsert_team(&self, team: Team) -> Result<Team, StoreError> {
        self.inner.upsert_team(team).await
    }

    async fn register(
        &self,
        record: MonitoredDomain,
        gate: &dyn PlanGate,
    ) -> Result<Registration, StoreError> {
        self.inner.register(record, gate).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Record due at `now`, with the given frequency
pub fn due_record(domain: &str) -> MonitoredDomain {
    MonitoredDomain::new(domain, now())
}
