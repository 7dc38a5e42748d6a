// src/store/mod.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::plan::PlanGate;
use crate::types::{DomainId, DomainPatch, MonitoredDomain, Team, TeamId};

pub mod file;
pub mod postgres;

pub use file::FileStore;
pub use postgres::PostgresStore;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(MonitoredDomain),
    Updated(MonitoredDomain),
    Denied { reason: String },
}

/// Persistence for monitored domains and teams
///
/// Every method is a single atomic operation against the backing store;
/// `update_fields` in particular applies its patch (including the renewal
/// re-arm rule) without a separate read.
#[async_trait]
pub trait DomainStore: Send + Sync {
    /// Records whose `next_check_at <= now`, oldest first
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredDomain>>;

    /// Case-insensitive lookup by domain
    async fn find_by_domain(&self, domain: &str) -> Result<Option<MonitoredDomain>>;

    async fn find_all(&self) -> Result<Vec<MonitoredDomain>>;

    /// Record with the earliest `next_check_at`
    async fn find_next_scheduled(&self) -> Result<Option<MonitoredDomain>>;

    /// Insert, or replace the record with the same domain (keeping its id)
    async fn upsert(&self, record: MonitoredDomain) -> Result<MonitoredDomain>;

    async fn update_fields(&self, id: DomainId, patch: &DomainPatch) -> Result<()>;

    /// Records with a status that have not been notified yet
    async fn find_alert_candidates(&self) -> Result<Vec<MonitoredDomain>>;

    async fn get_team(&self, id: TeamId) -> Result<Option<Team>>;

    async fn upsert_team(&self, team: Team) -> Result<Team>;

    /// Create or refresh a record, consulting `gate` for new domains
    ///
    /// The free-slot counter, the domain count and the insert happen in one
    /// transaction.
    async fn register(&self, record: MonitoredDomain, gate: &dyn PlanGate) -> Result<Registration>;

    /// Health check
    async fn ping(&self) -> Result<()>;
}

/// Fold a fresh registration into the stored record for the same domain
///
/// Keeps the stored id; `notified` survives only while the validity window is
/// unchanged.
pub fn merge_registration(existing: &MonitoredDomain, incoming: MonitoredDomain) -> MonitoredDomain {
    let renewed = incoming.valid_until != existing.valid_until;
    MonitoredDomain {
        id: existing.id,
        notified: if renewed { false } else { existing.notified },
        ..incoming
    }
}
