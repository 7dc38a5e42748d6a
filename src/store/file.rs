// src/store/file.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use super::{DomainStore, Registration, Result, merge_registration};
use crate::error::StoreError;
use crate::plan::{PlanGate, PlanUsage};
use crate::types::{DomainId, DomainPatch, MonitoredDomain, Team, TeamId};

/// Everything the file store persists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    next_domain_id: DomainId,
    #[serde(default)]
    free_used: bool,
    #[serde(default)]
    domains: Vec<MonitoredDomain>,
    #[serde(default)]
    teams: Vec<Team>,
}

impl Snapshot {
    fn position(&self, domain: &str) -> Option<usize> {
        self.domains
            .iter()
            .position(|d| d.domain.eq_ignore_ascii_case(domain))
    }

    fn insert(&mut self, mut record: MonitoredDomain) -> MonitoredDomain {
        self.next_domain_id += 1;
        record.id = self.next_domain_id;
        self.domains.push(record.clone());
        record
    }
}

/// Domain store persisted to a TOML file
///
/// Several processes may share one state file (the daemon plus `add` or
/// `team` invocations). Every operation takes an advisory lock on a sibling
/// `.lock` file and reloads the snapshot from disk first; mutations are
/// applied to that fresh copy, written out (temp file + rename) and only then
/// published, all while the exclusive lock is held. Without a path the store
/// is memory-only.
pub struct FileStore {
    path: Option<PathBuf>,
    state: Arc<Mutex<Snapshot>>,
}

async fn load(path: &Path) -> Result<Snapshot> {
    if !fs::try_exists(path).await? {
        return Ok(Snapshot::default());
    }
    let contents = fs::read_to_string(path).await?;
    if contents.trim().is_empty() {
        return Ok(Snapshot::default());
    }
    Ok(toml::from_str(&contents)?)
}

/// Block (off the runtime) until the advisory lock beside `path` is held
///
/// The lock is released when the returned file is dropped.
async fn lock_beside(path: &Path, exclusive: bool) -> Result<File> {
    let lock_path = path.with_extension("lock");
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        if exclusive {
            FileExt::lock_exclusive(&file)?;
        } else {
            FileExt::lock_shared(&file)?;
        }
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)??;
    Ok(file)
}

impl FileStore {
    /// Open the store at `path`, loading existing state if the file exists
    pub async fn open(path: PathBuf) -> Result<Self> {
        let snapshot = {
            let _lock = lock_beside(&path, false).await?;
            load(&path).await?
        };

        if snapshot.domains.is_empty() && snapshot.teams.is_empty() {
            info!("No domain state in {:?} yet, starting fresh", path);
        } else {
            info!(
                "Loaded {} domains and {} teams from {:?}",
                snapshot.domains.len(),
                snapshot.teams.len(),
                path
            );
        }

        Ok(Self {
            path: Some(path),
            state: Arc::new(Mutex::new(snapshot)),
        })
    }

    /// Memory-only store, nothing is written to disk
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            state: Arc::new(Mutex::new(Snapshot::default())),
        }
    }

    async fn persist(path: &Path, snapshot: &Snapshot) -> Result<()> {
        let toml_string = toml::to_string(snapshot)?;

        // Write to temporary file first, then rename for atomicity
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, toml_string).await?;
        fs::rename(&temp_path, path).await?;

        debug!("Saved {} domains to {:?}", snapshot.domains.len(), path);
        Ok(())
    }

    /// Latest state, reloaded from disk under a shared lock
    async fn current(&self) -> Result<MutexGuard<'_, Snapshot>> {
        let mut state = self.state.lock().await;
        if let Some(ref path) = self.path {
            let _lock = lock_beside(path, false).await?;
            *state = load(path).await?;
        }
        Ok(state)
    }

    /// Run `mutate` on the latest state, persist it, then publish it
    async fn transact<T>(&self, mutate: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock().await;

        let Some(ref path) = self.path else {
            let mut next = state.clone();
            let out = mutate(&mut next)?;
            *state = next;
            return Ok(out);
        };

        let _lock = lock_beside(path, true).await?;
        let mut next = load(path).await?;
        let out = mutate(&mut next)?;
        Self::persist(path, &next).await?;
        *state = next;
        Ok(out)
    }
}

impl Clone for FileStore {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl DomainStore for FileStore {
    async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredDomain>> {
        let state = self.current().await?;
        let mut due: Vec<_> = state
            .domains
            .iter()
            .filter(|d| d.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|d| (d.next_check_at, d.id));
        Ok(due)
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<MonitoredDomain>> {
        let state = self.current().await?;
        Ok(state.position(domain).map(|i| state.domains[i].clone()))
    }

    async fn find_all(&self) -> Result<Vec<MonitoredDomain>> {
        let state = self.current().await?;
        Ok(state.domains.clone())
    }

    async fn find_next_scheduled(&self) -> Result<Option<MonitoredDomain>> {
        let state = self.current().await?;
        Ok(state
            .domains
            .iter()
            .min_by_key(|d| (d.next_check_at, d.id))
            .cloned())
    }

    async fn upsert(&self, record: MonitoredDomain) -> Result<MonitoredDomain> {
        self.transact(|snap| match snap.position(&record.domain) {
            Some(i) => {
                let updated = MonitoredDomain {
                    id: snap.domains[i].id,
                    ..record
                };
                snap.domains[i] = updated.clone();
                Ok(updated)
            }
            None => Ok(snap.insert(record)),
        })
        .await
    }

    async fn update_fields(&self, id: DomainId, patch: &DomainPatch) -> Result<()> {
        self.transact(|snap| {
            let record = snap
                .domains
                .iter_mut()
                .find(|d| d.id == id)
                .ok_or(StoreError::NotFound(id))?;
            patch.apply_to(record);
            Ok(())
        })
        .await
    }

    async fn find_alert_candidates(&self) -> Result<Vec<MonitoredDomain>> {
        let state = self.current().await?;
        Ok(state
            .domains
            .iter()
            .filter(|d| d.is_alert_candidate())
            .cloned()
            .collect())
    }

    async fn get_team(&self, id: TeamId) -> Result<Option<Team>> {
        let state = self.current().await?;
        Ok(state.teams.iter().find(|t| t.id == id).cloned())
    }

    async fn upsert_team(&self, team: Team) -> Result<Team> {
        self.transact(|snap| {
            match snap.teams.iter_mut().find(|t| t.id == team.id) {
                Some(existing) => *existing = team.clone(),
                None => snap.teams.push(team.clone()),
            }
            Ok(team)
        })
        .await
    }

    async fn register(&self, record: MonitoredDomain, gate: &dyn PlanGate) -> Result<Registration> {
        self.transact(|snap| {
            if let Some(i) = snap.position(&record.domain) {
                let merged = merge_registration(&snap.domains[i], record);
                snap.domains[i] = merged.clone();
                return Ok(Registration::Updated(merged));
            }

            let usage = PlanUsage {
                existing_domains: snap.domains.len(),
                free_used: snap.free_used,
            };
            if !gate.can_add_domain(usage, true) {
                return Ok(Registration::Denied {
                    reason: gate.describe(),
                });
            }

            let created = snap.insert(record);
            if gate.consumes_free_slot() {
                snap.free_used = true;
            }
            Ok(Registration::Created(created))
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
