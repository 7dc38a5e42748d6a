// src/registration.rs
//! Adding a domain to the monitored set
//!
//! A domain is only stored after a successful probe, so every record starts
//! with a known validity window.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::classify::{days_until, status_for_days};
use crate::error::{ProbeError, RegistrationError};
use crate::plan::PlanGate;
use crate::probe::{Prober, normalize_host};
use crate::recipients;
use crate::schedule::next_check_at;
use crate::store::{DomainStore, Registration};
use crate::types::{CheckFrequency, MonitoredDomain, TeamId};

#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    pub domain: String,
    pub port: Option<u16>,
    pub team_id: Option<TeamId>,
    pub check_frequency: CheckFrequency,
    pub custom_alert_days: Option<u32>,
    pub custom_emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationOutcome {
    pub record: MonitoredDomain,
    /// False when an existing record was refreshed
    pub created: bool,
}

pub struct Registrar {
    store: Arc<dyn DomainStore>,
    prober: Arc<dyn Prober>,
    gate: Arc<dyn PlanGate>,
    default_port: u16,
}

impl Registrar {
    pub fn new(
        store: Arc<dyn DomainStore>,
        prober: Arc<dyn Prober>,
        gate: Arc<dyn PlanGate>,
        default_port: u16,
    ) -> Self {
        Self {
            store,
            prober,
            gate,
            default_port,
        }
    }

    /// Probe the domain and create or refresh its record
    pub async fn register(
        &self,
        request: RegistrationRequest,
        now: DateTime<Utc>,
    ) -> Result<RegistrationOutcome, RegistrationError> {
        let host = normalize_host(&request.domain);
        if host.is_empty() {
            return Err(RegistrationError::Probe {
                domain: request.domain.clone(),
                source: ProbeError::InvalidHost(request.domain),
            });
        }
        let port = request.port.unwrap_or(self.default_port);

        let info = self
            .prober
            .probe(&host, port)
            .await
            .map_err(|source| RegistrationError::Probe {
                domain: host.clone(),
                source,
            })?;

        if let Some(team_id) = request.team_id {
            if self.store.get_team(team_id).await?.is_none() {
                return Err(RegistrationError::UnknownTeam(team_id));
            }
        }

        let days_remaining = days_until(info.not_after, now);
        let record = MonitoredDomain {
            id: 0,
            domain: host.clone(),
            port,
            common_name: info.common_name.clone(),
            valid_from: Some(info.valid_from()),
            valid_until: Some(info.valid_until()),
            days_remaining: Some(days_remaining),
            status: Some(status_for_days(days_remaining)),
            last_checked_at: Some(now),
            next_check_at: next_check_at(request.check_frequency, now),
            check_frequency: request.check_frequency,
            notified: false,
            custom_alert_days: request.custom_alert_days,
            custom_emails: recipients::resolve(&request.custom_emails, &[], ""),
            team_id: request.team_id,
        };

        match self.store.register(record, self.gate.as_ref()).await? {
            Registration::Created(record) => {
                info!("Registered {} ({} days remaining)", record.domain, days_remaining);
                Ok(RegistrationOutcome {
                    record,
                    created: true,
                })
            }
            Registration::Updated(record) => {
                info!("Refreshed existing record for {}", record.domain);
                Ok(RegistrationOutcome {
                    record,
                    created: false,
                })
            }
            Registration::Denied { reason } => Err(RegistrationError::PlanLimitReached(reason)),
        }
    }
}
