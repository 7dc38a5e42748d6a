// src/types.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a stored domain record
pub type DomainId = i64;

/// Identifier of a team
pub type TeamId = i64;

/// Expiry status of a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Valid,
    Expiring,
    Expired,
}

impl CertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertStatus::Valid => "valid",
            CertStatus::Expiring => "expiring",
            CertStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for CertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "valid" => Ok(CertStatus::Valid),
            "expiring" => Ok(CertStatus::Expiring),
            "expired" => Ok(CertStatus::Expired),
            other => anyhow::bail!("unknown certificate status '{}'", other),
        }
    }
}

/// How often a domain's certificate is re-probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CheckFrequency {
    #[serde(rename = "1h")]
    Hourly,
    #[serde(rename = "2h")]
    TwoHours,
    #[serde(rename = "4h")]
    FourHours,
    #[serde(rename = "8h")]
    EightHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[default]
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
}

impl CheckFrequency {
    pub const ALL: [CheckFrequency; 8] = [
        CheckFrequency::Hourly,
        CheckFrequency::TwoHours,
        CheckFrequency::FourHours,
        CheckFrequency::EightHours,
        CheckFrequency::TwelveHours,
        CheckFrequency::Daily,
        CheckFrequency::Weekly,
        CheckFrequency::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckFrequency::Hourly => "1h",
            CheckFrequency::TwoHours => "2h",
            CheckFrequency::FourHours => "4h",
            CheckFrequency::EightHours => "8h",
            CheckFrequency::TwelveHours => "12h",
            CheckFrequency::Daily => "daily",
            CheckFrequency::Weekly => "weekly",
            CheckFrequency::Monthly => "monthly",
        }
    }

    /// Lenient parse: unknown or empty values fall back to daily
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "1h" => CheckFrequency::Hourly,
            "2h" => CheckFrequency::TwoHours,
            "4h" => CheckFrequency::FourHours,
            "8h" => CheckFrequency::EightHours,
            "12h" => CheckFrequency::TwelveHours,
            "weekly" => CheckFrequency::Weekly,
            "monthly" => CheckFrequency::Monthly,
            _ => CheckFrequency::Daily,
        }
    }
}

impl fmt::Display for CheckFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Team grouping with default alert settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    #[serde(default)]
    pub default_alert_days: Option<u32>,
    #[serde(default)]
    pub default_emails: Vec<String>,
}

/// One monitored domain and its last known certificate state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredDomain {
    pub id: DomainId,
    pub domain: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    #[serde(default)]
    pub days_remaining: Option<i64>,
    #[serde(default)]
    pub status: Option<CertStatus>,
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: DateTime<Utc>,
    #[serde(default)]
    pub check_frequency: CheckFrequency,
    #[serde(default)]
    pub notified: bool,
    #[serde(default)]
    pub custom_alert_days: Option<u32>,
    #[serde(default)]
    pub custom_emails: Vec<String>,
    #[serde(default)]
    pub team_id: Option<TeamId>,
}

fn default_port() -> u16 {
    443
}

impl MonitoredDomain {
    /// Blank record for `domain`, due immediately
    pub fn new(domain: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            domain: domain.into(),
            port: default_port(),
            common_name: String::new(),
            valid_from: None,
            valid_until: None,
            days_remaining: None,
            status: None,
            last_checked_at: None,
            next_check_at: now,
            check_frequency: CheckFrequency::default(),
            notified: false,
            custom_alert_days: None,
            custom_emails: Vec::new(),
            team_id: None,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_check_at <= now
    }

    /// Has a status and has not been alerted for the current validity window
    pub fn is_alert_candidate(&self) -> bool {
        self.status.is_some() && !self.notified
    }
}

/// Partial update of a domain record
///
/// Only `Some` fields are written. With `rearm_on_renewal` set, the store
/// resets `notified` to false in the same atomic write when the stored
/// `valid_until` differs from the patched one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DomainPatch {
    pub common_name: Option<String>,
    pub valid_from: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub days_remaining: Option<i64>,
    pub status: Option<CertStatus>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub next_check_at: Option<DateTime<Utc>>,
    pub notified: Option<bool>,
    pub rearm_on_renewal: bool,
}

impl DomainPatch {
    /// Patch that only flips the notified flag
    pub fn notified(value: bool) -> Self {
        Self {
            notified: Some(value),
            ..Default::default()
        }
    }

    /// Apply to an in-memory record using the same rules as the SQL backend
    pub fn apply_to(&self, record: &mut MonitoredDomain) {
        if self.rearm_on_renewal {
            if let Some(new_until) = self.valid_until {
                if record.valid_until != Some(new_until) {
                    record.notified = false;
                }
            }
        }
        if let Some(ref cn) = self.common_name {
            record.common_name = cn.clone();
        }
        if let Some(from) = self.valid_from {
            record.valid_from = Some(from);
        }
        if let Some(until) = self.valid_until {
            record.valid_until = Some(until);
        }
        if let Some(days) = self.days_remaining {
            record.days_remaining = Some(days);
        }
        if let Some(status) = self.status {
            record.status = Some(status);
        }
        if let Some(at) = self.last_checked_at {
            record.last_checked_at = Some(at);
        }
        if let Some(at) = self.next_check_at {
            record.next_check_at = at;
        }
        if let Some(notified) = self.notified {
            record.notified = notified;
        }
    }
}

/// Alert sent to dispatchers for one alert-eligible domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub domain: String,
    pub common_name: String,
    pub expires_on: NaiveDate,
    pub status: CertStatus,
    pub days_remaining: i64,
    pub recipients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(now: DateTime<Utc>) -> MonitoredDomain {
        let mut record = MonitoredDomain::new("example.com", now);
        record.valid_until = NaiveDate::from_ymd_opt(2025, 3, 1);
        record.notified = true;
        record
    }

    #[test]
    fn test_check_frequency_parse_lenient() {
        assert_eq!(CheckFrequency::parse_lenient("1h"), CheckFrequency::Hourly);
        assert_eq!(CheckFrequency::parse_lenient(" Weekly "), CheckFrequency::Weekly);
        assert_eq!(CheckFrequency::parse_lenient(""), CheckFrequency::Daily);
        assert_eq!(CheckFrequency::parse_lenient("fortnightly"), CheckFrequency::Daily);
        for freq in CheckFrequency::ALL {
            assert_eq!(CheckFrequency::parse_lenient(freq.as_str()), freq);
        }
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Expired".parse::<CertStatus>().unwrap(), CertStatus::Expired);
        assert!("revoked".parse::<CertStatus>().is_err());
    }

    #[test]
    fn test_patch_rearms_on_new_validity_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut record = sample(now);

        let patch = DomainPatch {
            valid_until: NaiveDate::from_ymd_opt(2025, 6, 1),
            rearm_on_renewal: true,
            ..Default::default()
        };
        patch.apply_to(&mut record);

        assert!(!record.notified);
        assert_eq!(record.valid_until, NaiveDate::from_ymd_opt(2025, 6, 1));
    }

    #[test]
    fn test_patch_keeps_notified_for_same_window() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut record = sample(now);

        let patch = DomainPatch {
            valid_until: NaiveDate::from_ymd_opt(2025, 3, 1),
            days_remaining: Some(59),
            rearm_on_renewal: true,
            ..Default::default()
        };
        patch.apply_to(&mut record);

        assert!(record.notified);
        assert_eq!(record.days_remaining, Some(59));
    }

    #[test]
    fn test_notified_patch_touches_only_flag() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let mut record = sample(now);
        record.notified = false;
        let before = record.clone();

        DomainPatch::notified(true).apply_to(&mut record);

        assert!(record.notified);
        assert_eq!(record.valid_until, before.valid_until);
        assert_eq!(record.next_check_at, before.next_check_at);
    }
}
