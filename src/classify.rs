// src/classify.rs
//! Certificate status classification
//!
//! Thresholds are fixed and independent of any per-domain alert threshold.

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::CertStatus;

/// Upper bound (inclusive) of days remaining classified as expiring
pub const EXPIRING_THRESHOLD_DAYS: i64 = 15;

const SECS_PER_DAY: i64 = 86_400;

/// Map a days-remaining count to its status
pub fn status_for_days(days_remaining: i64) -> CertStatus {
    if days_remaining < 0 {
        CertStatus::Expired
    } else if days_remaining <= EXPIRING_THRESHOLD_DAYS {
        CertStatus::Expiring
    } else {
        CertStatus::Valid
    }
}

/// Classify a certificate by its expiry date relative to `today`
pub fn classify(valid_until: NaiveDate, today: NaiveDate) -> (CertStatus, i64) {
    let days = (valid_until - today).num_days();
    (status_for_days(days), days)
}

/// Whole days between `now` and `not_after`
///
/// Partial days are dropped towards negative infinity, so a certificate that
/// expired an hour ago reports -1 rather than 0.
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(SECS_PER_DAY)
}
