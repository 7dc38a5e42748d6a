// src/schedule.rs
//! Next-check scheduling policy

use chrono::{DateTime, Duration, Utc};

use crate::types::CheckFrequency;

/// Re-probe interval for a frequency
pub fn interval(frequency: CheckFrequency) -> Duration {
    match frequency {
        CheckFrequency::Hourly => Duration::hours(1),
        CheckFrequency::TwoHours => Duration::hours(2),
        CheckFrequency::FourHours => Duration::hours(4),
        CheckFrequency::EightHours => Duration::hours(8),
        CheckFrequency::TwelveHours => Duration::hours(12),
        CheckFrequency::Daily => Duration::days(1),
        CheckFrequency::Weekly => Duration::days(7),
        CheckFrequency::Monthly => Duration::days(30),
    }
}

/// Timestamp of the next check for a probe performed at `from`
pub fn next_check_at(frequency: CheckFrequency, from: DateTime<Utc>) -> DateTime<Utc> {
    from + interval(frequency)
}

/// Same as [`next_check_at`] for a raw frequency string (unknown → daily)
pub fn next_check_at_str(frequency: &str, from: DateTime<Utc>) -> DateTime<Utc> {
    next_check_at(CheckFrequency::parse_lenient(frequency), from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_check_table() {
        let t = Utc.with_ymd_and_hms(2025, 2, 28, 23, 30, 0).unwrap();
        let table = [
            ("1h", Duration::hours(1)),
            ("2h", Duration::hours(2)),
            ("4h", Duration::hours(4)),
            ("8h", Duration::hours(8)),
            ("12h", Duration::hours(12)),
            ("daily", Duration::days(1)),
            ("weekly", Duration::days(7)),
            ("monthly", Duration::days(30)),
        ];
        for (name, delta) in table {
            assert_eq!(next_check_at_str(name, t), t + delta, "{}", name);
        }
    }

    #[test]
    fn test_next_check_strictly_after_from() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        for freq in CheckFrequency::ALL {
            assert!(next_check_at(freq, t) > t, "{}", freq);
        }
    }

    #[test]
    fn test_unknown_frequency_defaults_to_daily() {
        let t = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(next_check_at_str("", t), t + Duration::days(1));
        assert_eq!(next_check_at_str("every-tuesday", t), t + Duration::days(1));
    }
}
