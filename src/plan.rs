// src/plan.rs
//! Plan limits consulted before a new domain record is created
//!
//! Scanning already-registered domains never goes through the gate.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::PlanConfig;
use crate::license;

/// Counters read inside the registration transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlanUsage {
    pub existing_domains: usize,
    pub free_used: bool,
}

/// Capability check: may this domain be added?
pub trait PlanGate: Send + Sync {
    fn can_add_domain(&self, usage: PlanUsage, is_new_domain: bool) -> bool;

    /// Whether a successful insert consumes the one-time free slot
    fn consumes_free_slot(&self) -> bool {
        false
    }

    /// Human-readable limit, for error messages
    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// One domain per installation, never again once used
    Free,
    /// Up to `max_domains`, unbounded when `None`
    Pro { max_domains: Option<usize> },
}

impl Plan {
    /// Resolve the plan in effect at `now`
    ///
    /// `tier = "pro"` only takes effect with a license signed by the configured
    /// public key that has not expired; anything else falls back to free.
    /// A configured `max_domains` can lower the licensed cap but never raise it.
    pub fn from_config(cfg: &PlanConfig, now: DateTime<Utc>) -> anyhow::Result<Self> {
        match cfg.tier.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Self::from_license(cfg, now)),
            other => anyhow::bail!("Invalid plan tier '{}'. Must be 'free' or 'pro'", other),
        }
    }

    fn from_license(cfg: &PlanConfig, now: DateTime<Utc>) -> Self {
        let (Some(token), Some(public_key)) = (&cfg.license, &cfg.public_key) else {
            warn!("Pro tier configured without license and public_key, using free plan");
            return Plan::Free;
        };

        let license = match license::verify(token, public_key) {
            Ok(license) => license,
            Err(e) => {
                warn!("License rejected ({:#}), using free plan", e);
                return Plan::Free;
            }
        };

        if license.is_expired(now) {
            warn!("License expired, using free plan");
            return Plan::Free;
        }
        if !license.is_pro() {
            return Plan::Free;
        }

        let licensed = license.max_domains();
        let max = cfg.max_domains.map_or(licensed, |n| n.clamp(1, licensed));
        info!(
            "Pro license{} accepted for {} domains",
            license.name.map(|n| format!(" for {}", n)).unwrap_or_default(),
            max
        );
        Plan::Pro {
            max_domains: Some(max),
        }
    }
}

impl PlanGate for Plan {
    fn can_add_domain(&self, usage: PlanUsage, is_new_domain: bool) -> bool {
        if !is_new_domain {
            return true;
        }
        match self {
            Plan::Free => !usage.free_used && usage.existing_domains == 0,
            Plan::Pro { max_domains: None } => true,
            Plan::Pro { max_domains: Some(max) } => usage.existing_domains < *max,
        }
    }

    fn consumes_free_slot(&self) -> bool {
        matches!(self, Plan::Free)
    }

    fn describe(&self) -> String {
        match self {
            Plan::Free => "free plan allows a single domain per installation".to_string(),
            Plan::Pro { max_domains: None } => "pro plan (unlimited domains)".to_string(),
            Plan::Pro { max_domains: Some(max) } => format!("pro plan allows {} domains", max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::license::test_support::{key_pair, public_key, sign};

    fn usage(existing: usize, free_used: bool) -> PlanUsage {
        PlanUsage {
            existing_domains: existing,
            free_used,
        }
    }

    #[test]
    fn test_free_plan_allows_first_domain_only() {
        let plan = Plan::Free;
        assert!(plan.can_add_domain(usage(0, false), true));
        assert!(!plan.can_add_domain(usage(1, false), true));
        // Slot burned even after the domain was removed
        assert!(!plan.can_add_domain(usage(0, true), true));
    }

    #[test]
    fn test_existing_domain_always_allowed() {
        assert!(Plan::Free.can_add_domain(usage(1, true), false));
        let pro = Plan::Pro { max_domains: Some(1) };
        assert!(pro.can_add_domain(usage(5, false), false));
    }

    #[test]
    fn test_pro_plan_limit() {
        let pro = Plan::Pro { max_domains: Some(3) };
        assert!(pro.can_add_domain(usage(2, true), true));
        assert!(!pro.can_add_domain(usage(3, true), true));

        let unlimited = Plan::Pro { max_domains: None };
        assert!(unlimited.can_add_domain(usage(10_000, true), true));
        assert!(!unlimited.consumes_free_slot());
    }

    fn now() -> DateTime<Utc> {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn pro_config(license: Option<String>, public_key: Option<String>) -> PlanConfig {
        PlanConfig {
            tier: "PRO".to_string(),
            max_domains: None,
            license,
            public_key,
        }
    }

    #[test]
    fn test_pro_tier_without_license_is_free() {
        assert_eq!(Plan::from_config(&pro_config(None, None), now()).unwrap(), Plan::Free);
    }

    #[test]
    fn test_pro_tier_with_signed_license() {
        let keys = key_pair(9);
        let license = sign(&keys, r#"{"tier":"pro","max_sites":50,"exp":"2026-01-01T00:00:00Z"}"#);
        let mut cfg = pro_config(Some(license), Some(public_key(&keys)));

        let plan = Plan::from_config(&cfg, now()).unwrap();
        assert_eq!(plan, Plan::Pro { max_domains: Some(50) });

        // Config may lower the licensed cap, not raise it
        cfg.max_domains = Some(10);
        assert_eq!(Plan::from_config(&cfg, now()).unwrap(), Plan::Pro { max_domains: Some(10) });
        cfg.max_domains = Some(500);
        assert_eq!(Plan::from_config(&cfg, now()).unwrap(), Plan::Pro { max_domains: Some(50) });
    }

    #[test]
    fn test_expired_or_forged_license_is_free() {
        let keys = key_pair(9);
        let expired = sign(&keys, r#"{"tier":"pro","exp":"2025-01-01T00:00:00Z"}"#);
        let cfg = pro_config(Some(expired), Some(public_key(&keys)));
        assert_eq!(Plan::from_config(&cfg, now()).unwrap(), Plan::Free);

        let forged = sign(&key_pair(1), r#"{"tier":"pro"}"#);
        let cfg = pro_config(Some(forged), Some(public_key(&keys)));
        assert_eq!(Plan::from_config(&cfg, now()).unwrap(), Plan::Free);

        let free_terms = sign(&keys, r#"{"tier":"free","max_sites":20}"#);
        let cfg = pro_config(Some(free_terms), Some(public_key(&keys)));
        assert_eq!(Plan::from_config(&cfg, now()).unwrap(), Plan::Free);
    }

    #[test]
    fn test_unknown_tier_rejected() {
        let cfg = PlanConfig {
            tier: "enterprise".to_string(),
            ..PlanConfig::default()
        };
        assert!(Plan::from_config(&cfg, now()).is_err());
    }
}
