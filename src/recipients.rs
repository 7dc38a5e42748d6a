// src/recipients.rs
//! Alert recipient resolution
//!
//! Domain-level addresses come first, then the team defaults. Duplicates are
//! dropped case-insensitively and malformed addresses are discarded.

use lettre::Address;
use std::collections::HashSet;
use tracing::warn;

/// Split a comma/semicolon/whitespace separated address list
pub fn parse_list(raw: &str) -> Vec<String> {
    raw.split([',', ';', '\n', ' ', '\t'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// True if `addr` is a syntactically valid mailbox address
pub fn is_valid_address(addr: &str) -> bool {
    addr.parse::<Address>().is_ok()
}

/// Merge domain overrides with team defaults
///
/// Falls back to `fallback` when nothing valid remains.
pub fn resolve(domain_emails: &[String], team_emails: &[String], fallback: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();

    for addr in domain_emails.iter().chain(team_emails.iter()) {
        let addr = addr.trim();
        if addr.is_empty() {
            continue;
        }
        if !is_valid_address(addr) {
            warn!("Dropping malformed recipient address '{}'", addr);
            continue;
        }
        if seen.insert(addr.to_ascii_lowercase()) {
            resolved.push(addr.to_string());
        }
    }

    if resolved.is_empty() && !fallback.trim().is_empty() {
        resolved.push(fallback.trim().to_string());
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("a@example.com, b@example.com;c@example.com\n"),
            strings(&["a@example.com", "b@example.com", "c@example.com"])
        );
        assert!(parse_list(" , ;").is_empty());
    }

    #[test]
    fn test_resolve_dedupes_case_insensitively() {
        let domain = strings(&["Ops@Example.com", "dev@example.com"]);
        let team = strings(&["ops@example.com", "lead@example.com"]);

        let resolved = resolve(&domain, &team, "noreply@example.com");
        assert_eq!(
            resolved,
            strings(&["Ops@Example.com", "dev@example.com", "lead@example.com"])
        );
    }

    #[test]
    fn test_resolve_drops_invalid() {
        let domain = strings(&["not-an-address", "ok@example.com", "@missing.local"]);
        let resolved = resolve(&domain, &[], "noreply@example.com");
        assert_eq!(resolved, strings(&["ok@example.com"]));
    }

    #[test]
    fn test_resolve_falls_back_when_empty() {
        let resolved = resolve(&strings(&["bogus"]), &[], "noreply@example.com");
        assert_eq!(resolved, strings(&["noreply@example.com"]));

        assert!(resolve(&[], &[], "").is_empty());
    }
}
