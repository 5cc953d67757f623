//! Intrusion detection over the audit trail.
//!
//! A signature pass, not a behavioural model: each rule looks for one known
//! pattern in the recorded entries and raises an [`Incident`].

use crate::audit::{AuditEntry, Component, Outcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Failed access attempts in a row that count as brute force.
pub const BRUTE_FORCE_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentKind {
    /// Activity by a watch-listed identity
    SuspiciousIdentity,
    BruteForce,
    /// Archive bytes deliberately modified
    DataTampering,
    /// Authenticated identity reaching beyond its role
    PrivilegeEscalation,
    /// Nothing to analyse
    SystemCheck,
}

impl IncidentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SuspiciousIdentity => "Suspicious identity",
            Self::BruteForce => "Brute force",
            Self::DataTampering => "Data tampering",
            Self::PrivilegeEscalation => "Privilege escalation",
            Self::SystemCheck => "System check",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub severity: IncidentSeverity,
    pub kind: IncidentKind,
    pub details: String,
    pub first_seen: Option<DateTime<Utc>>,
}

impl fmt::Display for Incident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.severity.as_str(),
            self.kind.as_str(),
            self.details
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntrusionDetector {
    watch_list: Vec<String>,
}

impl IntrusionDetector {
    pub fn new(watch_list: Vec<String>) -> Self {
        Self { watch_list }
    }

    /// Run every signature over `entries`, most severe incidents first.
    pub fn analyze(&self, entries: &[AuditEntry]) -> Vec<Incident> {
        if entries.is_empty() {
            return vec![Incident {
                severity: IncidentSeverity::Low,
                kind: IncidentKind::SystemCheck,
                details: "Audit trail is empty; nothing to analyse".to_owned(),
                first_seen: None,
            }];
        }

        let mut incidents = Vec::new();
        incidents.extend(self.watch_list_activity(entries));
        incidents.extend(brute_force(entries));
        incidents.extend(tampering(entries));
        incidents.extend(privilege_escalation(entries));

        // Stable, so equal severities keep trail order
        incidents.sort_by(|a, b| b.severity.cmp(&a.severity));
        incidents
    }

    fn watch_list_activity(&self, entries: &[AuditEntry]) -> Vec<Incident> {
        let mut hits: BTreeMap<&str, (usize, DateTime<Utc>)> = BTreeMap::new();

        for entry in entries {
            for watched in &self.watch_list {
                let by_identity = entry.identity.as_deref() == Some(watched.as_str());
                if by_identity || entry.message.contains(watched.as_str()) {
                    hits.entry(watched.as_str())
                        .and_modify(|(count, _)| *count += 1)
                        .or_insert((1, entry.timestamp));
                }
            }
        }

        hits.into_iter()
            .map(|(identity, (count, first_seen))| Incident {
                severity: IncidentSeverity::High,
                kind: IncidentKind::SuspiciousIdentity,
                details: format!("Watch-listed identity '{identity}' appears in {count} audit event(s)"),
                first_seen: Some(first_seen),
            })
            .collect()
    }
}

fn is_failed_access(entry: &AuditEntry) -> bool {
    entry.component == Component::Access
        && matches!(entry.outcome, Some(Outcome::Denied | Outcome::Unauthenticated))
}

fn brute_force(entries: &[AuditEntry]) -> Vec<Incident> {
    let mut incidents = Vec::new();
    let mut streak: Vec<&AuditEntry> = Vec::new();

    let mut close = |streak: &mut Vec<&AuditEntry>| {
        if streak.len() >= BRUTE_FORCE_THRESHOLD
            && let Some(first) = streak.first()
        {
            let mut identities: Vec<&str> = streak
                .iter()
                .filter_map(|entry| entry.identity.as_deref())
                .collect();
            identities.dedup();
            incidents.push(Incident {
                severity: IncidentSeverity::Critical,
                kind: IncidentKind::BruteForce,
                details: format!(
                    "{} consecutive failed access attempts ({})",
                    streak.len(),
                    identities.join(", ")
                ),
                first_seen: Some(first.timestamp),
            });
        }
        streak.clear();
    };

    for entry in entries.iter().filter(|e| e.component == Component::Access) {
        if is_failed_access(entry) {
            streak.push(entry);
        } else if entry.outcome == Some(Outcome::Granted) && entry.action.is_some() {
            // Only a granted action breaks the run; a successful login by the
            // attacker in between is still part of it
            close(&mut streak);
        }
    }
    close(&mut streak);

    incidents
}

fn tampering(entries: &[AuditEntry]) -> Vec<Incident> {
    entries
        .iter()
        .filter(|entry| entry.component == Component::Attack)
        .map(|entry| Incident {
            severity: IncidentSeverity::Critical,
            kind: IncidentKind::DataTampering,
            details: entry.message.clone(),
            first_seen: Some(entry.timestamp),
        })
        .collect()
}

fn privilege_escalation(entries: &[AuditEntry]) -> Vec<Incident> {
    entries
        .iter()
        .filter(|entry| entry.component == Component::Access && entry.outcome == Some(Outcome::Denied))
        .map(|entry| Incident {
            severity: IncidentSeverity::Medium,
            kind: IncidentKind::PrivilegeEscalation,
            details: entry.message.clone(),
            first_seen: Some(entry.timestamp),
        })
        .collect()
}

/// Render incidents as an operator report.
pub fn format_report(incidents: &[Incident]) -> String {
    incidents.iter().fold(
        format!("Intrusion detection report: {} incident(s)\n", incidents.len()),
        |mut out, incident| {
            out.push_str(&format!("  {incident}\n"));
            out
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{AccessController, Action};
    use crate::audit::Severity;

    #[test]
    fn test_empty_trail_is_system_check() {
        let incidents = IntrusionDetector::default().analyze(&[]);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, IncidentKind::SystemCheck);
        assert_eq!(incidents[0].severity, IncidentSeverity::Low);
    }

    #[test]
    fn test_brute_force_after_three_failures() {
        let controller = AccessController::default();
        for _ in 0..3 {
            controller.authorize("eve_hacker", Action::InjectFault);
        }

        let incidents = IntrusionDetector::default().analyze(&controller.audit().entries());
        assert_eq!(incidents[0].kind, IncidentKind::BruteForce);
        assert_eq!(incidents[0].severity, IncidentSeverity::Critical);
        assert!(incidents[0].details.contains("eve_hacker"));
    }

    #[test]
    fn test_granted_action_breaks_streak() {
        let controller = AccessController::default();
        controller.authorize("eve_hacker", Action::Scan);
        controller.authorize("eve_hacker", Action::Scan);
        controller.authorize("emanuele_admin", Action::Scan);
        controller.authorize("eve_hacker", Action::Scan);

        let incidents = IntrusionDetector::default().analyze(&controller.audit().entries());
        assert!(incidents.iter().all(|i| i.kind != IncidentKind::BruteForce));
    }

    #[test]
    fn test_privilege_escalation_and_watch_list() {
        let controller = AccessController::default();
        controller.authorize("charlie_user", Action::Archive);
        controller.authenticate("eve_hacker").unwrap_err();

        let detector = IntrusionDetector::new(vec!["eve_hacker".to_owned()]);
        let incidents = detector.analyze(&controller.audit().entries());

        assert!(incidents.iter().any(|i| i.kind == IncidentKind::PrivilegeEscalation
            && i.severity == IncidentSeverity::Medium
            && i.details.contains("charlie_user")));
        assert!(incidents.iter().any(|i| i.kind == IncidentKind::SuspiciousIdentity
            && i.severity == IncidentSeverity::High));
    }

    #[test]
    fn test_tampering_event_is_critical() {
        let entries = vec![AuditEntry::new(
            Component::Attack,
            Severity::Critical,
            "Archive payload for S2_L0_0001 overwritten",
        )];
        let incidents = IntrusionDetector::default().analyze(&entries);
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].kind, IncidentKind::DataTampering);

        let report = format_report(&incidents);
        assert!(report.contains("[CRITICAL] Data tampering"));
        assert_eq!(report.lines().count(), incidents.len() + 1);
    }
}
