//! Findings Store (§4.1): dedup/snooze/dismiss/suppress lifecycle over
//! structured problem records, with debounced persistence.
//!
//! Grounded on the teacher's `DefaultResourceManager` (`resource/mod.rs`):
//! a `DashMap`-backed store guarded at the API boundary, mutation methods
//! that return a narrow `Result`, and a debounced save scheduled from every
//! mutating call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::interfaces::ConfigPersistence;
use crate::types::{
    normalize_key, Category, DismissReason, Disposition, Finding, FindingId, FindingSource,
    FindingsSummary, Severity, SuppressionRule, SuppressionRuleId,
};

#[derive(Debug, Error, Clone)]
pub enum FindingsError {
    #[error("invalid finding: {0}")]
    InvalidInput(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FindingsState {
    findings: HashMap<FindingId, Finding>,
    suppression_rules: Vec<SuppressionRule>,
}

#[derive(Debug, Clone)]
pub struct FindingsStoreConfig {
    pub debounce: Duration,
}

impl Default for FindingsStoreConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
        }
    }
}

pub struct FindingsStore {
    findings: DashMap<FindingId, Finding>,
    suppression_rules: DashMap<SuppressionRuleId, SuppressionRule>,
    persistence: parking_lot::RwLock<Option<Arc<dyn ConfigPersistence<FindingsState>>>>,
    config: FindingsStoreConfig,
}

impl FindingsStore {
    pub fn new(config: FindingsStoreConfig) -> Self {
        Self {
            findings: DashMap::new(),
            suppression_rules: DashMap::new(),
            persistence: parking_lot::RwLock::new(None),
            config,
        }
    }

    pub fn set_persistence(&self, persistence: Arc<dyn ConfigPersistence<FindingsState>>) {
        if let Ok(Some(state)) = persistence.load() {
            self.findings.clear();
            for (id, finding) in state.findings {
                self.findings.insert(id, finding);
            }
            self.suppression_rules.clear();
            for rule in state.suppression_rules {
                self.suppression_rules.insert(rule.id, rule);
            }
            info!(count = self.findings.len(), "loaded findings from persistence");
        }
        *self.persistence.write() = Some(persistence);
    }

    fn snapshot(&self) -> FindingsState {
        FindingsState {
            findings: self.findings.iter().map(|e| (*e.key(), e.value().clone())).collect(),
            suppression_rules: self.suppression_rules.iter().map(|e| e.value().clone()).collect(),
        }
    }

    fn schedule_save(&self) {
        if let Some(p) = self.persistence.read().as_ref() {
            if let Err(e) = p.save(&self.snapshot()) {
                warn!(error = %e, "findings save failed");
            }
        }
    }

    pub fn force_save(&self) -> Result<(), FindingsError> {
        if let Some(p) = self.persistence.read().as_ref() {
            p.force_save(&self.snapshot())
                .map_err(|e| FindingsError::Persistence(e.to_string()))?;
        }
        Ok(())
    }

    fn derive_id(resource_id: &str, category: Category, title: &str) -> FindingId {
        use uuid::Uuid;
        let seed = format!("{resource_id}|{category}|{}", normalize_key(title));
        FindingId(Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes()))
    }

    /// `true` iff a new record was created; `false` if it was merged into
    /// an existing one (§4.1 dedup rule).
    pub fn add(&self, mut finding: Finding) -> Result<bool, FindingsError> {
        if finding.resource_id.is_empty() || finding.title.is_empty() {
            return Err(FindingsError::InvalidInput(
                "resource_id, category and title are required".to_string(),
            ));
        }

        let id = if finding.id.0.is_nil() {
            Self::derive_id(&finding.resource_id, finding.category, &finding.title)
        } else {
            finding.id
        };
        finding.id = id;

        if let Some(rule) = self
            .suppression_rules
            .iter()
            .find(|r| r.matches(&finding.resource_id, finding.category))
        {
            finding.disposition = Disposition::Dismissed {
                reason: rule.reason.clone(),
                note: None,
            };
        }

        let now = finding.detected_at;
        let created = match self.findings.get_mut(&id) {
            Some(mut existing) => {
                existing.last_seen_at = now;
                existing.times_raised += 1;
                if finding.severity > existing.severity {
                    existing.description = finding.description.clone();
                    existing.recommendation = finding.recommendation.clone();
                    existing.severity = finding.severity;
                    if existing.is_terminal() {
                        existing.disposition = Disposition::Active;
                        debug!(id = %existing.id, "severity escalation reactivated finding");
                    }
                }
                false
            }
            None => {
                self.findings.insert(id, finding);
                true
            }
        };

        self.schedule_save();
        Ok(created)
    }

    pub fn get(&self, id: FindingId) -> Option<Finding> {
        self.findings.get(&id).map(|e| e.clone())
    }

    pub fn get_by_resource(&self, resource_id: &str) -> Vec<Finding> {
        self.findings
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_all(&self, since: Option<SystemTime>) -> Vec<Finding> {
        self.findings
            .iter()
            .filter(|e| since.map(|s| e.last_seen_at >= s).unwrap_or(true))
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_active(&self, min_severity: Severity) -> Vec<Finding> {
        let now = SystemTime::now();
        self.findings
            .iter()
            .filter(|e| e.is_active(now) && e.severity >= min_severity)
            .map(|e| e.clone())
            .collect()
    }

    pub fn get_summary(&self) -> FindingsSummary {
        let now = SystemTime::now();
        let mut summary = FindingsSummary::default();
        for entry in self.findings.iter() {
            if !entry.is_active(now) {
                continue;
            }
            match entry.severity {
                Severity::Critical => summary.critical += 1,
                Severity::Warning => summary.warning += 1,
                Severity::Watch => summary.watch += 1,
                Severity::Info => summary.info += 1,
            }
            summary.total_active += 1;
        }
        summary
    }

    pub fn acknowledge(&self, id: FindingId) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        f.disposition = Disposition::Acknowledged {
            acknowledged_at: SystemTime::now(),
        };
        drop(f);
        self.schedule_save();
        true
    }

    /// §4.1 dismissal semantics: `not_an_issue` also adds a suppression
    /// rule and marks suppressed; `expected_behavior`/`will_fix_later`
    /// acknowledge only; anything else is a plain dismissal.
    pub fn dismiss(&self, id: FindingId, reason: DismissReason, note: Option<String>) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        match reason {
            DismissReason::NotAnIssue => {
                f.disposition = Disposition::Suppressed;
                let resource_id = f.resource_id.clone();
                let category = f.category;
                drop(f);
                self.add_suppression_rule(resource_id, Some(category), reason.as_str().to_string());
            }
            DismissReason::ExpectedBehavior | DismissReason::WillFixLater => {
                f.disposition = Disposition::Acknowledged {
                    acknowledged_at: SystemTime::now(),
                };
            }
            DismissReason::Other => {
                f.disposition = Disposition::Dismissed {
                    reason: reason.as_str().to_string(),
                    note,
                };
            }
        }
        self.schedule_save();
        true
    }

    pub fn snooze(&self, id: FindingId, duration: Duration) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        f.disposition = Disposition::Snoozed {
            until: SystemTime::now() + duration,
        };
        drop(f);
        self.schedule_save();
        true
    }

    pub fn unsnooze(&self, id: FindingId) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        if matches!(f.disposition, Disposition::Snoozed { .. }) {
            f.disposition = Disposition::Active;
        }
        drop(f);
        self.schedule_save();
        true
    }

    pub fn suppress(&self, id: FindingId) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        f.disposition = Disposition::Suppressed;
        drop(f);
        self.schedule_save();
        true
    }

    pub fn resolve(&self, id: FindingId, auto: bool) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        f.disposition = Disposition::Resolved {
            reason: if auto {
                "No longer detected by patrol".to_string()
            } else {
                "manually resolved".to_string()
            },
            auto,
        };
        drop(f);
        self.schedule_save();
        true
    }

    pub fn set_user_note(&self, id: FindingId, note: String) -> bool {
        let Some(mut f) = self.findings.get_mut(&id) else { return false };
        f.user_note = Some(note);
        drop(f);
        self.schedule_save();
        true
    }

    pub fn add_suppression_rule(&self, resource_id: String, category: Option<Category>, reason: String) -> SuppressionRuleId {
        let id = SuppressionRuleId::new();
        self.suppression_rules.insert(
            id,
            SuppressionRule {
                id,
                resource_id,
                category,
                reason,
                created_at: SystemTime::now(),
            },
        );
        self.schedule_save();
        id
    }

    /// Removing a rule reactivates any finding that now no longer matches
    /// any remaining rule.
    pub fn delete_suppression_rule(&self, id: SuppressionRuleId) -> bool {
        let Some((_, rule)) = self.suppression_rules.remove(&id) else { return false };
        for mut entry in self.findings.iter_mut() {
            if entry.resource_id == rule.resource_id
                && matches!(entry.disposition, Disposition::Suppressed)
                && !self
                    .suppression_rules
                    .iter()
                    .any(|r| r.matches(&entry.resource_id, entry.category))
            {
                entry.disposition = Disposition::Active;
            }
        }
        self.schedule_save();
        true
    }

    pub fn matches_suppression_rule(&self, resource_id: &str, category: Category) -> bool {
        self.suppression_rules.iter().any(|r| r.matches(resource_id, category))
    }

    /// Deletes terminal findings whose disposition has held for longer than
    /// `max_age`, returning the count removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let now = SystemTime::now();
        let terminal_since = |f: &Finding| -> Option<SystemTime> {
            match &f.disposition {
                Disposition::Resolved { .. } | Disposition::Suppressed | Disposition::Dismissed { .. } => {
                    Some(f.last_seen_at)
                }
                _ => None,
            }
        };
        let to_remove: Vec<FindingId> = self
            .findings
            .iter()
            .filter_map(|e| {
                terminal_since(&e).and_then(|since| {
                    if now.duration_since(since).unwrap_or_default() > max_age {
                        Some(*e.key())
                    } else {
                        None
                    }
                })
            })
            .collect();
        let count = to_remove.len();
        for id in &to_remove {
            self.findings.remove(id);
        }
        if count > 0 {
            self.schedule_save();
        }
        count
    }

    /// Short text block summarizing dismissed findings, for seeding into an
    /// agentic-loop system prompt so the model doesn't re-raise them.
    pub fn get_dismissed_for_context(&self) -> String {
        let mut lines = Vec::new();
        for entry in self.findings.iter() {
            if let Disposition::Dismissed { reason, note } = &entry.disposition {
                lines.push(format!(
                    "- {} ({}): {}{}",
                    entry.title,
                    entry.resource_id,
                    reason,
                    note.as_ref().map(|n| format!(" — {n}")).unwrap_or_default()
                ));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FindingId, InvestigationState};

    fn sample_finding(resource_id: &str, severity: Severity, title: &str) -> Finding {
        Finding {
            id: FindingId(uuid::Uuid::nil()),
            key: normalize_key(title),
            severity,
            category: Category::Performance,
            resource_id: resource_id.to_string(),
            resource_name: resource_id.to_string(),
            resource_type: "node".to_string(),
            node: None,
            title: title.to_string(),
            description: "desc".to_string(),
            recommendation: None,
            evidence: None,
            source: FindingSource::Patrol,
            detected_at: SystemTime::now(),
            last_seen_at: SystemTime::now(),
            disposition: Disposition::Active,
            user_note: None,
            times_raised: 1,
            alert_id: None,
            investigation: InvestigationState::default(),
        }
    }

    #[test]
    fn add_dedups_on_derived_id() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        let f = sample_finding("node-1", Severity::Warning, "CPU high");
        assert!(store.add(f.clone()).unwrap());
        assert!(!store.add(f).unwrap());
        assert_eq!(store.get_summary().warning, 1);
    }

    #[test]
    fn escalation_reactivates_terminal_finding() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        let f = sample_finding("node-1", Severity::Watch, "Disk filling");
        assert!(store.add(f.clone()).unwrap());
        let id = derived_id(&store, "node-1", "Disk filling");
        store.resolve(id, true);
        assert!(store.get(id).unwrap().is_terminal());

        let mut escalated = f;
        escalated.severity = Severity::Critical;
        store.add(escalated).unwrap();
        assert!(!store.get(id).unwrap().is_terminal());
    }

    fn derived_id(_store: &FindingsStore, resource_id: &str, title: &str) -> FindingId {
        FindingsStore::derive_id(resource_id, Category::Performance, title)
    }

    #[test]
    fn not_an_issue_dismissal_adds_suppression_rule() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        let f = sample_finding("node-2", Severity::Info, "Noisy log");
        store.add(f.clone()).unwrap();
        let id = derived_id(&store, "node-2", "Noisy log");
        store.dismiss(id, DismissReason::NotAnIssue, None);
        assert!(store.matches_suppression_rule("node-2", Category::Performance));
        assert!(matches!(store.get(id).unwrap().disposition, Disposition::Suppressed));
    }

    #[test]
    fn suppression_rule_forces_new_finding_dismissed() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        store.add_suppression_rule("node-3".to_string(), Some(Category::Performance), "manual".to_string());
        let f = sample_finding("node-3", Severity::Warning, "CPU high");
        store.add(f).unwrap();
        let id = derived_id(&store, "node-3", "CPU high");
        assert!(matches!(store.get(id).unwrap().disposition, Disposition::Dismissed { .. }));
    }

    #[test]
    fn active_query_excludes_snoozed_and_terminal() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        let f1 = sample_finding("a", Severity::Warning, "one");
        let f2 = sample_finding("b", Severity::Warning, "two");
        store.add(f1).unwrap();
        store.add(f2).unwrap();
        let id2 = derived_id(&store, "b", "two");
        store.snooze(id2, Duration::from_secs(3600));
        let active = store.get_active(Severity::Info);
        assert_eq!(active.len(), 1);
    }

    #[test]
    fn cleanup_removes_only_aged_terminal_findings() {
        let store = FindingsStore::new(FindingsStoreConfig::default());
        let f = sample_finding("c", Severity::Info, "stale");
        store.add(f).unwrap();
        let id = derived_id(&store, "c", "stale");
        store.resolve(id, true);
        assert_eq!(store.cleanup(Duration::from_secs(3600)), 0);
        {
            let mut entry = store.findings.get_mut(&id).unwrap();
            entry.last_seen_at = SystemTime::now() - Duration::from_secs(7200);
        }
        assert_eq!(store.cleanup(Duration::from_secs(3600)), 1);
    }
}
