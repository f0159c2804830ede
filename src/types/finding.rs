//! Finding and suppression-rule data structures (§3, §4.1).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{Category, FindingId, Severity, SessionId};

/// Terminal disposition a finding can hold. At most one applies at a time
/// (§8 invariant: at most one of {resolved, suppressed, snooze-active}).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Disposition {
    Active,
    Acknowledged { acknowledged_at: SystemTime },
    Snoozed { until: SystemTime },
    Suppressed,
    Resolved { reason: String, auto: bool },
    Dismissed { reason: String, note: Option<String> },
}

impl Default for Disposition {
    fn default() -> Self {
        Disposition::Active
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvestigationStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum InvestigationOutcome {
    Resolved,
    NeedsAttention,
    FixQueued,
    Inconclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InvestigationState {
    pub session_id: Option<SessionId>,
    pub status: Option<InvestigationStatus>,
    pub outcome: Option<InvestigationOutcome>,
    pub last_investigated_at: Option<SystemTime>,
    pub attempts: u32,
}

/// A structured, deduplicated problem record with lifecycle (§3 Finding).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub key: String,
    pub severity: Severity,
    pub category: Category,
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    pub node: Option<String>,
    pub title: String,
    pub description: String,
    pub recommendation: Option<String>,
    pub evidence: Option<String>,
    pub source: FindingSource,
    pub detected_at: SystemTime,
    pub last_seen_at: SystemTime,
    pub disposition: Disposition,
    pub user_note: Option<String>,
    pub times_raised: u32,
    pub alert_id: Option<String>,
    pub investigation: InvestigationState,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FindingSource {
    Patrol,
    AlertTriggered,
    Manual,
}

impl Finding {
    /// `true` iff not resolved, not suppressed, and any snooze has expired.
    pub fn is_active(&self, now: SystemTime) -> bool {
        match &self.disposition {
            Disposition::Active | Disposition::Acknowledged { .. } => true,
            Disposition::Snoozed { until } => *until <= now,
            Disposition::Suppressed | Disposition::Resolved { .. } | Disposition::Dismissed { .. } => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.disposition,
            Disposition::Suppressed | Disposition::Resolved { .. } | Disposition::Dismissed { .. }
        )
    }
}

/// (resource_id|"", category|"", reason, created_at). Wildcards on either
/// side (§3 SuppressionRule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionRule {
    pub id: super::SuppressionRuleId,
    pub resource_id: String,
    pub category: Option<Category>,
    pub reason: String,
    pub created_at: SystemTime,
}

impl SuppressionRule {
    pub fn matches(&self, resource_id: &str, category: Category) -> bool {
        let resource_matches = self.resource_id.is_empty() || self.resource_id == resource_id;
        let category_matches = match self.category {
            Some(c) => c == category,
            None => true,
        };
        resource_matches && category_matches
    }
}

/// Reason codes accepted by `dismiss`, with the dispatch semantics from §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissReason {
    NotAnIssue,
    ExpectedBehavior,
    WillFixLater,
    Other,
}

impl DismissReason {
    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "not_an_issue" => DismissReason::NotAnIssue,
            "expected_behavior" => DismissReason::ExpectedBehavior,
            "will_fix_later" => DismissReason::WillFixLater,
            _ => DismissReason::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DismissReason::NotAnIssue => "not_an_issue",
            DismissReason::ExpectedBehavior => "expected_behavior",
            DismissReason::WillFixLater => "will_fix_later",
            DismissReason::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindingsSummary {
    pub critical: usize,
    pub warning: usize,
    pub watch: usize,
    pub info: usize,
    pub total_active: usize,
}
