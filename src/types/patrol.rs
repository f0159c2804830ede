//! Patrol run and scope data structures (§3 PatrolRunRecord, §4.5, §4.7).

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::{FindingId, RunId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatrolDepth {
    Quick,
    Normal,
}

/// Subset of resources/types a patrol run should consider, or full-fleet
/// when both lists are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatrolScope {
    pub resource_ids: Vec<String>,
    pub resource_types: Vec<String>,
    pub depth: Option<PatrolDepthOpt>,
    pub context: Option<String>,
}

/// Serializable wrapper so `PatrolScope::default()` doesn't need to pick an
/// arbitrary default depth; `None` means "caller decides" (normal, unscoped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatrolDepthOpt {
    Quick,
    Normal,
}

impl From<PatrolDepthOpt> for PatrolDepth {
    fn from(v: PatrolDepthOpt) -> Self {
        match v {
            PatrolDepthOpt::Quick => PatrolDepth::Quick,
            PatrolDepthOpt::Normal => PatrolDepth::Normal,
        }
    }
}

impl PatrolScope {
    pub fn is_full(&self) -> bool {
        self.resource_ids.is_empty() && self.resource_types.is_empty()
    }

    pub fn depth(&self) -> PatrolDepth {
        self.depth.map(Into::into).unwrap_or(PatrolDepth::Normal)
    }

    /// Normalized key used for trigger-manager deduplication: reason plus
    /// the sorted resource id set.
    pub fn dedup_key(&self) -> Vec<String> {
        let mut ids = self.resource_ids.clone();
        ids.sort();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Completed,
    Errored,
    Skipped,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceCounts {
    pub resources_checked: usize,
    pub checked_by_type: HashMap<String, usize>,
    pub new_findings: usize,
    pub existing_findings: usize,
    pub resolved_findings: usize,
    pub error_count: usize,
}

/// A single historical patrol run (§3 PatrolRunRecord).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatrolRunRecord {
    pub id: RunId,
    pub start: SystemTime,
    pub end: SystemTime,
    pub duration_ms: u64,
    pub trigger_reason: String,
    pub scope: PatrolScope,
    pub counts: ResourceCounts,
    pub status: RunStatus,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub ai_analysis: Option<String>,
    pub finding_ids: Vec<FindingId>,
}

impl PatrolRunRecord {
    /// Recomputes whichever of (duration, duration_ms) is missing from the
    /// other, preferring an explicitly supplied `duration_ms` (§4.2 rule,
    /// reused here since PatrolRunRecord shares the same duration shape).
    pub fn with_consistent_duration(mut self, duration_ms: Option<u64>) -> Self {
        if let Some(ms) = duration_ms {
            self.duration_ms = ms;
        } else if self.duration_ms == 0 {
            self.duration_ms = self
                .end
                .duration_since(self.start)
                .unwrap_or_default()
                .as_millis() as u64;
        }
        self
    }
}
