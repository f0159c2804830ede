//! Intelligence Facade (§4.11): unifies the Findings Store, Run History
//! Store, and Trigger Manager activity into a single health score and
//! correlated snapshot view, the way the teacher's `AgentRuntime`
//! (`lib.rs`) composes independently-owned subsystems behind one facade
//! struct with a single `get_status()`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cost::InvestigationBudget;
use crate::findings::FindingsStore;
use crate::incident::IncidentStore;
use crate::run_history::RunHistoryStore;
use crate::types::{Finding, RunStatus, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthScore {
    pub score: u8,
    pub critical_count: usize,
    pub warning_count: usize,
    pub recent_error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceSnapshot {
    pub health: HealthScore,
    pub findings_by_resource: HashMap<String, Vec<Finding>>,
    pub open_incident_count: usize,
    pub investigation_budget_remaining: u64,
}

pub struct IntelligenceFacade {
    findings: Arc<FindingsStore>,
    run_history: Arc<RunHistoryStore>,
    incidents: Arc<IncidentStore>,
    budget: Arc<InvestigationBudget>,
}

impl IntelligenceFacade {
    pub fn new(
        findings: Arc<FindingsStore>,
        run_history: Arc<RunHistoryStore>,
        incidents: Arc<IncidentStore>,
        budget: Arc<InvestigationBudget>,
    ) -> Self {
        Self {
            findings,
            run_history,
            incidents,
            budget,
        }
    }

    /// Weighted 0-100 score: starts at 100, loses points per active
    /// critical/warning finding and per errored run in the recent history,
    /// floored at 0.
    pub fn health_score(&self) -> HealthScore {
        let summary = self.findings.get_summary();
        let recent_runs = self.run_history.recent(10);
        let error_count = recent_runs.iter().filter(|r| r.status == RunStatus::Errored).count();
        let recent_error_rate = if recent_runs.is_empty() {
            0.0
        } else {
            error_count as f64 / recent_runs.len() as f64
        };

        let mut score: i32 = 100;
        score -= (summary.critical as i32) * 15;
        score -= (summary.warning as i32) * 5;
        score -= (summary.watch as i32) * 1;
        score -= (recent_error_rate * 20.0) as i32;
        let score = score.clamp(0, 100) as u8;

        HealthScore {
            score,
            critical_count: summary.critical,
            warning_count: summary.warning,
            recent_error_rate,
        }
    }

    pub fn snapshot(&self) -> IntelligenceSnapshot {
        let mut findings_by_resource: HashMap<String, Vec<Finding>> = HashMap::new();
        for finding in self.findings.get_active(Severity::Info) {
            findings_by_resource.entry(finding.resource_id.clone()).or_default().push(finding);
        }

        IntelligenceSnapshot {
            health: self.health_score(),
            findings_by_resource,
            open_incident_count: self.incidents.open_count(),
            investigation_budget_remaining: self.budget.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::FindingsStoreConfig;
    use crate::run_history::RunHistoryConfig;

    #[test]
    fn healthy_system_scores_100() {
        let facade = IntelligenceFacade::new(
            Arc::new(FindingsStore::new(FindingsStoreConfig::default())),
            Arc::new(RunHistoryStore::new(RunHistoryConfig::default())),
            Arc::new(IncidentStore::new()),
            Arc::new(InvestigationBudget::new(1000)),
        );
        assert_eq!(facade.health_score().score, 100);
    }

    #[test]
    fn critical_findings_reduce_score_more_than_warnings() {
        use crate::types::{Category, Disposition, Finding, FindingId, FindingSource, InvestigationState};
        use std::time::SystemTime;

        let findings = Arc::new(FindingsStore::new(FindingsStoreConfig::default()));
        let make = |sev: Severity| Finding {
            id: FindingId::new(),
            key: "k".to_string(),
            severity: sev,
            category: Category::Performance,
            resource_id: "r1".to_string(),
            resource_name: "r1".to_string(),
            resource_type: "node".to_string(),
            node: None,
            title: "t".to_string(),
            description: "d".to_string(),
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
        };
        findings.add(make(Severity::Critical)).unwrap();
        let facade = IntelligenceFacade::new(
            findings,
            Arc::new(RunHistoryStore::new(RunHistoryConfig::default())),
            Arc::new(IncidentStore::new()),
            Arc::new(InvestigationBudget::new(1000)),
        );
        assert_eq!(facade.health_score().score, 85);
    }
}
