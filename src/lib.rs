//! Argus fleet intelligence core.
//!
//! The intelligence subsystem for an AI-assisted infrastructure
//! investigation and remediation layer: findings lifecycle, patrol engine,
//! a tool-using agentic loop gated by a safety state machine, an
//! alert-to-patrol trigger coordinator, incident recording, and cost/usage
//! accounting. HTTP transport, state/alert collection, and LLM wire
//! protocols are peripheral — this crate is coded against the traits in
//! `interfaces` and ships a reference JSON-file adapter good enough to run
//! standalone and in its own test suite.

pub mod agentic;
pub mod alert_triggered;
pub mod config;
pub mod cost;
pub mod error;
pub mod findings;
pub mod fsm;
pub mod incident;
pub mod intelligence;
pub mod interfaces;
pub mod knowledge;
pub mod patrol;
pub mod persistence;
pub mod run_history;
pub mod trigger;
pub mod types;

use std::sync::Arc;

use crate::agentic::{AgenticLoop, AgenticLoopConfig, ToolExecutor};
use crate::alert_triggered::AlertTriggeredAnalyzer;
use crate::config::CoreConfig;
use crate::cost::{CostStore, InvestigationBudget};
use crate::error::CoreResult;
use crate::findings::FindingsStore;
use crate::incident::{IncidentRecorder, IncidentStore};
use crate::intelligence::{IntelligenceFacade, IntelligenceSnapshot};
use crate::interfaces::{LlmProvider, MetricsProvider, StateProvider, ThresholdProvider};
use crate::patrol::PatrolEngine;
use crate::run_history::RunHistoryStore;
use crate::trigger::TriggerManager;

/// Facade composing every independently-owned subsystem behind one struct,
/// the way the teacher's `AgentRuntime` (`lib.rs`) exposes a single
/// `get_status()` over components it does not otherwise entangle.
#[derive(Clone)]
pub struct ArgusCore {
    pub findings: Arc<FindingsStore>,
    pub run_history: Arc<RunHistoryStore>,
    pub trigger_manager: Arc<TriggerManager>,
    pub patrol_engine: Arc<PatrolEngine>,
    pub alert_triggered: Arc<AlertTriggeredAnalyzer>,
    pub incident_store: Arc<IncidentStore>,
    pub incident_recorder: Arc<IncidentRecorder>,
    pub cost_store: Arc<CostStore>,
    pub investigation_budget: Arc<InvestigationBudget>,
    pub agentic_loop: Arc<AgenticLoop>,
    pub intelligence: Arc<IntelligenceFacade>,
}

impl ArgusCore {
    pub fn new(
        config: CoreConfig,
        state_provider: Arc<dyn StateProvider>,
        threshold_provider: Arc<dyn ThresholdProvider>,
        metrics_provider: Arc<dyn MetricsProvider>,
        llm_provider: Arc<dyn LlmProvider>,
        tool_executor: ToolExecutor,
    ) -> Self {
        let findings = Arc::new(FindingsStore::new(config.findings.clone()));
        let run_history = Arc::new(RunHistoryStore::new(config.run_history.clone()));
        let trigger_manager = Arc::new(TriggerManager::new(config.trigger.clone()));
        let incident_store = Arc::new(IncidentStore::new());
        let incident_recorder = Arc::new(IncidentRecorder::new(config.incident.clone(), incident_store.clone(), metrics_provider));
        let cost_store = Arc::new(CostStore::new(config.cost.clone()));
        let investigation_budget = Arc::new(InvestigationBudget::new(config.investigation_budget_monthly_tokens));
        let alert_triggered = Arc::new(AlertTriggeredAnalyzer::new(config.alert_triggered.clone()));

        let patrol_engine = Arc::new(PatrolEngine::new(
            config.patrol.clone(),
            state_provider,
            threshold_provider,
            llm_provider.clone(),
            findings.clone(),
            run_history.clone(),
        ));

        let agentic_loop = Arc::new(AgenticLoop::new(
            AgenticLoopConfig::default(),
            llm_provider,
            tool_executor,
            cost_store.clone(),
        ));

        let intelligence = Arc::new(IntelligenceFacade::new(
            findings.clone(),
            run_history.clone(),
            incident_store.clone(),
            investigation_budget.clone(),
        ));

        Self {
            findings,
            run_history,
            trigger_manager,
            patrol_engine,
            alert_triggered,
            incident_store,
            incident_recorder,
            cost_store,
            investigation_budget,
            agentic_loop,
            intelligence,
        }
    }

    /// Wires JSON-file persistence for findings, run history, and cost
    /// events under `config.data_dir`, the reference adapter named in
    /// §4.12.
    pub fn wire_default_persistence(&self, data_dir: &std::path::Path) -> CoreResult<()> {
        use crate::persistence::JsonFilePersistence;
        use std::time::Duration;

        self.findings
            .set_persistence(Arc::new(JsonFilePersistence::new(data_dir.join("findings.json"), Duration::from_secs(5))));
        self.run_history
            .set_persistence(Arc::new(JsonFilePersistence::new(data_dir.join("run_history.json"), Duration::from_secs(5))));
        self.cost_store
            .set_persistence(Arc::new(JsonFilePersistence::new(data_dir.join("cost_events.json"), Duration::from_secs(5))));
        Ok(())
    }

    pub fn snapshot(&self) -> IntelligenceSnapshot {
        self.intelligence.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::{NodeThresholds, StateSnapshot, StorageThresholds};
    use async_trait::async_trait;
    use serde_json::json;

    struct EmptyState;
    #[async_trait]
    impl StateProvider for EmptyState {
        async fn get_state(&self) -> CoreResult<StateSnapshot> {
            Ok(StateSnapshot::default())
        }
    }

    struct FixedThresholds;
    impl ThresholdProvider for FixedThresholds {
        fn node_thresholds(&self) -> NodeThresholds {
            NodeThresholds {
                cpu_warning: 85.0,
                memory_warning: 90.0,
            }
        }
        fn guest_thresholds(&self) -> NodeThresholds {
            self.node_thresholds()
        }
        fn storage_thresholds(&self) -> StorageThresholds {
            StorageThresholds {
                warning: 80.0,
                critical: 95.0,
            }
        }
    }

    struct ZeroMetrics;
    #[async_trait]
    impl MetricsProvider for ZeroMetrics {
        async fn get(&self, _resource_id: &str, _metric: &str) -> CoreResult<Option<f64>> {
            Ok(Some(0.0))
        }
    }

    struct NoopLlm;
    #[async_trait]
    impl LlmProvider for NoopLlm {
        async fn chat_stream(&self, _req: crate::interfaces::LlmRequest, _cb: Box<dyn Fn(crate::interfaces::LlmStreamEvent) + Send + Sync>) -> CoreResult<()> {
            Ok(())
        }
        async fn chat(&self, _req: crate::interfaces::LlmRequest) -> CoreResult<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn core_wires_up_and_reports_healthy_snapshot() {
        let core = ArgusCore::new(
            CoreConfig::load(None),
            Arc::new(EmptyState),
            Arc::new(FixedThresholds),
            Arc::new(ZeroMetrics),
            Arc::new(NoopLlm),
            Arc::new(|_: &str, _: &serde_json::Value| Ok(json!({}))),
        );
        let snapshot = core.snapshot();
        assert_eq!(snapshot.health.score, 100);
        assert_eq!(snapshot.open_incident_count, 0);
    }
}
