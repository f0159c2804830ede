//! Patrol Engine (§4.5): scoped scanning pipeline producing findings from a
//! state snapshot, deterministic signals, and an LLM's `[FINDING]` report.
//!
//! The serialized-run-with-stuck-timeout guard and the broadcast stream of
//! progress events are grounded on the teacher's `CommunicationBus`
//! pub/sub loop (`communication/mod.rs`) and `DefaultAgentScheduler`'s
//! single-in-flight-run bookkeeping (`scheduler/mod.rs`).

pub mod analyzers;
pub mod parser;
pub mod reconcile;
pub mod signals;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::findings::FindingsStore;
use crate::interfaces::{LlmProvider, LlmRequest, ResourceState, StateProvider, ThresholdProvider};
use crate::run_history::RunHistoryStore;
use crate::types::{Category, FindingId, PatrolRunRecord, PatrolScope, ResourceCounts, RunId, RunStatus, Severity};

use analyzers::{analyze_backup, analyze_docker_container, analyze_docker_host, analyze_guest, analyze_kubernetes, analyze_node, analyze_storage, compute_thresholds};
use parser::{into_finding, parse_finding_blocks};
use reconcile::{reconcile, ReconciliationInput};
use signals::{detect_signals, SignalThresholds};

#[derive(Debug, Clone)]
pub enum PatrolStreamEvent {
    Phase(String),
    Content(String),
    Finding { title: String, severity: Severity },
    Signal { signal_type: String, resource_id: String },
    Error(String),
    Done,
}

#[derive(Debug, Clone)]
pub struct PatrolEngineConfig {
    pub proactive_mode: bool,
    pub stuck_run_timeout: Duration,
}

impl Default for PatrolEngineConfig {
    fn default() -> Self {
        Self {
            proactive_mode: true,
            stuck_run_timeout: Duration::from_secs(20 * 60),
        }
    }
}

pub struct PatrolEngine {
    config: PatrolEngineConfig,
    state_provider: Arc<dyn StateProvider>,
    threshold_provider: Arc<dyn ThresholdProvider>,
    llm: Arc<dyn LlmProvider>,
    findings: Arc<FindingsStore>,
    run_history: Arc<RunHistoryStore>,
    run_in_progress: AtomicBool,
    run_started_at: RwLock<Option<SystemTime>>,
    events: broadcast::Sender<PatrolStreamEvent>,
}

impl PatrolEngine {
    pub fn new(
        config: PatrolEngineConfig,
        state_provider: Arc<dyn StateProvider>,
        threshold_provider: Arc<dyn ThresholdProvider>,
        llm: Arc<dyn LlmProvider>,
        findings: Arc<FindingsStore>,
        run_history: Arc<RunHistoryStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            config,
            state_provider,
            threshold_provider,
            llm,
            findings,
            run_history,
            run_in_progress: AtomicBool::new(false),
            run_started_at: RwLock::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PatrolStreamEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: PatrolStreamEvent) {
        let _ = self.events.send(event);
    }

    /// Acquires the single-run lock, force-clearing a run stuck past
    /// `stuck_run_timeout` rather than permanently wedging the engine.
    fn try_acquire(&self) -> bool {
        if self.run_in_progress.load(Ordering::SeqCst) {
            let stuck = self
                .run_started_at
                .read()
                .map(|start| SystemTime::now().duration_since(start).unwrap_or_default() > self.config.stuck_run_timeout)
                .unwrap_or(false);
            if !stuck {
                return false;
            }
            warn!("previous patrol run exceeded stuck timeout, force-clearing");
        }
        self.run_in_progress.store(true, Ordering::SeqCst);
        *self.run_started_at.write() = Some(SystemTime::now());
        true
    }

    fn release(&self) {
        self.run_in_progress.store(false, Ordering::SeqCst);
        *self.run_started_at.write() = None;
    }

    pub fn is_running(&self) -> bool {
        self.run_in_progress.load(Ordering::SeqCst)
    }

    pub async fn run(&self, scope: PatrolScope, trigger_reason: String) -> CoreResult<PatrolRunRecord> {
        if !self.try_acquire() {
            return Err(CoreError::InvalidInput("patrol run already in progress".to_string()));
        }
        let result = self.run_inner(scope, trigger_reason).await;
        self.release();
        result
    }

    async fn run_inner(&self, scope: PatrolScope, trigger_reason: String) -> CoreResult<PatrolRunRecord> {
        let start = SystemTime::now();
        self.publish(PatrolStreamEvent::Phase("collecting".to_string()));

        let snapshot = self.state_provider.get_state().await?;
        let resources = filter_by_scope(&snapshot, &scope);

        self.publish(PatrolStreamEvent::Phase("analyzing".to_string()));
        let thresholds = compute_thresholds(self.threshold_provider.as_ref(), self.config.proactive_mode);
        let now = SystemTime::now();

        let mut candidates = Vec::new();
        let mut detected_signals = Vec::new();
        for resource in &resources {
            let mut found = match resource.resource_type.as_str() {
                "node" => analyze_node(resource, &thresholds, now),
                "guest" => analyze_guest(resource, &thresholds, now),
                "storage" => analyze_storage(resource, &thresholds, now),
                "docker_host" => analyze_docker_host(resource, &thresholds, now),
                "docker_container" => analyze_docker_container(resource, now),
                "backup" => analyze_backup(resource, now),
                "kubernetes_node" | "kubernetes_cluster" | "kubernetes_pod" | "kubernetes_deployment" => {
                    analyze_kubernetes(resource, &thresholds, now)
                }
                _ => Vec::new(),
            };
            candidates.append(&mut found);

            let signals = detect_signals(&resource.id, &resource.raw, SignalThresholds::default());
            for signal in &signals {
                self.publish(PatrolStreamEvent::Signal {
                    signal_type: signal.signal_type.clone(),
                    resource_id: signal.resource_id.clone(),
                });
            }
            detected_signals.extend(signals);
        }

        let seeded: Vec<FindingId> = self.findings.get_active(Severity::Info).iter().map(|f| f.id).collect();

        self.publish(PatrolStreamEvent::Phase("reasoning".to_string()));
        let prompt = build_prompt(&resources, &candidates, &detected_signals, &self.findings.get_dismissed_for_context());
        let llm_result = self
            .llm
            .chat(LlmRequest {
                system_prompt: prompt,
                messages: Vec::new(),
                tools: Vec::new(),
            })
            .await;

        let (errored, response_text) = match llm_result {
            Ok(text) => (false, text),
            Err(e) => {
                self.publish(PatrolStreamEvent::Error(e.to_string()));
                (true, String::new())
            }
        };

        let mut reported = Vec::new();
        let mut new_count = 0;
        let mut existing_count = 0;

        for parsed in parse_finding_blocks(&response_text) {
            let mut finding = into_finding(parsed, now);
            if !passes_validation(&finding, &resources) {
                continue;
            }
            if finding.id.0.is_nil() {
                finding.id = FindingId(uuid::Uuid::new_v5(
                    &uuid::Uuid::NAMESPACE_OID,
                    format!("{}|{}|{}", finding.resource_id, finding.category, finding.key).as_bytes(),
                ));
            }
            reported.push(finding.id);
            self.publish(PatrolStreamEvent::Finding {
                title: finding.title.clone(),
                severity: finding.severity,
            });
            match self.findings.add(finding) {
                Ok(true) => new_count += 1,
                Ok(false) => existing_count += 1,
                Err(e) => warn!(error = %e, "failed to add parsed finding"),
            }
        }

        for candidate in candidates {
            match self.findings.add(candidate) {
                Ok(true) => new_count += 1,
                Ok(false) => existing_count += 1,
                Err(e) => warn!(error = %e, "failed to add candidate finding"),
            }
        }

        let resolved = reconcile(&ReconciliationInput {
            seeded,
            reported,
            resolved_by_model: Vec::new(),
            errored,
        });
        let resolved_count = resolved.len();
        for id in resolved {
            self.findings.resolve(id, true);
        }

        let end = SystemTime::now();
        let record = PatrolRunRecord {
            id: RunId::new(),
            start,
            end,
            duration_ms: 0,
            trigger_reason,
            scope,
            counts: ResourceCounts {
                resources_checked: resources.len(),
                checked_by_type: Default::default(),
                new_findings: new_count,
                existing_findings: existing_count,
                resolved_findings: resolved_count,
                error_count: if errored { 1 } else { 0 },
            },
            status: if errored { RunStatus::Errored } else { RunStatus::Completed },
            input_tokens: 0,
            output_tokens: 0,
            ai_analysis: if response_text.is_empty() { None } else { Some(response_text) },
            finding_ids: Vec::new(),
        }
        .with_consistent_duration(None);

        self.run_history.add(record.clone());
        self.publish(PatrolStreamEvent::Done);
        info!(new = new_count, existing = existing_count, resolved = resolved_count, "patrol run completed");

        Ok(record)
    }
}

fn filter_by_scope(snapshot: &crate::interfaces::StateSnapshot, scope: &PatrolScope) -> Vec<ResourceState> {
    let all: Vec<ResourceState> = snapshot
        .nodes
        .iter()
        .chain(&snapshot.guests)
        .chain(&snapshot.containers)
        .chain(&snapshot.storage)
        .chain(&snapshot.docker_hosts)
        .chain(&snapshot.backup_hosts)
        .chain(&snapshot.kubernetes_clusters)
        .cloned()
        .collect();

    if scope.is_full() {
        return all;
    }
    all.into_iter()
        .filter(|r| {
            (scope.resource_ids.is_empty() || scope.resource_ids.contains(&r.id))
                && (scope.resource_types.is_empty() || scope.resource_types.contains(&r.resource_type))
        })
        .collect()
}

/// §4.5 filtering: a performance finding is dropped if the snapshot shows
/// its resource's relevant metric comfortably below threshold; critical
/// severity and allow-listed categories always pass.
fn passes_validation(finding: &crate::types::Finding, resources: &[ResourceState]) -> bool {
    if finding.severity == Severity::Critical || finding.category.always_passes_validation() {
        return true;
    }
    if finding.category != Category::Performance {
        return true;
    }
    let Some(resource) = resources.iter().find(|r| r.id == finding.resource_id) else {
        return true;
    };
    let below_threshold = resource
        .metrics
        .values()
        .all(|v| *v < 50.0);
    !below_threshold
}

fn build_prompt(resources: &[ResourceState], candidates: &[crate::types::Finding], signals: &[signals::DetectedSignal], dismissed_context: &str) -> String {
    format!(
        "Resources considered: {}\nDeterministic candidates: {}\nDetected signals: {}\nPreviously dismissed (do not re-raise):\n{}\n",
        resources.len(),
        candidates.len(),
        signals.len(),
        dismissed_context
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::FindingsStoreConfig;
    use crate::interfaces::{NodeThresholds, StateSnapshot, StorageThresholds};
    use crate::run_history::RunHistoryConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;

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

    struct EchoLlm(String);
    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn chat_stream(&self, _req: LlmRequest, _cb: Box<dyn Fn(crate::interfaces::LlmStreamEvent) + Send + Sync>) -> CoreResult<()> {
            Ok(())
        }
        async fn chat(&self, _req: LlmRequest) -> CoreResult<String> {
            Ok(self.0.clone())
        }
    }

    fn engine(llm_text: &str) -> PatrolEngine {
        PatrolEngine::new(
            PatrolEngineConfig::default(),
            Arc::new(EmptyState),
            Arc::new(FixedThresholds),
            Arc::new(EchoLlm(llm_text.to_string())),
            Arc::new(FindingsStore::new(FindingsStoreConfig::default())),
            Arc::new(RunHistoryStore::new(RunHistoryConfig::default())),
        )
    }

    #[tokio::test]
    async fn empty_snapshot_produces_completed_empty_run() {
        let engine = engine("");
        let record = engine.run(PatrolScope::default(), "manual".to_string()).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(record.counts.resources_checked, 0);
    }

    #[tokio::test]
    async fn concurrent_run_is_rejected_while_in_progress() {
        let engine = Arc::new(engine(""));
        let e2 = engine.clone();
        engine.run_in_progress.store(true, Ordering::SeqCst);
        *engine.run_started_at.write() = Some(SystemTime::now());
        let result = e2.run(PatrolScope::default(), "manual".to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn llm_findings_are_parsed_and_stored() {
        let text = "[FINDING]\nSEVERITY: critical\nCATEGORY: backup\nRESOURCE: pbs-1\nTITLE: Backup failed\nDESCRIPTION: Job errored overnight\n[/FINDING]";
        let engine = engine(text);
        let record = engine.run(PatrolScope::default(), "manual".to_string()).await.unwrap();
        assert_eq!(record.counts.new_findings, 1);
    }

    #[test]
    fn validation_drops_low_confidence_performance_claim() {
        let mut metrics = HashMap::new();
        metrics.insert("cpu_percent".to_string(), 10.0);
        let resource = ResourceState {
            id: "n1".to_string(),
            name: "n1".to_string(),
            resource_type: "node".to_string(),
            node: None,
            metrics,
            raw: serde_json::Value::Null,
        };
        let finding = crate::types::Finding {
            id: FindingId::new(),
            key: "x".to_string(),
            severity: Severity::Warning,
            category: Category::Performance,
            resource_id: "n1".to_string(),
            resource_name: "n1".to_string(),
            resource_type: "node".to_string(),
            node: None,
            title: "t".to_string(),
            description: "d".to_string(),
            recommendation: None,
            evidence: None,
            source: crate::types::FindingSource::Patrol,
            detected_at: SystemTime::now(),
            last_seen_at: SystemTime::now(),
            disposition: crate::types::Disposition::Active,
            user_note: None,
            times_raised: 1,
            alert_id: None,
            investigation: Default::default(),
        };
        assert!(!passes_validation(&finding, &[resource]));
    }
}
