//! Collaborator interfaces (§6): traits the core is coded against. HTTP
//! transport, state/alert collection, and LLM wire protocols are peripheral
//! concerns that a caller supplies; the reference adapter shipped alongside
//! each trait is just enough to run the crate standalone and in tests,
//! mirroring the teacher's pattern of a trait plus one concrete default
//! (`ResourceManager` / `DefaultResourceManager`).

use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub nodes: Vec<ResourceState>,
    pub guests: Vec<ResourceState>,
    pub containers: Vec<ResourceState>,
    pub storage: Vec<ResourceState>,
    pub docker_hosts: Vec<ResourceState>,
    pub backup_hosts: Vec<ResourceState>,
    pub kubernetes_clusters: Vec<ResourceState>,
}

/// Generic typed-or-freeform resource record; concrete collectors populate
/// `metrics` with whatever numeric facts the thresholds/signals care about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    pub node: Option<String>,
    pub metrics: std::collections::HashMap<String, f64>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: String,
    pub resource_id: String,
    pub resource_name: String,
    pub instance: Option<String>,
    pub severity: AlertSeverity,
    pub message: String,
    pub fired_at: SystemTime,
    pub pending_since: Option<SystemTime>,
}

#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn get_state(&self) -> CoreResult<StateSnapshot>;
}

#[async_trait]
pub trait AlertProvider: Send + Sync {
    async fn get_active_alerts(&self) -> CoreResult<Vec<Alert>>;
    async fn get_recently_resolved(&self, minutes: u64) -> CoreResult<Vec<Alert>>;
    async fn get_alerts_by_resource(&self, resource_id: &str) -> CoreResult<Vec<Alert>>;
    async fn get_alert_history(&self, resource_id: &str, limit: usize) -> CoreResult<Vec<Alert>>;
}

#[derive(Debug, Clone)]
pub enum LlmStreamEvent {
    Content(String),
    ToolCall { name: String, args: serde_json::Value, call_id: String },
    Done { stop_reason: String },
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub messages: Vec<crate::types::ChatMessage>,
    pub tools: Vec<String>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(
        &self,
        req: LlmRequest,
        cb: Box<dyn Fn(LlmStreamEvent) + Send + Sync>,
    ) -> CoreResult<()>;

    async fn chat(&self, req: LlmRequest) -> CoreResult<String>;
}

/// Typed persistence seam used by the Findings/RunHistory/Cost stores; the
/// reference implementation is `crate::persistence::JsonFilePersistence`.
pub trait ConfigPersistence<T>: Send + Sync {
    fn load(&self) -> CoreResult<Option<T>>;
    fn save(&self, value: &T) -> CoreResult<()>;
    fn force_save(&self, value: &T) -> CoreResult<()>;
}

#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn get(&self, resource_id: &str, metric: &str) -> CoreResult<Option<f64>>;
}

#[derive(Debug, Clone, Copy)]
pub struct NodeThresholds {
    pub cpu_warning: f64,
    pub memory_warning: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct StorageThresholds {
    pub warning: f64,
    pub critical: f64,
}

pub trait ThresholdProvider: Send + Sync {
    fn node_thresholds(&self) -> NodeThresholds;
    fn guest_thresholds(&self) -> NodeThresholds;
    fn storage_thresholds(&self) -> StorageThresholds;
}

#[async_trait]
pub trait UnifiedResourceProvider: Send + Sync {
    async fn list_all(&self) -> CoreResult<Vec<ResourceState>>;
    async fn top_n_by(&self, metric: &str, n: usize) -> CoreResult<Vec<ResourceState>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get_approval(&self, id: &crate::types::ApprovalId) -> CoreResult<ApprovalStatus>;
    async fn request_approval(&self, id: crate::types::ApprovalId, summary: String) -> CoreResult<()>;
}
