//! Incident Recorder & Store (§4.8): alert-anchored timelines with
//! pre/post evidence snapshotting, grounded on the teacher's
//! `CommunicationBus` background-task-with-buffers pattern
//! (`communication/mod.rs`) adapted from pub/sub fan-out to a bounded
//! concurrent-incident register with scheduled snapshot tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::interfaces::MetricsProvider;
use crate::types::{IncidentEvent, IncidentId, IncidentStatus, IncidentTimeline};

#[derive(Debug, Clone)]
pub struct IncidentRecorderConfig {
    pub max_concurrent: usize,
    pub pre_buffer: Duration,
    pub post_buffer: Duration,
    pub metrics: Vec<String>,
}

impl Default for IncidentRecorderConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 20,
            pre_buffer: Duration::from_secs(60),
            post_buffer: Duration::from_secs(300),
            metrics: vec!["cpu".to_string(), "memory".to_string()],
        }
    }
}

pub struct IncidentStore {
    timelines: RwLock<HashMap<IncidentId, IncidentTimeline>>,
    by_alert: RwLock<HashMap<String, IncidentId>>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self {
            timelines: RwLock::new(HashMap::new()),
            by_alert: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: IncidentId) -> Option<IncidentTimeline> {
        self.timelines.read().get(&id).cloned()
    }

    pub fn get_by_alert(&self, alert_id: &str) -> Option<IncidentTimeline> {
        let id = *self.by_alert.read().get(alert_id)?;
        self.get(id)
    }

    pub fn open_count(&self) -> usize {
        self.timelines
            .read()
            .values()
            .filter(|t| t.status == IncidentStatus::Open)
            .count()
    }

    fn append(&self, alert_id: &str, event: IncidentEvent) {
        let id = match self.by_alert.read().get(alert_id).copied() {
            Some(id) => id,
            None => return,
        };
        if let Some(timeline) = self.timelines.write().get_mut(&id) {
            timeline.events.push(event);
        }
    }

    fn close(&self, alert_id: &str, closed_at: SystemTime) {
        if let Some(id) = self.by_alert.read().get(alert_id).copied() {
            if let Some(timeline) = self.timelines.write().get_mut(&id) {
                timeline.status = IncidentStatus::Resolved;
                timeline.closed_at = Some(closed_at);
            }
        }
    }
}

impl Default for IncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Orchestrates fire/clear handling: registers timelines, enforces
/// `max_concurrent`, and schedules pre/post metric snapshots via the
/// `MetricsProvider`.
pub struct IncidentRecorder {
    config: IncidentRecorderConfig,
    store: Arc<IncidentStore>,
    metrics: Arc<dyn MetricsProvider>,
    active: RwLock<HashMap<String, SystemTime>>,
}

impl IncidentRecorder {
    pub fn new(config: IncidentRecorderConfig, store: Arc<IncidentStore>, metrics: Arc<dyn MetricsProvider>) -> Self {
        Self {
            config,
            store,
            metrics,
            active: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new incident timeline for `alert_id` unless one is
    /// already open for it, or the recorder is at `max_concurrent`.
    pub async fn on_alert_fired(&self, alert_id: &str, resource_id: &str, metric: Option<&str>) -> bool {
        {
            let active = self.active.read();
            if active.contains_key(alert_id) {
                return false;
            }
            if active.len() >= self.config.max_concurrent {
                warn!(alert_id, "incident recorder at max_concurrent, dropping fire");
                return false;
            }
        }

        let dedup_key = match metric {
            Some(m) => format!("{resource_id}:{m}"),
            None => alert_id.to_string(),
        };
        if self.active.read().contains_key(&dedup_key) {
            return false;
        }

        let now = SystemTime::now();
        self.active.write().insert(dedup_key.clone(), now);

        let timeline = IncidentTimeline::new(alert_id.to_string(), resource_id.to_string(), now);
        let id = timeline.id;
        self.store.timelines.write().insert(id, timeline);
        self.store.by_alert.write().insert(alert_id.to_string(), id);
        self.store.append(
            alert_id,
            IncidentEvent::Fired {
                alert_id: alert_id.to_string(),
                timestamp: now,
            },
        );

        let mut samples = Vec::new();
        for metric_name in &self.config.metrics {
            if let Ok(Some(value)) = self.metrics.get(resource_id, metric_name).await {
                samples.push((metric_name.clone(), value));
            }
        }
        self.store.append(
            alert_id,
            IncidentEvent::EvidenceSnapshot {
                label: "pre".to_string(),
                samples,
                timestamp: now,
            },
        );

        info!(alert_id, resource_id, "incident opened");
        true
    }

    pub async fn on_alert_cleared(&self, alert_id: &str, resource_id: &str) {
        tokio::time::sleep(self.config.post_buffer).await;

        let mut samples = Vec::new();
        for metric_name in &self.config.metrics {
            if let Ok(Some(value)) = self.metrics.get(resource_id, metric_name).await {
                samples.push((metric_name.clone(), value));
            }
        }
        let now = SystemTime::now();
        self.store.append(
            alert_id,
            IncidentEvent::EvidenceSnapshot {
                label: "post".to_string(),
                samples,
                timestamp: now,
            },
        );
        self.store.append(
            alert_id,
            IncidentEvent::Cleared {
                alert_id: alert_id.to_string(),
                timestamp: now,
            },
        );
        self.store.close(alert_id, now);
        self.active.write().remove(alert_id);
        info!(alert_id, resource_id, "incident closed");
    }

    /// Drops all active incident registrations without writing pending
    /// snapshots (§4.8 stop semantics).
    pub fn stop(&self) {
        self.active.write().clear();
    }
}
