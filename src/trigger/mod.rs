//! Trigger Manager (§4.7): bounded priority queue of patrol requests with
//! dedup, displacement, rate limiting, and adaptive cadence.
//!
//! Grounded directly on the teacher's `DefaultAgentScheduler`
//! (`scheduler/mod.rs`): a `BinaryHeap`-backed `ScheduledTask` with a custom
//! `Ord` comparing priority then timestamp, and a background loop that
//! pops the heap on a fixed tick.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::types::{PatrolScope, Severity, TriggerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerReason {
    AlertFired,
    AlertCleared,
    Anomaly(AnomalySeverity),
    UserAction,
    Manual,
    Scheduled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalySeverity {
    Low,
    Medium,
    High,
}

impl TriggerReason {
    pub fn base_priority(&self) -> i32 {
        match self {
            TriggerReason::Manual => 100,
            TriggerReason::AlertFired => 80,
            TriggerReason::UserAction => 70,
            TriggerReason::Anomaly(AnomalySeverity::High) => 85,
            TriggerReason::Anomaly(AnomalySeverity::Medium) => 72,
            TriggerReason::Anomaly(AnomalySeverity::Low) => 60,
            TriggerReason::AlertCleared => 40,
            TriggerReason::Scheduled => 20,
        }
    }
}

#[derive(Debug, Clone)]
struct QueuedTrigger {
    id: TriggerId,
    reason: TriggerReason,
    priority: i32,
    scope: PatrolScope,
    queued_at: Instant,
    retry_after: Option<Instant>,
}

impl PartialEq for QueuedTrigger {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.queued_at == other.queued_at
    }
}
impl Eq for QueuedTrigger {}

impl Ord for QueuedTrigger {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.queued_at.cmp(&self.queued_at))
    }
}
impl PartialOrd for QueuedTrigger {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct TriggerManagerConfig {
    pub max_queue: usize,
    pub global_rate_limit: Duration,
    pub per_resource_rate_limit: Duration,
    pub busy_threshold: u32,
    pub busy_window: Duration,
    pub base_interval: Duration,
    pub busy_interval: Duration,
    pub idle_interval: Duration,
}

impl Default for TriggerManagerConfig {
    fn default() -> Self {
        Self {
            max_queue: 10,
            global_rate_limit: Duration::from_secs(30),
            per_resource_rate_limit: Duration::from_secs(120),
            busy_threshold: 5,
            busy_window: Duration::from_secs(300),
            base_interval: Duration::from_secs(900),
            busy_interval: Duration::from_secs(300),
            idle_interval: Duration::from_secs(1800),
        }
    }
}

pub struct TriggerManager {
    config: TriggerManagerConfig,
    queue: RwLock<BinaryHeap<QueuedTrigger>>,
    last_global_run: RwLock<Option<Instant>>,
    last_resource_run: RwLock<HashMap<String, Instant>>,
    recent_events: RwLock<Vec<Instant>>,
    shutdown: Arc<Notify>,
}

impl TriggerManager {
    pub fn new(config: TriggerManagerConfig) -> Self {
        Self {
            config,
            queue: RwLock::new(BinaryHeap::new()),
            last_global_run: RwLock::new(None),
            last_resource_run: RwLock::new(HashMap::new()),
            recent_events: RwLock::new(Vec::new()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Dedupes by (reason, sorted resource ids), merging priority upward on
    /// collision. When full, displaces the lowest-priority pending entry
    /// iff the incoming one strictly exceeds it; otherwise rejects.
    pub fn trigger_patrol(&self, reason: TriggerReason, scope: PatrolScope) -> Option<TriggerId> {
        self.record_event();
        let priority = reason.base_priority();
        let dedup_key = (format!("{reason:?}"), scope.dedup_key());

        let mut queue = self.queue.write();
        let existing = queue
            .iter()
            .find(|t| (format!("{:?}", t.reason), t.scope.dedup_key()) == dedup_key)
            .map(|t| t.id);

        if let Some(id) = existing {
            let mut items: Vec<QueuedTrigger> = queue.drain().collect();
            if let Some(item) = items.iter_mut().find(|t| t.id == id) {
                item.priority = item.priority.max(priority);
            }
            *queue = items.into_iter().collect();
            return Some(id);
        }

        if queue.len() >= self.config.max_queue {
            let lowest = queue.iter().min().cloned();
            match lowest {
                Some(lowest) if priority > lowest.priority => {
                    let mut items: Vec<QueuedTrigger> = queue.drain().collect();
                    items.retain(|t| t.id != lowest.id);
                    *queue = items.into_iter().collect();
                    debug!(displaced = %lowest.id, "trigger displaced lower-priority entry");
                }
                _ => {
                    warn!("trigger queue full, rejecting trigger");
                    return None;
                }
            }
        }

        let id = TriggerId::new();
        queue.push(QueuedTrigger {
            id,
            reason,
            priority,
            scope,
            queued_at: Instant::now(),
            retry_after: None,
        });
        Some(id)
    }

    fn record_event(&self) {
        let now = Instant::now();
        let mut events = self.recent_events.write();
        events.push(now);
        let window = self.config.busy_window;
        events.retain(|t| now.duration_since(*t) <= window);
    }

    /// §4.7 adaptive cadence: busy_threshold-or-more events in the window
    /// shortens the interval, zero events lengthens it.
    pub fn current_interval(&self) -> Duration {
        let count = self.recent_events.read().len() as u32;
        if count >= self.config.busy_threshold {
            self.config.busy_interval
        } else if count == 0 {
            self.config.idle_interval
        } else {
            self.config.base_interval
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue.read().len()
    }

    /// Pops the highest-priority trigger respecting `retry_after` and the
    /// global/per-resource rate limits; returns `None` if nothing is
    /// currently eligible to run.
    pub fn pop_eligible(&self) -> Option<(TriggerId, TriggerReason, PatrolScope)> {
        let now = Instant::now();
        if let Some(last) = *self.last_global_run.read() {
            if now.duration_since(last) < self.config.global_rate_limit {
                return None;
            }
        }

        let mut queue = self.queue.write();
        let mut items: Vec<QueuedTrigger> = queue.drain().collect();
        items.sort_by(|a, b| b.cmp(a));

        let mut chosen_idx = None;
        for (idx, item) in items.iter().enumerate() {
            if let Some(retry) = item.retry_after {
                if retry > now {
                    continue;
                }
            }
            let resource_gate = item
                .scope
                .resource_ids
                .iter()
                .any(|id| {
                    self.last_resource_run
                        .read()
                        .get(id)
                        .map(|last| now.duration_since(*last) < self.config.per_resource_rate_limit)
                        .unwrap_or(false)
                });
            if resource_gate {
                continue;
            }
            chosen_idx = Some(idx);
            break;
        }

        let chosen = chosen_idx.map(|idx| items.remove(idx));
        *queue = items.into_iter().collect();
        drop(queue);

        chosen.map(|item| {
            *self.last_global_run.write() = Some(now);
            for id in &item.scope.resource_ids {
                self.last_resource_run.write().insert(id.clone(), now);
            }
            info!(id = %item.id, priority = item.priority, "trigger dispatched");
            (item.id, item.reason, item.scope)
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(ids: &[&str]) -> PatrolScope {
        PatrolScope {
            resource_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn dedup_merges_priority_upward() {
        let mgr = TriggerManager::new(TriggerManagerConfig::default());
        let id1 = mgr.trigger_patrol(TriggerReason::Scheduled, scope(&["n1"])).unwrap();
        let id2 = mgr.trigger_patrol(TriggerReason::Manual, scope(&["n1"])).unwrap();
        assert_eq!(id1, id2);
        assert_eq!(mgr.queue_len(), 1);
    }

    #[test]
    fn full_queue_displaces_lower_priority() {
        let mgr = TriggerManager::new(TriggerManagerConfig {
            max_queue: 1,
            ..TriggerManagerConfig::default()
        });
        mgr.trigger_patrol(TriggerReason::Scheduled, scope(&["a"])).unwrap();
        let replaced = mgr.trigger_patrol(TriggerReason::Manual, scope(&["b"]));
        assert!(replaced.is_some());
        assert_eq!(mgr.queue_len(), 1);
    }

    #[test]
    fn full_queue_rejects_equal_or_lower_priority() {
        let mgr = TriggerManager::new(TriggerManagerConfig {
            max_queue: 1,
            ..TriggerManagerConfig::default()
        });
        mgr.trigger_patrol(TriggerReason::Manual, scope(&["a"])).unwrap();
        let rejected = mgr.trigger_patrol(TriggerReason::Scheduled, scope(&["b"]));
        assert!(rejected.is_none());
    }

    #[test]
    fn pop_eligible_respects_global_rate_limit() {
        let mgr = TriggerManager::new(TriggerManagerConfig::default());
        mgr.trigger_patrol(TriggerReason::Manual, scope(&["a"])).unwrap();
        let first = mgr.pop_eligible();
        assert!(first.is_some());
        mgr.trigger_patrol(TriggerReason::Manual, scope(&["b"])).unwrap();
        assert!(mgr.pop_eligible().is_none());
    }

    #[test]
    fn adaptive_cadence_reacts_to_event_volume() {
        let mgr = TriggerManager::new(TriggerManagerConfig::default());
        assert_eq!(mgr.current_interval(), mgr.config.idle_interval);
        for _ in 0..mgr.config.busy_threshold {
            mgr.trigger_patrol(TriggerReason::AlertFired, scope(&["c"]));
        }
        assert_eq!(mgr.current_interval(), mgr.config.busy_interval);
    }
}
