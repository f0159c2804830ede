//! Deterministic per-category analyzers (§4.5 step 3): one function per
//! resource category, each folding a `ResourceState` plus the computed
//! threshold set into zero or more candidate findings before the LLM ever
//! sees the snapshot.

use std::time::SystemTime;

use crate::interfaces::{ResourceState, ThresholdProvider};
use crate::types::{Category, Disposition, Finding, FindingId, FindingSource, Severity};

#[derive(Debug, Clone, Copy)]
pub struct ThresholdSet {
    pub node_watch: f64,
    pub node_warning: f64,
    pub guest_watch: f64,
    pub guest_warning: f64,
    pub storage_watch: f64,
    pub storage_warning: f64,
}

/// §4.5 step 2: `proactive_mode` shifts watch/warning further below the
/// alert threshold; both modes clamp into [10,99].
pub fn compute_thresholds(provider: &dyn ThresholdProvider, proactive_mode: bool) -> ThresholdSet {
    let node = provider.node_thresholds();
    let guest = provider.guest_thresholds();
    let storage = provider.storage_thresholds();

    let clamp = |v: f64| v.clamp(10.0, 99.0);
    let (watch_offset, warning_offset) = if proactive_mode { (15.0, 5.0) } else { (5.0, 0.0) };

    ThresholdSet {
        node_watch: clamp(node.cpu_warning - watch_offset),
        node_warning: clamp(node.cpu_warning - warning_offset),
        guest_watch: clamp(guest.cpu_warning - watch_offset),
        guest_warning: clamp(guest.cpu_warning - warning_offset),
        storage_watch: clamp(storage.warning - watch_offset),
        storage_warning: clamp(storage.warning - warning_offset),
    }
}

fn severity_for(value: f64, watch: f64, warning: f64) -> Option<Severity> {
    if value >= warning {
        Some(Severity::Warning)
    } else if value >= watch {
        Some(Severity::Watch)
    } else {
        None
    }
}

fn candidate(resource: &ResourceState, category: Category, title: String, description: String, severity: Severity, now: SystemTime) -> Finding {
    Finding {
        id: FindingId(uuid::Uuid::nil()),
        key: crate::types::normalize_key(&title),
        severity,
        category,
        resource_id: resource.id.clone(),
        resource_name: resource.name.clone(),
        resource_type: resource.resource_type.clone(),
        node: resource.node.clone(),
        title,
        description,
        recommendation: None,
        evidence: None,
        source: FindingSource::Patrol,
        detected_at: now,
        last_seen_at: now,
        disposition: Disposition::Active,
        user_note: None,
        times_raised: 1,
        alert_id: None,
        investigation: Default::default(),
    }
}

pub fn analyze_node(resource: &ResourceState, thresholds: &ThresholdSet, now: SystemTime) -> Vec<Finding> {
    let mut out = Vec::new();
    if let Some(cpu) = resource.metrics.get("cpu_percent") {
        if let Some(sev) = severity_for(*cpu, thresholds.node_watch, thresholds.node_warning) {
            out.push(candidate(
                resource,
                Category::Performance,
                format!("{} CPU usage elevated", resource.name),
                format!("CPU usage at {cpu:.1}%"),
                sev,
                now,
            ));
        }
    }
    out
}

pub fn analyze_guest(resource: &ResourceState, thresholds: &ThresholdSet, now: SystemTime) -> Vec<Finding> {
    let mut out = Vec::new();
    if let Some(mem) = resource.metrics.get("memory_percent") {
        if let Some(sev) = severity_for(*mem, thresholds.guest_watch, thresholds.guest_warning) {
            out.push(candidate(
                resource,
                Category::Performance,
                format!("{} memory usage elevated", resource.name),
                format!("Memory usage at {mem:.1}%"),
                sev,
                now,
            ));
        }
    }
    out
}

pub fn analyze_storage(resource: &ResourceState, thresholds: &ThresholdSet, now: SystemTime) -> Vec<Finding> {
    let mut out = Vec::new();
    if let Some(usage) = resource.metrics.get("usage_percent") {
        if let Some(sev) = severity_for(*usage, thresholds.storage_watch, thresholds.storage_warning) {
            out.push(candidate(
                resource,
                Category::Capacity,
                format!("{} storage pool filling up", resource.name),
                format!("Pool usage at {usage:.1}%"),
                sev,
                now,
            ));
        }
    }
    out
}

pub fn analyze_docker_host(resource: &ResourceState, thresholds: &ThresholdSet, now: SystemTime) -> Vec<Finding> {
    analyze_node(resource, thresholds, now)
}

pub fn analyze_docker_container(resource: &ResourceState, now: SystemTime) -> Vec<Finding> {
    let mut out = Vec::new();
    if resource.raw.get("status").and_then(|v| v.as_str()) == Some("unhealthy") {
        out.push(candidate(
            resource,
            Category::Reliability,
            format!("{} container unhealthy", resource.name),
            "Container healthcheck reporting unhealthy".to_string(),
            Severity::Warning,
            now,
        ));
    }
    out
}

pub fn analyze_backup(resource: &ResourceState, now: SystemTime) -> Vec<Finding> {
    let mut out = Vec::new();
    if let Some(status) = resource.raw.get("last_status").and_then(|v| v.as_str()) {
        if !matches!(status.to_ascii_lowercase().as_str(), "ok" | "success") {
            out.push(candidate(
                resource,
                Category::Backup,
                format!("{} backup job failed", resource.name),
                format!("Last backup status: {status}"),
                Severity::from_str_loose(status),
                now,
            ));
        }
    }
    out
}

pub fn analyze_kubernetes(resource: &ResourceState, thresholds: &ThresholdSet, now: SystemTime) -> Vec<Finding> {
    analyze_node(resource, thresholds, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FixedThresholds;
    impl ThresholdProvider for FixedThresholds {
        fn node_thresholds(&self) -> crate::interfaces::NodeThresholds {
            crate::interfaces::NodeThresholds {
                cpu_warning: 85.0,
                memory_warning: 90.0,
            }
        }
        fn guest_thresholds(&self) -> crate::interfaces::NodeThresholds {
            crate::interfaces::NodeThresholds {
                cpu_warning: 85.0,
                memory_warning: 90.0,
            }
        }
        fn storage_thresholds(&self) -> crate::interfaces::StorageThresholds {
            crate::interfaces::StorageThresholds {
                warning: 80.0,
                critical: 95.0,
            }
        }
    }

    fn resource(id: &str, metric: &str, value: f64) -> ResourceState {
        let mut metrics = HashMap::new();
        metrics.insert(metric.to_string(), value);
        ResourceState {
            id: id.to_string(),
            name: id.to_string(),
            resource_type: "node".to_string(),
            node: None,
            metrics,
            raw: serde_json::Value::Null,
        }
    }

    #[test]
    fn proactive_mode_widens_watch_band() {
        let t_proactive = compute_thresholds(&FixedThresholds, true);
        let t_exact = compute_thresholds(&FixedThresholds, false);
        assert!(t_proactive.node_watch < t_exact.node_watch);
    }

    #[test]
    fn thresholds_clamp_into_range() {
        struct Extreme;
        impl ThresholdProvider for Extreme {
            fn node_thresholds(&self) -> crate::interfaces::NodeThresholds {
                crate::interfaces::NodeThresholds {
                    cpu_warning: 1.0,
                    memory_warning: 1.0,
                }
            }
            fn guest_thresholds(&self) -> crate::interfaces::NodeThresholds {
                self.node_thresholds()
            }
            fn storage_thresholds(&self) -> crate::interfaces::StorageThresholds {
                crate::interfaces::StorageThresholds {
                    warning: 200.0,
                    critical: 300.0,
                }
            }
        }
        let t = compute_thresholds(&Extreme, true);
        assert!(t.node_watch >= 10.0);
        assert!(t.storage_warning <= 99.0);
    }

    #[test]
    fn node_analyzer_emits_watch_then_warning() {
        let thresholds = compute_thresholds(&FixedThresholds, false);
        let watch = analyze_node(&resource("n1", "cpu_percent", thresholds.node_watch + 1.0), &thresholds, SystemTime::now());
        assert_eq!(watch.len(), 1);
        assert_eq!(watch[0].severity, Severity::Watch);

        let warn = analyze_node(&resource("n1", "cpu_percent", thresholds.node_warning + 1.0), &thresholds, SystemTime::now());
        assert_eq!(warn[0].severity, Severity::Warning);
    }

    #[test]
    fn below_watch_threshold_yields_no_candidate() {
        let thresholds = compute_thresholds(&FixedThresholds, false);
        let none = analyze_node(&resource("n1", "cpu_percent", 1.0), &thresholds, SystemTime::now());
        assert!(none.is_empty());
    }
}
