//! Alert-Triggered Analyzer (§4.6): classifies fired alerts into a patrol
//! scope, enforces per-resource cooldown, and scores container-update
//! urgency from image-name substrings.
//!
//! Grounded on the teacher's `integrations/policy_engine/engine.rs`
//! priority-sorted rule table idiom, reused here for both alert
//! classification and update-risk scoring instead of branching on
//! substrings inline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::interfaces::Alert;
use crate::types::{Category, PatrolScope, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertClass {
    Node,
    Guest,
    DockerHost,
    DockerContainer,
    DockerUpdate,
    Storage,
    Generic,
}

/// Tier table: (alert_type prefix, resource_id substring) -> class. Checked
/// in order; first match wins.
const CLASS_RULES: &[(&str, &str, AlertClass)] = &[
    ("node_", "", AlertClass::Node),
    ("guest_", "", AlertClass::Guest),
    ("docker_update", "", AlertClass::DockerUpdate),
    ("docker_host", "", AlertClass::DockerHost),
    ("docker_container", "", AlertClass::DockerContainer),
    ("docker_", "", AlertClass::DockerHost),
    ("storage_", "", AlertClass::Storage),
    ("", "pool", AlertClass::Storage),
    ("", "docker", AlertClass::DockerHost),
];

pub fn classify_alert(alert: &Alert) -> AlertClass {
    for (type_prefix, id_substring, class) in CLASS_RULES {
        let type_match = type_prefix.is_empty() || alert.alert_type.starts_with(type_prefix);
        let id_match = id_substring.is_empty() || alert.resource_id.contains(id_substring);
        if type_match && id_match && !(type_prefix.is_empty() && id_substring.is_empty()) {
            return *class;
        }
    }
    AlertClass::Generic
}

/// (image substring, severity, category, urgency 1-5, recommendation).
const UPDATE_RISK_RULES: &[(&str, Severity, Category, u8, &str)] = &[
    ("postgres", Severity::Warning, Category::Reliability, 4, "Schedule a maintenance window before updating; verify backups first"),
    ("mysql", Severity::Warning, Category::Reliability, 4, "Schedule a maintenance window before updating; verify backups first"),
    ("nginx", Severity::Watch, Category::Security, 3, "Update during low-traffic period"),
    ("traefik", Severity::Watch, Category::Security, 3, "Update during low-traffic period"),
];

#[derive(Debug, Clone)]
pub struct UpdateRisk {
    pub severity: Severity,
    pub category: Category,
    pub urgency: u8,
    pub recommendation: String,
}

/// Classifies a container-update alert's urgency from its image name,
/// escalating severity the longer it has been pending (§4.6).
pub fn classify_update_risk(image: &str, pending_since: Option<Instant>) -> UpdateRisk {
    let mut risk = UPDATE_RISK_RULES
        .iter()
        .find(|(substring, ..)| image.to_ascii_lowercase().contains(substring))
        .map(|(_, severity, category, urgency, recommendation)| UpdateRisk {
            severity: *severity,
            category: *category,
            urgency: *urgency,
            recommendation: recommendation.to_string(),
        })
        .unwrap_or(UpdateRisk {
            severity: Severity::Info,
            category: Category::General,
            urgency: 1,
            recommendation: "Update at your convenience".to_string(),
        });

    if let Some(since) = pending_since {
        let pending_days = since.elapsed().as_secs() / 86_400;
        if pending_days > 14 {
            risk.severity = Severity::Critical;
        } else if pending_days > 7 && risk.severity < Severity::Warning {
            risk.severity = Severity::Warning;
        }
    }
    risk
}

fn stable_key(alert: &Alert) -> String {
    format!(
        "{}|{}|{}",
        alert.resource_id,
        alert.instance.clone().unwrap_or_default(),
        alert.resource_name
    )
}

#[derive(Debug, Clone)]
pub struct AlertTriggeredConfig {
    pub enabled: bool,
    pub cooldown: Duration,
    pub cooldown_sweep_interval: Duration,
    pub cooldown_entry_ttl: Duration,
}

impl Default for AlertTriggeredConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::from_secs(300),
            cooldown_sweep_interval: Duration::from_secs(1800),
            cooldown_entry_ttl: Duration::from_secs(3600),
        }
    }
}

/// Decides whether a fired alert should start a scoped patrol, tracking
/// per-resource cooldown and in-flight dedup.
pub struct AlertTriggeredAnalyzer {
    config: AlertTriggeredConfig,
    cooldowns: RwLock<HashMap<String, Instant>>,
    pending: RwLock<HashMap<String, ()>>,
}

impl AlertTriggeredAnalyzer {
    pub fn new(config: AlertTriggeredConfig) -> Self {
        Self {
            config,
            cooldowns: RwLock::new(HashMap::new()),
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `Some(scope)` if this alert should trigger a scoped patrol
    /// right now, marking the resource key pending; `None` if disabled, in
    /// cooldown, or already pending.
    pub fn on_alert_fired(&self, alert: &Alert) -> Option<PatrolScope> {
        if !self.config.enabled {
            return None;
        }
        let key = stable_key(alert);

        if self.pending.read().contains_key(&key) {
            debug!(key, "alert already pending analysis");
            return None;
        }
        if let Some(last) = self.cooldowns.read().get(&key) {
            if last.elapsed() < self.config.cooldown {
                debug!(key, "alert in cooldown");
                return None;
            }
        }

        self.pending.write().insert(key.clone(), ());
        self.cooldowns.write().insert(key, Instant::now());

        Some(PatrolScope {
            resource_ids: vec![alert.resource_id.clone()],
            resource_types: Vec::new(),
            depth: Some(crate::types::PatrolDepthOpt::Quick),
            context: Some(format!("alert:{}", alert.alert_type)),
        })
    }

    pub fn mark_complete(&self, alert: &Alert) {
        self.pending.write().remove(&stable_key(alert));
    }

    /// Background sweep dropping cooldown entries older than the configured
    /// TTL; intended to run on a 30-minute ticker per §4.6.
    pub fn sweep_cooldowns(&self) {
        let ttl = self.config.cooldown_entry_ttl;
        self.cooldowns.write().retain(|_, last| last.elapsed() < ttl);
        info!(remaining = self.cooldowns.read().len(), "cooldown sweep completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn alert(id: &str, alert_type: &str) -> Alert {
        Alert {
            id: id.to_string(),
            alert_type: alert_type.to_string(),
            resource_id: id.to_string(),
            resource_name: id.to_string(),
            instance: None,
            severity: crate::interfaces::AlertSeverity::Warning,
            message: "msg".to_string(),
            fired_at: SystemTime::now(),
            pending_since: None,
        }
    }

    #[test]
    fn classifies_node_and_storage_alerts() {
        assert_eq!(classify_alert(&alert("n1", "node_cpu_high")), AlertClass::Node);
        assert_eq!(classify_alert(&alert("pool-1", "generic_usage")), AlertClass::Storage);
        assert_eq!(classify_alert(&alert("x", "mystery")), AlertClass::Generic);
    }

    #[test]
    fn cooldown_blocks_repeat_trigger() {
        let analyzer = AlertTriggeredAnalyzer::new(AlertTriggeredConfig::default());
        let a = alert("n1", "node_cpu_high");
        assert!(analyzer.on_alert_fired(&a).is_some());
        analyzer.mark_complete(&a);
        assert!(analyzer.on_alert_fired(&a).is_none());
    }

    #[test]
    fn pending_dedup_blocks_concurrent_trigger() {
        let analyzer = AlertTriggeredAnalyzer::new(AlertTriggeredConfig::default());
        let a = alert("n2", "node_cpu_high");
        assert!(analyzer.on_alert_fired(&a).is_some());
        assert!(analyzer.on_alert_fired(&a).is_none());
    }

    #[test]
    fn update_risk_escalates_with_pending_duration() {
        let fresh = classify_update_risk("postgres:16", None);
        assert_eq!(fresh.severity, Severity::Warning);

        let long_pending = Instant::now() - Duration::from_secs(15 * 86_400);
        let escalated = classify_update_risk("postgres:16", Some(long_pending));
        assert_eq!(escalated.severity, Severity::Critical);
    }

    #[test]
    fn unknown_image_gets_low_urgency_default() {
        let risk = classify_update_risk("my-custom-app", None);
        assert_eq!(risk.urgency, 1);
    }
}
