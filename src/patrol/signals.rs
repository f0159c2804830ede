//! Signal Detector (§4.5): deterministic, rule-based observations parsed
//! directly out of tool/metric JSON, no LLM involved. Grounded on the
//! teacher's `StandardRAGEngine::classify_intent`-style fixed-rule
//! classification (`rag/engine.rs`) generalized from keyword rules to
//! numeric-threshold rules.

use serde_json::Value;

use crate::types::{Category, Finding, Severity};

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSignal {
    pub signal_type: String,
    pub resource_id: String,
    pub category: Category,
    pub suggested_severity: Severity,
    pub evidence: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SignalThresholds {
    pub storage_warning: f64,
    pub storage_critical: f64,
    pub cpu_warning: f64,
    pub memory_warning: f64,
    pub backup_stale_hours: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            storage_warning: 80.0,
            storage_critical: 95.0,
            cpu_warning: 85.0,
            memory_warning: 90.0,
            backup_stale_hours: 36.0,
        }
    }
}

/// Parses a single tool-call result for a resource and returns any
/// deterministic signals it implies. Malformed JSON or a non-success call
/// (`result["success"] == false`) yields no signals.
pub fn detect_signals(resource_id: &str, result: &Value, thresholds: SignalThresholds) -> Vec<DetectedSignal> {
    if result.get("success").and_then(Value::as_bool) == Some(false) {
        return Vec::new();
    }

    let mut signals = Vec::new();

    if let Some(smart) = result.get("smart_status").and_then(Value::as_str) {
        if !matches!(smart.to_ascii_uppercase().as_str(), "PASSED" | "OK") {
            signals.push(DetectedSignal {
                signal_type: "SMART_FAILURE".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Reliability,
                suggested_severity: Severity::Critical,
                evidence: format!("smart_status={smart}"),
            });
        }
    }

    if let Some(usage) = result.get("pool_usage_percent").and_then(Value::as_f64) {
        if usage >= thresholds.storage_critical {
            signals.push(DetectedSignal {
                signal_type: "STORAGE_USAGE".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Capacity,
                suggested_severity: Severity::Critical,
                evidence: format!("pool_usage_percent={usage}"),
            });
        } else if usage >= thresholds.storage_warning {
            signals.push(DetectedSignal {
                signal_type: "STORAGE_USAGE".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Capacity,
                suggested_severity: Severity::Warning,
                evidence: format!("pool_usage_percent={usage}"),
            });
        }
    }

    if let Some(cpu) = result.get("avg_cpu_percent").and_then(Value::as_f64) {
        if cpu >= thresholds.cpu_warning {
            signals.push(DetectedSignal {
                signal_type: "CPU_HIGH".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Performance,
                suggested_severity: Severity::Warning,
                evidence: format!("avg_cpu_percent={cpu}"),
            });
        }
    }

    if let Some(mem) = result.get("memory_percent").and_then(Value::as_f64) {
        if mem >= thresholds.memory_warning {
            signals.push(DetectedSignal {
                signal_type: "MEMORY_HIGH".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Performance,
                suggested_severity: Severity::Warning,
                evidence: format!("memory_percent={mem}"),
            });
        }
    }

    if let Some(status) = result.get("backup_status").and_then(Value::as_str) {
        if !matches!(status.to_ascii_lowercase().as_str(), "ok" | "success") {
            signals.push(DetectedSignal {
                signal_type: "BACKUP_FAILED".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Backup,
                suggested_severity: Severity::from_str_loose(status),
                evidence: format!("backup_status={status}"),
            });
        }
    }

    if let Some(age_hours) = result.get("last_successful_backup_age_hours").and_then(Value::as_f64) {
        if age_hours >= thresholds.backup_stale_hours {
            signals.push(DetectedSignal {
                signal_type: "BACKUP_STALE".to_string(),
                resource_id: resource_id.to_string(),
                category: Category::Backup,
                suggested_severity: Severity::Warning,
                evidence: format!("last_successful_backup_age_hours={age_hours}"),
            });
        }
    }

    if let Some(alerts) = result.get("alerts").and_then(Value::as_array) {
        for alert in alerts {
            if let Some(severity) = alert.get("severity").and_then(Value::as_str) {
                let sev = Severity::from_str_loose(severity);
                if sev >= Severity::Warning {
                    signals.push(DetectedSignal {
                        signal_type: "ACTIVE_ALERT".to_string(),
                        resource_id: resource_id.to_string(),
                        category: Category::General,
                        suggested_severity: sev,
                        evidence: alert.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
                    });
                }
            }
        }
    }

    signals
}

/// Signals whose (resource_id, category) has no corresponding existing
/// finding, surfaced as prompt hints so the model is nudged toward things
/// the deterministic layer already suspects.
pub fn unmatched_signals(signals: &[DetectedSignal], findings: &[Finding]) -> Vec<DetectedSignal> {
    signals
        .iter()
        .filter(|s| {
            !findings
                .iter()
                .any(|f| f.resource_id == s.resource_id && f.category == s.category)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn smart_failure_detected() {
        let result = json!({"smart_status": "FAILED"});
        let signals = detect_signals("disk-1", &result, SignalThresholds::default());
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal_type, "SMART_FAILURE");
        assert_eq!(signals[0].suggested_severity, Severity::Critical);
    }

    #[test]
    fn storage_usage_tiers() {
        let warn = detect_signals("pool-1", &json!({"pool_usage_percent": 85.0}), SignalThresholds::default());
        assert_eq!(warn[0].suggested_severity, Severity::Warning);
        let crit = detect_signals("pool-1", &json!({"pool_usage_percent": 97.0}), SignalThresholds::default());
        assert_eq!(crit[0].suggested_severity, Severity::Critical);
    }

    #[test]
    fn failed_tool_call_yields_no_signals() {
        let result = json!({"success": false, "pool_usage_percent": 99.0});
        assert!(detect_signals("pool-1", &result, SignalThresholds::default()).is_empty());
    }

    #[test]
    fn backup_stale_and_failed() {
        let stale = detect_signals("pbs-1", &json!({"last_successful_backup_age_hours": 48.0}), SignalThresholds::default());
        assert_eq!(stale[0].signal_type, "BACKUP_STALE");
        let failed = detect_signals("pbs-1", &json!({"backup_status": "error"}), SignalThresholds::default());
        assert_eq!(failed[0].signal_type, "BACKUP_FAILED");
    }

    #[test]
    fn unmatched_signals_filters_existing_findings() {
        let signals = vec![DetectedSignal {
            signal_type: "CPU_HIGH".to_string(),
            resource_id: "node-1".to_string(),
            category: Category::Performance,
            suggested_severity: Severity::Warning,
            evidence: String::new(),
        }];
        assert_eq!(unmatched_signals(&signals, &[]).len(), 1);
    }
}
