//! Configuration (§4.13): aggregates every component's config struct,
//! `Default`-derived with the numeric defaults named throughout §4,
//! loadable from TOML with `ARGUS_`-prefixed env overrides.
//!
//! Grounded on the teacher's `RuntimeConfig` (`lib.rs`): one struct per
//! subsystem, composed into a single tree with a blanket `Default`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::alert_triggered::AlertTriggeredConfig;
use crate::cost::CostStoreConfig;
use crate::findings::FindingsStoreConfig;
use crate::incident::IncidentRecorderConfig;
use crate::patrol::PatrolEngineConfig;
use crate::run_history::RunHistoryConfig;
use crate::trigger::TriggerManagerConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializableDurations {
    pub findings_debounce_secs: u64,
    pub run_history_debounce_secs: u64,
    pub trigger_global_rate_limit_secs: u64,
    pub trigger_per_resource_rate_limit_secs: u64,
    pub incident_pre_buffer_secs: u64,
    pub incident_post_buffer_secs: u64,
    pub investigation_budget_monthly_tokens: u64,
}

impl Default for SerializableDurations {
    fn default() -> Self {
        Self {
            findings_debounce_secs: 5,
            run_history_debounce_secs: 5,
            trigger_global_rate_limit_secs: 30,
            trigger_per_resource_rate_limit_secs: 120,
            incident_pre_buffer_secs: 60,
            incident_post_buffer_secs: 300,
            investigation_budget_monthly_tokens: 2_000_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CoreConfig {
    pub findings: FindingsStoreConfig,
    pub run_history: RunHistoryConfig,
    pub trigger: TriggerManagerConfig,
    pub incident: IncidentRecorderConfig,
    pub patrol: PatrolEngineConfig,
    pub alert_triggered: AlertTriggeredConfig,
    pub cost: CostStoreConfig,
    pub investigation_budget_monthly_tokens: u64,
    pub data_dir: std::path::PathBuf,
}

impl CoreConfig {
    /// Loads a TOML config file (if present) and applies any `ARGUS_*`
    /// environment overrides on top, falling back to all defaults when
    /// neither source is present.
    pub fn load(path: Option<&Path>) -> Self {
        let mut durations = SerializableDurations::default();
        let mut data_dir = dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("argus");

        if let Some(path) = path {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<SerializableDurations>(&contents) {
                    Ok(parsed) => durations = parsed,
                    Err(e) => warn!(error = %e, "failed to parse config file, using defaults"),
                },
                Err(e) => warn!(error = %e, path = %path.display(), "config file not found, using defaults"),
            }
        }

        if let Ok(dir) = std::env::var("ARGUS_DATA_DIR") {
            data_dir = std::path::PathBuf::from(dir);
        }
        if let Ok(v) = std::env::var("ARGUS_INVESTIGATION_BUDGET_TOKENS") {
            if let Ok(parsed) = v.parse() {
                durations.investigation_budget_monthly_tokens = parsed;
            }
        }

        info!(data_dir = %data_dir.display(), "configuration loaded");

        Self {
            findings: FindingsStoreConfig {
                debounce: Duration::from_secs(durations.findings_debounce_secs),
            },
            run_history: RunHistoryConfig {
                max_size: 60,
                debounce: Duration::from_secs(durations.run_history_debounce_secs),
            },
            trigger: TriggerManagerConfig {
                global_rate_limit: Duration::from_secs(durations.trigger_global_rate_limit_secs),
                per_resource_rate_limit: Duration::from_secs(durations.trigger_per_resource_rate_limit_secs),
                ..TriggerManagerConfig::default()
            },
            incident: IncidentRecorderConfig {
                pre_buffer: Duration::from_secs(durations.incident_pre_buffer_secs),
                post_buffer: Duration::from_secs(durations.incident_post_buffer_secs),
                ..IncidentRecorderConfig::default()
            },
            patrol: PatrolEngineConfig::default(),
            alert_triggered: AlertTriggeredConfig::default(),
            cost: CostStoreConfig::default(),
            investigation_budget_monthly_tokens: durations.investigation_budget_monthly_tokens,
            data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_without_file_uses_defaults() {
        let config = CoreConfig::load(None);
        assert_eq!(config.run_history.max_size, 60);
        assert_eq!(config.investigation_budget_monthly_tokens, 2_000_000);
    }

    #[test]
    fn load_applies_toml_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("argus.toml");
        std::fs::write(&path, "findings_debounce_secs = 15\n").unwrap();
        let config = CoreConfig::load(Some(&path));
        assert_eq!(config.findings.debounce, Duration::from_secs(15));
    }
}
