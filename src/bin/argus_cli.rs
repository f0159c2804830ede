//! Demo CLI for the fleet intelligence core: wires the reference
//! JSON-file persistence adapter and a pair of no-op collaborator stubs so
//! the crate can be driven standalone without a real fleet behind it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use argus_core::config::CoreConfig;
use argus_core::error::CoreResult;
use argus_core::interfaces::{
    LlmProvider, LlmRequest, LlmStreamEvent, MetricsProvider, NodeThresholds, StateProvider, StateSnapshot,
    StorageThresholds, ThresholdProvider,
};
use argus_core::types::{DismissReason, FindingId, Severity};
use argus_core::ArgusCore;

#[derive(Parser)]
#[command(name = "argus-cli", about = "Fleet intelligence core demo CLI")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the unified health snapshot
    Status,
    /// Run a full patrol and print the resulting run record
    Patrol,
    /// List active findings at or above a minimum severity
    Findings {
        #[arg(long, default_value = "info")]
        min_severity: String,
    },
    /// Dismiss a finding by id
    Dismiss {
        id: String,
        #[arg(long, default_value = "other")]
        reason: String,
    },
}

struct EmptyStateProvider;
#[async_trait]
impl StateProvider for EmptyStateProvider {
    async fn get_state(&self) -> CoreResult<StateSnapshot> {
        Ok(StateSnapshot::default())
    }
}

struct DefaultThresholds;
impl ThresholdProvider for DefaultThresholds {
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

struct ZeroMetricsProvider;
#[async_trait]
impl MetricsProvider for ZeroMetricsProvider {
    async fn get(&self, _resource_id: &str, _metric: &str) -> CoreResult<Option<f64>> {
        Ok(Some(0.0))
    }
}

struct EchoLlm;
#[async_trait]
impl LlmProvider for EchoLlm {
    async fn chat_stream(&self, _req: LlmRequest, _cb: Box<dyn Fn(LlmStreamEvent) + Send + Sync>) -> CoreResult<()> {
        Ok(())
    }
    async fn chat(&self, _req: LlmRequest) -> CoreResult<String> {
        Ok(String::new())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = CoreConfig::load(cli.config.as_deref());
    let data_dir = config.data_dir.clone();

    let core = ArgusCore::new(
        config,
        Arc::new(EmptyStateProvider),
        Arc::new(DefaultThresholds),
        Arc::new(ZeroMetricsProvider),
        Arc::new(EchoLlm),
        Arc::new(|_: &str, _: &serde_json::Value| Ok(json!({}))),
    );
    core.wire_default_persistence(&data_dir)?;

    match cli.command {
        Command::Status => {
            let snapshot = core.snapshot();
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Patrol => {
            info!("starting full patrol");
            let record = core.patrol_engine.run(Default::default(), "manual".to_string()).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Findings { min_severity } => {
            let min = Severity::from_str_loose(&min_severity);
            for finding in core.findings.get_active(min) {
                println!("[{}] {} — {} ({})", finding.severity, finding.title, finding.resource_id, finding.id);
            }
        }
        Command::Dismiss { id, reason } => {
            let uuid = uuid::Uuid::parse_str(&id)?;
            let ok = core.findings.dismiss(FindingId(uuid), DismissReason::from_str_loose(&reason), None);
            if ok {
                println!("dismissed {id}");
            } else {
                println!("no such finding: {id}");
            }
        }
    }

    Ok(())
}
