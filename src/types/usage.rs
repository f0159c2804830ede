//! Usage accounting data structures (§3 UsageEvent, §4.9).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::FindingId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    pub timestamp: SystemTime,
    pub provider: String,
    pub request_model: String,
    pub response_model: String,
    pub use_case: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub target_type: String,
    pub target_id: String,
    pub finding_id: Option<FindingId>,
}
