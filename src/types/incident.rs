//! Incident / timeline data structures (§3, §4.8).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::IncidentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IncidentEvent {
    Fired { alert_id: String, timestamp: SystemTime },
    Cleared { alert_id: String, timestamp: SystemTime },
    Runbook { text: String, timestamp: SystemTime },
    EvidenceSnapshot { label: String, samples: Vec<(String, f64)>, timestamp: SystemTime },
    AiAnalysis { text: String, timestamp: SystemTime },
}

impl IncidentEvent {
    pub fn timestamp(&self) -> SystemTime {
        match self {
            IncidentEvent::Fired { timestamp, .. } => *timestamp,
            IncidentEvent::Cleared { timestamp, .. } => *timestamp,
            IncidentEvent::Runbook { timestamp, .. } => *timestamp,
            IncidentEvent::EvidenceSnapshot { timestamp, .. } => *timestamp,
            IncidentEvent::AiAnalysis { timestamp, .. } => *timestamp,
        }
    }
}

/// Ordered append-only timeline keyed by alert_id (§3 Incident/IncidentTimeline).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentTimeline {
    pub id: IncidentId,
    pub alert_id: String,
    pub resource_id: String,
    pub status: IncidentStatus,
    pub opened_at: SystemTime,
    pub closed_at: Option<SystemTime>,
    pub events: Vec<IncidentEvent>,
}

impl IncidentTimeline {
    pub fn new(alert_id: String, resource_id: String, opened_at: SystemTime) -> Self {
        Self {
            id: IncidentId::new(),
            alert_id,
            resource_id,
            status: IncidentStatus::Open,
            opened_at,
            closed_at: None,
            events: Vec::new(),
        }
    }
}
