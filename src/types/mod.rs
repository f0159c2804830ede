//! Core types and data structures for the fleet intelligence subsystem.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod finding;
pub mod incident;
pub mod patrol;
pub mod session;
pub mod usage;

pub use finding::*;
pub use incident::*;
pub use patrol::*;
pub use session::*;
pub use usage::*;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

opaque_id!(FindingId);
opaque_id!(SessionId);
opaque_id!(IncidentId);
opaque_id!(RunId);
opaque_id!(TriggerId);
opaque_id!(QuestionId);
opaque_id!(ApprovalId);
opaque_id!(SuppressionRuleId);

/// Severity ordered so `Critical > Warning > Watch > Info` for escalation
/// comparisons throughout the findings lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Watch,
    Warning,
    Critical,
}

impl Severity {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "warning" | "warn" => Severity::Warning,
            "watch" => Severity::Watch,
            _ => Severity::Info,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Critical => "critical",
            Severity::Warning => "warning",
            Severity::Watch => "watch",
            Severity::Info => "info",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Performance,
    Reliability,
    Security,
    Capacity,
    Backup,
    General,
}

impl Category {
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "reliability" => Category::Reliability,
            "security" => Category::Security,
            "capacity" => Category::Capacity,
            "backup" => Category::Backup,
            "general" => Category::General,
            _ => Category::Performance,
        }
    }

    /// Categories that always pass AI-finding metric validation in the
    /// patrol pipeline, regardless of severity (§4.5 filtering rule).
    pub fn always_passes_validation(&self) -> bool {
        matches!(
            self,
            Category::Backup | Category::Security | Category::Reliability
        )
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Category::Performance => "performance",
            Category::Reliability => "reliability",
            Category::Security => "security",
            Category::Capacity => "capacity",
            Category::Backup => "backup",
            Category::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// Normalizes a free-form string into a lowercase dashed slug: lowercase,
/// non-alphanumerics collapse to `-`, leading/trailing dashes trimmed.
pub fn normalize_key(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}
