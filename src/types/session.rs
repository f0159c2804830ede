//! Chat session and knowledge-fact data structures (§3 Session, KnowledgeFact).

use std::collections::HashMap;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::SessionId;
use crate::fsm::SessionFsm;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    pub timestamp: SystemTime,
}

/// (category, key, value) with a deterministic key derived from
/// (tool, args, result-shape); values truncated to a maximum length
/// (§3 KnowledgeFact, §5 resource caps).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeFact {
    pub category: String,
    pub key: String,
    pub value: String,
}

pub const FACT_VALUE_TRUNCATION_BYTES: usize = 2000;

impl KnowledgeFact {
    pub fn new(category: impl Into<String>, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut value = value.into();
        if value.len() > FACT_VALUE_TRUNCATION_BYTES {
            value.truncate(FACT_VALUE_TRUNCATION_BYTES);
            value.push_str("...[truncated]");
        }
        Self {
            category: category.into(),
            key: key.into(),
            value,
        }
    }
}

/// A chat session: message history, FSM state, pending questions/approvals,
/// and accumulated knowledge facts.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub messages: Vec<ChatMessage>,
    pub fsm: SessionFsm,
    pub facts: HashMap<String, KnowledgeFact>,
    pub created_at: SystemTime,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            messages: Vec::new(),
            fsm: SessionFsm::new(),
            facts: HashMap::new(),
            created_at: SystemTime::now(),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
