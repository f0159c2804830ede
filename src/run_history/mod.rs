//! Run History Store (§4.2): bounded, newest-first ring of patrol-run
//! records with debounced persistence, grounded on the same
//! `DefaultResourceManager` pattern as `findings` but simplified to a
//! single `RwLock<VecDeque<_>>` since entries are prepended wholesale
//! rather than mutated in place.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::interfaces::ConfigPersistence;
use crate::types::PatrolRunRecord;

#[derive(Debug, Clone)]
pub struct RunHistoryConfig {
    pub max_size: usize,
    pub debounce: Duration,
}

impl Default for RunHistoryConfig {
    fn default() -> Self {
        Self {
            max_size: 60,
            debounce: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct RunHistoryState {
    runs: VecDeque<PatrolRunRecord>,
}

pub struct RunHistoryStore {
    state: RwLock<RunHistoryState>,
    persistence: RwLock<Option<Arc<dyn ConfigPersistence<RunHistoryState>>>>,
    config: RunHistoryConfig,
}

impl RunHistoryStore {
    pub fn new(config: RunHistoryConfig) -> Self {
        Self {
            state: RwLock::new(RunHistoryState::default()),
            persistence: RwLock::new(None),
            config,
        }
    }

    pub fn set_persistence(&self, persistence: Arc<dyn ConfigPersistence<RunHistoryState>>) {
        if let Ok(Some(mut loaded)) = persistence.load() {
            while loaded.runs.len() > self.config.max_size {
                loaded.runs.pop_back();
            }
            *self.state.write() = loaded;
        }
        *self.persistence.write() = Some(persistence);
    }

    fn schedule_save(&self) {
        let snapshot = self.state.read().clone();
        if let Some(p) = self.persistence.read().as_ref() {
            if let Err(e) = p.save(&snapshot) {
                warn!(error = %e, "run history save failed");
            }
        }
    }

    pub fn flush_persistence(&self) -> Result<(), crate::error::CoreError> {
        let snapshot = self.state.read().clone();
        if let Some(p) = self.persistence.read().as_ref() {
            p.force_save(&snapshot)?;
        }
        Ok(())
    }

    pub fn add(&self, record: PatrolRunRecord) {
        let mut state = self.state.write();
        state.runs.push_front(record);
        while state.runs.len() > self.config.max_size {
            state.runs.pop_back();
        }
        drop(state);
        self.schedule_save();
    }

    pub fn recent(&self, limit: usize) -> Vec<PatrolRunRecord> {
        self.state.read().runs.iter().take(limit).cloned().collect()
    }

    pub fn all(&self) -> Vec<PatrolRunRecord> {
        self.state.read().runs.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
