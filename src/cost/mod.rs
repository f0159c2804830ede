//! Cost Store & Investigation Budget (§4.9): append-only usage accounting
//! and a monthly token allowance, grounded on the teacher's windowed-count
//! bookkeeping in `error_handler/mod.rs` (the circuit breaker keeps a
//! rolling event window the same shape as the per-day/provider aggregation
//! here).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Datelike, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CoreError, CoreResult};
use crate::interfaces::ConfigPersistence;
use crate::types::UsageEvent;

#[derive(Debug, Clone)]
pub struct CostStoreConfig {
    pub debounce: Duration,
}

impl Default for CostStoreConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct CostState {
    events: Vec<UsageEvent>,
}

pub struct CostStore {
    state: RwLock<CostState>,
    persistence: RwLock<Option<Arc<dyn ConfigPersistence<CostState>>>>,
}

#[derive(Debug, Clone, Default)]
pub struct CostAggregate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub event_count: u64,
}

impl CostStore {
    pub fn new(_config: CostStoreConfig) -> Self {
        Self {
            state: RwLock::new(CostState::default()),
            persistence: RwLock::new(None),
        }
    }

    pub fn set_persistence(&self, persistence: Arc<dyn ConfigPersistence<CostState>>) {
        if let Ok(Some(loaded)) = persistence.load() {
            *self.state.write() = loaded;
        }
        *self.persistence.write() = Some(persistence);
    }

    fn schedule_save(&self) {
        let snapshot = self.state.read().clone();
        if let Some(p) = self.persistence.read().as_ref() {
            if let Err(e) = p.save(&snapshot) {
                warn!(error = %e, "cost store save failed");
            }
        }
    }

    pub fn record(&self, event: UsageEvent) {
        self.state.write().events.push(event);
        self.schedule_save();
    }

    pub fn by_provider(&self, since: SystemTime) -> HashMap<String, CostAggregate> {
        let mut out: HashMap<String, CostAggregate> = HashMap::new();
        for event in self.state.read().events.iter().filter(|e| e.timestamp >= since) {
            let agg = out.entry(event.provider.clone()).or_default();
            agg.input_tokens += event.input_tokens;
            agg.output_tokens += event.output_tokens;
            agg.event_count += 1;
        }
        out
    }

    pub fn by_use_case(&self, since: SystemTime) -> HashMap<String, CostAggregate> {
        let mut out: HashMap<String, CostAggregate> = HashMap::new();
        for event in self.state.read().events.iter().filter(|e| e.timestamp >= since) {
            let agg = out.entry(event.use_case.clone()).or_default();
            agg.input_tokens += event.input_tokens;
            agg.output_tokens += event.output_tokens;
            agg.event_count += 1;
        }
        out
    }

    pub fn total_since(&self, since: SystemTime) -> CostAggregate {
        let mut agg = CostAggregate::default();
        for event in self.state.read().events.iter().filter(|e| e.timestamp >= since) {
            agg.input_tokens += event.input_tokens;
            agg.output_tokens += event.output_tokens;
            agg.event_count += 1;
        }
        agg
    }
}

/// Monthly token allowance for agentic investigation sessions. Resets the
/// first time `try_consume`/`remaining` observe a new calendar month.
pub struct InvestigationBudget {
    limit: u64,
    state: RwLock<BudgetState>,
}

struct BudgetState {
    used: u64,
    reset_month: u32,
    reset_year: i32,
}

impl InvestigationBudget {
    pub fn new(limit: u64) -> Self {
        let now: DateTime<Utc> = Utc::now();
        Self {
            limit,
            state: RwLock::new(BudgetState {
                used: 0,
                reset_month: now.month(),
                reset_year: now.year(),
            }),
        }
    }

    fn maybe_reset(&self, state: &mut BudgetState) {
        let now: DateTime<Utc> = Utc::now();
        if now.year() != state.reset_year || now.month() != state.reset_month {
            state.used = 0;
            state.reset_month = now.month();
            state.reset_year = now.year();
        }
    }

    pub fn remaining(&self) -> u64 {
        let mut state = self.state.write();
        self.maybe_reset(&mut state);
        self.limit.saturating_sub(state.used)
    }

    pub fn try_consume(&self, amount: u64) -> CoreResult<()> {
        let mut state = self.state.write();
        self.maybe_reset(&mut state);
        let remaining = self.limit.saturating_sub(state.used);
        if amount > remaining {
            return Err(CoreError::BudgetExhausted {
                reset_at: SystemTime::now(),
            });
        }
        state.used += amount;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FindingId;

    fn event(provider: &str, tokens: u64) -> UsageEvent {
        UsageEvent {
            timestamp: SystemTime::now(),
            provider: provider.to_string(),
            request_model: "m".to_string(),
            response_model: "m".to_string(),
            use_case: "patrol".to_string(),
            input_tokens: tokens,
            output_tokens: tokens,
            target_type: "node".to_string(),
            target_id: "n1".to_string(),
            finding_id: None::<FindingId>,
        }
    }

    #[test]
    fn by_provider_aggregates_correctly() {
        let store = CostStore::new(CostStoreConfig::default());
        store.record(event("openai", 100));
        store.record(event("openai", 50));
        store.record(event("anthropic", 10));
        let agg = store.by_provider(SystemTime::now() - Duration::from_secs(60));
        assert_eq!(agg["openai"].input_tokens, 150);
        assert_eq!(agg["openai"].event_count, 2);
        assert_eq!(agg["anthropic"].event_count, 1);
    }

    #[test]
    fn budget_consumes_and_exhausts() {
        let budget = InvestigationBudget::new(100);
        assert_eq!(budget.remaining(), 100);
        budget.try_consume(60).unwrap();
        assert_eq!(budget.remaining(), 40);
        assert!(budget.try_consume(50).is_err());
        assert_eq!(budget.remaining(), 40);
    }
}
