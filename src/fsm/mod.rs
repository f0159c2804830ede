//! Session FSM (§4.3): per-chat state machine gating tool kinds.
//!
//! States cycle `Resolving -> Reading -> Verifying -> Reading -> ...`, the
//! same shape as the teacher's `ToolReviewState` workflow states
//! (`integrations/tool_review/types.rs`): a small closed enum walked by
//! explicit transition methods rather than a generic state-pattern object.

pub mod classifier;

pub use classifier::ToolClassifier;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolKind {
    Resolve,
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FsmState {
    Resolving,
    Reading,
    Verifying,
}

/// Per-session FSM instance. Cloned into `Session`; mutated only through the
/// transition methods below so every state change goes through one place.
#[derive(Debug, Clone)]
pub struct SessionFsm {
    state: FsmState,
    pub wrote_this_episode: bool,
    pub read_after_write: bool,
    pub last_write_tool: Option<String>,
    pending_recoveries: Vec<PendingRecovery>,
}

#[derive(Debug, Clone)]
struct PendingRecovery {
    recovery_id: String,
    error_code: String,
    tool: String,
}

impl SessionFsm {
    pub fn new() -> Self {
        Self {
            state: FsmState::Resolving,
            wrote_this_episode: false,
            read_after_write: false,
            last_write_tool: None,
            pending_recoveries: Vec::new(),
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Checks whether `kind` would be allowed in the current state without
    /// mutating anything; callers gate the dispatch on this before invoking
    /// the tool.
    pub fn can_dispatch(&self, kind: ToolKind) -> bool {
        match (self.state, kind) {
            (FsmState::Resolving, ToolKind::Write) => false,
            (FsmState::Resolving, _) => true,
            (FsmState::Reading, _) => true,
            (FsmState::Verifying, ToolKind::Write) => false,
            (FsmState::Verifying, _) => true,
        }
    }

    /// Records the outcome of a successfully dispatched tool call and
    /// advances the state machine. Call `can_dispatch` first; this method
    /// assumes the call was allowed and already executed.
    pub fn record_success(&mut self, kind: ToolKind, tool_name: &str) {
        match (self.state, kind) {
            (FsmState::Reading, ToolKind::Write) => {
                self.state = FsmState::Verifying;
                self.wrote_this_episode = true;
                self.read_after_write = false;
                self.last_write_tool = Some(tool_name.to_string());
            }
            (FsmState::Verifying, ToolKind::Read) => {
                self.read_after_write = true;
            }
            _ => {}
        }
    }

    /// `true` in `Verifying` only once a Read has followed the write;
    /// always true otherwise (§4.3 `can_final_answer`).
    pub fn can_final_answer(&self) -> bool {
        match self.state {
            FsmState::Verifying => self.read_after_write,
            _ => true,
        }
    }

    /// Caller-driven acknowledgement that verification is satisfied;
    /// returns to `Reading`. Only valid once `read_after_write` is set.
    pub fn complete_verification(&mut self) {
        if self.state == FsmState::Verifying && self.read_after_write {
            self.state = FsmState::Reading;
        }
    }

    pub fn reset(&mut self) {
        self.state = FsmState::Resolving;
        self.wrote_this_episode = false;
        self.read_after_write = false;
        self.last_write_tool = None;
    }

    /// Verifying -> Reading while clearing `wrote_this_episode`, used when a
    /// session needs to start a fresh write/verify cycle without losing the
    /// episode's accumulated facts.
    pub fn reset_keep_progress(&mut self) {
        if self.state == FsmState::Verifying {
            self.state = FsmState::Reading;
        }
        self.wrote_this_episode = false;
    }

    pub fn gate(&self, kind: ToolKind) -> Result<(), CoreError> {
        if self.can_dispatch(kind) {
            Ok(())
        } else {
            Err(CoreError::FsmBlocked {
                reason: format!(
                    "{:?} tools are blocked while the session is {:?}",
                    kind, self.state
                ),
                blocked_kind: kind,
            })
        }
    }

    pub fn track_pending_recovery(&mut self, error_code: &str, tool: &str) -> String {
        let recovery_id = uuid::Uuid::new_v4().to_string();
        self.pending_recoveries.push(PendingRecovery {
            recovery_id: recovery_id.clone(),
            error_code: error_code.to_string(),
            tool: tool.to_string(),
        });
        recovery_id
    }

    /// Pops and returns the id of the first pending recovery registered for
    /// `tool`, if any.
    pub fn check_recovery_success(&mut self, tool: &str) -> Option<String> {
        if let Some(pos) = self.pending_recoveries.iter().position(|r| r.tool == tool) {
            Some(self.pending_recoveries.remove(pos).recovery_id)
        } else {
            None
        }
    }
}

impl Default for SessionFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario 1 (§8): read-only diagnostics stay in Reading.
    #[test]
    fn read_only_diagnostics_stay_reading() {
        let mut fsm = SessionFsm::new();
        assert!(fsm.can_dispatch(ToolKind::Resolve));
        fsm.record_success(ToolKind::Resolve, "pulse_query");
        for _ in 0..3 {
            assert!(fsm.can_dispatch(ToolKind::Read));
            fsm.record_success(ToolKind::Read, "pulse_read");
        }
        assert_eq!(fsm.state(), FsmState::Resolving);
        assert!(!fsm.wrote_this_episode);
    }

    /// Scenario 2 (§8): write-verify-write.
    #[test]
    fn write_verify_write_cycle() {
        let mut fsm = SessionFsm::new();
        assert!(fsm.gate(ToolKind::Write).is_err()); // Resolving blocks Write
        fsm.record_success(ToolKind::Resolve, "pulse_query");
        fsm.state = FsmState::Reading;
        assert!(fsm.can_dispatch(ToolKind::Write));
        fsm.record_success(ToolKind::Write, "pulse_control");
        assert_eq!(fsm.state(), FsmState::Verifying);

        assert!(fsm.gate(ToolKind::Write).is_err());

        assert!(fsm.can_dispatch(ToolKind::Read));
        fsm.record_success(ToolKind::Read, "pulse_metrics");
        assert!(fsm.read_after_write);
        fsm.complete_verification();
        assert_eq!(fsm.state(), FsmState::Reading);

        assert!(fsm.gate(ToolKind::Write).is_ok());
        fsm.record_success(ToolKind::Write, "pulse_docker");
        assert_eq!(fsm.state(), FsmState::Verifying);
    }

    #[test]
    fn can_final_answer_requires_read_after_write_only_while_verifying() {
        let mut fsm = SessionFsm::new();
        assert!(fsm.can_final_answer());
        fsm.state = FsmState::Verifying;
        assert!(!fsm.can_final_answer());
        fsm.read_after_write = true;
        assert!(fsm.can_final_answer());
    }

    #[test]
    fn no_two_writes_without_interleaving_read() {
        let mut fsm = SessionFsm::new();
        fsm.state = FsmState::Reading;
        fsm.record_success(ToolKind::Write, "a");
        assert_eq!(fsm.state(), FsmState::Verifying);
        assert!(!fsm.can_dispatch(ToolKind::Write));
    }

    #[test]
    fn reset_zeroes_flags() {
        let mut fsm = SessionFsm::new();
        fsm.state = FsmState::Reading;
        fsm.record_success(ToolKind::Write, "a");
        fsm.reset();
        assert_eq!(fsm.state(), FsmState::Resolving);
        assert!(!fsm.wrote_this_episode);
        assert!(!fsm.read_after_write);
    }

    #[test]
    fn recovery_tracking_pops_first_match() {
        let mut fsm = SessionFsm::new();
        let id = fsm.track_pending_recovery("E_TIMEOUT", "pulse_control");
        assert_eq!(fsm.check_recovery_success("pulse_control"), Some(id));
        assert_eq!(fsm.check_recovery_success("pulse_control"), None);
    }
}
