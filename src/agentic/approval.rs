//! Approval sub-protocol (§4.4): destructive tool calls route through an
//! `ApprovalStore` the loop polls at a fixed interval, grounded on the
//! teacher's `TaskManager` command/poll loop (`scheduler/task_manager.rs`).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::interfaces::{ApprovalStatus, ApprovalStore};
use crate::types::ApprovalId;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Polls `store` until the approval resolves away from `Pending` or
/// `cancel` fires; returns the terminal status.
pub async fn await_approval(
    store: &dyn ApprovalStore,
    id: ApprovalId,
    cancel: Arc<Notify>,
) -> CoreResult<ApprovalStatus> {
    loop {
        tokio::select! {
            _ = cancel.notified() => return Err(CoreError::Cancelled),
            status = store.get_approval(&id) => {
                let status = status?;
                if status != ApprovalStatus::Pending {
                    return Ok(status);
                }
                debug!(%id, "approval still pending, waiting");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct EventualApproval {
        calls: Arc<AtomicU32>,
        approve_after: u32,
    }

    #[async_trait]
    impl ApprovalStore for EventualApproval {
        async fn get_approval(&self, _id: &ApprovalId) -> CoreResult<ApprovalStatus> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n >= self.approve_after {
                Ok(ApprovalStatus::Approved)
            } else {
                Ok(ApprovalStatus::Pending)
            }
        }
        async fn request_approval(&self, _id: ApprovalId, _summary: String) -> CoreResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn polls_until_approved() {
        let store = EventualApproval {
            calls: Arc::new(AtomicU32::new(0)),
            approve_after: 2,
        };
        let status = await_approval(&store, ApprovalId::new(), Arc::new(tokio::sync::Notify::new())).await.unwrap();
        assert_eq!(status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn cancellation_aborts_wait() {
        let store = EventualApproval {
            calls: Arc::new(AtomicU32::new(0)),
            approve_after: 1000,
        };
        let cancel = Arc::new(tokio::sync::Notify::new());
        cancel.notify_one();
        let result = await_approval(&store, ApprovalId::new(), cancel).await;
        assert!(matches!(result, Err(CoreError::Cancelled)));
    }
}
