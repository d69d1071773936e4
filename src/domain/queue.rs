//! The work queue — an injected, lock-protected store of work items.
//!
//! All structural mutation (insert, status write, purge) is serialized
//! behind one async mutex; reads clone out of the lock and may lag a poll
//! cycle, which is fine for a polled queue. Creation order is insertion
//! order, so `get_next_waiting` is FIFO within a band.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use super::events::{FleetEvent, Notifier};
use super::work::{TargetBand, WorkItem, WorkStatus};

/// Failures callers are expected to match on and recover from.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("work item {0} not found")]
    NotFound(u64),
    #[error("work item {0} already exists")]
    AlreadyExists(u64),
    #[error("work item {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: WorkStatus,
        to: WorkStatus,
    },
}

/// Per-status counts for one band, for operator visibility and agent-side
/// capacity checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: usize,
    pub picked_up: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub failed: usize,
}

pub struct WorkQueue {
    items: Mutex<Vec<WorkItem>>,
    next_id: Mutex<u64>,
    notifier: Notifier,
}

impl WorkQueue {
    pub fn new(notifier: Notifier) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
            notifier,
        }
    }

    /// Server-assigned monotonic ids for items built by the dispatcher.
    pub async fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.lock().await;
        let id = *next;
        *next += 1;
        id
    }

    /// Insert a new item. The item must be in its initial status.
    pub async fn create(&self, item: WorkItem) -> Result<(), QueueError> {
        let mut items = self.items.lock().await;
        if items.iter().any(|i| i.id == item.id) {
            return Err(QueueError::AlreadyExists(item.id));
        }
        debug_assert_eq!(item.status, WorkStatus::WaitingToBePickedUp);
        items.push(item);
        Ok(())
    }

    /// Overwrite an item's status. Nothing else is mutable post-creation.
    pub async fn update_status(&self, id: u64, status: WorkStatus) -> Result<WorkItem, QueueError> {
        let updated = {
            let mut items = self.items.lock().await;
            let item = items
                .iter_mut()
                .find(|i| i.id == id)
                .ok_or(QueueError::NotFound(id))?;
            if !item.status.can_transition_to(status) {
                return Err(QueueError::InvalidTransition {
                    id,
                    from: item.status,
                    to: status,
                });
            }
            item.status = status;
            item.updated_at = Utc::now();
            item.clone()
        };

        self.notifier.publish(FleetEvent::WorkStatusChanged {
            work_id: updated.id,
            host_id: updated.host_id,
            status: updated.status,
        });
        Ok(updated)
    }

    pub async fn get(&self, id: u64) -> Option<WorkItem> {
        self.items.lock().await.iter().find(|i| i.id == id).cloned()
    }

    /// First waiting item in the band, in creation order. `None` means
    /// nothing is waiting; that is a result, not an error.
    pub async fn get_next_waiting(&self, band: TargetBand) -> Option<WorkItem> {
        self.items
            .lock()
            .await
            .iter()
            .find(|i| i.band == band && i.status == WorkStatus::WaitingToBePickedUp)
            .cloned()
    }

    /// First waiting item in the band for one host — the agent's pull.
    pub async fn get_next_waiting_for_host(
        &self,
        host_id: u64,
        band: TargetBand,
    ) -> Option<WorkItem> {
        self.items
            .lock()
            .await
            .iter()
            .find(|i| {
                i.host_id == host_id
                    && i.band == band
                    && i.status == WorkStatus::WaitingToBePickedUp
            })
            .cloned()
    }

    pub async fn get_in_progress(&self, band: TargetBand) -> Vec<WorkItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|i| i.band == band && i.status == WorkStatus::InProgress)
            .cloned()
            .collect()
    }

    /// Per-status counts for a band, for operator visibility and capacity
    /// checks.
    pub async fn counts(&self, band: TargetBand) -> QueueCounts {
        let items = self.items.lock().await;
        let mut counts = QueueCounts::default();
        for item in items.iter().filter(|i| i.band == band) {
            match item.status {
                WorkStatus::WaitingToBePickedUp => counts.waiting += 1,
                WorkStatus::PickedUp => counts.picked_up += 1,
                WorkStatus::InProgress => counts.in_progress += 1,
                WorkStatus::Completed => counts.completed += 1,
                WorkStatus::Cancelled => counts.cancelled += 1,
                WorkStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Bulk-remove every item in a terminal status; returns the count.
    /// Runs on a fixed interval so purging never blocks producers.
    pub async fn delete_completed(&self) -> usize {
        let mut items = self.items.lock().await;
        let before = items.len();
        items.retain(|i| !i.status.is_terminal());
        before - items.len()
    }

    /// Mark items stuck InProgress longer than `max_age` as Failed.
    /// Nothing is resubmitted automatically; re-issue is an operator
    /// decision.
    pub async fn sweep_stale_in_progress(&self, max_age: Duration) -> Vec<WorkItem> {
        let cutoff = Utc::now() - max_age;
        let swept: Vec<WorkItem> = {
            let mut items = self.items.lock().await;
            items
                .iter_mut()
                .filter(|i| i.status == WorkStatus::InProgress && i.updated_at < cutoff)
                .map(|i| {
                    i.status = WorkStatus::Failed;
                    i.updated_at = Utc::now();
                    i.clone()
                })
                .collect()
        };

        for item in &swept {
            warn!(
                work_id = item.id,
                host_id = item.host_id,
                age_secs = (Utc::now() - item.created_at).num_seconds(),
                "work item stuck in progress, marking failed"
            );
            self.notifier.publish(FleetEvent::WorkStatusChanged {
                work_id: item.id,
                host_id: item.host_id,
                status: item.status,
            });
        }
        swept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::work::{TargetType, WorkPayload};

    fn queue() -> WorkQueue {
        WorkQueue::new(Notifier::new(16))
    }

    async fn enqueue(q: &WorkQueue, host_id: u64, target: TargetType) -> WorkItem {
        let id = q.allocate_id().await;
        let item = WorkItem::new(
            id,
            host_id,
            None,
            target,
            WorkPayload::RestartHost.to_value(),
            "test",
        );
        q.create(item.clone()).await.unwrap();
        item
    }

    #[tokio::test]
    async fn create_rejects_duplicate_identity() {
        let q = queue();
        let item = enqueue(&q, 1, TargetType::RestartHost).await;
        assert_eq!(
            q.create(item.clone()).await,
            Err(QueueError::AlreadyExists(item.id))
        );
    }

    #[tokio::test]
    async fn update_status_enforces_monotonic_transitions() {
        let q = queue();
        let item = enqueue(&q, 1, TargetType::RestartHost).await;

        q.update_status(item.id, WorkStatus::PickedUp).await.unwrap();
        q.update_status(item.id, WorkStatus::InProgress).await.unwrap();
        q.update_status(item.id, WorkStatus::Completed).await.unwrap();

        // Terminal states are absorbing.
        let err = q.update_status(item.id, WorkStatus::Failed).await.unwrap_err();
        assert!(matches!(err, QueueError::InvalidTransition { .. }));

        assert!(matches!(
            q.update_status(9999, WorkStatus::PickedUp).await,
            Err(QueueError::NotFound(9999))
        ));
    }

    #[tokio::test]
    async fn next_waiting_respects_bands_under_interleaved_inserts() {
        let q = queue();
        enqueue(&q, 1, TargetType::StartGameServer).await;
        let host_first = enqueue(&q, 1, TargetType::RestartHost).await;
        enqueue(&q, 1, TargetType::StopGameServer).await;
        enqueue(&q, 1, TargetType::UpdateHost).await;

        let next = q.get_next_waiting(TargetBand::Host).await.unwrap();
        assert_eq!(next.id, host_first.id);
        assert_eq!(next.band, TargetBand::Host);

        let next = q.get_next_waiting(TargetBand::GameServer).await.unwrap();
        assert_eq!(next.target_type, TargetType::StartGameServer);
    }

    #[tokio::test]
    async fn next_waiting_is_fifo_and_skips_non_waiting() {
        let q = queue();
        let first = enqueue(&q, 1, TargetType::StartGameServer).await;
        let second = enqueue(&q, 1, TargetType::StopGameServer).await;

        q.update_status(first.id, WorkStatus::PickedUp).await.unwrap();
        let next = q.get_next_waiting(TargetBand::GameServer).await.unwrap();
        assert_eq!(next.id, second.id);
    }

    #[tokio::test]
    async fn next_waiting_for_host_filters_other_hosts() {
        let q = queue();
        enqueue(&q, 1, TargetType::StartGameServer).await;
        let mine = enqueue(&q, 2, TargetType::StopGameServer).await;

        let next = q
            .get_next_waiting_for_host(2, TargetBand::GameServer)
            .await
            .unwrap();
        assert_eq!(next.id, mine.id);
        assert!(q.get_next_waiting_for_host(3, TargetBand::GameServer).await.is_none());
    }

    #[tokio::test]
    async fn delete_completed_removes_all_and_only_terminal_items() {
        let q = queue();
        let a = enqueue(&q, 1, TargetType::RestartHost).await;
        let b = enqueue(&q, 1, TargetType::StartGameServer).await;
        let c = enqueue(&q, 1, TargetType::StopGameServer).await;
        let d = enqueue(&q, 1, TargetType::UpdateHost).await;

        q.update_status(a.id, WorkStatus::Completed).await.unwrap();
        q.update_status(b.id, WorkStatus::Cancelled).await.unwrap();
        q.update_status(c.id, WorkStatus::Failed).await.unwrap();

        assert_eq!(q.delete_completed().await, 3);
        assert!(q.get(a.id).await.is_none());
        assert!(q.get(d.id).await.is_some());

        let counts = q.counts(TargetBand::Host).await;
        assert_eq!(counts.completed, 0);
        assert_eq!(counts.waiting, 1);
        assert_eq!(q.delete_completed().await, 0);
    }

    #[tokio::test]
    async fn sweep_marks_old_in_progress_items_failed() {
        let q = queue();
        let item = enqueue(&q, 1, TargetType::UpdateGameServer).await;
        q.update_status(item.id, WorkStatus::InProgress).await.unwrap();

        // Not stale yet.
        assert!(q.sweep_stale_in_progress(Duration::hours(1)).await.is_empty());

        let swept = q.sweep_stale_in_progress(Duration::seconds(-1)).await;
        assert_eq!(swept.len(), 1);
        assert_eq!(q.get(item.id).await.unwrap().status, WorkStatus::Failed);
    }
}
