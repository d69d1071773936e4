//! Fire-and-forget notifications for state changes.
//!
//! The queue and registry publish onto a broadcast channel; subscribers
//! (logging, UI, audit) consume at their own pace and can never block a
//! publisher. A lagging subscriber drops old events, which is acceptable
//! for advisory notifications.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::ConnectivityState;
use super::work::WorkStatus;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    WorkStatusChanged {
        work_id: u64,
        host_id: u64,
        status: WorkStatus,
    },
    ConnectivityChanged {
        server_id: u64,
        from: ConnectivityState,
        to: ConnectivityState,
    },
    HostCheckedIn {
        host_id: u64,
    },
}

#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<FleetEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish without caring whether anyone is listening.
    pub fn publish(&self, event: FleetEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }
}

/// Drain events into the log at debug level. Spawned by the controller so
/// every state change leaves a trace even with no external subscriber.
pub async fn run_log_subscriber(notifier: Notifier) {
    let mut rx = notifier.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => debug!(event = ?event, "fleet event"),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event log subscriber lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_fire_and_forget_without_subscribers() {
        let notifier = Notifier::new(4);
        // No receiver; must not error or block.
        notifier.publish(FleetEvent::HostCheckedIn { host_id: 1 });
    }

    #[tokio::test]
    async fn subscribers_see_published_events() {
        let notifier = Notifier::new(4);
        let mut rx = notifier.subscribe();
        notifier.publish(FleetEvent::HostCheckedIn { host_id: 7 });
        match rx.recv().await.unwrap() {
            FleetEvent::HostCheckedIn { host_id } => assert_eq!(host_id, 7),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
