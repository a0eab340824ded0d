//! Status hub: fan-out of full snapshots to live subscribers
//!
//! A single publish point feeds a tokio broadcast channel; every connected client
//! holds its own receiver. The latest snapshot is cached so a late subscriber gets
//! it immediately instead of waiting for the next cycle.

use crate::models::{MachineStatus, StatusSnapshot};
use crate::state::{new_state, Shared};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

#[derive(Clone)]
pub struct StatusHub {
    tx: broadcast::Sender<Arc<StatusSnapshot>>,
    latest: Shared<Option<Arc<StatusSnapshot>>>,
}

impl StatusHub {
    /// `capacity` bounds how far a slow subscriber may lag before skipping snapshots
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            latest: new_state(None),
        }
    }

    /// Stamps, caches and fans out a new snapshot.
    /// `ts` never goes backwards, even if the wall clock does.
    pub fn publish(&self, machines: Vec<MachineStatus>) -> Arc<StatusSnapshot> {
        let mut latest = self.latest.lock();
        let floor = latest.as_ref().map_or(i64::MIN, |s| s.ts);
        let snapshot = Arc::new(StatusSnapshot {
            machines,
            ts: epoch_ms().max(floor),
        });

        *latest = Some(Arc::clone(&snapshot));
        // pas d'abonné : rien à faire
        let _ = self.tx.send(Arc::clone(&snapshot));
        snapshot
    }

    pub fn latest(&self) -> Option<Arc<StatusSnapshot>> {
        self.latest.lock().clone()
    }

    /// Cached snapshot and receiver are taken under the same lock:
    /// no publish can fall between them.
    pub fn subscribe(&self) -> Subscription {
        let latest = self.latest.lock();
        Subscription {
            initial: latest.clone(),
            rx: self.tx.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

pub struct Subscription {
    /// Last snapshot published before this subscription began, if any
    pub initial: Option<Arc<StatusSnapshot>>,
    rx: broadcast::Receiver<Arc<StatusSnapshot>>,
}

impl Subscription {
    /// Next published snapshot; `None` once the hub is gone.
    /// A lagging subscriber skips straight to newer snapshots.
    pub async fn next(&mut self) -> Option<Arc<StatusSnapshot>> {
        loop {
            match self.rx.recv().await {
                Ok(snapshot) => return Some(snapshot),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "subscriber lagged, skipping to newer snapshots");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

pub fn epoch_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MachineRecord;
    use std::collections::BTreeMap;

    fn status(name: &str) -> MachineStatus {
        MachineStatus {
            machine: MachineRecord::named(name),
            results: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_first_subscriber_has_no_cached_snapshot() {
        let hub = StatusHub::new(4);
        let sub = hub.subscribe();
        assert!(sub.initial.is_none());
        assert!(hub.latest().is_none());
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_last_published() {
        let hub = StatusHub::new(4);
        hub.publish(vec![status("a")]);
        let last = hub.publish(vec![status("b")]);

        let sub = hub.subscribe();
        assert_eq!(sub.initial.as_deref(), Some(&*last));
    }

    #[tokio::test]
    async fn test_subscribers_receive_full_snapshots_in_order() {
        let hub = StatusHub::new(4);
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        let one = hub.publish(vec![status("a")]);
        let two = hub.publish(vec![status("a"), status("b")]);

        for sub in [&mut first, &mut second] {
            let got_one = sub.next().await.unwrap();
            let got_two = sub.next().await.unwrap();
            assert_eq!(got_one, one);
            assert_eq!(got_two.machines.len(), 2);
            assert_eq!(got_two, two);
            assert!(got_two.ts >= got_one.ts);
        }
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_to_newest() {
        let hub = StatusHub::new(2);
        let mut sub = hub.subscribe();
        for i in 0..5 {
            hub.publish(vec![status(&format!("m{i}"))]);
        }

        let got = sub.next().await.unwrap();
        assert_eq!(got.machines[0].machine.name, "m3");
        let got = sub.next().await.unwrap();
        assert_eq!(got.machines[0].machine.name, "m4");
    }

    #[tokio::test]
    async fn test_closed_hub_ends_subscription() {
        let hub = StatusHub::new(2);
        let mut sub = hub.subscribe();
        drop(hub);
        assert!(sub.next().await.is_none());
    }
}
