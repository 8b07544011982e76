use crate::shared_data::{GridSnapshot, Snapshot};
use log::info;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

/// Read-only view of the most recent grid snapshot. Clone freely; a slow
/// consumer only ever misses intermediate snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotFeed {
    rx: watch::Receiver<GridSnapshot>,
}

impl SnapshotFeed {
    /// Pull the latest snapshot without waiting.
    pub fn latest(&self) -> GridSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<GridSnapshot> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Collects each agent's latest snapshot into the grid-wide feed on its
/// own cadence. Reading an agent's cell never blocks that agent.
#[derive(Debug)]
pub struct SnapshotPublisher {
    cells: Vec<watch::Receiver<Snapshot>>,
    feed: watch::Sender<GridSnapshot>,
}

impl SnapshotPublisher {
    pub fn new(cells: Vec<watch::Receiver<Snapshot>>) -> (Self, SnapshotFeed) {
        let (feed, rx) = watch::channel(GridSnapshot::default());
        let publisher = Self { cells, feed };
        publisher.publish();
        (publisher, SnapshotFeed { rx })
    }

    pub fn subscribe(&self) -> SnapshotFeed {
        SnapshotFeed {
            rx: self.feed.subscribe(),
        }
    }

    /// Copies the current per-node snapshots into the feed and returns them.
    /// Subscribers are only woken when the content actually changed.
    pub fn publish(&self) -> GridSnapshot {
        let grid = GridSnapshot {
            nodes: self
                .cells
                .iter()
                .map(|cell| {
                    let snapshot = cell.borrow().clone();
                    (snapshot.node.clone(), snapshot)
                })
                .collect(),
        };
        self.feed.send_if_modified(|current| {
            if *current == grid {
                false
            } else {
                *current = grid.clone();
                true
            }
        });
        grid
    }

    /// Publishes every `cadence` until `stop` flips, then once more so the
    /// feed ends on the agents' final state.
    pub async fn run(self, cadence: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.publish();
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.publish();
        info!("snapshot publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation_engine::topology::{NodeId, Position};
    use crate::simulation_engine::traffic_state::PhaseId;
    use std::collections::BTreeMap;

    fn snapshot(node: &str, cycle: u64) -> Snapshot {
        Snapshot {
            node: NodeId::from(node),
            position: Position { x: 0.0, y: 0.0 },
            phase: PhaseId(0),
            elapsed: 0,
            in_clearance: false,
            pressures: BTreeMap::new(),
            total_discharged: 0,
            congestion: 0.0,
            average_queue: 0.0,
            average_wait: 0.0,
            switch_threshold: 10,
            cycle,
            timestamp_ms: 1_000 + cycle,
        }
    }

    #[test]
    fn publishing_twice_without_a_cycle_is_identical() {
        let (a_tx, a_rx) = watch::channel(snapshot("A", 1));
        let (_b_tx, b_rx) = watch::channel(snapshot("B", 1));
        let (publisher, feed) = SnapshotPublisher::new(vec![a_rx, b_rx]);

        let first = publisher.publish();
        let second = publisher.publish();
        assert_eq!(first, second);
        assert_eq!(feed.latest(), first);
        assert_eq!(first.len(), 2);

        a_tx.send_replace(snapshot("A", 2));
        let third = publisher.publish();
        assert_ne!(third, second);
        assert_eq!(third.get(&NodeId::from("A")).map(|s| s.cycle), Some(2));
    }

    #[tokio::test]
    async fn subscribers_only_wake_on_new_content() {
        let (a_tx, a_rx) = watch::channel(snapshot("A", 1));
        let (publisher, _) = SnapshotPublisher::new(vec![a_rx]);
        let mut feed = publisher.subscribe();

        publisher.publish();
        assert!(!feed.rx.has_changed().unwrap());

        a_tx.send_replace(snapshot("A", 5));
        publisher.publish();
        let grid = feed.changed().await.unwrap();
        assert_eq!(grid.get(&NodeId::from("A")).map(|s| s.cycle), Some(5));
    }

    #[tokio::test]
    async fn slow_consumer_sees_only_the_latest() {
        let (a_tx, a_rx) = watch::channel(snapshot("A", 1));
        let (publisher, mut feed) = SnapshotPublisher::new(vec![a_rx]);
        for cycle in 2..=10 {
            a_tx.send_replace(snapshot("A", cycle));
            publisher.publish();
        }
        let grid = feed.changed().await.unwrap();
        assert_eq!(grid.get(&NodeId::from("A")).map(|s| s.cycle), Some(10));
    }
}
