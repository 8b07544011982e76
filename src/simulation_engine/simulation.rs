// simulation.rs
use crate::communication::messages::PhaseOverride;
use crate::config::SimulationConfig;
use crate::error::SimulationError;
use crate::monitoring::snapshot_publisher::{SnapshotFeed, SnapshotPublisher};
use crate::shared_data::GridSnapshot;
use crate::simulation_engine::inflow::{inflow_model, InflowModel};
use crate::simulation_engine::topology::{NodeId, Topology};
use crate::simulation_engine::wiring::{wire, GridWiring};
use log::{error, info, warn};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

/// Handle to a running grid: one task per intersection plus the snapshot
/// publisher, all sharing a stop flag.
pub struct Simulation {
    topology: Topology,
    phase_count: usize,
    overrides: HashMap<NodeId, mpsc::Sender<PhaseOverride>>,
    feed: SnapshotFeed,
    stop_tx: watch::Sender<bool>,
    agents: Vec<(NodeId, JoinHandle<()>)>,
    publisher: JoinHandle<()>,
    shutdown_grace: Duration,
}

impl Simulation {
    /// Validates the configuration, wires the grid and spawns every task.
    /// Nothing is spawned if validation fails.
    pub fn start(config: SimulationConfig) -> Result<Self, SimulationError> {
        let inflow = config.inflow.clone();
        Self::start_with_inflow(config, move |index, _| inflow_model(&inflow, index))
    }

    /// Like [`Simulation::start`], with each node's demand built by
    /// `make_inflow` instead of the `inflow` section.
    pub fn start_with_inflow<F>(
        config: SimulationConfig,
        mut make_inflow: F,
    ) -> Result<Self, SimulationError>
    where
        F: FnMut(usize, &NodeId) -> Box<dyn InflowModel>,
    {
        let topology = config.validate()?;
        let GridWiring {
            agents,
            overrides,
            snapshot_cells,
        } = wire(&topology, &config.signal);

        let (stop_tx, stop_rx) = watch::channel(false);
        let cadence = config.timing.cycle_interval();

        let agents = agents
            .into_iter()
            .enumerate()
            .map(|(index, agent)| {
                let id = agent.id().clone();
                let inflow = make_inflow(index, &id);
                let handle = tokio::spawn(agent.run(inflow, cadence, stop_rx.clone()));
                (id, handle)
            })
            .collect::<Vec<_>>();

        let (publisher, feed) = SnapshotPublisher::new(snapshot_cells);
        let publisher = tokio::spawn(publisher.run(config.timing.publish_interval(), stop_rx));

        info!(
            "simulation started: {} intersections, {} links, cycle every {:?}",
            topology.len(),
            topology.edges().len(),
            cadence
        );

        Ok(Self {
            topology,
            phase_count: config.signal.phase_count,
            overrides,
            feed,
            stop_tx,
            agents,
            publisher,
            shutdown_grace: config.timing.shutdown_grace(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Subscribe to grid snapshots.
    pub fn snapshots(&self) -> SnapshotFeed {
        self.feed.clone()
    }

    /// Validates the request and queues it for the target agent's next
    /// decision step. A rejected request changes nothing.
    pub fn request_override(&self, request: PhaseOverride) -> Result<(), SimulationError> {
        request.validate(&self.topology, self.phase_count)?;
        let node = request.node.clone();
        let Some(sender) = self.overrides.get(&node) else {
            return Err(SimulationError::AgentUnavailable(node));
        };
        match sender.try_send(request) {
            Ok(()) => {
                info!("override queued for {}", node);
                Ok(())
            }
            Err(e) => {
                warn!("override for {} not queued: {}", node, e);
                Err(SimulationError::AgentUnavailable(node))
            }
        }
    }

    /// Signals every task to stop and waits for them under the grace period.
    /// Tasks that miss the deadline are aborted and named in the error.
    /// On success returns the final grid snapshot.
    pub async fn stop(self) -> Result<GridSnapshot, SimulationError> {
        info!("stopping simulation");
        self.stop_tx.send_replace(true);
        let deadline = Instant::now() + self.shutdown_grace;

        let mut late = Vec::new();
        for (id, mut handle) in self.agents {
            match timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("{}: agent task failed: {}", id, e);
                    late.push(id);
                }
                Err(_) => {
                    handle.abort();
                    late.push(id);
                }
            }
        }

        let mut publisher = self.publisher;
        if timeout_at(deadline, &mut publisher).await.is_err() {
            publisher.abort();
            warn!("snapshot publisher missed the shutdown deadline");
        }

        if !late.is_empty() {
            error!("{} agents did not stop in time: {:?}", late.len(), late);
            return Err(SimulationError::ShutdownTimeout { nodes: late });
        }
        info!("simulation stopped");
        Ok(self.feed.latest())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InflowConfig;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig {
            inflow: InflowConfig::None,
            ..SimulationConfig::default()
        };
        config.timing.cycle_interval_ms = 100;
        config.timing.publish_interval_ms = 100;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn runs_and_stops_cleanly() {
        let sim = Simulation::start(config()).unwrap();
        tokio::time::sleep(Duration::from_millis(550)).await;
        let last = sim.stop().await.unwrap();
        assert_eq!(last.len(), 9);
        assert!(last.nodes.values().all(|s| s.cycle >= 5));
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_phase_is_rejected() {
        let sim = Simulation::start(config()).unwrap();
        let err = sim
            .request_override(PhaseOverride::new("Node_1_1", 5))
            .unwrap_err();
        assert!(matches!(err, SimulationError::InvalidOverride(_)));
        sim.stop().await.unwrap();
    }
}
