use crate::communication::messages::{Advisory, PhaseOverride};
use crate::communication::neighbor_channel::{ChannelRead, Delivery, NeighborEndpoint};
use crate::config::{ControlMode, SignalConfig};
use crate::control_system::decision::{AdaptiveThreshold, NeighborView, SwitchPolicy, SwitchReason};
use crate::shared_data::{current_timestamp_ms, Snapshot};
use crate::simulation_engine::inflow::InflowModel;
use crate::simulation_engine::topology::{NodeId, NodeSpec, Position, Topology};
use crate::simulation_engine::traffic_state::{PhaseId, TrafficState};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Link to one neighbor plus the last advisory it sent us.
#[derive(Debug)]
struct NeighborSlot {
    endpoint: NeighborEndpoint,
    last_known: Option<Advisory>,
    stale: bool,
    /// Traffic we have discharged towards the peer, in total.
    handed_over: u64,
    /// Traffic from the peer we have let into our queue, in total.
    admitted: u64,
}

/// What one decision cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    /// Phase that held right-of-way while traffic discharged this cycle.
    pub served_phase: PhaseId,
    /// Phase in force after the decision step.
    pub phase: PhaseId,
    pub switched: Option<SwitchReason>,
}

/// Autonomous controller for one intersection.
///
/// Each cycle runs ingest -> update -> decide -> emit -> publish against
/// state that nothing else can touch. Neighbors are only ever seen through
/// the advisories they send.
#[derive(Debug)]
pub struct IntersectionAgent {
    id: NodeId,
    position: Position,
    state: TrafficState,
    neighbors: Vec<NeighborSlot>,
    policy: SwitchPolicy,
    adaptive: Option<AdaptiveThreshold>,
    overrides: mpsc::Receiver<PhaseOverride>,
    snapshot_tx: watch::Sender<Snapshot>,
    cycle: u64,
}

impl IntersectionAgent {
    /// Builds the agent for `node`. `endpoints` must hold one link per
    /// neighbor. Returns the agent and the cell its snapshots land in.
    pub fn new(
        node: &NodeSpec,
        topology: &Topology,
        signal: &SignalConfig,
        endpoints: Vec<NeighborEndpoint>,
        overrides: mpsc::Receiver<PhaseOverride>,
    ) -> (Self, watch::Receiver<Snapshot>) {
        let state = TrafficState::new(node, topology, signal);
        let policy = SwitchPolicy::from_config(signal);
        let neighbors = endpoints
            .into_iter()
            .map(|endpoint| NeighborSlot {
                endpoint,
                last_known: None,
                stale: false,
                handed_over: 0,
                admitted: 0,
            })
            .collect();

        let initial = Snapshot {
            node: node.id.clone(),
            position: node.position(),
            phase: state.phase(),
            elapsed: state.elapsed(),
            in_clearance: state.in_clearance(),
            pressures: state.pressures(),
            total_discharged: 0,
            congestion: 0.0,
            average_queue: 0.0,
            average_wait: 0.0,
            switch_threshold: policy.threshold,
            cycle: 0,
            timestamp_ms: current_timestamp_ms(),
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(initial);

        let agent = Self {
            id: node.id.clone(),
            position: node.position(),
            state,
            neighbors,
            policy,
            adaptive: signal.adaptive_threshold.map(AdaptiveThreshold::new),
            overrides,
            snapshot_tx,
            cycle: 0,
        };
        (agent, snapshot_rx)
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn state(&self) -> &TrafficState {
        &self.state
    }

    /// Direct access for seeding scenarios; the running agent is the only
    /// other writer.
    pub fn state_mut(&mut self) -> &mut TrafficState {
        &mut self.state
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn switch_threshold(&self) -> u32 {
        self.policy.threshold
    }

    /// Last advisory received from `neighbor`, if any.
    pub fn last_known(&self, neighbor: &NodeId) -> Option<&Advisory> {
        self.neighbors
            .iter()
            .find(|slot| slot.endpoint.peer() == neighbor)
            .and_then(|slot| slot.last_known.as_ref())
    }

    /// Whether the link to `neighbor` has been reported stale.
    pub fn is_stale(&self, neighbor: &NodeId) -> bool {
        self.neighbors
            .iter()
            .any(|slot| slot.endpoint.peer() == neighbor && slot.stale)
    }

    /// Runs one full decision cycle.
    pub fn run_cycle(&mut self, inflow: &mut dyn InflowModel) -> CycleReport {
        self.cycle += 1;
        self.ingest();
        self.apply_inflow(inflow);

        let served_phase = self.state.phase();
        let handovers = self.discharge();
        self.state.advance_elapsed();
        self.state.observe_load();
        let switched = self.decide();

        self.emit(&handovers);
        self.publish();

        CycleReport {
            cycle: self.cycle,
            served_phase,
            phase: self.state.phase(),
            switched,
        }
    }

    fn ingest(&mut self) {
        for slot in self.neighbors.iter_mut() {
            match slot.endpoint.try_recv() {
                ChannelRead::Fresh(advisory) => {
                    if slot.stale {
                        info!("{}: neighbor {} is back", self.id, slot.endpoint.peer());
                        slot.stale = false;
                    }
                    slot.last_known = Some(advisory);
                }
                ChannelRead::Empty => {}
                ChannelRead::Stale => {
                    if !slot.stale {
                        warn!(
                            "{}: neighbor {} unreachable, using last known advisory",
                            self.id,
                            slot.endpoint.peer()
                        );
                        slot.stale = true;
                    }
                }
            }

            // Whatever the peer handed over and we could not fit yet waits
            // on the link until our approach has room.
            let handed = slot.last_known.as_ref().map_or(0, |a| a.handover);
            let outstanding = handed.saturating_sub(slot.admitted);
            if outstanding > 0 {
                let amount = u32::try_from(outstanding).unwrap_or(u32::MAX);
                slot.admitted += self.state.add_inflow(slot.endpoint.peer(), amount) as u64;
            }
        }
    }

    fn apply_inflow(&mut self, inflow: &mut dyn InflowModel) {
        let approaches: Vec<(NodeId, PhaseId)> = self
            .state
            .approaches()
            .map(|(id, a)| (id.clone(), a.phase))
            .collect();
        for (approach, phase) in approaches {
            let amount = inflow.inflow(&self.id, &approach, phase);
            if amount > 0 {
                self.state.add_inflow(&approach, amount);
            }
        }
    }

    /// Drains served approaches. Traffic bound for a neighbor only moves as
    /// far as that neighbor has room: its reported queue plus what is still
    /// in flight on the link must stay within capacity. Returns the amount
    /// handed to each downstream neighbor this cycle.
    fn discharge(&mut self) -> BTreeMap<NodeId, u32> {
        let capacity = self.state.capacity();
        let neighbors = &self.neighbors;
        let room = |downstream: &NodeId| -> Option<u32> {
            let capacity = capacity?;
            let slot = neighbors
                .iter()
                .find(|slot| slot.endpoint.peer() == downstream)?;
            let (pressure, admitted) = slot
                .last_known
                .as_ref()
                .map_or((0, 0), |advisory| (advisory.pressure, advisory.admitted));
            let in_flight = slot.handed_over.saturating_sub(admitted);
            let free = (capacity as u64).saturating_sub(pressure as u64 + in_flight);
            Some(u32::try_from(free).unwrap_or(u32::MAX))
        };

        let moved = self.state.discharge(room);
        let mut handovers = BTreeMap::new();
        for discharge in moved {
            let Some(downstream) = discharge.downstream else {
                continue;
            };
            if let Some(slot) = self
                .neighbors
                .iter_mut()
                .find(|slot| slot.endpoint.peer() == &downstream)
            {
                slot.handed_over += discharge.amount as u64;
            }
            *handovers.entry(downstream).or_insert(0) += discharge.amount;
        }
        handovers
    }

    fn decide(&mut self) -> Option<SwitchReason> {
        let mut pending = None;
        while let Ok(request) = self.overrides.try_recv() {
            pending = Some(request);
        }

        let overridden = match pending {
            Some(request) => {
                let applied = self.state.force_phase(request.phase);
                if applied {
                    info!(
                        "{}: manual override to phase {} at cycle {}",
                        self.id, request.phase, self.cycle
                    );
                }
                applied
            }
            None => false,
        };

        let reason = if overridden {
            Some(SwitchReason::ManualOverride)
        } else {
            let current = self.state.phase();
            let mut view = NeighborView {
                count: self.neighbors.len(),
                ..NeighborView::default()
            };
            // An unreachable neighbor's last word no longer steers us.
            for advisory in self
                .neighbors
                .iter()
                .filter(|slot| !slot.stale)
                .filter_map(|slot| slot.last_known.as_ref())
            {
                if advisory.requests_change_from(current) {
                    view.requests += 1;
                }
                view.max_congestion = view.max_congestion.max(advisory.congestion);
            }
            let reason = self.policy.evaluate(&self.state, &view);
            if let Some(reason) = reason {
                let next = self.state.switch_to_next();
                debug!(
                    "{}: phase {} -> {} ({:?}) at cycle {}",
                    self.id, current, next, reason, self.cycle
                );
            }
            reason
        };

        if let Some(adaptive) = self.adaptive.as_mut() {
            if let Some(threshold) =
                adaptive.observe(self.state.total_pressure(), self.policy.threshold)
            {
                if threshold != self.policy.threshold {
                    debug!(
                        "{}: switch threshold {} -> {}",
                        self.id, self.policy.threshold, threshold
                    );
                }
                self.policy.threshold = threshold;
            }
        }
        reason
    }

    fn emit(&self, handovers: &BTreeMap<NodeId, u32>) {
        for slot in &self.neighbors {
            let peer = slot.endpoint.peer();
            let handed_now = handovers.get(peer).copied().unwrap_or(0);
            let requested_phase = if self.policy.mode == ControlMode::Coordinated && handed_now > 0 {
                self.state.phase_of(peer)
            } else {
                None
            };
            let advisory = Advisory {
                from: self.id.clone(),
                cycle: self.cycle,
                pressure: self.state.pressure(peer).unwrap_or(0),
                handover: slot.handed_over,
                admitted: slot.admitted,
                congestion: self.state.congestion(),
                requested_phase,
            };
            if slot.endpoint.send(advisory) == Delivery::Unreachable {
                debug!("{}: advisory to {} dropped, peer gone", self.id, peer);
            }
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            node: self.id.clone(),
            position: self.position,
            phase: self.state.phase(),
            elapsed: self.state.elapsed(),
            in_clearance: self.state.in_clearance(),
            pressures: self.state.pressures(),
            total_discharged: self.state.total_discharged(),
            congestion: self.state.congestion(),
            average_queue: self.state.average_queue(),
            average_wait: self.state.average_wait(),
            switch_threshold: self.policy.threshold,
            cycle: self.cycle,
            timestamp_ms: current_timestamp_ms(),
        }
    }

    fn publish(&self) {
        self.snapshot_tx.send_replace(self.snapshot());
    }

    /// Runs cycles on this agent's own cadence until `stop` flips to true
    /// (or its sender goes away). The flag is checked at the top of every
    /// cycle; a cycle in progress always completes. Dropping `self` on exit
    /// releases the channel endpoints.
    pub async fn run(
        mut self,
        mut inflow: Box<dyn InflowModel>,
        cadence: Duration,
        mut stop: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("{}: agent started with {} neighbors", self.id, self.neighbors.len());

        loop {
            if *stop.borrow_and_update() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle(inflow.as_mut());
                }
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        info!("{}: agent stopped after {} cycles", self.id, self.cycle);
    }
}
