use grid_signal_agents::control_system::SwitchReason;
use grid_signal_agents::simulation_engine::grid::grid_node_id;
use grid_signal_agents::simulation_engine::inflow::{InflowModel, NoInflow, ScriptedInflow};
use grid_signal_agents::simulation_engine::topology::TopologyConfig;
use grid_signal_agents::{
    ControlMode, InflowConfig, InvalidOverride, LockstepGrid, NodeId, NodeSpec, PhaseId, PhaseOverride,
    SimulationConfig, SimulationError,
};

fn quiet(config: SimulationConfig) -> LockstepGrid {
    LockstepGrid::with_inflow(&config, |_, _| Box::new(NoInflow)).unwrap()
}

fn base_config() -> SimulationConfig {
    SimulationConfig {
        inflow: InflowConfig::None,
        ..SimulationConfig::default()
    }
}

fn two_node_line() -> SimulationConfig {
    SimulationConfig {
        topology: TopologyConfig {
            nodes: vec![
                NodeSpec::new("A", 0.0, 0.0, &["B"]),
                NodeSpec::new("B", 100.0, 0.0, &["A"]),
            ],
        },
        ..base_config()
    }
}

#[test]
fn loaded_side_switches_while_idle_neighbor_waits_for_its_maximum() {
    let config = two_node_line();
    let (min, max) = (
        config.signal.min_phase_cycles as u64,
        config.signal.max_phase_cycles as u64,
    );
    let mut grid = quiet(config);
    let a = NodeId::from("A");
    let b = NodeId::from("B");
    grid.agent_mut(&a)
        .unwrap()
        .state_mut()
        .set_pressure(&b, 15);

    for step in 1..max {
        let reports = grid.step();
        let (ra, rb) = (&reports[0], &reports[1]);
        if step == 1 {
            let heard = grid.agent(&b).unwrap().last_known(&a).cloned().unwrap();
            assert_eq!(heard.pressure, 15);
        }
        if step == min {
            assert_eq!(ra.switched, Some(SwitchReason::PressureThreshold));
            assert_eq!(ra.phase, PhaseId(1));
        } else {
            assert_eq!(ra.switched, None, "A switched at step {step}");
        }
        assert_eq!(rb.switched, None, "B switched at step {step}");
        assert_eq!(rb.phase, PhaseId(0));
    }

    let reports = grid.step();
    assert_eq!(reports[1].switched, Some(SwitchReason::MaxDuration));
    assert_eq!(reports[1].phase, PhaseId(1));
}

#[test]
fn symmetric_idle_grid_switches_together_at_maximum() {
    let config = base_config();
    let max = config.signal.max_phase_cycles;
    let mut grid = quiet(config);

    for _ in 1..max {
        let reports = grid.step();
        assert!(reports.iter().all(|r| r.switched.is_none() && r.phase == PhaseId(0)));
    }
    let reports = grid.step();
    assert_eq!(reports.len(), 9);
    assert!(reports
        .iter()
        .all(|r| r.switched == Some(SwitchReason::MaxDuration) && r.phase == PhaseId(1)));

    let snapshot = grid.publish();
    assert!(snapshot.nodes.values().all(|s| s.elapsed == 0));
}

#[test]
fn override_for_unknown_node_changes_nothing() {
    let mut grid = quiet(base_config());
    grid.step();
    let before = grid.publish();

    let err = grid
        .request_override(PhaseOverride::new("Node_5_5", 1))
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::InvalidOverride(InvalidOverride::UnknownNode(ref id)) if id.as_str() == "Node_5_5"
    ));
    assert_eq!(grid.publish(), before);

    let reports = grid.step();
    assert!(reports.iter().all(|r| r.switched.is_none()));
}

#[test]
fn override_for_unknown_phase_is_rejected() {
    let grid = quiet(base_config());
    let err = grid
        .request_override(PhaseOverride::new(grid_node_id(0, 0), 2))
        .unwrap_err();
    assert!(matches!(
        err,
        SimulationError::InvalidOverride(InvalidOverride::UnknownPhase { phase_count: 2, .. })
    ));
}

#[test]
fn override_is_one_shot() {
    let mut grid = quiet(base_config());
    let centre = grid_node_id(1, 1);
    grid.request_override(PhaseOverride::new(centre.clone(), 1))
        .unwrap();

    grid.step();
    let agent = grid.agent(&centre).unwrap();
    assert_eq!(agent.state().phase(), PhaseId(1));
    assert_eq!(agent.state().elapsed(), 0);

    // The override does not pin the phase: the maximum still rotates it on.
    let max = agent.state().max_phase();
    let mut rotated = None;
    for _ in 0..max {
        let report = grid.step_node(&centre).unwrap();
        if report.switched.is_some() {
            rotated = Some(report);
            break;
        }
    }
    let report = rotated.unwrap();
    assert_eq!(report.switched, Some(SwitchReason::MaxDuration));
    assert_eq!(report.phase, PhaseId(0));
}

#[test]
fn last_override_in_a_cycle_wins() {
    let mut grid = quiet(base_config());
    let corner = grid_node_id(0, 0);
    grid.request_override(PhaseOverride::new(corner.clone(), 1))
        .unwrap();
    grid.request_override(PhaseOverride::new(corner.clone(), 0))
        .unwrap();
    let report = grid.step_node(&corner).unwrap();
    assert_eq!(report.switched, Some(SwitchReason::ManualOverride));
    assert_eq!(report.phase, PhaseId(0));
}

#[test]
fn torn_down_neighbor_degrades_to_last_known_value() {
    let mut grid = quiet(base_config());
    let centre = grid_node_id(1, 1);
    grid.agent_mut(&centre)
        .unwrap()
        .state_mut()
        .set_pressure(&grid_node_id(1, 0), 7);
    grid.step();
    grid.step();

    assert!(grid.tear_down(&centre));
    for _ in 0..3 {
        assert_eq!(grid.step().len(), 8);
    }

    let west = grid.agent(&grid_node_id(1, 0)).unwrap();
    assert!(west.is_stale(&centre));
    assert_eq!(west.last_known(&centre).map(|a| a.pressure), Some(7));

    let err = grid
        .request_override(PhaseOverride::new(centre, 1))
        .unwrap_err();
    assert!(matches!(err, SimulationError::AgentUnavailable(_)));
}

#[test]
fn handover_pulls_downstream_neighbor_into_the_same_phase() {
    let mut config = base_config();
    config.topology = TopologyConfig {
        nodes: grid_signal_agents::simulation_engine::grid::grid_nodes(1, 3),
    };
    config.signal.clearance_cycles = 0;
    let west = grid_node_id(0, 0);
    let middle = grid_node_id(0, 1);
    let east = grid_node_id(0, 2);
    let min = config.signal.min_phase_cycles as u64;

    let (m, w) = (middle.clone(), west.clone());
    let mut grid = LockstepGrid::with_inflow(&config, move |_, _| -> Box<dyn InflowModel> {
        Box::new(ScriptedInflow::new().with(m.clone(), w.clone(), 1))
    })
    .unwrap();

    // Middle serves east/west from the first decision onwards.
    grid.request_override(PhaseOverride::new(middle.clone(), 1))
        .unwrap();

    for step in 1..=min {
        let reports = grid.step();
        let east_report = &reports[2];
        if step == 2 {
            let heard = grid.agent(&east).unwrap().last_known(&middle).cloned().unwrap();
            assert_eq!(heard.handover, 1);
            assert_eq!(heard.requested_phase, Some(PhaseId(1)));
        }
        if step < min {
            assert_eq!(east_report.switched, None);
        } else {
            assert_eq!(east_report.switched, Some(SwitchReason::NeighborMajority));
            assert_eq!(east_report.phase, PhaseId(1));
        }
        assert_eq!(reports[0].phase, PhaseId(0), "west is never asked");
    }
}

#[test]
fn full_downstream_approach_holds_discharge() {
    let mut config = base_config();
    config.topology = TopologyConfig {
        nodes: grid_signal_agents::simulation_engine::grid::grid_nodes(1, 3),
    };
    config.signal.clearance_cycles = 0;
    config.signal.approach_capacity = Some(5);
    let west = grid_node_id(0, 0);
    let middle = grid_node_id(0, 1);
    let east = grid_node_id(0, 2);
    let mut grid = quiet(config);

    grid.agent_mut(&middle)
        .unwrap()
        .state_mut()
        .force_phase(PhaseId(1));
    grid.agent_mut(&middle)
        .unwrap()
        .state_mut()
        .set_pressure(&west, 4);
    // East reports its approach from the middle as full.
    grid.agent_mut(&east)
        .unwrap()
        .state_mut()
        .set_pressure(&middle, 5);

    grid.step_in_order(&[east.clone()]);
    grid.step_in_order(&[middle.clone()]);
    let state = grid.agent(&middle).unwrap().state();
    assert_eq!(state.pressure(&west), Some(4));
    assert_eq!(state.total_discharged(), 0);
}

fn one_by_three(config: SimulationConfig) -> SimulationConfig {
    let mut config = SimulationConfig {
        topology: TopologyConfig {
            nodes: grid_signal_agents::simulation_engine::grid::grid_nodes(1, 3),
        },
        ..config
    };
    config.signal.clearance_cycles = 0;
    config
}

#[test]
fn handovers_add_up_when_the_receiver_reads_late() {
    let mut grid = quiet(one_by_three(base_config()));
    let west = grid_node_id(0, 0);
    let middle = grid_node_id(0, 1);
    let east = grid_node_id(0, 2);

    let state = grid.agent_mut(&middle).unwrap().state_mut();
    state.force_phase(PhaseId(1));
    state.set_pressure(&west, 5);

    grid.step_in_order(&[middle.clone()]);
    grid.step_in_order(&[middle.clone()]);
    grid.step_in_order(&[east.clone()]);

    assert_eq!(grid.agent(&middle).unwrap().state().total_discharged(), 2);
    assert_eq!(grid.agent(&east).unwrap().state().pressure(&middle), Some(2));
}

#[test]
fn unreachable_neighbor_request_stops_counting() {
    let config = one_by_three(base_config());
    let max = config.signal.max_phase_cycles as u64;
    let min = config.signal.min_phase_cycles as u64;
    let west = grid_node_id(0, 0);
    let middle = grid_node_id(0, 1);
    let east = grid_node_id(0, 2);

    let (m, w) = (middle.clone(), west.clone());
    let mut grid = LockstepGrid::with_inflow(&config, move |_, _| -> Box<dyn InflowModel> {
        Box::new(ScriptedInflow::new().with(m.clone(), w.clone(), 1))
    })
    .unwrap();
    grid.request_override(PhaseOverride::new(middle.clone(), 1))
        .unwrap();
    for _ in 0..min {
        grid.step();
    }
    assert_eq!(grid.agent(&east).unwrap().state().phase(), PhaseId(1));

    assert!(grid.tear_down(&middle));
    for _ in 0..2 * max {
        let report = grid.step_node(&east).unwrap();
        assert_ne!(report.switched, Some(SwitchReason::NeighborMajority));
    }
    assert!(grid.agent(&east).unwrap().is_stale(&middle));
}

#[test]
fn congested_neighbor_sends_quiet_node_back_to_phase_zero() {
    let mut config = one_by_three(base_config());
    config.signal.mode = ControlMode::Stigmergy;
    config.signal.switch_threshold = 100;
    let middle = grid_node_id(0, 1);
    let east = grid_node_id(0, 2);
    let mut grid = quiet(config);

    grid.agent_mut(&middle)
        .unwrap()
        .state_mut()
        .force_phase(PhaseId(1));
    grid.agent_mut(&east)
        .unwrap()
        .state_mut()
        .set_pressure(&middle, 18);

    // East's level climbs 2, 3.5, 5, 6.5, 8, 9.5; middle hears it a step later.
    for step in 1..7 {
        let reports = grid.step();
        assert_eq!(reports[1].switched, None, "middle switched at step {step}");
    }
    let reports = grid.step();
    assert_eq!(reports[1].switched, Some(SwitchReason::CongestionRelief));
    assert_eq!(reports[1].phase, PhaseId(0));

    for _ in 0..4 {
        let reports = grid.step();
        assert_eq!(reports[1].phase, PhaseId(0));
    }
    let snapshot = grid.publish();
    assert_eq!(snapshot.get(&east).unwrap().congestion, 10.0);
}
