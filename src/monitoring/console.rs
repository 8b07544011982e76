//! Operator console: line commands read from stdin by the simulation binary.

use crate::shared_data::GridSnapshot;
use crate::simulation_engine::topology::NodeId;
use crate::simulation_engine::traffic_state::PhaseId;
use std::fmt::Write;

pub const HELP: &str = "commands: override <node> <phase> | show | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Override(NodeId, PhaseId),
    Show,
    Help,
    Quit,
    /// Anything that did not parse, with the reason.
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Command::Unknown("empty command".to_string());
    };
    let rest: Vec<&str> = words.collect();

    match (head.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("override" | "o", [node, phase]) => match phase.parse::<usize>() {
            Ok(phase) => Command::Override(NodeId::from(*node), PhaseId(phase)),
            Err(_) => Command::Unknown(format!("'{phase}' is not a phase number")),
        },
        ("override" | "o", _) => Command::Unknown("usage: override <node> <phase>".to_string()),
        ("show" | "s", []) => Command::Show,
        ("help" | "h" | "?", []) => Command::Help,
        ("quit" | "q" | "exit", []) => Command::Quit,
        _ => Command::Unknown(format!("unrecognised command '{}'", line.trim())),
    }
}

/// Renders one line per intersection, in node order.
pub fn render_grid(grid: &GridSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<12} {:>6} {:>5} {:>7} {:>8} {:>10} {:>9} {:>10} {:>8}",
        "node", "cycle", "phase", "elapsed", "pressure", "discharged", "threshold", "congestion", "avg_wait"
    );
    for snapshot in grid.nodes.values() {
        let phase = if snapshot.in_clearance {
            format!("{}*", snapshot.phase)
        } else {
            snapshot.phase.to_string()
        };
        let _ = writeln!(
            out,
            "{:<12} {:>6} {:>5} {:>7} {:>8} {:>10} {:>9} {:>10.1} {:>8.1}",
            snapshot.node.as_str(),
            snapshot.cycle,
            phase,
            snapshot.elapsed,
            snapshot.total_pressure(),
            snapshot.total_discharged,
            snapshot.switch_threshold,
            snapshot.congestion,
            snapshot.average_wait
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared_data::Snapshot;
    use crate::simulation_engine::topology::Position;
    use std::collections::BTreeMap;

    #[test]
    fn parses_override() {
        assert_eq!(
            parse_command("override Node_1_1 1"),
            Command::Override(NodeId::from("Node_1_1"), PhaseId(1))
        );
        assert_eq!(
            parse_command("  o   A 0 "),
            Command::Override(NodeId::from("A"), PhaseId(0))
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(parse_command("override A"), Command::Unknown(_)));
        assert!(matches!(parse_command("override A one"), Command::Unknown(_)));
        assert!(matches!(parse_command("show me"), Command::Unknown(_)));
        assert!(matches!(parse_command(""), Command::Unknown(_)));
        assert!(matches!(parse_command("launch"), Command::Unknown(_)));
    }

    #[test]
    fn parses_simple_commands() {
        assert_eq!(parse_command("show"), Command::Show);
        assert_eq!(parse_command("QUIT"), Command::Quit);
        assert_eq!(parse_command("?"), Command::Help);
    }

    #[test]
    fn renders_each_node_once() {
        let mut nodes = BTreeMap::new();
        for name in ["B", "A"] {
            let node = NodeId::from(name);
            nodes.insert(
                node.clone(),
                Snapshot {
                    node,
                    position: Position { x: 0.0, y: 0.0 },
                    phase: PhaseId(1),
                    elapsed: 3,
                    in_clearance: name == "B",
                    pressures: BTreeMap::new(),
                    total_discharged: 0,
                    congestion: 0.0,
                    average_queue: 0.0,
                    average_wait: 0.0,
                    switch_threshold: 10,
                    cycle: 4,
                    timestamp_ms: 0,
                },
            );
        }
        let text = render_grid(&GridSnapshot { nodes });
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("A "));
        assert!(lines[2].contains("1*"));
    }
}
