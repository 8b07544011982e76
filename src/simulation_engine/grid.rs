use crate::error::ConfigError;
use crate::global_variables::{GRID_ORIGIN, GRID_SPACING};
use crate::simulation_engine::topology::{NodeId, NodeSpec, Topology};

/// Name used for the intersection at `(row, col)`.
pub fn grid_node_id(row: usize, col: usize) -> NodeId {
    NodeId(format!("Node_{}_{}", row, col))
}

/// Builds a `rows x cols` grid where every intersection is wired to its
/// north, south, west and east neighbors (when they exist).
pub fn grid_nodes(rows: usize, cols: usize) -> Vec<NodeSpec> {
    let mut nodes = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        for col in 0..cols {
            let mut neighbors = Vec::new();
            if row > 0 {
                neighbors.push(grid_node_id(row - 1, col));
            }
            if row + 1 < rows {
                neighbors.push(grid_node_id(row + 1, col));
            }
            if col > 0 {
                neighbors.push(grid_node_id(row, col - 1));
            }
            if col + 1 < cols {
                neighbors.push(grid_node_id(row, col + 1));
            }
            nodes.push(NodeSpec {
                id: grid_node_id(row, col),
                x: GRID_ORIGIN + GRID_SPACING * col as f64,
                y: GRID_ORIGIN + GRID_SPACING * row as f64,
                neighbors,
            });
        }
    }
    nodes
}

impl Topology {
    /// Rectangular grid topology; `grid(3, 3)` is the nine-node example.
    pub fn grid(rows: usize, cols: usize) -> Result<Self, ConfigError> {
        Self::new(grid_nodes(rows, cols))
    }
}
