use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::Path;

/// Unique identifier of an intersection, e.g. `Node_1_1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Layout position. Only used for drawing and for classifying approaches
/// by bearing, never by the coordination rules themselves.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One node as declared in the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: NodeId,
    pub x: f64,
    pub y: f64,
    /// Adjacent intersections, in declaration order.
    pub neighbors: Vec<NodeId>,
}

impl NodeSpec {
    pub fn new(id: impl Into<String>, x: f64, y: f64, neighbors: &[&str]) -> Self {
        Self {
            id: NodeId::new(id),
            x,
            y,
            neighbors: neighbors.iter().map(|n| NodeId::from(*n)).collect(),
        }
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }
}

/// Serialized form of a topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub nodes: Vec<NodeSpec>,
}

/// The static grid: nodes, positions and the symmetric neighbor relation.
/// Built once at start-up and handed to every agent by reference.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: Vec<NodeSpec>,
    index: HashMap<NodeId, usize>,
}

impl Topology {
    /// Validates and builds a topology. The neighbor relation must be
    /// symmetric and the graph connected.
    pub fn new(nodes: Vec<NodeSpec>) -> Result<Self, ConfigError> {
        if nodes.is_empty() {
            return Err(ConfigError::EmptyTopology);
        }

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicateNode(node.id.clone()));
            }
        }

        for node in &nodes {
            let mut seen = BTreeSet::new();
            for neighbor in &node.neighbors {
                if neighbor == &node.id {
                    return Err(ConfigError::SelfLoop(node.id.clone()));
                }
                if !seen.insert(neighbor) {
                    return Err(ConfigError::DuplicateNeighbor {
                        node: node.id.clone(),
                        neighbor: neighbor.clone(),
                    });
                }
                let Some(&other) = index.get(neighbor) else {
                    return Err(ConfigError::UnknownNeighbor {
                        node: node.id.clone(),
                        neighbor: neighbor.clone(),
                    });
                };
                if !nodes[other].neighbors.contains(&node.id) {
                    return Err(ConfigError::AsymmetricEdge {
                        from: node.id.clone(),
                        to: neighbor.clone(),
                    });
                }
            }
        }

        let topology = Self { nodes, index };
        topology.check_connected()?;
        Ok(topology)
    }

    pub fn from_config(config: TopologyConfig) -> Result<Self, ConfigError> {
        Self::new(config.nodes)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: TopologyConfig = serde_json::from_str(json)?;
        Self::from_config(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_config(&self) -> TopologyConfig {
        TopologyConfig {
            nodes: self.nodes.clone(),
        }
    }

    fn check_connected(&self) -> Result<(), ConfigError> {
        let mut visited = vec![false; self.nodes.len()];
        let mut queue = VecDeque::from([0usize]);
        visited[0] = true;
        while let Some(i) = queue.pop_front() {
            for neighbor in &self.nodes[i].neighbors {
                let j = self.index[neighbor];
                if !visited[j] {
                    visited[j] = true;
                    queue.push_back(j);
                }
            }
        }

        let unreachable: Vec<NodeId> = self
            .nodes
            .iter()
            .zip(&visited)
            .filter(|(_, &seen)| !seen)
            .map(|(node, _)| node.id.clone())
            .collect();
        if unreachable.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Disconnected {
                root: self.nodes[0].id.clone(),
                unreachable,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn node(&self, id: &NodeId) -> Option<&NodeSpec> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn neighbors(&self, id: &NodeId) -> &[NodeId] {
        self.node(id).map(|n| n.neighbors.as_slice()).unwrap_or(&[])
    }

    /// Every undirected edge exactly once, as an ordered `(low, high)` pair.
    pub fn edges(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges = BTreeSet::new();
        for node in &self.nodes {
            for neighbor in &node.neighbors {
                let edge = if node.id < *neighbor {
                    (node.id.clone(), neighbor.clone())
                } else {
                    (neighbor.clone(), node.id.clone())
                };
                edges.insert(edge);
            }
        }
        edges.into_iter().collect()
    }
}
