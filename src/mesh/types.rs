use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::time::Instant;

/// Last known liveness and role of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub node_id: String,
    /// Wall-clock seconds of the heartbeat that produced this state
    pub heartbeat: f64,
    pub is_master: bool,
}

impl NodeState {
    pub fn new(node_id: impl Into<String>, heartbeat: f64) -> Self {
        Self {
            node_id: node_id.into(),
            heartbeat,
            is_master: false,
        }
    }
}

/// A self-nomination for mastership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterCandidate {
    pub node_id: String,
    /// Nominating node's wall clock at nomination time
    pub timestamp: f64,
}

impl MasterCandidate {
    pub fn new(node_id: impl Into<String>, timestamp: f64) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp,
        }
    }
}

/// Informal role of a node, derived from its local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodePhase {
    FollowerUnknownMaster,
    FollowerWithMaster,
    Candidate,
    Voted,
    Master,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodePhase::FollowerUnknownMaster => "follower (no master)",
            NodePhase::FollowerWithMaster => "follower",
            NodePhase::Candidate => "candidate",
            NodePhase::Voted => "voted",
            NodePhase::Master => "MASTER",
        };
        f.write_str(name)
    }
}

/// Point-in-time copy of a node's local state.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub state: NodeState,
    pub phase: NodePhase,
    pub view: HashMap<String, NodeState>,
    pub candidates: HashMap<String, MasterCandidate>,
    pub votes: HashMap<String, String>,
    pub outstanding_requests: usize,
}

impl NodeSnapshot {
    pub fn node_id(&self) -> &str {
        &self.state.node_id
    }

    pub fn is_master(&self) -> bool {
        self.state.is_master
    }

    /// Node ids flagged as master in this node's view.
    pub fn known_masters(&self) -> Vec<&str> {
        let mut masters: Vec<&str> = self
            .view
            .values()
            .filter(|node| node.is_master)
            .map(|node| node.node_id.as_str())
            .collect();
        masters.sort_unstable();
        masters
    }
}

/// Wall clock in fractional seconds, advanced by the tokio clock so that
/// paused test runtimes drive it deterministically.
#[derive(Debug, Clone, Copy)]
pub struct NodeClock {
    wall_origin: f64,
    instant_origin: Instant,
}

impl NodeClock {
    pub fn new() -> Self {
        Self {
            wall_origin: Utc::now().timestamp_micros() as f64 / 1_000_000.0,
            instant_origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.wall_origin + self.instant_origin.elapsed().as_secs_f64()
    }
}

impl Default for NodeClock {
    fn default() -> Self {
        Self::new()
    }
}
