use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::election::NodeCore;
use super::node::MeshNode;
use super::transport::Transport;
use super::types::{NodeClock, NodeSnapshot};
use crate::config::MeshConfig;
use crate::error::SwarmError;

/// Lifecycle handle of a spawned node.
#[derive(Debug)]
pub struct NodeHandle {
    pub node_id: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
    core: Arc<RwLock<NodeCore>>,
}

impl NodeHandle {
    pub fn snapshot(&self) -> NodeSnapshot {
        self.core.read().snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.join.is_finished()
    }
}

/// Random 8 character alphanumeric node id.
pub fn generate_node_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

/// Spawns, stops and lists the nodes sharing one transport.
pub struct ClusterSupervisor {
    transport: Arc<dyn Transport>,
    config: MeshConfig,
    nodes: DashMap<String, NodeHandle>,
    clock: NodeClock,
}

impl ClusterSupervisor {
    pub fn new(transport: Arc<dyn Transport>, config: MeshConfig) -> Self {
        Self {
            transport,
            config,
            nodes: DashMap::new(),
            clock: NodeClock::new(),
        }
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }

    /// Spawns a node with a fresh id and returns that id.
    pub fn start_node(&self) -> String {
        loop {
            let node_id = generate_node_id();
            if self.spawn(node_id.clone(), None).is_ok() {
                return node_id;
            }
        }
    }

    /// Spawns a node under a caller chosen id.
    pub fn start_node_with_id(&self, node_id: impl Into<String>) -> Result<String, SwarmError> {
        let node_id = node_id.into();
        self.spawn(node_id.clone(), None)?;
        Ok(node_id)
    }

    /// Like [`Self::start_node_with_id`] with deterministic voting.
    pub fn start_seeded_node(&self, node_id: impl Into<String>, seed: u64) -> Result<String, SwarmError> {
        let node_id = node_id.into();
        self.spawn(node_id.clone(), Some(seed))?;
        Ok(node_id)
    }

    fn spawn(&self, node_id: String, seed: Option<u64>) -> Result<(), SwarmError> {
        match self.nodes.entry(node_id.clone()) {
            Entry::Occupied(_) => Err(SwarmError::NodeExists(node_id)),
            Entry::Vacant(slot) => {
                let cancel = CancellationToken::new();
                let mut node =
                    MeshNode::new(node_id.clone(), self.transport.clone(), &self.config, cancel.clone());
                if let Some(seed) = seed {
                    node = node.with_seed(seed);
                }
                let core = node.core();
                let join = tokio::spawn(node.run());

                info!(node_id = %node_id, "Node spawned");
                slot.insert(NodeHandle {
                    node_id,
                    cancel,
                    join,
                    core,
                });
                Ok(())
            }
        }
    }

    /// Cancels a node and waits for its loop to exit. Peers are not told.
    pub async fn stop_node(&self, node_id: &str) -> Result<(), SwarmError> {
        let (_, handle) = self
            .nodes
            .remove(node_id)
            .ok_or_else(|| SwarmError::NodeNotFound(node_id.to_string()))?;

        handle.cancel.cancel();
        handle.join.await?;
        info!(node_id = %node_id, "Node removed");
        Ok(())
    }

    pub fn list_nodes(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.iter().map(|entry| entry.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn snapshot(&self, node_id: &str) -> Option<NodeSnapshot> {
        self.nodes.get(node_id).map(|handle| handle.snapshot())
    }

    pub fn snapshots(&self) -> Vec<NodeSnapshot> {
        let mut snapshots: Vec<NodeSnapshot> =
            self.nodes.iter().map(|entry| entry.value().snapshot()).collect();
        snapshots.sort_unstable_by(|a, b| a.state.node_id.cmp(&b.state.node_id));
        snapshots
    }

    /// Ids of nodes whose own record says they are master.
    pub fn masters(&self) -> Vec<String> {
        self.snapshots()
            .into_iter()
            .filter(|snapshot| snapshot.is_master())
            .map(|snapshot| snapshot.state.node_id)
            .collect()
    }

    /// Peers a node has not heard from within the heartbeat timeout.
    pub fn stale_peers(&self, node_id: &str) -> Option<Vec<String>> {
        let now = self.clock.now();
        let timeout = self.config.heartbeat_timeout_secs;
        self.nodes
            .get(node_id)
            .map(|handle| handle.core.read().stale_peers(now, timeout))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Stops every node.
    pub async fn shutdown(&self) {
        for node_id in self.list_nodes() {
            if let Err(e) = self.stop_node(&node_id).await {
                error!(node_id = %node_id, error = %e, "Failed to stop node");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::transport::BroadcastTransport;

    fn supervisor() -> ClusterSupervisor {
        let transport = Arc::new(BroadcastTransport::new(256));
        ClusterSupervisor::new(transport, MeshConfig::default())
    }

    #[test]
    fn test_generated_ids() {
        let id = generate_node_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_list_stop() {
        let supervisor = supervisor();
        let first = supervisor.start_node();
        let second = supervisor.start_node();

        let mut expected = vec![first.clone(), second.clone()];
        expected.sort();
        assert_eq!(supervisor.list_nodes(), expected);

        supervisor.stop_node(&first).await.unwrap();
        assert_eq!(supervisor.list_nodes(), vec![second.clone()]);

        supervisor.shutdown().await;
        assert!(supervisor.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_unknown_node() {
        let supervisor = supervisor();
        let result = supervisor.stop_node("missing").await;
        assert!(matches!(result, Err(SwarmError::NodeNotFound(id)) if id == "missing"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_id_is_rejected() {
        let supervisor = supervisor();
        supervisor.start_node_with_id("a").unwrap();
        assert!(matches!(
            supervisor.start_node_with_id("a"),
            Err(SwarmError::NodeExists(_))
        ));
        assert_eq!(supervisor.len(), 1);
        supervisor.shutdown().await;
    }
}
