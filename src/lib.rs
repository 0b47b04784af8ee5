//! Mesh Swarm
//!
//! Peer-to-peer cluster membership and leader election for nodes that
//! share nothing but a broadcast bus.
//!
//! - **`mesh`**: wire protocol, transport, request correlation, the per-node
//!   election state machine and the supervisor that spawns nodes.
//! - **`cli`**: interactive control surface over a supervisor.
//! - **`config`** / **`logging`**: YAML configuration and tracing setup.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod mesh;

pub use config::SwarmConfig;
pub use error::{Result, SwarmError};
pub use mesh::{BroadcastTransport, ClusterSupervisor, MeshNode, Message, NodeCore, Transport};
