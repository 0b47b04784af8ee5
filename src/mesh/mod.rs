//! Mesh Membership and Election
//!
//! Nodes share nothing but a broadcast transport:
//! - Periodic heartbeats maintain each node's view of its peers
//! - A node that sees no master nominates itself
//! - Every node votes for a random candidate once the round has aged
//! - A unique plurality elects the master, a tie abandons the round
//!
//! There is no eviction of silent peers and no term number; two partitions
//! can each elect a master.

pub mod correlator;
pub mod election;
pub mod node;
pub mod protocol;
pub mod supervisor;
pub mod transport;
mod types;

pub use correlator::RequestCorrelator;
pub use election::{tally, ElectionSettings, NodeCore, Tally};
pub use node::MeshNode;
pub use protocol::{decode, encode, CodecError, Envelope, Message};
pub use supervisor::{generate_node_id, ClusterSupervisor, NodeHandle};
pub use transport::{BroadcastTransport, Subscription, Transport};
pub use types::{MasterCandidate, NodeClock, NodePhase, NodeSnapshot, NodeState};
