//! Wire surface of the ring.
//!
//! The service is deliberately thin: each method mirrors one local
//! operation on [Node](crate::node::Node), so a remote call to a node
//! returns exactly what that node's own local call would. Request and
//! response types are the plain serde value types of the dht module; an
//! unknown or unreachable peer travels as `null`.

pub mod client;
pub mod server;

pub use client::Connector;
pub use server::NodeServer;

use crate::dht::Did;
use crate::dht::NodeRef;

/// The ring RPCs.
#[tarpc::service]
pub trait NodeService {
    /// Identify the serving node. Doubles as the liveness probe.
    async fn summary() -> NodeRef;

    /// Resolve the first node responsible for `id`, dispatching from
    /// `node` (the serving node, for a well-formed request).
    async fn find_successor(id: Did, node: NodeRef) -> Option<NodeRef>;

    /// Immediate successor of `node`.
    async fn get_successor(node: NodeRef) -> Option<NodeRef>;

    /// Closest finger of `node` strictly preceding `id`.
    async fn closest_preceding_finger(id: Did, node: NodeRef) -> Option<NodeRef>;

    /// Current predecessor of the serving node, if known.
    async fn get_predecessor() -> Option<NodeRef>;

    /// Overwrite the predecessor of the serving node (join handshake).
    async fn set_predecessor(node: NodeRef);

    /// The caller believes it is the serving node's predecessor.
    async fn notify(node: NodeRef);

    /// A node that may now own finger `index` announces itself.
    async fn update_finger_table(node: NodeRef, index: u32);
}
