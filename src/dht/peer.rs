//! Peer references.
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use super::Did;

/// A peer on the ring: its identifier and the address it answers RPCs on.
///
/// Peers are plain value records. The ring is inherently cyclic, so nodes
/// never hold connections or owning pointers to each other; channels live
/// in the connector cache keyed by `(host, port)`. An unknown or
/// unreachable peer is represented as `Option::<NodeRef>::None`, which
/// serializes as `null` on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Position on the ring.
    pub id: Did,
    /// Network address.
    pub host: String,
    /// TCP port of the ring RPC endpoint.
    pub port: u16,
}

impl NodeRef {
    /// Build a reference from its parts.
    pub fn new(id: Did, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }

    /// `host:port` form, for dialing and log records.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.host, self.port)
    }
}
