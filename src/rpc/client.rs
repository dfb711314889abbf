//! Cached RPC clients.
use std::io;
use std::time::Duration;

use dashmap::DashMap;
use tarpc::client;
use tarpc::tokio_serde::formats::Bincode;
use tokio::time::timeout;

use super::NodeServiceClient;
use crate::dht::NodeRef;

/// Resolves peers to RPC stubs.
///
/// Channels are cached by `(host, port)` and shared freely between
/// concurrent callers; a stub is a cheap clone over one multiplexed
/// connection. Dialing is bounded by the same deadline as calls. When a
/// transport dies, [Connector::evict] drops the cache entry so the next
/// caller redials.
pub struct Connector {
    clients: DashMap<(String, u16), NodeServiceClient>,
    deadline: Duration,
}

impl Connector {
    /// A connector whose dials and calls are bounded by `deadline`.
    pub fn new(deadline: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            deadline,
        }
    }

    /// The per-call deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Fetch or dial the stub for `peer`.
    pub async fn connect(&self, peer: &NodeRef) -> io::Result<NodeServiceClient> {
        let key = (peer.host.clone(), peer.port);
        if let Some(existing) = self.clients.get(&key) {
            return Ok(existing.value().clone());
        }
        let dial = tarpc::serde_transport::tcp::connect((peer.host.as_str(), peer.port), Bincode::default);
        let transport = match timeout(self.deadline, dial).await {
            Ok(connected) => connected?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect deadline expired",
                ))
            }
        };
        let stub = NodeServiceClient::new(client::Config::default(), transport).spawn();
        self.clients.insert(key, stub.clone());
        Ok(stub)
    }

    /// Drop the cached channel for `peer`.
    pub fn evict(&self, peer: &NodeRef) {
        self.clients.remove(&(peer.host.clone(), peer.port));
    }
}
