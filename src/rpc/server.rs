//! RPC surface: thin wrappers over the local node.
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future;
use futures::prelude::*;
use tarpc::context;
use tarpc::server;
use tarpc::server::Channel;
use tarpc::tokio_serde::formats::Bincode;
use tokio::net::ToSocketAddrs;
use tokio::task::JoinHandle;

use super::NodeService;
use crate::consts::MAX_CONCURRENT_CHANNELS;
use crate::dht::Did;
use crate::dht::NodeRef;
use crate::error::Result;
use crate::node::Node;

/// Serves the ring RPCs for one node.
///
/// Every wrapper unpacks the request, invokes the matching local
/// operation and replies; none adds logic of its own. This symmetry is
/// what makes a remote `find_successor` indistinguishable from the
/// serving node running the lookup itself.
#[derive(Clone)]
pub struct NodeServer {
    node: Arc<Node>,
}

impl NodeServer {
    /// Wrap `node` for serving.
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[tarpc::server]
impl NodeService for NodeServer {
    async fn summary(self, _: context::Context) -> NodeRef {
        self.node.me().clone()
    }

    async fn find_successor(self, _: context::Context, id: Did, node: NodeRef) -> Option<NodeRef> {
        self.node.find_successor(id, &node).await
    }

    async fn get_successor(self, _: context::Context, node: NodeRef) -> Option<NodeRef> {
        self.node.successor_of(&node).await
    }

    async fn closest_preceding_finger(
        self,
        _: context::Context,
        id: Did,
        node: NodeRef,
    ) -> Option<NodeRef> {
        self.node.closest_preceding_finger(id, &node).await
    }

    async fn get_predecessor(self, _: context::Context) -> Option<NodeRef> {
        self.node.ring().predecessor().ok().flatten()
    }

    async fn set_predecessor(self, _: context::Context, node: NodeRef) {
        if let Err(cause) = self.node.ring().set_predecessor(Some(node)) {
            tracing::warn!(%cause, "set_predecessor rejected");
        }
    }

    async fn notify(self, _: context::Context, node: NodeRef) {
        if let Err(cause) = self.node.ring().notify(node) {
            tracing::warn!(%cause, "notify rejected");
        }
    }

    async fn update_finger_table(self, _: context::Context, node: NodeRef, index: u32) {
        self.node.update_finger_table(node, index).await;
    }
}

/// Bind `addr` and drive the accept loop on a background task. Returns
/// the bound address (useful when binding port 0 in tests) and the task
/// handle.
pub async fn spawn<A>(node: Arc<Node>, addr: A) -> Result<(SocketAddr, JoinHandle<()>)>
where A: ToSocketAddrs {
    let mut listener = tarpc::serde_transport::tcp::listen(addr, Bincode::default).await?;
    listener.config_mut().max_frame_length(usize::MAX);
    let local_addr = listener.local_addr();
    let handle = tokio::spawn(async move {
        listener
            // Ignore sockets that fail during accept.
            .filter_map(|accepted| future::ready(accepted.ok()))
            .map(server::BaseChannel::with_defaults)
            .map(|channel| {
                let server = NodeServer::new(Arc::clone(&node));
                channel.execute(server.serve())
            })
            .buffer_unordered(MAX_CONCURRENT_CHANNELS)
            .for_each(|_| async {})
            .await;
    });
    Ok((local_addr, handle))
}
