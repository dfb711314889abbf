//! Lookup engine, join protocol and ring maintenance.
//!
//! A [Node] owns the local [Ring] state and a [Connector]. Every operation
//! that the Chord paper writes as `n'.op(..)` dispatches on identity: when
//! the queried node is this node the operation runs locally, otherwise it
//! is one RPC. Transport failures never propagate as errors; they are
//! logged with the peer and collapsed to `None` (or `false` for liveness
//! probes), and the periodic maintenance tasks repair whatever
//! inconsistency is left behind.
#![warn(missing_docs)]
use std::future::Future;
use std::sync::Arc;

use rand::Rng;
use tarpc::client::RpcError;
use tarpc::context;
use tokio::time::timeout;

use crate::config::Config;
use crate::dht::in_modulo_range;
use crate::dht::Did;
use crate::dht::IdSpace;
use crate::dht::NodeRef;
use crate::dht::Ring;
use crate::error::Error;
use crate::error::Result;
use crate::migrate::KeyMigration;
use crate::migrate::NoMigration;
use crate::rpc::Connector;
use crate::rpc::NodeServiceClient;

/// One ring member.
pub struct Node {
    ring: Ring,
    connector: Connector,
    known: Option<NodeRef>,
    migrator: Arc<dyn KeyMigration>,
}

impl Node {
    /// Build a node from its configuration, with the no-op migration hook.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_migrator(config, Arc::new(NoMigration))
    }

    /// Build a node with a storage-layer migration hook.
    ///
    /// Fails on an invalid configuration or when this node and the
    /// configured bootstrap peer are distinct addresses hashing to the
    /// same identifier; that collision is unrecoverable and must abort
    /// the process.
    pub fn with_migrator(config: &Config, migrator: Arc<dyn KeyMigration>) -> Result<Self> {
        config.validate()?;
        let space = config.id_space()?;
        let self_id = match config.pinned_id()? {
            Some(raw) => space.pinned(raw)?,
            None => space.id_of(&config.host, config.port),
        };
        let me = NodeRef::new(self_id, config.host.clone(), config.port);

        let known = match (&config.known_host, config.known_port) {
            (Some(host), Some(port)) => {
                let id = match config.pinned_known_id()? {
                    Some(raw) => space.pinned(raw)?,
                    None => space.id_of(host, port),
                };
                Some(NodeRef::new(id, host.clone(), port))
            }
            _ => None,
        };
        if let Some(peer) = &known {
            if (peer.host != me.host || peer.port != me.port) && peer.id == me.id {
                return Err(Error::IdCollision(me.endpoint(), peer.endpoint()));
            }
        }

        Ok(Self {
            ring: Ring::new(me, space),
            connector: Connector::new(config.rpc_timeout()),
            known,
            migrator,
        })
    }

    /// This node.
    pub fn me(&self) -> &NodeRef {
        self.ring.me()
    }

    /// This node's identifier.
    pub fn id(&self) -> Did {
        self.ring.id()
    }

    /// The identifier space.
    pub fn space(&self) -> &IdSpace {
        self.ring.space()
    }

    /// The local ring state.
    pub fn ring(&self) -> &Ring {
        &self.ring
    }

    /// Resolve the first node at or after `id`, dispatching from
    /// `queried`. Locally this is `successor(find_predecessor(id))`; for
    /// another node it is one forwarded RPC. Any failure yields `None`.
    pub async fn find_successor(&self, id: Did, queried: &NodeRef) -> Option<NodeRef> {
        if queried.id == self.id() {
            let before = self.find_predecessor(id).await?;
            self.successor_of(&before).await
        } else {
            self.remote_find_successor(queried, id, "find_successor").await
        }
    }

    /// Walk the ring towards the node that immediately precedes `id`.
    ///
    /// Starts at self and keeps hopping to the closest preceding finger
    /// until `id` lands in `(n', successor(n')]`. Two further exits: a
    /// ring of one (n' is its own successor), and a hop cap of
    /// `m * 2^m`. A failed hop ends the walk at the last good node.
    pub async fn find_predecessor(&self, id: Did) -> Option<NodeRef> {
        let mut current = self.me().clone();
        let mut successor = self.ring.successor().ok()?;
        let mut hops = self.space().hop_cap();
        loop {
            if current.id == successor.id {
                break;
            }
            if in_modulo_range(id, current.id, false, successor.id, true) {
                break;
            }
            if hops == 0 {
                tracing::warn!(%id, "hop cap exhausted during predecessor walk");
                break;
            }
            hops -= 1;
            let next = match self.closest_preceding_finger(id, &current).await {
                Some(next) => next,
                None => return Some(current),
            };
            if next.id == current.id {
                // No finger precedes `id`; the walk cannot progress.
                break;
            }
            successor = match self.successor_of(&next).await {
                Some(successor) => successor,
                None => return Some(current),
            };
            current = next;
        }
        Some(current)
    }

    /// Closest finger of `queried` strictly preceding `id`; `queried`
    /// itself when none of its fingers qualifies.
    pub async fn closest_preceding_finger(&self, id: Did, queried: &NodeRef) -> Option<NodeRef> {
        if queried.id == self.id() {
            let finger = self.ring.lock_finger().ok()?;
            Some(finger.closest_preceding(id))
        } else {
            self.remote_closest_preceding_finger(queried, id, "closest_preceding_finger")
                .await
        }
    }

    /// Immediate successor of `queried`: a table read locally, one RPC
    /// otherwise.
    pub async fn successor_of(&self, queried: &NodeRef) -> Option<NodeRef> {
        if queried.id == self.id() {
            self.ring.successor().ok()
        } else {
            self.remote_get_successor(queried, "successor_of").await
        }
    }

    /// Join the ring. Runs exactly once at startup; the caller starts the
    /// maintenance tasks only after this returns.
    ///
    /// The finger table already covers the whole space pointing at self
    /// (see [Ring::new]). With a bootstrap peer the table is rebuilt from
    /// the ring and the nodes that must now route through this node are
    /// told so; without one this node closes the ring onto itself.
    pub async fn join_cluster(&self) -> Result<()> {
        match self.known.clone() {
            Some(peer) if peer.id != self.id() => {
                self.init_finger_table(&peer).await?;
                self.update_others().await;
            }
            _ => {
                self.ring.set_predecessor(Some(self.me().clone()))?;
            }
        }
        if let Err(cause) = self.migrator.migrate_keys_after_join(self).await {
            tracing::warn!(%cause, "key migration after join failed");
        }
        let successor = self.ring.successor()?;
        self.ring.lock_successors()?.set_head(successor);
        tracing::info!(id = %self.id(), "joined the ring");
        Ok(())
    }

    /// Build the finger table by querying `peer`, then splice self in
    /// between its successor and that successor's old predecessor.
    async fn init_finger_table(&self, peer: &NodeRef) -> Result<()> {
        let m = self.space().bits() as usize;
        let start = self.ring.lock_finger()?[0].start;
        let successor = self
            .remote_find_successor(peer, start, "init_finger_table")
            .await
            .ok_or_else(|| Error::JoinFailed(peer.host.clone(), peer.port))?;
        self.ring.set_successor(successor.clone())?;

        let old_predecessor = self
            .remote_get_predecessor(&successor, "init_finger_table")
            .await;
        self.ring.set_predecessor(old_predecessor)?;
        self.remote_set_predecessor(&successor, "init_finger_table")
            .await;

        for i in 0..m - 1 {
            let (next_start, previous) = {
                let finger = self.ring.lock_finger()?;
                (finger[i + 1].start, finger[i].node.clone())
            };
            if in_modulo_range(next_start, self.id(), true, previous.id, false) {
                // The previous finger already covers this start.
                self.ring.lock_finger()?.set(i + 1, previous);
            } else if let Some(node) = self
                .remote_find_successor(peer, next_start, "init_finger_table")
                .await
            {
                self.ring.lock_finger()?.set(i + 1, node);
            }
            // On a failed lookup the entry keeps pointing at self until
            // fix_fingers repairs it.
        }
        Ok(())
    }

    /// Tell every node whose finger table must now route through this
    /// node. For each i, the predecessor of `(self - 2^i)` may own a
    /// finger i that this node supersedes.
    async fn update_others(&self) {
        for i in 0..self.space().bits() {
            let target = self.space().finger_inverse(self.id(), i);
            let node = match self.find_predecessor(target).await {
                Some(node) => node,
                None => continue,
            };
            if node.id == self.id() {
                continue;
            }
            self.remote_update_finger_table(&node, i, "update_others")
                .await;
        }
    }

    /// A node `s` announces it may now own finger `index`. Adopt it when
    /// it falls inside `[self, finger[index].node)` and pass the word to
    /// the predecessor; the chain dies out where the arc test fails.
    pub async fn update_finger_table(&self, s: NodeRef, index: u32) {
        let adopted = match self.ring.apply_finger_update(&s, index as usize) {
            Ok(adopted) => adopted,
            Err(cause) => {
                tracing::warn!(%cause, "finger update skipped");
                return;
            }
        };
        if !adopted {
            return;
        }
        let predecessor = match self.ring.predecessor() {
            Ok(Some(predecessor)) => predecessor,
            _ => return,
        };
        if predecessor.id == self.id() || predecessor.id == s.id {
            return;
        }
        self.relay_update_finger_table(&predecessor, &s, index, "update_finger_table")
            .await;
    }

    /// One stabilize round: reconcile the immediate successor against its
    /// predecessor, announce self to it, then reconcile the successor
    /// list.
    pub async fn stabilize(&self) {
        let successor = match self.ring.successor() {
            Ok(successor) => successor,
            Err(_) => return,
        };
        let candidate = if successor.id == self.id() {
            if !self.stabilize_self().await {
                tracing::debug!("nothing to repair on a closed ring of one");
            }
            Some(self.me().clone())
        } else {
            self.remote_get_predecessor(&successor, "stabilize").await
        };
        if let Some(candidate) = candidate {
            if in_modulo_range(candidate.id, self.id(), false, successor.id, false) {
                tracing::debug!(successor = %candidate, "adopting closer successor");
                let _ = self.ring.set_successor(candidate);
            }
        }

        // Announce self to the (possibly new) successor.
        match self.ring.successor() {
            Ok(successor) if successor.id != self.id() => {
                self.remote_notify(&successor, "stabilize").await;
            }
            Ok(_) => {
                if let Err(cause) = self.ring.notify(self.me().clone()) {
                    tracing::warn!(%cause, "self notify failed");
                }
            }
            Err(_) => return,
        }

        self.update_successor_table().await;
    }

    /// Degenerate case of a node whose successor is itself. A live
    /// predecessor means another node spliced itself in behind us; adopt
    /// it as successor to kick the singleton open. Fails when the
    /// predecessor is unknown or dead; succeeds when genuinely alone.
    pub async fn stabilize_self(&self) -> bool {
        let predecessor = match self.ring.predecessor() {
            Ok(Some(predecessor)) => predecessor,
            _ => return false,
        };
        if predecessor.id == self.id() {
            return true;
        }
        if self.check_predecessor().await {
            let _ = self.ring.set_successor(predecessor);
            true
        } else {
            false
        }
    }

    /// Probe the predecessor; wipe it on failure so a live claimant can
    /// take the slot.
    pub async fn check_predecessor(&self) -> bool {
        let predecessor = match self.ring.predecessor() {
            Ok(Some(predecessor)) => predecessor,
            _ => return false,
        };
        if predecessor.id == self.id() {
            return true;
        }
        if self
            .remote_summary(&predecessor, "check_predecessor")
            .await
            .is_some()
        {
            true
        } else {
            let _ = self.ring.set_predecessor(None);
            false
        }
    }

    /// Whether the immediate successor is this node or answers liveness.
    pub async fn check_successor(&self) -> bool {
        let successor = match self.ring.successor() {
            Ok(successor) => successor,
            Err(_) => return false,
        };
        if successor.id == self.id() {
            return true;
        }
        self.remote_summary(&successor, "check_successor")
            .await
            .is_some()
    }

    /// Reconcile the successor list. Best effort: every phase absorbs
    /// failures and leaves repair to the next round.
    ///
    /// 1. Mirror a live immediate successor into slot 0; otherwise shift
    ///    dead heads off and promote the first live fall-back into
    ///    `finger[0]`.
    /// 2. If everything died, fall back to self.
    /// 3. Extend the tail by walking each entry's successor.
    /// 4. Cap the length at m and prune dead entries off the tail.
    pub async fn update_successor_table(&self) {
        if self.check_successor().await {
            let successor = match self.ring.successor() {
                Ok(successor) => successor,
                Err(_) => return,
            };
            if let Ok(mut successors) = self.ring.lock_successors() {
                successors.set_head(successor);
            }
        } else {
            loop {
                let dropped = match self.ring.lock_successors() {
                    Ok(mut successors) => successors.drop_head(),
                    Err(_) => return,
                };
                if let Some(dead) = dropped {
                    tracing::info!(node = %dead, "dropping dead successor");
                } else {
                    break;
                }
                let promoted = match self.ring.lock_successors() {
                    Ok(successors) => successors.head().cloned(),
                    Err(_) => return,
                };
                match promoted {
                    Some(candidate) => {
                        let _ = self.ring.set_successor(candidate);
                        if self.check_successor().await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // Vacuum: nobody left to succeed us but ourselves.
            if let Ok(mut successors) = self.ring.lock_successors() {
                if successors.is_empty() {
                    successors.set_head(self.me().clone());
                    drop(successors);
                    let _ = self.ring.set_successor(self.me().clone());
                }
            }
        }

        // Extend: each entry's own successor is the next fall-back, until
        // the walk returns to this node's arc or the list is full.
        let capacity = match self.ring.lock_successors() {
            Ok(successors) => successors.capacity(),
            Err(_) => return,
        };
        let mut index = 0;
        while index < capacity {
            let (entry, len) = match self.ring.lock_successors() {
                Ok(successors) => (successors.get(index).cloned(), successors.len()),
                Err(_) => return,
            };
            let entry = match entry {
                Some(entry) => entry,
                None => break,
            };
            if len >= capacity || entry.id == self.id() {
                break;
            }
            if let Some(next) = self
                .remote_get_successor(&entry, "update_successor_table")
                .await
            {
                if !in_modulo_range(next.id, self.id(), true, entry.id, true) {
                    if let Ok(mut successors) = self.ring.lock_successors() {
                        successors.insert_after(index, next);
                    }
                }
            }
            index += 1;
        }

        // Cap and prune dead tail entries.
        loop {
            let tail = match self.ring.lock_successors() {
                Ok(mut successors) => {
                    successors.cap();
                    successors.tail().cloned()
                }
                Err(_) => return,
            };
            let tail = match tail {
                Some(tail) => tail,
                None => break,
            };
            if tail.id == self.id() {
                break;
            }
            if self
                .remote_summary(&tail, "update_successor_table")
                .await
                .is_some()
            {
                break;
            }
            if let Ok(mut successors) = self.ring.lock_successors() {
                successors.pop_tail();
            }
        }
    }

    /// Refresh one random finger. Index 0 is excluded; stabilize owns the
    /// immediate successor. Overwrites only on a successful lookup, so
    /// random selection converges every finger without synchronized work.
    pub async fn fix_fingers(&self) {
        let index = rand::thread_rng().gen_range(1..self.space().bits()) as usize;
        self.refresh_finger(index).await;
    }

    /// Re-resolve the owner of finger `index` through a fresh lookup.
    pub async fn refresh_finger(&self, index: usize) {
        let start = match self.ring.lock_finger() {
            Ok(finger) => match finger.get(index) {
                Some(entry) => entry.start,
                None => return,
            },
            Err(_) => return,
        };
        let me = self.me().clone();
        if let Some(node) = self.find_successor(start, &me).await {
            if let Ok(mut finger) = self.ring.lock_finger() {
                finger.set(index, node);
            }
        }
    }

    /// Run one RPC against `peer` under the connector deadline. Any
    /// failure (dialing, transport, deadline) is logged as a structured
    /// record and collapsed to `None`; a dead transport is evicted from
    /// the cache.
    async fn call<T, Fut>(
        &self,
        peer: &NodeRef,
        local: &'static str,
        remote: &'static str,
        dispatch: impl FnOnce(NodeServiceClient, context::Context) -> Fut,
    ) -> Option<T>
    where
        Fut: Future<Output = std::result::Result<T, RpcError>>,
    {
        let stub = match self.connector.connect(peer).await {
            Ok(stub) => stub,
            Err(cause) => {
                tracing::warn!(
                    local,
                    remote,
                    peer.host = %peer.host,
                    peer.port = peer.port,
                    %cause,
                    "ring rpc dial failed"
                );
                return None;
            }
        };
        match timeout(self.connector.deadline(), dispatch(stub, context::current())).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(cause)) => {
                if matches!(cause, RpcError::Shutdown) {
                    self.connector.evict(peer);
                }
                tracing::warn!(
                    local,
                    remote,
                    peer.host = %peer.host,
                    peer.port = peer.port,
                    %cause,
                    "ring rpc failed"
                );
                None
            }
            Err(_) => {
                self.connector.evict(peer);
                tracing::warn!(
                    local,
                    remote,
                    peer.host = %peer.host,
                    peer.port = peer.port,
                    cause = "deadline expired",
                    "ring rpc failed"
                );
                None
            }
        }
    }

    async fn remote_summary(&self, peer: &NodeRef, local: &'static str) -> Option<NodeRef> {
        self.call(peer, local, "summary", |stub, ctx| async move {
            stub.summary(ctx).await
        })
        .await
    }

    async fn remote_find_successor(
        &self,
        peer: &NodeRef,
        id: Did,
        local: &'static str,
    ) -> Option<NodeRef> {
        let target = peer.clone();
        self.call(peer, local, "find_successor", |stub, ctx| async move {
            stub.find_successor(ctx, id, target).await
        })
        .await
        .flatten()
    }

    async fn remote_get_successor(&self, peer: &NodeRef, local: &'static str) -> Option<NodeRef> {
        let target = peer.clone();
        self.call(peer, local, "get_successor", |stub, ctx| async move {
            stub.get_successor(ctx, target).await
        })
        .await
        .flatten()
    }

    async fn remote_closest_preceding_finger(
        &self,
        peer: &NodeRef,
        id: Did,
        local: &'static str,
    ) -> Option<NodeRef> {
        let target = peer.clone();
        self.call(
            peer,
            local,
            "closest_preceding_finger",
            |stub, ctx| async move { stub.closest_preceding_finger(ctx, id, target).await },
        )
        .await
        .flatten()
    }

    async fn remote_get_predecessor(&self, peer: &NodeRef, local: &'static str) -> Option<NodeRef> {
        self.call(peer, local, "get_predecessor", |stub, ctx| async move {
            stub.get_predecessor(ctx).await
        })
        .await
        .flatten()
    }

    async fn remote_set_predecessor(&self, peer: &NodeRef, local: &'static str) {
        let me = self.me().clone();
        self.call(peer, local, "set_predecessor", |stub, ctx| async move {
            stub.set_predecessor(ctx, me).await
        })
        .await;
    }

    async fn remote_notify(&self, peer: &NodeRef, local: &'static str) {
        let me = self.me().clone();
        self.call(peer, local, "notify", |stub, ctx| async move {
            stub.notify(ctx, me).await
        })
        .await;
    }

    /// Announce self for finger `index` of `peer`.
    async fn remote_update_finger_table(&self, peer: &NodeRef, index: u32, local: &'static str) {
        let me = self.me().clone();
        self.call(peer, local, "update_finger_table", |stub, ctx| async move {
            stub.update_finger_table(ctx, me, index).await
        })
        .await;
    }

    /// Pass a third node's announcement backwards along the ring.
    async fn relay_update_finger_table(
        &self,
        peer: &NodeRef,
        s: &NodeRef,
        index: u32,
        local: &'static str,
    ) {
        let s = s.clone();
        self.call(peer, local, "update_finger_table", |stub, ctx| async move {
            stub.update_finger_table(ctx, s, index).await
        })
        .await;
    }
}
