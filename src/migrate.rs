//! Key migration hook.
use async_trait::async_trait;

use crate::error::Result;
use crate::node::Node;

/// Storage-layer hook invoked exactly once per process, after the finger
/// table is initialized and before the maintenance tasks start.
///
/// The ring core does not prescribe a payload protocol; it only requires
/// that the hook terminates. An `Err` is logged and swallowed by the
/// caller, never failing the join.
#[async_trait]
pub trait KeyMigration: Send + Sync {
    /// Pull the keys this node is now responsible for from its successor.
    async fn migrate_keys_after_join(&self, node: &Node) -> Result<()>;
}

/// Hook for nodes without a storage layer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMigration;

#[async_trait]
impl KeyMigration for NoMigration {
    async fn migrate_keys_after_join(&self, _node: &Node) -> Result<()> {
        Ok(())
    }
}
