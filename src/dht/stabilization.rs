//! Periodic ring maintenance.
use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::consts::DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS;
use crate::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::node::Node;

/// Intervals of the three maintenance tasks.
#[derive(Clone, Copy, Debug)]
pub struct Intervals {
    /// Successor reconciliation cadence.
    pub stabilize: Duration,
    /// Finger refresh cadence.
    pub fix_fingers: Duration,
    /// Predecessor liveness cadence.
    pub check_predecessor: Duration,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            stabilize: Duration::from_millis(DEFAULT_STABILIZE_INTERVAL_MS),
            fix_fingers: Duration::from_millis(DEFAULT_FIX_FINGERS_INTERVAL_MS),
            check_predecessor: Duration::from_millis(DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS),
        }
    }
}

/// Drives the periodic maintenance of one node.
///
/// Each task reschedules itself after its interval regardless of how the
/// round went. The tasks share no ordering and may overlap each other and
/// inbound RPC handlers; every round works on snapshots and reapplies
/// results under short locks, so overlap only costs redundant work.
#[derive(Clone)]
pub struct Stabilizer {
    node: Arc<Node>,
    intervals: Intervals,
}

impl Stabilizer {
    /// A stabilizer for `node`.
    pub fn new(node: Arc<Node>, intervals: Intervals) -> Self {
        Self { node, intervals }
    }

    /// Spawn the three maintenance loops onto the runtime.
    pub fn start(&self) {
        let this = self.clone();
        tokio::spawn(async move { this.run_stabilize().await });
        let this = self.clone();
        tokio::spawn(async move { this.run_fix_fingers().await });
        let this = self.clone();
        tokio::spawn(async move { this.run_check_predecessor().await });
    }

    async fn run_stabilize(self) {
        loop {
            let tick = Delay::new(self.intervals.stabilize).fuse();
            pin_mut!(tick);
            select! {
                _ = tick => self.node.stabilize().await,
            }
        }
    }

    async fn run_fix_fingers(self) {
        loop {
            let tick = Delay::new(self.intervals.fix_fingers).fuse();
            pin_mut!(tick);
            select! {
                _ = tick => self.node.fix_fingers().await,
            }
        }
    }

    async fn run_check_predecessor(self) {
        loop {
            let tick = Delay::new(self.intervals.check_predecessor).fuse();
            pin_mut!(tick);
            select! {
                _ = tick => {
                    if !self.node.check_predecessor().await {
                        tracing::debug!("predecessor unknown or unreachable");
                    }
                },
            }
        }
    }
}
