//! Finger table.
#![warn(missing_docs)]
use std::ops::Index;

use super::did::in_modulo_range;
use super::Did;
use super::IdSpace;
use super::NodeRef;

/// One finger: the arc start it covers and the best-known owner of that
/// arc.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FingerEntry {
    /// `(self_id + 2^i) mod 2^m`. Fixed for the lifetime of the table.
    pub start: Did,
    /// First known live node at or after `start`, clockwise.
    pub node: NodeRef,
}

/// Finger table of a node: m shortcuts at exponentially increasing
/// distances. Entry 0 is the immediate successor.
#[derive(Clone, Debug)]
pub struct FingerTable {
    me: NodeRef,
    entries: Vec<FingerEntry>,
}

impl FingerTable {
    /// Build a table with every finger pointing at `me`. A lone node is
    /// its own successor on every arc, so this is also the post-join
    /// initial state.
    pub fn new(me: NodeRef, space: &IdSpace) -> Self {
        let entries = (0..space.bits())
            .map(|i| FingerEntry {
                start: space.finger_start(me.id, i),
                node: me.clone(),
            })
            .collect();
        Self { me, entries }
    }

    /// Number of fingers, always m.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// A finger table is never empty; kept for container symmetry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// getter
    pub fn get(&self, index: usize) -> Option<&FingerEntry> {
        self.entries.get(index)
    }

    /// setter; only the node half of an entry is writable
    pub fn set(&mut self, index: usize, node: NodeRef) {
        if index >= self.entries.len() {
            tracing::error!("set finger index out of range, index: {}", index);
            return;
        }
        self.entries[index].node = node;
    }

    /// The immediate successor, `entries[0].node`.
    pub fn successor(&self) -> NodeRef {
        self.entries[0].node.clone()
    }

    /// Scan fingers from the top down for the first node strictly inside
    /// `(self, id)`. Falls back to `me` when no finger precedes `id`.
    pub fn closest_preceding(&self, id: Did) -> NodeRef {
        for entry in self.entries.iter().rev() {
            if in_modulo_range(entry.node.id, self.me.id, false, id, false) {
                return entry.node.clone();
            }
        }
        self.me.clone()
    }

    /// All entries in index order.
    pub fn list(&self) -> &[FingerEntry] {
        &self.entries
    }
}

impl Index<usize> for FingerTable {
    type Output = FingerEntry;
    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: u128, port: u16) -> NodeRef {
        NodeRef::new(Did::from(id), "127.0.0.1", port)
    }

    #[test]
    fn test_new_table_covers_space_with_self() {
        let space = IdSpace::new(3).unwrap();
        let me = node(1, 4001);
        let table = FingerTable::new(me.clone(), &space);
        assert_eq!(table.len(), 3);
        let starts: Vec<u128> = table.list().iter().map(|e| e.start.value()).collect();
        assert_eq!(starts, vec![2, 3, 5]);
        assert!(table.list().iter().all(|e| e.node == me));
        assert_eq!(table.successor(), me);
    }

    #[test]
    fn test_set_ignores_out_of_range_index() {
        let space = IdSpace::new(3).unwrap();
        let me = node(1, 4001);
        let mut table = FingerTable::new(me.clone(), &space);
        table.set(3, node(5, 4005));
        assert!(table.list().iter().all(|e| e.node == me));
        table.set(0, node(3, 4003));
        assert_eq!(table.successor(), node(3, 4003));
        assert_eq!(table[0].start.value(), 2);
    }

    #[test]
    fn test_closest_preceding_scans_top_down() {
        let space = IdSpace::new(3).unwrap();
        let me = node(1, 4001);
        let mut table = FingerTable::new(me.clone(), &space);
        // Ring {1, 3, 5}: fingers of node 1 converge to {3, 3, 5}.
        table.set(0, node(3, 4003));
        table.set(1, node(3, 4003));
        table.set(2, node(5, 4005));
        // Looking up 0 from node 1 should route to 5, the highest finger
        // inside (1, 0).
        assert_eq!(table.closest_preceding(Did::from(0)).id.value(), 5);
        // Looking up 4: finger 5 is not in (1, 4), finger 3 is.
        assert_eq!(table.closest_preceding(Did::from(4)).id.value(), 3);
        // Nothing precedes 2, fall back to self.
        assert_eq!(table.closest_preceding(Did::from(2)), me);
    }
}
