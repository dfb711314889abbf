//! Fault-tolerant successor list.
use super::NodeRef;

/// Ordered fall-backs for the immediate successor, capped at m entries.
///
/// Slot 0 mirrors `finger[0]` whenever the successor answers a liveness
/// probe; the tail approximates the successor's own successors so the node
/// survives losing its immediate neighbor. Reconciliation lives in the
/// maintenance pass; this type only provides the shift/insert/prune
/// primitives it needs.
#[derive(Clone, Debug)]
pub struct SuccessorList {
    max: usize,
    nodes: Vec<NodeRef>,
}

impl SuccessorList {
    /// An empty list capped at `max` entries.
    pub fn new(max: usize) -> Self {
        Self {
            max,
            nodes: Vec::with_capacity(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Entry cap (m).
    pub fn capacity(&self) -> usize {
        self.max
    }

    pub fn head(&self) -> Option<&NodeRef> {
        self.nodes.first()
    }

    pub fn tail(&self) -> Option<&NodeRef> {
        self.nodes.last()
    }

    pub fn get(&self, index: usize) -> Option<&NodeRef> {
        self.nodes.get(index)
    }

    pub fn list(&self) -> Vec<NodeRef> {
        self.nodes.clone()
    }

    /// Overwrite slot 0, growing the list if it was empty.
    pub fn set_head(&mut self, node: NodeRef) {
        if self.nodes.is_empty() {
            self.nodes.push(node);
        } else {
            self.nodes[0] = node;
        }
    }

    /// Shift the list left, dropping the dead head.
    pub fn drop_head(&mut self) -> Option<NodeRef> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(self.nodes.remove(0))
        }
    }

    /// Insert `node` after position `index`. Duplicates are skipped and
    /// anything past the cap falls off the tail.
    pub fn insert_after(&mut self, index: usize, node: NodeRef) {
        if self.nodes.iter().any(|n| n.id == node.id) {
            return;
        }
        let at = (index + 1).min(self.nodes.len());
        self.nodes.insert(at, node);
        self.nodes.truncate(self.max);
    }

    /// Enforce the cap.
    pub fn cap(&mut self) {
        self.nodes.truncate(self.max);
    }

    /// Remove and return the last entry.
    pub fn pop_tail(&mut self) -> Option<NodeRef> {
        self.nodes.pop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dht::Did;

    fn node(id: u128) -> NodeRef {
        NodeRef::new(Did::from(id), "127.0.0.1", 4000 + id as u16)
    }

    #[test]
    fn test_head_mirror_and_shift() {
        let mut list = SuccessorList::new(3);
        assert!(list.is_empty());
        list.set_head(node(3));
        assert_eq!(list.list(), vec![node(3)]);
        list.set_head(node(5));
        assert_eq!(list.list(), vec![node(5)]);
        list.insert_after(0, node(7));
        assert_eq!(list.drop_head(), Some(node(5)));
        assert_eq!(list.head(), Some(&node(7)));
    }

    #[test]
    fn test_insert_dedupes_and_caps() {
        let mut list = SuccessorList::new(3);
        list.set_head(node(2));
        list.insert_after(0, node(4));
        list.insert_after(1, node(6));
        list.insert_after(0, node(4));
        assert_eq!(list.list(), vec![node(2), node(4), node(6)]);
        // Full: a new insert pushes the tail off.
        list.insert_after(0, node(3));
        assert_eq!(list.list(), vec![node(2), node(3), node(4)]);
        assert_eq!(list.pop_tail(), Some(node(4)));
        assert_eq!(list.len(), 2);
    }
}
