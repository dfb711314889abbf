//! Per-node ring state.
#![warn(missing_docs)]
use std::sync::Mutex;
use std::sync::MutexGuard;

use super::did::in_modulo_range;
use super::Did;
use super::FingerTable;
use super::IdSpace;
use super::NodeRef;
use super::SuccessorList;
use crate::error::Error;
use crate::error::Result;

/// Everything a node knows about the ring: its own identity, the finger
/// table, the successor list and the predecessor.
///
/// Each piece sits behind its own mutex. Mutations are short and
/// lock-scoped; callers snapshot what they need, drop the guard, perform
/// any RPC, then reacquire to apply the result. No lock is ever held
/// across a suspension point.
#[derive(Debug)]
pub struct Ring {
    me: NodeRef,
    space: IdSpace,
    finger: Mutex<FingerTable>,
    successors: Mutex<SuccessorList>,
    predecessor: Mutex<Option<NodeRef>>,
}

impl Ring {
    /// State of a fresh node: every finger points at `me`, the successor
    /// list holds `me`, the predecessor is unknown.
    pub fn new(me: NodeRef, space: IdSpace) -> Self {
        let finger = FingerTable::new(me.clone(), &space);
        let mut successors = SuccessorList::new(space.bits() as usize);
        successors.set_head(me.clone());
        Self {
            me,
            space,
            finger: Mutex::new(finger),
            successors: Mutex::new(successors),
            predecessor: Mutex::new(None),
        }
    }

    /// This node.
    pub fn me(&self) -> &NodeRef {
        &self.me
    }

    /// This node's identifier.
    pub fn id(&self) -> Did {
        self.me.id
    }

    /// The identifier space the ring lives in.
    pub fn space(&self) -> &IdSpace {
        &self.space
    }

    /// Lock and return MutexGuard of the finger table.
    pub fn lock_finger(&self) -> Result<MutexGuard<FingerTable>> {
        self.finger.lock().map_err(|_| Error::FingerLock)
    }

    /// Lock and return MutexGuard of the successor list.
    pub fn lock_successors(&self) -> Result<MutexGuard<SuccessorList>> {
        self.successors.lock().map_err(|_| Error::SuccessorLock)
    }

    /// Lock and return MutexGuard of the predecessor.
    pub fn lock_predecessor(&self) -> Result<MutexGuard<Option<NodeRef>>> {
        self.predecessor.lock().map_err(|_| Error::PredecessorLock)
    }

    /// Snapshot of the immediate successor, `finger[0].node`.
    pub fn successor(&self) -> Result<NodeRef> {
        Ok(self.lock_finger()?.successor())
    }

    /// Overwrite the immediate successor.
    pub fn set_successor(&self, node: NodeRef) -> Result<()> {
        self.lock_finger()?.set(0, node);
        Ok(())
    }

    /// Snapshot of the predecessor.
    pub fn predecessor(&self) -> Result<Option<NodeRef>> {
        Ok(self.lock_predecessor()?.clone())
    }

    /// Overwrite the predecessor. `None` marks it unknown after a death.
    pub fn set_predecessor(&self, node: Option<NodeRef>) -> Result<()> {
        *self.lock_predecessor()? = node;
        Ok(())
    }

    /// n' thinks it might be our predecessor. Adopt it when we have none,
    /// or when it sits strictly between the current predecessor and us.
    /// Returns whether it was adopted.
    pub fn notify(&self, n: NodeRef) -> Result<bool> {
        let mut predecessor = self.lock_predecessor()?;
        let adopt = match predecessor.as_ref() {
            None => true,
            Some(p) => in_modulo_range(n.id, p.id, false, self.me.id, false),
        };
        if adopt {
            tracing::debug!(node = %n, "adopting predecessor");
            *predecessor = Some(n);
        }
        Ok(adopt)
    }

    /// Join-time finger update: adopt `s` for finger `index` when it falls
    /// inside `[self, finger[index].node)`. Returns whether it was
    /// adopted, in which case the caller propagates the update backwards.
    pub fn apply_finger_update(&self, s: &NodeRef, index: usize) -> Result<bool> {
        if s.id == self.me.id {
            return Ok(false);
        }
        let mut finger = self.lock_finger()?;
        let owner = match finger.get(index) {
            Some(entry) => entry.node.id,
            None => return Ok(false),
        };
        if in_modulo_range(s.id, self.me.id, true, owner, false) {
            finger.set(index, s.clone());
            return Ok(true);
        }
        Ok(false)
    }
}
