//! Ring membership state and the Chord routing algorithm.
//! ref: <https://pdos.csail.mit.edu/papers/ton:chord/paper-ton.pdf>
//!
//! With high probability, the number of nodes that must be contacted to
//! find a successor in an N-node network is O(log N).

mod did;
pub use did::in_modulo_range;
pub use did::AddrHasher;
pub use did::Did;
pub use did::IdSpace;
mod peer;
pub use peer::NodeRef;
mod finger;
pub use finger::FingerEntry;
pub use finger::FingerTable;
mod successor;
pub use successor::SuccessorList;
mod ring;
pub use ring::Ring;
pub mod stabilization;
pub use stabilization::Intervals;
pub use stabilization::Stabilizer;
