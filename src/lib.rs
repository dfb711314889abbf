//! rondo: a Chord ring membership and routing node.
//!
//! Each process owns a contiguous arc of an m-bit identifier circle; the
//! collective answers "which node is responsible for key k" in O(log N)
//! hops. This crate implements the ring core: finger-table construction,
//! the lookup algorithm, the join protocol, and the periodic maintenance
//! (stabilize / fix-fingers / check-predecessor) that keeps the ring
//! consistent while peers come and go.
//!
//! - [dht] holds the ring state and the pure algorithm pieces.
//! - [node] glues them to the wire: local/remote dispatch, join, repair.
//! - [rpc] is the tarpc service surface plus the cached client factory.
//!
//! Stored data is out of scope; the [migrate] hook is the seam a storage
//! layer plugs into.

pub mod config;
pub mod consts;
pub mod dht;
pub mod error;
pub mod logging;
pub mod migrate;
pub mod node;
pub mod rpc;
