//! Protocol defaults.

/// Default identifier bit length (m).
pub const DEFAULT_HASH_BITS: u32 = 32;
/// Smallest usable identifier space.
pub const MIN_HASH_BITS: u32 = 3;
/// Ids are kept in a u128, so the space caps at 128 bits.
pub const MAX_HASH_BITS: u32 = 128;

/// Default per-call RPC deadline in ms.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 500;
/// Default interval of the stabilize task in ms.
pub const DEFAULT_STABILIZE_INTERVAL_MS: u64 = 1000;
/// Default interval of the fix-fingers task in ms.
pub const DEFAULT_FIX_FINGERS_INTERVAL_MS: u64 = 3000;
/// Default interval of the check-predecessor task in ms.
pub const DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS: u64 = 1000;

/// In-flight channel cap of the RPC accept loop.
pub const MAX_CONCURRENT_CHANNELS: usize = 32;
