//! Fatal failure conditions of a ring node.

/// Shorthand for results carrying [Error].
pub type Result<T> = std::result::Result<T, Error>;

/// Conditions a node cannot start from or recover out of.
///
/// Transport and peer failures are deliberately absent: every remote call
/// site absorbs them into `None` (or `false` for liveness probes) and lets
/// the maintenance tasks repair the ring. `Err` is reserved for local fatal
/// conditions.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("hash bit length {0} out of range, expect 3..=128")]
    BadHashBitLength(u32),

    #[error("node host or port missing from configuration")]
    IncompleteAddress,

    #[error("bootstrap peer host and port must be configured together")]
    IncompleteKnownAddress,

    #[error("identifier collision: {0} and {1} hash to the same id")]
    IdCollision(String, String),

    #[error("pinned id {0:#x} exceeds the {1}-bit identifier space")]
    IdOutOfSpace(u128, u32),

    #[error("invalid identifier literal: {0}")]
    BadIdLiteral(String),

    #[error("join via {0}:{1} failed: ring lookup returned no successor")]
    JoinFailed(String, u16),

    #[error("failed to lock finger table")]
    FingerLock,

    #[error("failed to lock successor list")]
    SuccessorLock,

    #[error("failed to lock predecessor")]
    PredecessorLock,

    #[error("config file error: {0}")]
    ConfigFile(String),

    #[error("YAML codec error")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("IO error")]
    Io(#[from] std::io::Error),
}
