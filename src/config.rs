//! Node configuration.
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS;
use crate::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::consts::DEFAULT_HASH_BITS;
use crate::consts::DEFAULT_RPC_TIMEOUT_MS;
use crate::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::dht::Intervals;
use crate::dht::IdSpace;
use crate::error::Error;
use crate::error::Result;

fn default_hash_bits() -> u32 {
    DEFAULT_HASH_BITS
}

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_stabilize_interval_ms() -> u64 {
    DEFAULT_STABILIZE_INTERVAL_MS
}

fn default_fix_fingers_interval_ms() -> u64 {
    DEFAULT_FIX_FINGERS_INTERVAL_MS
}

fn default_check_predecessor_interval_ms() -> u64 {
    DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS
}

/// Everything a node consumes at startup. Identifiers are hex literals
/// (with or without a `0x` prefix) so a YAML file never has to carry
/// 128-bit numbers.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Address this node binds and advertises.
    pub host: String,
    /// RPC port this node binds and advertises.
    pub port: u16,
    /// Pinned identifier. Hashed from `host:port` when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Bootstrap peer host. Absent for the first node of a ring.
    #[serde(default)]
    pub known_host: Option<String>,
    /// Bootstrap peer port.
    #[serde(default)]
    pub known_port: Option<u16>,
    /// Pinned bootstrap peer identifier.
    #[serde(default)]
    pub known_id: Option<String>,
    /// Identifier bit length m. Must match across the ring.
    #[serde(default = "default_hash_bits")]
    pub hash_bits: u32,
    /// Per-call RPC deadline in ms.
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
    /// Stabilize cadence in ms.
    #[serde(default = "default_stabilize_interval_ms")]
    pub stabilize_interval_ms: u64,
    /// Fix-fingers cadence in ms.
    #[serde(default = "default_fix_fingers_interval_ms")]
    pub fix_fingers_interval_ms: u64,
    /// Check-predecessor cadence in ms.
    #[serde(default = "default_check_predecessor_interval_ms")]
    pub check_predecessor_interval_ms: u64,
    /// Verbose protocol tracing.
    #[serde(default)]
    pub debug: bool,
}

impl Config {
    /// A default configuration for `host:port`.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            id: None,
            known_host: None,
            known_port: None,
            known_id: None,
            hash_bits: DEFAULT_HASH_BITS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            fix_fingers_interval_ms: DEFAULT_FIX_FINGERS_INTERVAL_MS,
            check_predecessor_interval_ms: DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS,
            debug: false,
        }
    }

    /// Reject configurations a node cannot start from: a missing own or
    /// bootstrap address, a bit length outside [3, 128], or a pinned
    /// identifier that does not fit the identifier space.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.port == 0 {
            return Err(Error::IncompleteAddress);
        }
        if self.known_host.is_some() != self.known_port.is_some() {
            return Err(Error::IncompleteKnownAddress);
        }
        let space = self.id_space()?;
        if let Some(raw) = self.pinned_id()? {
            space.pinned(raw)?;
        }
        if let Some(raw) = self.pinned_known_id()? {
            space.pinned(raw)?;
        }
        Ok(())
    }

    /// The identifier space this node operates in.
    pub fn id_space(&self) -> Result<IdSpace> {
        IdSpace::new(self.hash_bits)
    }

    /// Parsed pinned identifier, if configured.
    pub fn pinned_id(&self) -> Result<Option<u128>> {
        self.id.as_deref().map(parse_id).transpose()
    }

    /// Parsed pinned identifier of the bootstrap peer, if configured.
    pub fn pinned_known_id(&self) -> Result<Option<u128>> {
        self.known_id.as_deref().map(parse_id).transpose()
    }

    /// Per-call RPC deadline.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Maintenance cadences.
    pub fn intervals(&self) -> Intervals {
        Intervals {
            stabilize: Duration::from_millis(self.stabilize_interval_ms),
            fix_fingers: Duration::from_millis(self.fix_fingers_interval_ms),
            check_predecessor: Duration::from_millis(self.check_predecessor_interval_ms),
        }
    }

    /// Write the configuration to a YAML file, creating parent
    /// directories as needed. Returns the resolved path.
    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path.as_ref())?;
        if let Some(parent) = path.parent() {
            if !parent.is_dir() {
                fs::create_dir_all(parent).map_err(|e| Error::ConfigFile(e.to_string()))?;
            }
        }
        let file = fs::File::create(&path).map_err(|e| Error::ConfigFile(e.to_string()))?;
        serde_yaml::to_writer(io::BufWriter::new(file), self)?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Load a configuration from a YAML file.
    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path.as_ref())?;
        let file = fs::File::open(&path).map_err(|e| Error::ConfigFile(e.to_string()))?;
        Ok(serde_yaml::from_reader(io::BufReader::new(file))?)
    }
}

fn expand_home(path: &std::path::Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(stripped) => {
            let home = env::var_os("HOME")
                .map(PathBuf::from)
                .ok_or_else(|| Error::ConfigFile("cannot expand ~, HOME is unset".into()))?;
            Ok(home.join(stripped))
        }
        Err(_) => Ok(path.to_owned()),
    }
}

fn parse_id(literal: &str) -> Result<u128> {
    let digits = literal.trim_start_matches("0x");
    u128::from_str_radix(digits, 16).map_err(|_| Error::BadIdLiteral(literal.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(Config::new("127.0.0.1", 4000).validate().is_ok());
        assert!(Config::new("", 4000).validate().is_err());
        assert!(Config::new("127.0.0.1", 0).validate().is_err());
        let mut config = Config::new("127.0.0.1", 4000);
        config.known_host = Some("127.0.0.2".into());
        assert!(config.validate().is_err());
        config.known_port = Some(4001);
        assert!(config.validate().is_ok());
        // The bit length and pinned identifiers are gated here too.
        config.hash_bits = 2;
        assert!(config.validate().is_err());
        config.hash_bits = 3;
        config.id = Some("9".into());
        assert!(config.validate().is_err());
        config.id = Some("7".into());
        config.known_id = Some("ff".into());
        assert!(config.validate().is_err());
        config.known_id = Some("1".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_pinned_id_literals() {
        let mut config = Config::new("127.0.0.1", 4000);
        assert_eq!(config.pinned_id().unwrap(), None);
        config.id = Some("0x2a".into());
        assert_eq!(config.pinned_id().unwrap(), Some(42));
        config.id = Some("ff".into());
        assert_eq!(config.pinned_id().unwrap(), Some(255));
        config.id = Some("zz".into());
        assert!(config.pinned_id().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = Config::new("10.0.0.1", 4100);
        config.known_host = Some("10.0.0.2".into());
        config.known_port = Some(4200);
        config.hash_bits = 16;
        let text = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back.host, "10.0.0.1");
        assert_eq!(back.known_port, Some(4200));
        assert_eq!(back.hash_bits, 16);
        // Omitted knobs fall back to the defaults.
        let sparse: Config = serde_yaml::from_str("host: 10.0.0.3\nport: 4300\n").unwrap();
        assert_eq!(sparse.hash_bits, DEFAULT_HASH_BITS);
        assert_eq!(sparse.rpc_timeout_ms, DEFAULT_RPC_TIMEOUT_MS);
        assert!(!sparse.debug);
    }
}
