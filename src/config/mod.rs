//! CLI flags plus an optional TOML config-file layer. CLI flags always win
//! over file values; file values win over built-in defaults.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed MTU for the virtual interface. Not negotiated.
pub const DEFAULT_MTU: u16 = 1430;

fn default_keepalive_interval_s() -> u32 {
    10
}

/// Command-line flags. Every networking field is optional here so a config
/// file can supply it instead; `identity` and `server` are the two values
/// with no other source and are required unless a config file sets them.
#[derive(Parser, Debug)]
#[command(
    name = "meshlink-client",
    author,
    version,
    about = "Mesh VPN client data plane",
    long_about = None
)]
pub struct Args {
    /// Path to a TOML config file overlaying these defaults.
    #[arg(long)]
    pub config: Option<String>,

    /// Coordination server address, e.g. 127.0.0.1:8080.
    #[arg(short, long)]
    pub server: Option<String>,

    /// This client's identity string.
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Crypto suite config: plain, aes256:<key>, chacha20:<key>, xor:<key>.
    #[arg(short, long)]
    pub crypto: Option<String>,

    /// Keepalive interval in seconds.
    #[arg(long)]
    pub keepalive_interval: Option<u32>,
}

/// The TOML-file config layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server_addr: Option<String>,
    pub identity: Option<String>,
    #[serde(default)]
    pub crypto_config: Option<String>,
    #[serde(default = "default_keepalive_interval_s")]
    pub keepalive_interval_s: u32,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            server_addr: None,
            identity: None,
            crypto_config: None,
            keepalive_interval_s: default_keepalive_interval_s(),
        }
    }
}

/// Loads and parses a TOML config file from `path`.
pub fn load_file(path: &str) -> crate::Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read config file {}: {}", path, e))?;
    toml::from_str(&content).map_err(|e| format!("failed to parse config file {}: {}", path, e).into())
}

/// The fully resolved configuration the engine runs with, after merging CLI
/// flags over an optional file layer over built-in defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub server_addr: String,
    pub identity: String,
    pub crypto_config: String,
    pub keepalive_interval: Duration,
}

impl EngineConfig {
    /// Merges `args` over an optional file at `args.config`. CLI flags take
    /// priority; `server_addr` and `identity` are the only fields with no
    /// built-in default and must be set by one of the two sources.
    pub fn resolve(args: &Args) -> crate::Result<Self> {
        let file = match &args.config {
            Some(path) => load_file(path)?,
            None => FileConfig::default(),
        };

        let server_addr = args
            .server
            .clone()
            .or(file.server_addr)
            .ok_or("server address not set (pass --server or set server_addr in --config)")?;

        let identity = args
            .identity
            .clone()
            .or(file.identity)
            .ok_or("identity not set (pass --identity or set identity in --config)")?;

        let crypto_config = args
            .crypto
            .clone()
            .or(file.crypto_config)
            .unwrap_or_default();

        let keepalive_interval_s = args.keepalive_interval.unwrap_or(file.keepalive_interval_s);

        Ok(Self {
            server_addr,
            identity,
            crypto_config,
            keepalive_interval: Duration::from_secs(keepalive_interval_s.max(1) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_args() -> Args {
        Args {
            config: None,
            server: None,
            identity: None,
            crypto: None,
            keepalive_interval: None,
        }
    }

    #[test]
    fn cli_flags_resolve_without_a_file() {
        let args = Args {
            server: Some("127.0.0.1:8080".to_string()),
            identity: Some("c1".to_string()),
            crypto: Some("chacha20:k".to_string()),
            keepalive_interval: Some(5),
            ..bare_args()
        };
        let cfg = EngineConfig::resolve(&args).unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:8080");
        assert_eq!(cfg.identity, "c1");
        assert_eq!(cfg.crypto_config, "chacha20:k");
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(5));
    }

    #[test]
    fn missing_identity_and_server_is_an_error() {
        let args = bare_args();
        assert!(EngineConfig::resolve(&args).is_err());
    }

    #[test]
    fn defaults_keepalive_interval_to_ten_seconds() {
        let args = Args {
            server: Some("s:1".to_string()),
            identity: Some("c1".to_string()),
            ..bare_args()
        };
        let cfg = EngineConfig::resolve(&args).unwrap();
        assert_eq!(cfg.keepalive_interval, Duration::from_secs(10));
    }
}
