//! Configuration tree (§10.3): a top-level config struct nesting
//! sub-configs with their own `Default` impls — listen address, storage
//! root, TLS material, and per-model storage overrides.
//!
//! Loaded from `--config <path>` or `HATN_CONFIG_DIR` (a directory
//! containing `node.json`), as a JSON file that may carry `//` line
//! comments; CLI flags override individual fields afterward.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process exit codes (§6, §10.3).
pub mod exit_code {
    pub const OK: u8 = 0;
    pub const USAGE: u8 = 64;
    pub const CONFIG: u8 = 78;
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "node-runtime")]
#[command(about = "Encrypted, multi-tenant storage and RPC node")]
pub struct Args {
    /// Path to a JSON-with-comments config file. Falls back to
    /// `$HATN_CONFIG_DIR/node.json` when absent.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `listen_addr` from the config file.
    #[arg(long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub root_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { root_dir: PathBuf::from("./data") }
    }
}

/// Certificate and private key paths for the TLS acceptor. Absent means
/// the server accepts plaintext connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Per-model overrides resolved by collection name at bridge start-up,
/// layered over whatever a `Model` impl declares as its own `TTL`/
/// `PARTITION` constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelOverride {
    pub collection: String,
    pub ttl_seconds: Option<u32>,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:7420".parse().expect("valid default socket address")
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default)]
    pub storage: StorageConfig,

    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub model_overrides: Vec<ModelOverride>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to a passphrase-sealed secrets blob (§4.6); unsealed at
    /// start-up with the passphrase from `HATN_SECRETS_PASSPHRASE`.
    pub secrets_path: Option<PathBuf>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage: StorageConfig::default(),
            tls: None,
            model_overrides: Vec::new(),
            log_level: default_log_level(),
            secrets_path: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
}

impl NodeConfig {
    /// Resolves a config path from `--config` or `HATN_CONFIG_DIR`, and
    /// loads it; with neither given, runs on defaults. CLI flags apply on
    /// top of whatever the file produced.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let path = args
            .config
            .clone()
            .or_else(|| std::env::var_os("HATN_CONFIG_DIR").map(|dir| PathBuf::from(dir).join("node.json")));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => NodeConfig::default(),
        };

        if let Some(listen) = args.listen {
            config.listen_addr = listen;
        }
        Ok(config)
    }

    fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        let stripped = strip_line_comments(&raw);
        serde_json::from_str(&stripped).map_err(|source| ConfigError::Parse { path: path.clone(), source })
    }
}

/// Strips `//`-prefixed line comments outside of string literals. Not a
/// full JSON5 parser; good enough for a hand-authored config file.
fn strip_line_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.lines() {
        let mut in_string = false;
        let mut escaped = false;
        let mut cut = line.len();
        for (i, c) in line.char_indices() {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' if in_string => escaped = true,
                '"' => in_string = !in_string,
                '/' if !in_string && line[i..].starts_with("//") => {
                    cut = i;
                    break;
                }
                _ => {}
            }
        }
        out.push_str(&line[..cut]);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let config = NodeConfig::default();
        assert_eq!(config.listen_addr.port(), 7420);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn strips_line_comments_outside_strings() {
        let input = "{\n  // a comment\n  \"log_level\": \"debug\" // trailing\n}\n";
        let stripped = strip_line_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["log_level"], "debug");
    }

    #[test]
    fn preserves_double_slash_inside_a_string() {
        let input = "{\"root_dir\": \"http://example\"}";
        let stripped = strip_line_comments(input);
        let value: serde_json::Value = serde_json::from_str(&stripped).unwrap();
        assert_eq!(value["root_dir"], "http://example");
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = NodeConfig::from_file(&PathBuf::from("/nonexistent/node.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
