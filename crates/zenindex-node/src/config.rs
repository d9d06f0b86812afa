//! Node configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogConfig;

/// Startup-fatal: an unrecognized `network` value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown network '{0}' (expected livenet, testnet, or regtest)")]
pub struct UnknownNetwork(pub String);

/// The chain networks the node can index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Livenet,
    Testnet,
    Regtest,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Livenet => write!(f, "livenet"),
            Self::Testnet => write!(f, "testnet"),
            Self::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "livenet" => Ok(Self::Livenet),
            "testnet" => Ok(Self::Testnet),
            "regtest" => Ok(Self::Regtest),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// Configuration recognized by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory; the database lives underneath it.
    pub datadir: PathBuf,
    #[serde(default)]
    pub network: Network,
    /// Maximum open files for the store engine.
    #[serde(default = "default_max_open_files")]
    pub max_open_files: i32,
    /// Bound on concurrent previous-output lookups per transaction.
    #[serde(default = "default_max_transaction_limit")]
    pub max_transaction_limit: usize,
    /// Publish accepted mempool transactions on the `transaction` topic.
    #[serde(default)]
    pub publish_mempool_transactions: bool,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_max_open_files() -> i32 {
    zenindex_core::store::DEFAULT_MAX_OPEN_FILES
}

fn default_max_transaction_limit() -> usize {
    5
}

impl NodeConfig {
    pub fn new(datadir: impl Into<PathBuf>) -> Self {
        Self {
            datadir: datadir.into(),
            network: Network::default(),
            max_open_files: default_max_open_files(),
            max_transaction_limit: default_max_transaction_limit(),
            publish_mempool_transactions: false,
            log: LogConfig::default(),
        }
    }

    /// Database path for the configured network.
    pub fn db_path(&self) -> PathBuf {
        match self.network {
            Network::Livenet => self.datadir.join("bitcore-node.db"),
            Network::Testnet => self.datadir.join("testnet3").join("bitcore-node.db"),
            Network::Regtest => self.datadir.join("regtest").join("bitcore-node.db"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_path_per_network() {
        let mut config = NodeConfig::new("/data");
        assert_eq!(config.db_path(), PathBuf::from("/data/bitcore-node.db"));
        config.network = Network::Testnet;
        assert_eq!(config.db_path(), PathBuf::from("/data/testnet3/bitcore-node.db"));
        config.network = Network::Regtest;
        assert_eq!(config.db_path(), PathBuf::from("/data/regtest/bitcore-node.db"));
    }

    #[test]
    fn network_parsing() {
        assert_eq!("livenet".parse::<Network>().unwrap(), Network::Livenet);
        assert_eq!("regtest".parse::<Network>().unwrap(), Network::Regtest);
        let err = "mainnet".parse::<Network>().unwrap_err();
        assert!(err.to_string().contains("mainnet"));
    }

    #[test]
    fn config_defaults_from_json() {
        let config: NodeConfig =
            serde_json::from_str(r#"{ "datadir": "/data" }"#).unwrap();
        assert_eq!(config.network, Network::Livenet);
        assert_eq!(config.max_open_files, 200);
        assert_eq!(config.max_transaction_limit, 5);
        assert!(!config.publish_mempool_transactions);
    }

    #[test]
    fn unknown_network_fails_deserialization() {
        let result = serde_json::from_str::<NodeConfig>(
            r#"{ "datadir": "/data", "network": "mainnet" }"#,
        );
        assert!(result.is_err());
    }
}
