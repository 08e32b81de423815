//! Node Configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Registry node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// HTTP gateway bind address
    pub rpc_addr: String,
    /// Data directory for the event journal
    pub data_dir: PathBuf,
    /// Genesis committee members (base58 ed25519 verifying keys),
    /// applied only when the journal is empty
    pub genesis_members: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_addr: "127.0.0.1:8700".to_string(),
            data_dir: PathBuf::from("./data"),
            genesis_members: Vec::new(),
        }
    }
}
