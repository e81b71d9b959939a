//! Error types for the orchestration library
//!
//! Two families exist: configuration errors, raised before any network
//! interaction, and everything that happens once contracts are being called
//! (RPC failures, reverts, artifact and address-book problems during a
//! deployment). Neither family is retried.

use alloy::primitives::B256;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    #[error("Configuration not found: {0}")]
    UnknownPool(String),

    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    #[error("Pool '{pool}' has no {param} configured for network '{network}'")]
    MissingNetworkParam {
        pool: String,
        param: &'static str,
        network: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // RPC / Transaction Errors
    // ========================================================================
    #[error("Contract call {method} failed: {reason}")]
    Rpc { method: &'static str, reason: String },

    #[error("Transaction {tx_hash} for {method} reverted")]
    Reverted { method: &'static str, tx_hash: B256 },

    #[error("Deployment of {contract} returned no contract address (tx {tx_hash})")]
    MissingContractAddress { contract: String, tx_hash: B256 },

    #[error("Addresses provider registry at {0} has no registered providers")]
    NoAddressesProvider(alloy::primitives::Address),

    #[error("Artifact error for {contract}: {reason}")]
    Artifact { contract: String, reason: String },

    #[error("Address book error: {0}")]
    AddressBook(String),

    #[error("Fork deployment failed: {0}")]
    ForkDeployment(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised while resolving static configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownPool(_)
                | Self::UnknownNetwork(_)
                | Self::MissingNetworkParam { .. }
                | Self::InvalidConfig(_)
        )
    }

    /// Wrap an RPC-layer failure for the given contract method
    pub fn rpc(method: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Rpc {
            method,
            reason: err.to_string(),
        }
    }
}
