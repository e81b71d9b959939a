//! Runtime configuration
//!
//! Everything that is not part of a pool's static market file comes from the
//! environment (optionally seeded from a `.env` file). Defaults target a local
//! Anvil/Hardhat node with its well-known development accounts.

use alloy::primitives::B256;
use std::env;
use std::path::PathBuf;
use url::Url;

use crate::address_book::DEFAULT_ADDRESS_BOOK;
use crate::error::{Error, Result};
use crate::markets::Network;
use crate::redact::Redacted;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
pub const DEFAULT_FORK_DEPLOY_COMMAND: &str = "npx hardhat bend:mainnet --skip-registry";

/// Anvil dev account #0 (0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266)
pub const ANVIL_DEPLOYER_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
/// Anvil dev account #1 (0x70997970C51812dc3A010C7d01b50e0d17dc79C8)
pub const ANVIL_SECONDARY_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Operator configuration
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// JSON-RPC endpoint of the target node
    pub rpc_url: Url,
    /// Network whose pool parameters are used (`NETWORK`)
    pub network: Network,
    /// Set when running against a mainnet fork (`FORK`)
    pub fork: Option<Network>,
    /// Signer #0: deploys everything and holds the pool admin role by default
    pub deployer_key: Redacted<B256>,
    /// Signer #1: emergency admin by default
    pub secondary_key: Redacted<B256>,
    pub address_book_path: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Shell command that performs the fork-mode deployment
    pub fork_deploy_command: String,
}

impl OpsConfig {
    /// Load `.env` if present, then read the environment
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded .env from {:?}", path);
        }
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let rpc_url = env_or("RPC_URL", DEFAULT_RPC_URL);
        let rpc_url = Url::parse(&rpc_url)
            .map_err(|e| Error::InvalidConfig(format!("RPC_URL '{}': {}", rpc_url, e)))?;

        let network = env_or("NETWORK", Network::Localhost.name()).parse()?;
        let fork = match env::var("FORK") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().parse()?),
            _ => None,
        };

        Ok(Self {
            rpc_url,
            network,
            fork,
            deployer_key: Redacted(parse_key(
                "DEPLOYER_PRIVATE_KEY",
                &env_or("DEPLOYER_PRIVATE_KEY", ANVIL_DEPLOYER_KEY),
            )?),
            secondary_key: Redacted(parse_key(
                "SECONDARY_PRIVATE_KEY",
                &env_or("SECONDARY_PRIVATE_KEY", ANVIL_SECONDARY_KEY),
            )?),
            address_book_path: env_or("ADDRESS_BOOK_PATH", DEFAULT_ADDRESS_BOOK).into(),
            artifacts_dir: env_or("ARTIFACTS_DIR", DEFAULT_ARTIFACTS_DIR).into(),
            fork_deploy_command: env_or("FORK_DEPLOY_COMMAND", DEFAULT_FORK_DEPLOY_COMMAND),
        })
    }

    /// Network used for parameter lookups: the fork network wins over `NETWORK`
    pub fn effective_network(&self) -> Network {
        self.fork.unwrap_or(self.network)
    }

    pub fn is_fork(&self) -> bool {
        self.fork.is_some()
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_key(name: &str, raw: &str) -> Result<B256> {
    raw.trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} is not a 32-byte hex key", name)))
}
