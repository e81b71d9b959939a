//! Pool (market) configurations
//!
//! Each known pool is described by a static, human-edited JSON file under
//! `markets/`, compiled into the binary. Per-network parameters are keyed by
//! [`Network`] and looked up with [`PoolConfig::param_for_network`].

use alloy::primitives::Address;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const BEND_MARKET: &str = include_str!("../markets/bend.json");
const COMMONS_MARKET: &str = include_str!("../markets/commons.json");

/// Known pool configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigNames {
    Commons,
    Bend,
}

impl ConfigNames {
    pub const ALL: [ConfigNames; 2] = [ConfigNames::Commons, ConfigNames::Bend];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Commons => "Commons",
            Self::Bend => "Bend",
        }
    }

    fn source(&self) -> &'static str {
        match self {
            Self::Commons => COMMONS_MARKET,
            Self::Bend => BEND_MARKET,
        }
    }
}

impl FromStr for ConfigNames {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::UnknownPool(s.to_string()))
    }
}

impl fmt::Display for ConfigNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Networks a pool configuration can carry parameters for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Hardhat,
    Localhost,
    Coverage,
    Develop,
    Rinkeby,
    Goerli,
    Main,
}

impl Network {
    pub const ALL: [Network; 7] = [
        Network::Hardhat,
        Network::Localhost,
        Network::Coverage,
        Network::Develop,
        Network::Rinkeby,
        Network::Goerli,
        Network::Main,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Hardhat => "hardhat",
            Self::Localhost => "localhost",
            Self::Coverage => "coverage",
            Self::Develop => "develop",
            Self::Rinkeby => "rinkeby",
            Self::Goerli => "goerli",
            Self::Main => "main",
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|n| n.name() == s)
            .ok_or_else(|| Error::UnknownNetwork(s.to_string()))
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A reserve or NFT asset listed in a pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetEntry {
    pub symbol: String,
    pub address: Address,
}

/// Name/symbol prefixes for the test doubles deployed by the builder
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockParams {
    pub b_nft_name_prefix: String,
    pub b_nft_symbol_prefix: String,
}

/// Static description of one pool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    #[serde(skip, default = "default_pool_name")]
    pub name: ConfigNames,
    pub market_id: String,
    pub provider_id: u64,
    /// Index into the signer list for the pool admin role
    pub pool_admin_index: usize,
    /// Index into the signer list for the emergency admin role
    pub emergency_admin_index: usize,
    pub mocks: MockParams,
    /// Empty string means "not deployed on this network"
    pub provider_registry: BTreeMap<Network, String>,
    #[serde(default)]
    pub reserve_assets: BTreeMap<Network, Vec<AssetEntry>>,
    #[serde(default)]
    pub nfts_assets: BTreeMap<Network, Vec<AssetEntry>>,
}

fn default_pool_name() -> ConfigNames {
    ConfigNames::Commons
}

impl PoolConfig {
    /// Look up a per-network parameter, failing if the network has no entry
    pub fn param_for_network<'a, T>(
        &self,
        param: &'static str,
        values: &'a BTreeMap<Network, T>,
        network: Network,
    ) -> Result<&'a T> {
        values.get(&network).ok_or_else(|| Error::MissingNetworkParam {
            pool: self.name.to_string(),
            param,
            network: network.to_string(),
        })
    }

    /// Registry address for a network; `None` when the entry is left empty
    pub fn provider_registry(&self, network: Network) -> Result<Option<Address>> {
        let raw = self.param_for_network("providerRegistry", &self.provider_registry, network)?;
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let address: Address = raw.parse().map_err(|e| {
            Error::InvalidConfig(format!(
                "{} providerRegistry for {}: {}",
                self.name, network, e
            ))
        })?;
        Ok(Some(address))
    }

    pub fn reserve_assets(&self, network: Network) -> Result<&[AssetEntry]> {
        self.param_for_network("reserveAssets", &self.reserve_assets, network)
            .map(Vec::as_slice)
    }

    pub fn nfts_assets(&self, network: Network) -> Result<&[AssetEntry]> {
        self.param_for_network("nftsAssets", &self.nfts_assets, network)
            .map(Vec::as_slice)
    }
}

/// Load one of the known pool configurations
pub fn load_pool_config(name: ConfigNames) -> Result<PoolConfig> {
    let mut config: PoolConfig = serde_json::from_str(name.source())
        .map_err(|e| Error::InvalidConfig(format!("{}: {}", name, e)))?;
    config.name = name;
    Ok(config)
}

/// Resolve a pool identifier string and load its configuration
pub fn load_pool_config_by_name(pool: &str) -> Result<PoolConfig> {
    load_pool_config(pool.parse()?)
}
