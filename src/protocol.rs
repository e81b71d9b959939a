//! Protocol capabilities
//!
//! Each on-chain contract the orchestration touches is reached through one of
//! the traits below. [`crate::evm::EvmProtocol`] implements them over JSON-RPC;
//! `crate::testing::MockProtocol` implements them in memory.

use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

use crate::artifacts::{ContractId, LinkedLibraries};
use crate::error::Result;

// ============================================================================
// Read-only snapshots
// ============================================================================

/// `getReserveConfigurationData` result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReserveConfiguration {
    pub decimals: U256,
    pub reserve_factor: U256,
    pub borrowing_enabled: bool,
    pub is_active: bool,
    pub is_frozen: bool,
}

impl ReserveConfiguration {
    pub const FIELDS: [&'static str; 5] = [
        "decimals",
        "reserveFactor",
        "borrowingEnabled",
        "isActive",
        "isFrozen",
    ];

    /// Field values rendered for display, in [`Self::FIELDS`] order
    pub fn values(&self) -> [String; 5] {
        [
            self.decimals.to_string(),
            self.reserve_factor.to_string(),
            self.borrowing_enabled.to_string(),
            self.is_active.to_string(),
            self.is_frozen.to_string(),
        ]
    }
}

/// `getReserveTokenData` result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReserveTokenData {
    pub token_symbol: String,
    pub token_address: Address,
    pub b_token_symbol: String,
    pub b_token_address: Address,
    pub debt_token_symbol: String,
    pub debt_token_address: Address,
}

impl ReserveTokenData {
    pub const FIELDS: [&'static str; 4] = [
        "bTokenSymbol",
        "bTokenAddress",
        "debtTokenSymbol",
        "debtTokenAddress",
    ];

    pub fn values(&self) -> [String; 4] {
        [
            self.b_token_symbol.clone(),
            self.b_token_address.to_string(),
            self.debt_token_symbol.clone(),
            self.debt_token_address.to_string(),
        ]
    }
}

/// `getNftConfigurationData` result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftConfiguration {
    pub ltv: U256,
    pub liquidation_threshold: U256,
    pub liquidation_bonus: U256,
    pub redeem_duration: U256,
    pub auction_duration: U256,
    pub redeem_fine: U256,
    pub is_active: bool,
    pub is_frozen: bool,
}

impl NftConfiguration {
    pub const FIELDS: [&'static str; 8] = [
        "ltv",
        "liquidationThreshold",
        "liquidationBonus",
        "redeemDuration",
        "auctionDuration",
        "redeemFine",
        "isActive",
        "isFrozen",
    ];

    pub fn values(&self) -> [String; 8] {
        [
            self.ltv.to_string(),
            self.liquidation_threshold.to_string(),
            self.liquidation_bonus.to_string(),
            self.redeem_duration.to_string(),
            self.auction_duration.to_string(),
            self.redeem_fine.to_string(),
            self.is_active.to_string(),
            self.is_frozen.to_string(),
        ]
    }
}

/// `getNftTokenData` result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NftTokenData {
    pub nft_symbol: String,
    pub nft_address: Address,
    pub b_nft_symbol: String,
    pub b_nft_address: Address,
}

impl NftTokenData {
    pub const FIELDS: [&'static str; 2] = ["bNftSymbol", "bNftAddress"];

    pub fn values(&self) -> [String; 2] {
        [self.b_nft_symbol.clone(), self.b_nft_address.to_string()]
    }
}

/// Global limits and pause flag of a lend pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LendPoolLimits {
    pub max_number_reserves: U256,
    pub max_number_nfts: U256,
    pub paused: bool,
}

// ============================================================================
// Capabilities
// ============================================================================

/// Registry of addresses providers (one per market)
#[async_trait]
pub trait ProtocolRegistry: Send + Sync {
    fn address(&self) -> Address;

    async fn addresses_providers_list(&self) -> Result<Vec<Address>>;

    async fn register_addresses_provider(&self, provider: Address, id: U256) -> Result<()>;
}

/// Per-market addresses provider: the directory of every protocol contract
#[async_trait]
pub trait ProtocolProvider: Send + Sync {
    fn address(&self) -> Address;

    async fn market_id(&self) -> Result<String>;
    async fn pool_admin(&self) -> Result<Address>;
    async fn emergency_admin(&self) -> Result<Address>;
    async fn lend_pool(&self) -> Result<Address>;
    async fn lend_pool_loan(&self) -> Result<Address>;
    async fn lend_pool_configurator(&self) -> Result<Address>;
    async fn lend_pool_liquidator(&self) -> Result<Address>;
    async fn reserve_oracle(&self) -> Result<Address>;
    async fn nft_oracle(&self) -> Result<Address>;
    async fn bnft_registry(&self) -> Result<Address>;
    async fn incentives_controller(&self) -> Result<Address>;
    async fn bend_data_provider(&self) -> Result<Address>;
    async fn ui_data_provider(&self) -> Result<Address>;
    async fn wallet_balance_provider(&self) -> Result<Address>;

    async fn set_pool_admin(&self, admin: Address) -> Result<()>;
    async fn set_emergency_admin(&self, admin: Address) -> Result<()>;
    async fn set_bnft_registry(&self, registry: Address) -> Result<()>;
    async fn set_incentives_controller(&self, controller: Address) -> Result<()>;

    /// Register a lend pool implementation. The provider creates (or upgrades)
    /// the proxy and calls it with `init_data` if non-empty.
    async fn set_lend_pool_impl(&self, implementation: Address, init_data: Bytes) -> Result<()>;
}

/// Read-only aggregator over reserve and NFT parameters
#[async_trait]
pub trait ProtocolDataProvider: Send + Sync {
    fn address(&self) -> Address;

    async fn reserve_configuration(&self, asset: Address) -> Result<ReserveConfiguration>;
    async fn reserve_token_data(&self, asset: Address) -> Result<ReserveTokenData>;
    async fn nft_configuration(&self, asset: Address) -> Result<NftConfiguration>;
    async fn nft_token_data(&self, asset: Address) -> Result<NftTokenData>;
}

#[async_trait]
pub trait LendPoolView: Send + Sync {
    fn address(&self) -> Address;

    async fn max_number_reserves(&self) -> Result<U256>;
    async fn max_number_nfts(&self) -> Result<U256>;
    async fn paused(&self) -> Result<bool>;

    async fn limits(&self) -> Result<LendPoolLimits> {
        Ok(LendPoolLimits {
            max_number_reserves: self.max_number_reserves().await?,
            max_number_nfts: self.max_number_nfts().await?,
            paused: self.paused().await?,
        })
    }
}

#[async_trait]
pub trait BnftRegistry: Send + Sync {
    fn address(&self) -> Address;

    async fn transfer_ownership(&self, new_owner: Address) -> Result<()>;
}

/// Creates contracts from compiled artifacts
#[async_trait]
pub trait ContractDeployer: Send + Sync {
    /// Account that signs deployments
    fn deployer(&self) -> Address;

    /// Deploy `contract` with ABI-encoded constructor arguments
    async fn deploy(&self, contract: ContractId, constructor_args: Bytes) -> Result<Address>;

    /// Deploy `contract` after linking its bytecode against `libraries`
    async fn deploy_linked(
        &self,
        contract: ContractId,
        constructor_args: Bytes,
        libraries: &LinkedLibraries,
    ) -> Result<Address>;

    /// Libraries the bytecode of `contract` must be linked against
    fn library_dependencies(&self, contract: ContractId) -> Result<Vec<String>>;
}

/// Binds contract addresses to capability handles
pub trait ProtocolConnector: ContractDeployer {
    type Registry: ProtocolRegistry;
    type Provider: ProtocolProvider;
    type DataProvider: ProtocolDataProvider;
    type LendPool: LendPoolView;
    type BnftRegistry: BnftRegistry;

    fn registry(&self, address: Address) -> Self::Registry;
    fn provider(&self, address: Address) -> Self::Provider;
    fn data_provider(&self, address: Address) -> Self::DataProvider;
    fn lend_pool(&self, address: Address) -> Self::LendPool;
    fn bnft_registry(&self, address: Address) -> Self::BnftRegistry;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_match_field_order() {
        let config = ReserveConfiguration {
            decimals: U256::from(18),
            reserve_factor: U256::from(1000),
            borrowing_enabled: true,
            is_active: true,
            is_frozen: false,
        };
        assert_eq!(
            config.values(),
            ["18", "1000", "true", "true", "false"].map(String::from)
        );

        let nft = NftConfiguration {
            ltv: U256::from(4000),
            redeem_fine: U256::from(500),
            ..Default::default()
        };
        let values = nft.values();
        assert_eq!(values[0], "4000");
        assert_eq!(values[5], "500");
        assert_eq!(values[7], "false");
    }

    #[test]
    fn test_token_data_uses_checksummed_addresses() {
        let data = NftTokenData {
            b_nft_symbol: "boundBAYC".to_string(),
            b_nft_address: "0xbc4ca0eda7647a8ab7c2061c2e118a18a936f13d"
                .parse()
                .unwrap(),
            ..Default::default()
        };
        assert_eq!(
            data.values(),
            [
                "boundBAYC".to_string(),
                "0xBC4CA0EdA7647A8aB7C2061c2E118A18a936f13D".to_string()
            ]
        );
    }
}
