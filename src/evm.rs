//! JSON-RPC implementation of the protocol capabilities
//!
//! Uses Alloy's `ProviderBuilder::with_recommended_fillers()` plus a local
//! wallet, so nonce, gas and fees are filled automatically and every
//! transaction is signed by the deployer key.
//!
//! Every state-changing call waits for its receipt; a receipt with a failed
//! status is reported as [`Error::Reverted`].

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use tracing::{debug, info};
use url::Url;

use crate::artifacts::{ArtifactStore, ContractId, LinkedLibraries};
use crate::contracts::{
    IBNFTRegistry, IBendProtocolDataProvider, ILendPool, ILendPoolAddressesProvider,
    ILendPoolAddressesProviderRegistry,
};
use crate::error::{Error, Result};
use crate::protocol::{
    BnftRegistry, ContractDeployer, LendPoolView, NftConfiguration, NftTokenData,
    ProtocolConnector, ProtocolDataProvider, ProtocolProvider, ProtocolRegistry,
    ReserveConfiguration, ReserveTokenData,
};

/// Build a signer from a raw 32-byte key
pub fn signer_from_key(key: &B256) -> Result<PrivateKeySigner> {
    PrivateKeySigner::from_bytes(key)
        .map_err(|e| Error::InvalidConfig(format!("invalid private key: {}", e)))
}

/// Connect to a node with the given deployer key
pub fn connect(
    rpc_url: &Url,
    deployer_key: &B256,
    artifacts: ArtifactStore,
) -> Result<EvmProtocol<impl Provider<Http<Client>> + Clone>> {
    let signer = signer_from_key(deployer_key)?;
    let deployer = signer.address();

    let provider = ProviderBuilder::new()
        .with_recommended_fillers()
        .wallet(EthereumWallet::from(signer))
        .on_http(rpc_url.clone());

    info!(rpc_url = %rpc_url, deployer = %deployer, "EVM client initialized");

    Ok(EvmProtocol {
        provider,
        deployer,
        artifacts,
    })
}

/// Chain identity reported by the `status` command
#[derive(Debug, Clone, Copy)]
pub struct NodeStatus {
    pub chain_id: u64,
    pub block_number: u64,
    pub deployer_balance: U256,
}

/// Signing connection to one node
#[derive(Clone)]
pub struct EvmProtocol<P> {
    provider: P,
    deployer: Address,
    artifacts: ArtifactStore,
}

impl<P> EvmProtocol<P>
where
    P: Provider<Http<Client>> + Clone,
{
    pub async fn node_status(&self) -> Result<NodeStatus> {
        let chain_id = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| Error::rpc("eth_chainId", e))?;
        let block_number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| Error::rpc("eth_blockNumber", e))?;
        let deployer_balance = self
            .provider
            .get_balance(self.deployer)
            .await
            .map_err(|e| Error::rpc("eth_getBalance", e))?;

        Ok(NodeStatus {
            chain_id,
            block_number,
            deployer_balance,
        })
    }

    /// True if there is contract code at `address`
    pub async fn has_code(&self, address: Address) -> Result<bool> {
        let code = self
            .provider
            .get_code_at(address)
            .await
            .map_err(|e| Error::rpc("eth_getCode", e))?;
        Ok(!code.is_empty())
    }

    async fn deploy_code(
        &self,
        contract: ContractId,
        code: Bytes,
        constructor_args: Bytes,
    ) -> Result<Address> {
        let mut init_code = code.to_vec();
        init_code.extend_from_slice(&constructor_args);

        let tx = TransactionRequest::default().with_deploy_code(init_code);
        let receipt = send_and_confirm(&self.provider, "deploy", tx).await?;

        let address = receipt
            .contract_address
            .ok_or_else(|| Error::MissingContractAddress {
                contract: contract.name().to_string(),
                tx_hash: receipt.transaction_hash,
            })?;

        info!(
            contract = %contract,
            address = %address,
            tx_hash = %receipt.transaction_hash,
            "Contract deployed"
        );
        Ok(address)
    }
}

async fn send_and_confirm<P>(
    provider: &P,
    method: &'static str,
    tx: TransactionRequest,
) -> Result<TransactionReceipt>
where
    P: Provider<Http<Client>>,
{
    let pending = provider
        .send_transaction(tx)
        .await
        .map_err(|e| Error::rpc(method, e))?;

    let tx_hash = *pending.tx_hash();
    debug!(method, tx_hash = %tx_hash, "Transaction sent");

    let receipt = pending
        .get_receipt()
        .await
        .map_err(|e| Error::rpc(method, e))?;

    if !receipt.status() {
        return Err(Error::Reverted { method, tx_hash });
    }
    Ok(receipt)
}

#[async_trait]
impl<P> ContractDeployer for EvmProtocol<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn deployer(&self) -> Address {
        self.deployer
    }

    async fn deploy(&self, contract: ContractId, constructor_args: Bytes) -> Result<Address> {
        self.deploy_linked(contract, constructor_args, &LinkedLibraries::new())
            .await
    }

    async fn deploy_linked(
        &self,
        contract: ContractId,
        constructor_args: Bytes,
        libraries: &LinkedLibraries,
    ) -> Result<Address> {
        let artifact = self.artifacts.load(contract)?;
        let code = artifact.linked_bytecode(libraries)?;
        self.deploy_code(contract, code, constructor_args).await
    }

    fn library_dependencies(&self, contract: ContractId) -> Result<Vec<String>> {
        Ok(self.artifacts.load(contract)?.library_names())
    }
}

impl<P> ProtocolConnector for EvmProtocol<P>
where
    P: Provider<Http<Client>> + Clone,
{
    type Registry = EvmRegistry<P>;
    type Provider = EvmAddressesProvider<P>;
    type DataProvider = EvmDataProvider<P>;
    type LendPool = EvmLendPool<P>;
    type BnftRegistry = EvmBnftRegistry<P>;

    fn registry(&self, address: Address) -> Self::Registry {
        EvmRegistry {
            address,
            provider: self.provider.clone(),
        }
    }

    fn provider(&self, address: Address) -> Self::Provider {
        EvmAddressesProvider {
            address,
            provider: self.provider.clone(),
        }
    }

    fn data_provider(&self, address: Address) -> Self::DataProvider {
        EvmDataProvider {
            address,
            provider: self.provider.clone(),
        }
    }

    fn lend_pool(&self, address: Address) -> Self::LendPool {
        EvmLendPool {
            address,
            provider: self.provider.clone(),
        }
    }

    fn bnft_registry(&self, address: Address) -> Self::BnftRegistry {
        EvmBnftRegistry {
            address,
            provider: self.provider.clone(),
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct EvmRegistry<P> {
    address: Address,
    provider: P,
}

#[async_trait]
impl<P> ProtocolRegistry for EvmRegistry<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn addresses_providers_list(&self) -> Result<Vec<Address>> {
        let contract = ILendPoolAddressesProviderRegistry::new(self.address, &self.provider);
        let list = contract
            .getAddressesProvidersList()
            .call()
            .await
            .map_err(|e| Error::rpc("getAddressesProvidersList", e))?;
        Ok(list._0)
    }

    async fn register_addresses_provider(&self, provider: Address, id: U256) -> Result<()> {
        let contract = ILendPoolAddressesProviderRegistry::new(self.address, &self.provider);
        let tx = contract
            .registerAddressesProvider(provider, id)
            .into_transaction_request();
        send_and_confirm(&self.provider, "registerAddressesProvider", tx).await?;
        Ok(())
    }
}

// ============================================================================
// Addresses provider
// ============================================================================

pub struct EvmAddressesProvider<P> {
    address: Address,
    provider: P,
}

impl<P> EvmAddressesProvider<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn contract(
        &self,
    ) -> ILendPoolAddressesProvider::ILendPoolAddressesProviderInstance<Http<Client>, &P> {
        ILendPoolAddressesProvider::new(self.address, &self.provider)
    }

    async fn set(&self, method: &'static str, tx: TransactionRequest) -> Result<()> {
        send_and_confirm(&self.provider, method, tx).await?;
        debug!(provider = %self.address, method, "Addresses provider updated");
        Ok(())
    }
}

#[async_trait]
impl<P> ProtocolProvider for EvmAddressesProvider<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn market_id(&self) -> Result<String> {
        let ret = self
            .contract()
            .getMarketId()
            .call()
            .await
            .map_err(|e| Error::rpc("getMarketId", e))?;
        Ok(ret._0)
    }

    async fn pool_admin(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getPoolAdmin()
            .call()
            .await
            .map_err(|e| Error::rpc("getPoolAdmin", e))?;
        Ok(ret._0)
    }

    async fn emergency_admin(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getEmergencyAdmin()
            .call()
            .await
            .map_err(|e| Error::rpc("getEmergencyAdmin", e))?;
        Ok(ret._0)
    }

    async fn lend_pool(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getLendPool()
            .call()
            .await
            .map_err(|e| Error::rpc("getLendPool", e))?;
        Ok(ret._0)
    }

    async fn lend_pool_loan(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getLendPoolLoan()
            .call()
            .await
            .map_err(|e| Error::rpc("getLendPoolLoan", e))?;
        Ok(ret._0)
    }

    async fn lend_pool_configurator(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getLendPoolConfigurator()
            .call()
            .await
            .map_err(|e| Error::rpc("getLendPoolConfigurator", e))?;
        Ok(ret._0)
    }

    async fn lend_pool_liquidator(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getLendPoolLiquidator()
            .call()
            .await
            .map_err(|e| Error::rpc("getLendPoolLiquidator", e))?;
        Ok(ret._0)
    }

    async fn reserve_oracle(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getReserveOracle()
            .call()
            .await
            .map_err(|e| Error::rpc("getReserveOracle", e))?;
        Ok(ret._0)
    }

    async fn nft_oracle(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getNFTOracle()
            .call()
            .await
            .map_err(|e| Error::rpc("getNFTOracle", e))?;
        Ok(ret._0)
    }

    async fn bnft_registry(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getBNFTRegistry()
            .call()
            .await
            .map_err(|e| Error::rpc("getBNFTRegistry", e))?;
        Ok(ret._0)
    }

    async fn incentives_controller(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getIncentivesController()
            .call()
            .await
            .map_err(|e| Error::rpc("getIncentivesController", e))?;
        Ok(ret._0)
    }

    async fn bend_data_provider(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getBendDataProvider()
            .call()
            .await
            .map_err(|e| Error::rpc("getBendDataProvider", e))?;
        Ok(ret._0)
    }

    async fn ui_data_provider(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getUIDataProvider()
            .call()
            .await
            .map_err(|e| Error::rpc("getUIDataProvider", e))?;
        Ok(ret._0)
    }

    async fn wallet_balance_provider(&self) -> Result<Address> {
        let ret = self
            .contract()
            .getWalletBalanceProvider()
            .call()
            .await
            .map_err(|e| Error::rpc("getWalletBalanceProvider", e))?;
        Ok(ret._0)
    }

    async fn set_pool_admin(&self, admin: Address) -> Result<()> {
        let tx = self.contract().setPoolAdmin(admin).into_transaction_request();
        self.set("setPoolAdmin", tx).await
    }

    async fn set_emergency_admin(&self, admin: Address) -> Result<()> {
        let tx = self
            .contract()
            .setEmergencyAdmin(admin)
            .into_transaction_request();
        self.set("setEmergencyAdmin", tx).await
    }

    async fn set_bnft_registry(&self, registry: Address) -> Result<()> {
        let tx = self
            .contract()
            .setBNFTRegistry(registry)
            .into_transaction_request();
        self.set("setBNFTRegistry", tx).await
    }

    async fn set_incentives_controller(&self, controller: Address) -> Result<()> {
        let tx = self
            .contract()
            .setIncentivesController(controller)
            .into_transaction_request();
        self.set("setIncentivesController", tx).await
    }

    async fn set_lend_pool_impl(&self, implementation: Address, init_data: Bytes) -> Result<()> {
        let tx = self
            .contract()
            .setLendPoolImpl(implementation, init_data)
            .into_transaction_request();
        self.set("setLendPoolImpl", tx).await
    }
}

// ============================================================================
// Data provider
// ============================================================================

pub struct EvmDataProvider<P> {
    address: Address,
    provider: P,
}

impl From<IBendProtocolDataProvider::ReserveTokenData> for ReserveTokenData {
    fn from(data: IBendProtocolDataProvider::ReserveTokenData) -> Self {
        Self {
            token_symbol: data.tokenSymbol,
            token_address: data.tokenAddress,
            b_token_symbol: data.bTokenSymbol,
            b_token_address: data.bTokenAddress,
            debt_token_symbol: data.debtTokenSymbol,
            debt_token_address: data.debtTokenAddress,
        }
    }
}

impl From<IBendProtocolDataProvider::NftTokenData> for NftTokenData {
    fn from(data: IBendProtocolDataProvider::NftTokenData) -> Self {
        Self {
            nft_symbol: data.nftSymbol,
            nft_address: data.nftAddress,
            b_nft_symbol: data.bNftSymbol,
            b_nft_address: data.bNftAddress,
        }
    }
}

#[async_trait]
impl<P> ProtocolDataProvider for EvmDataProvider<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn reserve_configuration(&self, asset: Address) -> Result<ReserveConfiguration> {
        let contract = IBendProtocolDataProvider::new(self.address, &self.provider);
        let ret = contract
            .getReserveConfigurationData(asset)
            .call()
            .await
            .map_err(|e| Error::rpc("getReserveConfigurationData", e))?;
        Ok(ReserveConfiguration {
            decimals: ret.decimals,
            reserve_factor: ret.reserveFactor,
            borrowing_enabled: ret.borrowingEnabled,
            is_active: ret.isActive,
            is_frozen: ret.isFrozen,
        })
    }

    async fn reserve_token_data(&self, asset: Address) -> Result<ReserveTokenData> {
        let contract = IBendProtocolDataProvider::new(self.address, &self.provider);
        let ret = contract
            .getReserveTokenData(asset)
            .call()
            .await
            .map_err(|e| Error::rpc("getReserveTokenData", e))?;
        Ok(ret._0.into())
    }

    async fn nft_configuration(&self, asset: Address) -> Result<NftConfiguration> {
        let contract = IBendProtocolDataProvider::new(self.address, &self.provider);
        let ret = contract
            .getNftConfigurationData(asset)
            .call()
            .await
            .map_err(|e| Error::rpc("getNftConfigurationData", e))?;
        Ok(NftConfiguration {
            ltv: ret.ltv,
            liquidation_threshold: ret.liquidationThreshold,
            liquidation_bonus: ret.liquidationBonus,
            redeem_duration: ret.redeemDuration,
            auction_duration: ret.auctionDuration,
            redeem_fine: ret.redeemFine,
            is_active: ret.isActive,
            is_frozen: ret.isFrozen,
        })
    }

    async fn nft_token_data(&self, asset: Address) -> Result<NftTokenData> {
        let contract = IBendProtocolDataProvider::new(self.address, &self.provider);
        let ret = contract
            .getNftTokenData(asset)
            .call()
            .await
            .map_err(|e| Error::rpc("getNftTokenData", e))?;
        Ok(ret._0.into())
    }
}

// ============================================================================
// Lend pool / BNFT registry
// ============================================================================

pub struct EvmLendPool<P> {
    address: Address,
    provider: P,
}

#[async_trait]
impl<P> LendPoolView for EvmLendPool<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn max_number_reserves(&self) -> Result<U256> {
        let contract = ILendPool::new(self.address, &self.provider);
        let ret = contract
            .MAX_NUMBER_RESERVES()
            .call()
            .await
            .map_err(|e| Error::rpc("MAX_NUMBER_RESERVES", e))?;
        Ok(ret._0)
    }

    async fn max_number_nfts(&self) -> Result<U256> {
        let contract = ILendPool::new(self.address, &self.provider);
        let ret = contract
            .MAX_NUMBER_NFTS()
            .call()
            .await
            .map_err(|e| Error::rpc("MAX_NUMBER_NFTS", e))?;
        Ok(ret._0)
    }

    async fn paused(&self) -> Result<bool> {
        let contract = ILendPool::new(self.address, &self.provider);
        let ret = contract
            .paused()
            .call()
            .await
            .map_err(|e| Error::rpc("paused", e))?;
        Ok(ret._0)
    }
}

pub struct EvmBnftRegistry<P> {
    address: Address,
    provider: P,
}

#[async_trait]
impl<P> BnftRegistry for EvmBnftRegistry<P>
where
    P: Provider<Http<Client>> + Clone,
{
    fn address(&self) -> Address {
        self.address
    }

    async fn transfer_ownership(&self, new_owner: Address) -> Result<()> {
        let contract = IBNFTRegistry::new(self.address, &self.provider);
        let tx = contract
            .transferOwnership(new_owner)
            .into_transaction_request();
        send_and_confirm(&self.provider, "transferOwnership", tx).await?;
        info!(registry = %self.address, owner = %new_owner, "BNFT registry ownership transferred");
        Ok(())
    }
}
