//! In-memory protocol for tests
//!
//! [`MockProtocol`] implements every capability trait against shared state,
//! hands out sequential contract addresses and records each call in order so
//! tests can assert on sequencing. A method can be made to fail with
//! [`MockProtocol::fail_on`].

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::SolValue;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::artifacts::{ContractId, LinkedLibraries};
use crate::error::{Error, Result};
use crate::protocol::{
    BnftRegistry, ContractDeployer, LendPoolLimits, LendPoolView, NftConfiguration,
    NftTokenData, ProtocolConnector, ProtocolDataProvider, ProtocolProvider, ProtocolRegistry,
    ReserveConfiguration, ReserveTokenData,
};

const FIRST_MOCK_ADDRESS: u64 = 0x1000;

/// One observed interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Deploy {
        contract: ContractId,
        libraries: Vec<String>,
    },
    Call {
        target: Address,
        method: &'static str,
    },
}

impl MockCall {
    /// Contract method name, or `deploy:<ContractId>` for deployments
    pub fn label(&self) -> String {
        match self {
            Self::Deploy { contract, .. } => format!("deploy:{}", contract),
            Self::Call { method, .. } => method.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    next_address: u64,
    deployed: HashMap<ContractId, Address>,
    /// registry -> registered providers, in registration order
    registries: HashMap<Address, Vec<Address>>,
    /// provider -> market id
    market_ids: HashMap<Address, String>,
    /// (provider, getter) -> address
    provider_slots: HashMap<(Address, &'static str), Address>,
    owners: HashMap<Address, Address>,
    reserves: HashMap<Address, (ReserveConfiguration, ReserveTokenData)>,
    nfts: HashMap<Address, (NftConfiguration, NftTokenData)>,
    limits: LendPoolLimits,
    /// contract -> libraries its bytecode links against
    link_references: HashMap<ContractId, Vec<String>>,
    fail_on: Option<&'static str>,
}

impl MockState {
    fn allocate(&mut self) -> Address {
        if self.next_address == 0 {
            self.next_address = FIRST_MOCK_ADDRESS;
        }
        let address = Address::left_padding_from(&self.next_address.to_be_bytes());
        self.next_address += 1;
        address
    }

    fn record(&mut self, target: Address, method: &'static str) -> Result<()> {
        self.calls.push(MockCall::Call { target, method });
        self.check(method)
    }

    fn check(&self, method: &'static str) -> Result<()> {
        if self.fail_on == Some(method) {
            return Err(Error::Rpc {
                method,
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn slot(&self, provider: Address, getter: &'static str) -> Address {
        self.provider_slots
            .get(&(provider, getter))
            .copied()
            .unwrap_or(Address::ZERO)
    }
}

/// Shared in-memory chain
#[derive(Debug, Clone)]
pub struct MockProtocol {
    deployer: Address,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockProtocol {
    fn default() -> Self {
        Self::new(Address::repeat_byte(0xd0))
    }
}

impl MockProtocol {
    pub fn new(deployer: Address) -> Self {
        Self {
            deployer,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, address: Address) -> MockContract {
        MockContract {
            address,
            state: Arc::clone(&self.state),
        }
    }

    /// Every call observed so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    /// Labels of every call observed so far, in order
    pub fn call_labels(&self) -> Vec<String> {
        self.state().calls.iter().map(MockCall::label).collect()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Make every subsequent call to `method` fail
    pub fn fail_on(&self, method: &'static str) {
        self.state().fail_on = Some(method);
    }

    /// Latest deployment of `contract`, if any
    pub fn deployed(&self, contract: ContractId) -> Option<Address> {
        self.state().deployed.get(&contract).copied()
    }

    pub fn owner_of(&self, contract: Address) -> Option<Address> {
        self.state().owners.get(&contract).copied()
    }

    /// Declare the libraries `contract` links against. Deploying it without
    /// all of them fails like an unlinked artifact would.
    pub fn set_library_dependencies(&self, contract: ContractId, libraries: &[&str]) {
        self.state().link_references.insert(
            contract,
            libraries.iter().map(|name| name.to_string()).collect(),
        );
    }

    // ------------------------------------------------------------------------
    // Seeding for read-only scenarios
    // ------------------------------------------------------------------------

    /// Create a registry with the given providers already registered
    pub fn add_registry(&self, providers: &[Address]) -> Address {
        let mut state = self.state();
        let address = state.allocate();
        state.registries.insert(address, providers.to_vec());
        address
    }

    /// Create an addresses provider whose every getter points at a fresh
    /// address, as on a fully deployed market
    pub fn add_provider(&self, market_id: &str) -> Address {
        let mut state = self.state();
        let provider = state.allocate();
        state.market_ids.insert(provider, market_id.to_string());
        for getter in PROVIDER_GETTERS {
            let address = state.allocate();
            state.provider_slots.insert((provider, getter), address);
        }
        provider
    }

    /// Address a provider getter currently returns
    pub fn provider_slot(&self, provider: Address, getter: &'static str) -> Address {
        self.state().slot(provider, getter)
    }

    pub fn set_reserve(
        &self,
        asset: Address,
        config: ReserveConfiguration,
        tokens: ReserveTokenData,
    ) {
        self.state().reserves.insert(asset, (config, tokens));
    }

    pub fn set_nft(&self, asset: Address, config: NftConfiguration, tokens: NftTokenData) {
        self.state().nfts.insert(asset, (config, tokens));
    }

    pub fn set_lend_pool_limits(&self, limits: LendPoolLimits) {
        self.state().limits = limits;
    }
}

const PROVIDER_GETTERS: [&str; 13] = [
    "getPoolAdmin",
    "getEmergencyAdmin",
    "getLendPool",
    "getLendPoolLoan",
    "getLendPoolConfigurator",
    "getLendPoolLiquidator",
    "getReserveOracle",
    "getNFTOracle",
    "getBNFTRegistry",
    "getIncentivesController",
    "getBendDataProvider",
    "getUIDataProvider",
    "getWalletBalanceProvider",
];

#[async_trait]
impl ContractDeployer for MockProtocol {
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
        let mut state = self.state();
        state.calls.push(MockCall::Deploy {
            contract,
            libraries: libraries.keys().cloned().collect(),
        });
        state.check("deploy")?;

        if let Some(missing) = state
            .link_references
            .get(&contract)
            .and_then(|deps| deps.iter().find(|dep| !libraries.contains_key(*dep)))
        {
            return Err(Error::Artifact {
                contract: contract.artifact_name().to_string(),
                reason: format!("unlinked library {}", missing),
            });
        }

        let address = state.allocate();
        state.deployed.insert(contract, address);

        match contract {
            ContractId::LendPoolAddressesProviderRegistry => {
                state.registries.insert(address, Vec::new());
            }
            ContractId::LendPoolAddressesProvider => {
                let market_id = <(String,)>::abi_decode_params(&constructor_args, true)
                    .map(|(id,)| id)
                    .map_err(|e| Error::rpc("deploy", e))?;
                state.market_ids.insert(address, market_id);
            }
            ContractId::BnftRegistry => {
                state.owners.insert(address, self.deployer);
            }
            _ => {}
        }
        Ok(address)
    }

    fn library_dependencies(&self, contract: ContractId) -> Result<Vec<String>> {
        Ok(self
            .state()
            .link_references
            .get(&contract)
            .cloned()
            .unwrap_or_default())
    }
}

impl ProtocolConnector for MockProtocol {
    type Registry = MockContract;
    type Provider = MockContract;
    type DataProvider = MockContract;
    type LendPool = MockContract;
    type BnftRegistry = MockContract;

    fn registry(&self, address: Address) -> MockContract {
        self.handle(address)
    }

    fn provider(&self, address: Address) -> MockContract {
        self.handle(address)
    }

    fn data_provider(&self, address: Address) -> MockContract {
        self.handle(address)
    }

    fn lend_pool(&self, address: Address) -> MockContract {
        self.handle(address)
    }

    fn bnft_registry(&self, address: Address) -> MockContract {
        self.handle(address)
    }
}

/// Handle to one mock contract; implements every capability
#[derive(Debug, Clone)]
pub struct MockContract {
    address: Address,
    state: Arc<Mutex<MockState>>,
}

impl MockContract {
    pub fn address(&self) -> Address {
        self.address
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, getter: &'static str) -> Result<Address> {
        let mut state = self.state();
        state.record(self.address, getter)?;
        Ok(state.slot(self.address, getter))
    }

    fn set(&self, setter: &'static str, getter: &'static str, value: Address) -> Result<()> {
        let mut state = self.state();
        state.record(self.address, setter)?;
        state.provider_slots.insert((self.address, getter), value);
        Ok(())
    }
}

#[async_trait]
impl ProtocolRegistry for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn addresses_providers_list(&self) -> Result<Vec<Address>> {
        let mut state = self.state();
        state.record(self.address, "getAddressesProvidersList")?;
        Ok(state
            .registries
            .get(&self.address)
            .cloned()
            .unwrap_or_default())
    }

    async fn register_addresses_provider(&self, provider: Address, _id: U256) -> Result<()> {
        let mut state = self.state();
        state.record(self.address, "registerAddressesProvider")?;
        let providers = state.registries.entry(self.address).or_default();
        if !providers.contains(&provider) {
            providers.push(provider);
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolProvider for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn market_id(&self) -> Result<String> {
        let mut state = self.state();
        state.record(self.address, "getMarketId")?;
        Ok(state
            .market_ids
            .get(&self.address)
            .cloned()
            .unwrap_or_default())
    }

    async fn pool_admin(&self) -> Result<Address> {
        self.get("getPoolAdmin")
    }

    async fn emergency_admin(&self) -> Result<Address> {
        self.get("getEmergencyAdmin")
    }

    async fn lend_pool(&self) -> Result<Address> {
        self.get("getLendPool")
    }

    async fn lend_pool_loan(&self) -> Result<Address> {
        self.get("getLendPoolLoan")
    }

    async fn lend_pool_configurator(&self) -> Result<Address> {
        self.get("getLendPoolConfigurator")
    }

    async fn lend_pool_liquidator(&self) -> Result<Address> {
        self.get("getLendPoolLiquidator")
    }

    async fn reserve_oracle(&self) -> Result<Address> {
        self.get("getReserveOracle")
    }

    async fn nft_oracle(&self) -> Result<Address> {
        self.get("getNFTOracle")
    }

    async fn bnft_registry(&self) -> Result<Address> {
        self.get("getBNFTRegistry")
    }

    async fn incentives_controller(&self) -> Result<Address> {
        self.get("getIncentivesController")
    }

    async fn bend_data_provider(&self) -> Result<Address> {
        self.get("getBendDataProvider")
    }

    async fn ui_data_provider(&self) -> Result<Address> {
        self.get("getUIDataProvider")
    }

    async fn wallet_balance_provider(&self) -> Result<Address> {
        self.get("getWalletBalanceProvider")
    }

    async fn set_pool_admin(&self, admin: Address) -> Result<()> {
        self.set("setPoolAdmin", "getPoolAdmin", admin)
    }

    async fn set_emergency_admin(&self, admin: Address) -> Result<()> {
        self.set("setEmergencyAdmin", "getEmergencyAdmin", admin)
    }

    async fn set_bnft_registry(&self, registry: Address) -> Result<()> {
        self.set("setBNFTRegistry", "getBNFTRegistry", registry)
    }

    async fn set_incentives_controller(&self, controller: Address) -> Result<()> {
        self.set("setIncentivesController", "getIncentivesController", controller)
    }

    /// The first registration creates the proxy; later ones upgrade it in place
    async fn set_lend_pool_impl(&self, _implementation: Address, _init_data: Bytes) -> Result<()> {
        let mut state = self.state();
        state.record(self.address, "setLendPoolImpl")?;
        if state.slot(self.address, "getLendPool") == Address::ZERO {
            let proxy = state.allocate();
            state
                .provider_slots
                .insert((self.address, "getLendPool"), proxy);
        }
        Ok(())
    }
}

#[async_trait]
impl ProtocolDataProvider for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn reserve_configuration(&self, asset: Address) -> Result<ReserveConfiguration> {
        let mut state = self.state();
        state.record(self.address, "getReserveConfigurationData")?;
        Ok(state
            .reserves
            .get(&asset)
            .map(|(config, _)| config.clone())
            .unwrap_or_default())
    }

    async fn reserve_token_data(&self, asset: Address) -> Result<ReserveTokenData> {
        let mut state = self.state();
        state.record(self.address, "getReserveTokenData")?;
        Ok(state
            .reserves
            .get(&asset)
            .map(|(_, tokens)| tokens.clone())
            .unwrap_or_default())
    }

    async fn nft_configuration(&self, asset: Address) -> Result<NftConfiguration> {
        let mut state = self.state();
        state.record(self.address, "getNftConfigurationData")?;
        Ok(state
            .nfts
            .get(&asset)
            .map(|(config, _)| config.clone())
            .unwrap_or_default())
    }

    async fn nft_token_data(&self, asset: Address) -> Result<NftTokenData> {
        let mut state = self.state();
        state.record(self.address, "getNftTokenData")?;
        Ok(state
            .nfts
            .get(&asset)
            .map(|(_, tokens)| tokens.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl LendPoolView for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn max_number_reserves(&self) -> Result<U256> {
        let mut state = self.state();
        state.record(self.address, "MAX_NUMBER_RESERVES")?;
        Ok(state.limits.max_number_reserves)
    }

    async fn max_number_nfts(&self) -> Result<U256> {
        let mut state = self.state();
        state.record(self.address, "MAX_NUMBER_NFTS")?;
        Ok(state.limits.max_number_nfts)
    }

    async fn paused(&self) -> Result<bool> {
        let mut state = self.state();
        state.record(self.address, "paused")?;
        Ok(state.limits.paused)
    }
}

#[async_trait]
impl BnftRegistry for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn transfer_ownership(&self, new_owner: Address) -> Result<()> {
        let mut state = self.state();
        state.record(self.address, "transferOwnership")?;
        state.owners.insert(self.address, new_owner);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequential_addresses() {
        let mock = MockProtocol::default();
        let a = mock.deploy(ContractId::Bnft, Bytes::new()).await.unwrap();
        let b = mock
            .deploy(ContractId::BnftRegistryImpl, Bytes::new())
            .await
            .unwrap();
        assert_ne!(a, b);
        assert_ne!(a, Address::ZERO);
        assert_eq!(mock.deployed(ContractId::Bnft), Some(a));
    }

    #[tokio::test]
    async fn test_provider_market_id_from_constructor() {
        let mock = MockProtocol::default();
        let args = ("Bend genesis market".to_string(),).abi_encode_params();
        let provider = mock
            .deploy(ContractId::LendPoolAddressesProvider, args.into())
            .await
            .unwrap();

        let handle = mock.provider(provider);
        assert_eq!(handle.market_id().await.unwrap(), "Bend genesis market");
        assert_eq!(handle.lend_pool().await.unwrap(), Address::ZERO);
    }

    #[tokio::test]
    async fn test_set_lend_pool_impl_creates_proxy_once() {
        let mock = MockProtocol::default();
        let provider = mock.provider(Address::repeat_byte(0x42));

        provider
            .set_lend_pool_impl(Address::repeat_byte(1), Bytes::new())
            .await
            .unwrap();
        let proxy = provider.lend_pool().await.unwrap();
        assert_ne!(proxy, Address::ZERO);

        provider
            .set_lend_pool_impl(Address::repeat_byte(2), Bytes::new())
            .await
            .unwrap();
        assert_eq!(provider.lend_pool().await.unwrap(), proxy);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let mock = MockProtocol::default();
        let registry = mock.registry(mock.add_registry(&[]));
        mock.fail_on("getAddressesProvidersList");

        let err = registry.addresses_providers_list().await.unwrap_err();
        assert!(err.to_string().contains("injected failure"));
        assert_eq!(mock.call_labels(), vec!["getAddressesProvidersList"]);
    }
}
