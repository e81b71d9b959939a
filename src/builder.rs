//! Test environment builder
//!
//! Deploys the lending protocol infrastructure into an empty chain and wires
//! it together. The sequence is a hard dependency chain:
//!
//! 1. Incentives controller test double
//! 2. Proxy admin
//! 3. BNFT implementation, BNFT registry implementation and its proxy
//!    (ownership handed to the pool admin)
//! 4. Addresses provider registry and addresses provider (admins set,
//!    provider registered)
//! 5. BNFT registry and incentives controller set on the provider; the lend
//!    pool configurator reads both on init, so this must precede step 7
//! 6. Logic libraries, each after the libraries it links against
//! 7. Lend pool implementation, registered on the provider, which creates
//!    the proxy
//!
//! Every deployed address is recorded in the [`AddressBook`]. The first
//! failure aborts the run; nothing is retried or rolled back.
//!
//! In fork mode nothing is deployed here. The mainnet deployment is
//! delegated to a [`ForkDeployment`] with the registry step skipped.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::address_book::AddressBook;
use crate::artifacts::{ContractId, LinkedLibraries};
use crate::contracts::IBNFTRegistry;
use crate::error::{Error, Result};
use crate::markets::{ConfigNames, PoolConfig};
use crate::protocol::{
    BnftRegistry, ContractDeployer, ProtocolConnector, ProtocolProvider, ProtocolRegistry,
};

/// Flag understood by the fork deployment task
pub const SKIP_REGISTRY_FLAG: &str = "--skip-registry";

/// Setup steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStep {
    DeployIncentivesController,
    DeployProxyAdmin,
    DeployBnftImpl,
    DeployBnftRegistryImpl,
    DeployBnftRegistryProxy,
    TransferBnftRegistryOwnership,
    DeployProviderRegistry,
    DeployAddressesProvider,
    SetAdmins,
    RegisterAddressesProvider,
    SetBnftRegistryAndIncentives,
    DeployLibraries,
    DeployLendPool,
    RecordLendPool,
}

impl SetupStep {
    pub const ALL: [SetupStep; 14] = [
        SetupStep::DeployIncentivesController,
        SetupStep::DeployProxyAdmin,
        SetupStep::DeployBnftImpl,
        SetupStep::DeployBnftRegistryImpl,
        SetupStep::DeployBnftRegistryProxy,
        SetupStep::TransferBnftRegistryOwnership,
        SetupStep::DeployProviderRegistry,
        SetupStep::DeployAddressesProvider,
        SetupStep::SetAdmins,
        SetupStep::RegisterAddressesProvider,
        SetupStep::SetBnftRegistryAndIncentives,
        SetupStep::DeployLibraries,
        SetupStep::DeployLendPool,
        SetupStep::RecordLendPool,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DeployIncentivesController => "Deploy Incentives Controller",
            Self::DeployProxyAdmin => "Deploy Proxy Admin",
            Self::DeployBnftImpl => "Deploy BNFT Implementation",
            Self::DeployBnftRegistryImpl => "Deploy BNFT Registry Implementation",
            Self::DeployBnftRegistryProxy => "Deploy BNFT Registry Proxy",
            Self::TransferBnftRegistryOwnership => "Transfer BNFT Registry Ownership",
            Self::DeployProviderRegistry => "Deploy Addresses Provider Registry",
            Self::DeployAddressesProvider => "Deploy Addresses Provider",
            Self::SetAdmins => "Set Admins",
            Self::RegisterAddressesProvider => "Register Addresses Provider",
            Self::SetBnftRegistryAndIncentives => "Set BNFT Registry and Incentives Controller",
            Self::DeployLibraries => "Deploy Libraries",
            Self::DeployLendPool => "Deploy Lend Pool",
            Self::RecordLendPool => "Record Lend Pool",
        }
    }
}

/// Accounts taking part in the setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identities {
    /// Signs every deployment and setter
    pub deployer: Address,
    pub secondary: Address,
    pub pool_admin: Address,
    pub emergency_admin: Address,
}

impl Identities {
    /// Derive the admin roles from the pool's signer indexes.
    /// `signers[0]` is the deployer and `signers[1]` the secondary wallet.
    pub fn from_signers(pool: &PoolConfig, signers: &[Address]) -> Result<Self> {
        let signer = |index: usize, role: &str| {
            signers.get(index).copied().ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "{} index {} is out of range ({} signers available)",
                    role,
                    index,
                    signers.len()
                ))
            })
        };

        Ok(Self {
            deployer: signer(0, "deployer")?,
            secondary: signer(1, "secondary")?,
            pool_admin: signer(pool.pool_admin_index, "poolAdmin")?,
            emergency_admin: signer(pool.emergency_admin_index, "emergencyAdmin")?,
        })
    }
}

/// External mainnet-fork deployment
#[async_trait]
pub trait ForkDeployment: Send + Sync {
    async fn deploy(&self, pool: ConfigNames, skip_registry: bool) -> Result<()>;
}

/// Runs the fork deployment as an external command, e.g.
/// `npx hardhat bend:mainnet --skip-registry`. The pool name is passed in
/// the `POOL` environment variable.
#[derive(Debug, Clone)]
pub struct ExternalForkDeployer {
    command: String,
}

impl ExternalForkDeployer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl ForkDeployment for ExternalForkDeployer {
    async fn deploy(&self, pool: ConfigNames, skip_registry: bool) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| Error::ForkDeployment("empty deploy command".to_string()))?;
        let mut args: Vec<&str> = parts.collect();
        if skip_registry && !args.contains(&SKIP_REGISTRY_FLAG) {
            args.push(SKIP_REGISTRY_FLAG);
        }

        info!(program, args = ?args, pool = %pool, "Running fork deployment");

        let output = tokio::process::Command::new(program)
            .args(&args)
            .env("POOL", pool.name())
            .output()
            .await
            .map_err(|e| Error::ForkDeployment(format!("failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ForkDeployment(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }

        info!(pool = %pool, "Fork deployment finished");
        Ok(())
    }
}

/// Addresses produced by a local build
#[derive(Debug, Clone)]
pub struct DeployedContracts {
    pub incentives_controller: Address,
    pub proxy_admin: Address,
    pub bnft_impl: Address,
    pub bnft_registry_impl: Address,
    pub bnft_registry: Address,
    pub provider_registry: Address,
    pub addresses_provider: Address,
    pub libraries: LinkedLibraries,
    pub lend_pool_impl: Address,
    pub lend_pool: Address,
}

#[derive(Debug, Clone)]
pub enum BuildOutcome {
    Deployed(DeployedContracts),
    /// Delegated to the fork deployment
    Forked,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub pool: ConfigNames,
    pub outcome: BuildOutcome,
    pub duration: Duration,
}

/// Build the test environment for `pool`.
///
/// `on_step` is called once per step with `true` on success, or `false`
/// right before the step's error is returned. Not called in fork mode.
pub async fn build_test_env<C, F>(
    connector: &C,
    pool: &PoolConfig,
    identities: &Identities,
    address_book: &mut AddressBook,
    fork: Option<&dyn ForkDeployment>,
    on_step: F,
) -> Result<BuildReport>
where
    C: ProtocolConnector,
    F: FnMut(SetupStep, bool),
{
    let start = Instant::now();

    if let Some(fork) = fork {
        info!(pool = %pool.name, "Fork mode: delegating deployment");
        fork.deploy(pool.name, true).await?;
        return Ok(BuildReport {
            pool: pool.name,
            outcome: BuildOutcome::Forked,
            duration: start.elapsed(),
        });
    }

    info!(
        pool_admin = %identities.pool_admin,
        emergency_admin = %identities.emergency_admin,
        "Admin accounts"
    );

    let mut builder = TestEnvBuilder {
        connector,
        pool,
        identities,
        address_book,
    };
    let contracts = builder.run(on_step).await?;

    let duration = start.elapsed();
    info!(
        pool = %pool.name,
        lend_pool = %contracts.lend_pool,
        duration = ?duration,
        "Test environment ready"
    );

    Ok(BuildReport {
        pool: pool.name,
        outcome: BuildOutcome::Deployed(contracts),
        duration,
    })
}

async fn run_step<T, F>(
    step: SetupStep,
    on_step: &mut F,
    action: impl Future<Output = Result<T>>,
) -> Result<T>
where
    F: FnMut(SetupStep, bool),
{
    info!("-> {}", step.name());
    let result = action.await;
    if let Err(e) = &result {
        error!(step = step.name(), error = %e, "Setup step failed");
    }
    on_step(step, result.is_ok());
    result
}

struct TestEnvBuilder<'a, C> {
    connector: &'a C,
    pool: &'a PoolConfig,
    identities: &'a Identities,
    address_book: &'a mut AddressBook,
}

impl<C: ProtocolConnector> TestEnvBuilder<'_, C> {
    async fn run<F>(&mut self, mut on_step: F) -> Result<DeployedContracts>
    where
        F: FnMut(SetupStep, bool),
    {
        let incentives_controller = run_step(
            SetupStep::DeployIncentivesController,
            &mut on_step,
            self.deploy(ContractId::MockIncentivesController, Bytes::new()),
        )
        .await?;

        let proxy_admin = run_step(
            SetupStep::DeployProxyAdmin,
            &mut on_step,
            self.deploy(ContractId::BendProxyAdminTest, Bytes::new()),
        )
        .await?;

        let bnft_impl = run_step(
            SetupStep::DeployBnftImpl,
            &mut on_step,
            self.deploy(ContractId::Bnft, Bytes::new()),
        )
        .await?;

        let bnft_registry_impl = run_step(
            SetupStep::DeployBnftRegistryImpl,
            &mut on_step,
            self.deploy(ContractId::BnftRegistryImpl, Bytes::new()),
        )
        .await?;

        let init_data = IBNFTRegistry::initializeCall {
            genericImpl: bnft_impl,
            namePrefix_: self.pool.mocks.b_nft_name_prefix.clone(),
            symbolPrefix_: self.pool.mocks.b_nft_symbol_prefix.clone(),
        }
        .abi_encode();
        let proxy_args = (bnft_registry_impl, proxy_admin, Bytes::from(init_data)).abi_encode_params();
        let bnft_registry = run_step(
            SetupStep::DeployBnftRegistryProxy,
            &mut on_step,
            self.deploy(ContractId::BnftRegistry, proxy_args.into()),
        )
        .await?;

        let pool_admin = self.identities.pool_admin;
        let registry_handle = self.connector.bnft_registry(bnft_registry);
        run_step(
            SetupStep::TransferBnftRegistryOwnership,
            &mut on_step,
            registry_handle.transfer_ownership(pool_admin),
        )
        .await?;

        let provider_registry = run_step(
            SetupStep::DeployProviderRegistry,
            &mut on_step,
            self.deploy(ContractId::LendPoolAddressesProviderRegistry, Bytes::new()),
        )
        .await?;

        let provider_args = (self.pool.market_id.clone(),).abi_encode_params();
        let addresses_provider = run_step(
            SetupStep::DeployAddressesProvider,
            &mut on_step,
            self.deploy(ContractId::LendPoolAddressesProvider, provider_args.into()),
        )
        .await?;

        let provider = self.connector.provider(addresses_provider);
        let emergency_admin = self.identities.emergency_admin;
        run_step(SetupStep::SetAdmins, &mut on_step, async {
            provider.set_pool_admin(pool_admin).await?;
            provider.set_emergency_admin(emergency_admin).await
        })
        .await?;

        let registry = self.connector.registry(provider_registry);
        let provider_id = U256::from(self.pool.provider_id);
        run_step(
            SetupStep::RegisterAddressesProvider,
            &mut on_step,
            registry.register_addresses_provider(addresses_provider, provider_id),
        )
        .await?;

        run_step(
            SetupStep::SetBnftRegistryAndIncentives,
            &mut on_step,
            async {
                provider.set_bnft_registry(bnft_registry).await?;
                provider.set_incentives_controller(incentives_controller).await
            },
        )
        .await?;

        let libraries = run_step(
            SetupStep::DeployLibraries,
            &mut on_step,
            self.deploy_libraries(),
        )
        .await?;

        let lend_pool_impl = run_step(SetupStep::DeployLendPool, &mut on_step, async {
            let implementation = self
                .deploy_linked(ContractId::LendPoolImpl, &libraries)
                .await?;
            provider
                .set_lend_pool_impl(implementation, Bytes::new())
                .await?;
            Ok::<_, Error>(implementation)
        })
        .await?;

        let lend_pool = run_step(SetupStep::RecordLendPool, &mut on_step, async {
            let lend_pool = provider.lend_pool().await?;
            if lend_pool == Address::ZERO {
                return Err(Error::Rpc {
                    method: "getLendPool",
                    reason: "provider returned the zero address".to_string(),
                });
            }
            self.record(ContractId::LendPool, lend_pool)?;
            Ok::<_, Error>(lend_pool)
        })
        .await?;

        Ok(DeployedContracts {
            incentives_controller,
            proxy_admin,
            bnft_impl,
            bnft_registry_impl,
            bnft_registry,
            provider_registry,
            addresses_provider,
            libraries,
            lend_pool_impl,
            lend_pool,
        })
    }

    async fn deploy(&mut self, contract: ContractId, constructor_args: Bytes) -> Result<Address> {
        let address = self.connector.deploy(contract, constructor_args).await?;
        self.record(contract, address)?;
        Ok(address)
    }

    async fn deploy_linked(
        &mut self,
        contract: ContractId,
        libraries: &LinkedLibraries,
    ) -> Result<Address> {
        let address = self
            .connector
            .deploy_linked(contract, Bytes::new(), libraries)
            .await?;
        self.record(contract, address)?;
        Ok(address)
    }

    /// Deploy the logic libraries, each linked against the ones before it
    async fn deploy_libraries(&mut self) -> Result<LinkedLibraries> {
        let mut libraries = LinkedLibraries::new();
        for library in library_order(self.connector)? {
            let address = self.deploy_linked(library, &libraries).await?;
            libraries.insert(library.name().to_string(), address);
        }
        Ok(libraries)
    }

    fn record(&mut self, contract: ContractId, address: Address) -> Result<()> {
        let deployer = self.connector.deployer();
        self.address_book.insert(contract, address, Some(deployer))
    }
}

/// Order the logic libraries so each comes after every library it links
/// against. Independent libraries keep their declared order.
fn library_order<D: ContractDeployer>(deployer: &D) -> Result<Vec<ContractId>> {
    let is_library = |name: &str| ContractId::LIBRARIES.iter().any(|l| l.name() == name);

    let mut pending = Vec::with_capacity(ContractId::LIBRARIES.len());
    for library in ContractId::LIBRARIES {
        let dependencies: Vec<String> = deployer
            .library_dependencies(library)?
            .into_iter()
            .filter(|name| is_library(name.as_str()))
            .collect();
        pending.push((library, dependencies));
    }

    let mut order: Vec<ContractId> = Vec::with_capacity(pending.len());
    while !pending.is_empty() {
        let ready = pending.iter().position(|(_, dependencies)| {
            dependencies
                .iter()
                .all(|dep| order.iter().any(|done| done.name() == dep.as_str()))
        });
        let Some(index) = ready else {
            let stuck: Vec<&str> = pending.iter().map(|(library, _)| library.name()).collect();
            return Err(Error::Artifact {
                contract: stuck[0].to_string(),
                reason: format!("circular library dependencies among {}", stuck.join(", ")),
            });
        };
        order.push(pending.remove(index).0);
    }

    debug!(?order, "Library deployment order");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markets::{load_pool_config, Network};
    use crate::testing::{MockCall, MockProtocol};
    use std::sync::Mutex;

    fn identities() -> Identities {
        Identities {
            deployer: Address::repeat_byte(0xd0),
            secondary: Address::repeat_byte(0xd1),
            pool_admin: Address::repeat_byte(0xa0),
            emergency_admin: Address::repeat_byte(0xe0),
        }
    }

    #[derive(Default)]
    struct RecordingFork {
        calls: Mutex<Vec<(ConfigNames, bool)>>,
    }

    #[async_trait]
    impl ForkDeployment for RecordingFork {
        async fn deploy(&self, pool: ConfigNames, skip_registry: bool) -> Result<()> {
            self.calls.lock().unwrap().push((pool, skip_registry));
            Ok(())
        }
    }

    async fn build(
        mock: &MockProtocol,
        book: &mut AddressBook,
        steps: &mut Vec<(SetupStep, bool)>,
    ) -> Result<BuildReport> {
        let pool = load_pool_config(ConfigNames::Bend).unwrap();
        build_test_env(mock, &pool, &identities(), book, None, |step, ok| {
            steps.push((step, ok))
        })
        .await
    }

    #[tokio::test]
    async fn test_steps_run_in_order() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);
        let mut steps = Vec::new();

        build(&mock, &mut book, &mut steps).await.unwrap();

        let expected: Vec<(SetupStep, bool)> =
            SetupStep::ALL.iter().map(|s| (*s, true)).collect();
        assert_eq!(steps, expected);
    }

    #[tokio::test]
    async fn test_call_sequence() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);

        build(&mock, &mut book, &mut Vec::new()).await.unwrap();

        let labels = mock.call_labels();
        let expected = [
            "deploy:MockIncentivesController",
            "deploy:BendProxyAdminTest",
            "deploy:BNFT",
            "deploy:BNFTRegistryImpl",
            "deploy:BNFTRegistry",
            "transferOwnership",
            "deploy:LendPoolAddressesProviderRegistry",
            "deploy:LendPoolAddressesProvider",
            "setPoolAdmin",
            "setEmergencyAdmin",
            "registerAddressesProvider",
            "setBNFTRegistry",
            "setIncentivesController",
            "deploy:ReserveLogic",
            "deploy:NftLogic",
            "deploy:GenericLogic",
            "deploy:ValidationLogic",
            "deploy:SupplyLogic",
            "deploy:BorrowLogic",
            "deploy:LiquidateLogic",
            "deploy:LendPoolImpl",
            "setLendPoolImpl",
            "getLendPool",
        ];
        assert_eq!(labels, expected);
    }

    #[tokio::test]
    async fn test_registry_and_incentives_set_before_lend_pool() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);
        build(&mock, &mut book, &mut Vec::new()).await.unwrap();

        let labels = mock.call_labels();
        let position = |label: &str| labels.iter().position(|l| l == label).unwrap();
        assert!(position("setBNFTRegistry") < position("setLendPoolImpl"));
        assert!(position("setIncentivesController") < position("setLendPoolImpl"));
        assert!(position("setIncentivesController") < position("getLendPool"));
    }

    #[tokio::test]
    async fn test_libraries_link_against_earlier_ones() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);
        build(&mock, &mut book, &mut Vec::new()).await.unwrap();

        let linked: Vec<(ContractId, usize)> = mock
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Deploy {
                    contract,
                    libraries,
                } => Some((contract, libraries.len())),
                _ => None,
            })
            .filter(|(contract, _)| {
                ContractId::LIBRARIES.contains(contract) || *contract == ContractId::LendPoolImpl
            })
            .collect();

        for (index, (contract, count)) in linked.iter().enumerate() {
            assert_eq!(*count, index, "{} linked against wrong set", contract);
        }
        assert_eq!(linked.last().unwrap(), &(ContractId::LendPoolImpl, 7));
    }

    #[tokio::test]
    async fn test_libraries_follow_link_references() {
        let mock = MockProtocol::new(identities().deployer);
        // ReserveLogic is declared first but links a library declared later
        mock.set_library_dependencies(ContractId::ReserveLogic, &["ValidationLogic"]);
        mock.set_library_dependencies(ContractId::ValidationLogic, &["GenericLogic"]);
        let mut book = AddressBook::in_memory(Network::Hardhat);

        build(&mock, &mut book, &mut Vec::new()).await.unwrap();

        let libraries: Vec<(ContractId, Vec<String>)> = mock
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::Deploy {
                    contract,
                    libraries,
                } if ContractId::LIBRARIES.contains(&contract) => Some((contract, libraries)),
                _ => None,
            })
            .collect();
        let order: Vec<ContractId> = libraries.iter().map(|(c, _)| *c).collect();
        assert_eq!(
            order,
            vec![
                ContractId::NftLogic,
                ContractId::GenericLogic,
                ContractId::ValidationLogic,
                ContractId::ReserveLogic,
                ContractId::SupplyLogic,
                ContractId::BorrowLogic,
                ContractId::LiquidateLogic,
            ]
        );

        let (_, reserve_links) = &libraries[3];
        assert!(reserve_links.contains(&"ValidationLogic".to_string()));
        assert!(reserve_links.contains(&"GenericLogic".to_string()));
    }

    #[tokio::test]
    async fn test_circular_library_dependencies_abort() {
        let mock = MockProtocol::new(identities().deployer);
        mock.set_library_dependencies(ContractId::GenericLogic, &["ValidationLogic"]);
        mock.set_library_dependencies(ContractId::ValidationLogic, &["GenericLogic"]);
        let mut book = AddressBook::in_memory(Network::Hardhat);
        let mut steps = Vec::new();

        let err = build(&mock, &mut book, &mut steps).await.unwrap_err();
        assert!(matches!(err, Error::Artifact { .. }));
        assert!(err.to_string().contains("circular"));
        assert_eq!(steps.last(), Some(&(SetupStep::DeployLibraries, false)));
        assert_eq!(book.get(ContractId::ReserveLogic), None);
        assert_eq!(mock.deployed(ContractId::LendPoolImpl), None);
    }

    #[tokio::test]
    async fn test_lend_pool_recorded_from_provider() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);

        let report = build(&mock, &mut book, &mut Vec::new()).await.unwrap();
        let BuildOutcome::Deployed(contracts) = report.outcome else {
            panic!("expected a local deployment");
        };

        let recorded = book.get(ContractId::LendPool).unwrap();
        let from_provider = mock.provider_slot(contracts.addresses_provider, "getLendPool");
        assert_eq!(recorded, from_provider);
        assert_ne!(recorded, Address::ZERO);
        assert_eq!(recorded.as_slice().len(), 20);
        assert_eq!(contracts.lend_pool, recorded);
        assert_ne!(contracts.lend_pool, contracts.lend_pool_impl);

        let entry = book.entry(ContractId::LendPool).unwrap();
        assert_eq!(entry.deployer, Some(identities().deployer));
    }

    #[tokio::test]
    async fn test_wiring() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Hardhat);

        let report = build(&mock, &mut book, &mut Vec::new()).await.unwrap();
        let BuildOutcome::Deployed(contracts) = report.outcome else {
            panic!("expected a local deployment");
        };
        let provider = contracts.addresses_provider;

        assert_eq!(mock.provider_slot(provider, "getPoolAdmin"), identities().pool_admin);
        assert_eq!(
            mock.provider_slot(provider, "getEmergencyAdmin"),
            identities().emergency_admin
        );
        assert_eq!(mock.provider_slot(provider, "getBNFTRegistry"), contracts.bnft_registry);
        assert_eq!(
            mock.provider_slot(provider, "getIncentivesController"),
            contracts.incentives_controller
        );
        assert_eq!(
            mock.owner_of(contracts.bnft_registry),
            Some(identities().pool_admin)
        );

        let registry = mock.registry(contracts.provider_registry);
        assert_eq!(
            registry.addresses_providers_list().await.unwrap(),
            vec![provider]
        );
        assert_eq!(
            mock.provider(provider).market_id().await.unwrap(),
            "Bend genesis market"
        );

        assert_eq!(book.get(ContractId::BnftRegistry), Some(contracts.bnft_registry));
        assert_eq!(
            book.get(ContractId::LendPoolAddressesProviderRegistry),
            Some(contracts.provider_registry)
        );
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_steps() {
        let mock = MockProtocol::new(identities().deployer);
        mock.fail_on("registerAddressesProvider");
        let mut book = AddressBook::in_memory(Network::Hardhat);
        let mut steps = Vec::new();

        let err = build(&mock, &mut book, &mut steps).await.unwrap_err();
        assert!(matches!(err, Error::Rpc { method: "registerAddressesProvider", .. }));

        assert_eq!(
            steps.last(),
            Some(&(SetupStep::RegisterAddressesProvider, false))
        );
        assert_eq!(steps.len(), 10);
        assert_eq!(
            mock.call_labels().last().map(String::as_str),
            Some("registerAddressesProvider")
        );
        assert!(book.get(ContractId::LendPool).is_none());
    }

    #[tokio::test]
    async fn test_fork_mode_delegates() {
        let mock = MockProtocol::new(identities().deployer);
        let mut book = AddressBook::in_memory(Network::Main);
        let fork = RecordingFork::default();
        let pool = load_pool_config(ConfigNames::Bend).unwrap();
        let mut steps = Vec::new();

        let report = build_test_env(
            &mock,
            &pool,
            &identities(),
            &mut book,
            Some(&fork as &dyn ForkDeployment),
            |step, ok| steps.push((step, ok)),
        )
        .await
        .unwrap();

        assert!(matches!(report.outcome, BuildOutcome::Forked));
        assert_eq!(*fork.calls.lock().unwrap(), vec![(ConfigNames::Bend, true)]);
        assert!(mock.calls().is_empty());
        assert!(steps.is_empty());
        assert!(book.is_empty());
    }

    #[test]
    fn test_identities_from_signers() {
        let pool = load_pool_config(ConfigNames::Bend).unwrap();
        let signers = [Address::repeat_byte(1), Address::repeat_byte(2)];

        let ids = Identities::from_signers(&pool, &signers).unwrap();
        assert_eq!(ids.deployer, signers[0]);
        assert_eq!(ids.pool_admin, signers[pool.pool_admin_index]);
        assert_eq!(ids.emergency_admin, signers[pool.emergency_admin_index]);

        let err = Identities::from_signers(&pool, &signers[..1]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_step_names_are_unique() {
        let mut names: Vec<&str> = SetupStep::ALL.iter().map(|s| s.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), SetupStep::ALL.len());
    }

    #[tokio::test]
    async fn test_external_fork_command() {
        ExternalForkDeployer::new("true")
            .deploy(ConfigNames::Bend, true)
            .await
            .unwrap();

        let err = ExternalForkDeployer::new("false")
            .deploy(ConfigNames::Bend, true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ForkDeployment(_)));

        let err = ExternalForkDeployer::new("   ")
            .deploy(ConfigNames::Bend, true)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty deploy command"));
    }
}
