//! Bend protocol operations
//!
//! Deployment orchestration and configuration reporting for the Bend
//! NFT-collateralized lending protocol:
//!
//! - [`reporter::print_config`] prints a pool's configuration and live
//!   on-chain state
//! - [`builder::build_test_env`] deploys and wires a fresh test environment,
//!   recording addresses in the local [`AddressBook`]
//!
//! Contracts are reached through the capability traits in [`protocol`];
//! [`evm::EvmProtocol`] talks to a node over JSON-RPC.

pub mod address_book;
pub mod artifacts;
pub mod builder;
pub mod config;
pub mod contracts;
pub mod error;
pub mod evm;
pub mod markets;
pub mod protocol;
pub mod redact;
pub mod reporter;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use address_book::AddressBook;
pub use artifacts::{ArtifactStore, ContractId};
pub use builder::{
    build_test_env, BuildOutcome, BuildReport, DeployedContracts, ExternalForkDeployer,
    ForkDeployment, Identities, SetupStep,
};
pub use config::OpsConfig;
pub use error::{Error, Result};
pub use markets::{load_pool_config, load_pool_config_by_name, ConfigNames, Network, PoolConfig};
pub use reporter::{open_report_address_book, print_config, ReportRequest};
