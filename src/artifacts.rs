//! Contract artifacts and library linking
//!
//! Bytecode is read from Hardhat-format artifact files (`<ContractName>.json`
//! anywhere below the artifacts directory). Library placeholders are filled
//! in using the byte offsets listed under `linkReferences`.

use alloy::primitives::{Address, Bytes};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{Error, Result};

const ADDRESS_LEN: usize = 20;

/// Library name -> deployed address, used when linking bytecode
pub type LinkedLibraries = BTreeMap<String, Address>;

/// Contracts handled by the orchestration, doubling as address-book keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContractId {
    MockIncentivesController,
    BendProxyAdminTest,
    Bnft,
    BnftRegistryImpl,
    BnftRegistry,
    LendPoolAddressesProviderRegistry,
    LendPoolAddressesProvider,
    ReserveLogic,
    NftLogic,
    GenericLogic,
    ValidationLogic,
    SupplyLogic,
    BorrowLogic,
    LiquidateLogic,
    LendPoolImpl,
    LendPool,
}

impl ContractId {
    pub const ALL: [ContractId; 16] = [
        ContractId::MockIncentivesController,
        ContractId::BendProxyAdminTest,
        ContractId::Bnft,
        ContractId::BnftRegistryImpl,
        ContractId::BnftRegistry,
        ContractId::LendPoolAddressesProviderRegistry,
        ContractId::LendPoolAddressesProvider,
        ContractId::ReserveLogic,
        ContractId::NftLogic,
        ContractId::GenericLogic,
        ContractId::ValidationLogic,
        ContractId::SupplyLogic,
        ContractId::BorrowLogic,
        ContractId::LiquidateLogic,
        ContractId::LendPoolImpl,
        ContractId::LendPool,
    ];

    /// Logic libraries consumed by the lend pool. Deployment follows the
    /// artifacts' link references; this order breaks ties.
    pub const LIBRARIES: [ContractId; 7] = [
        ContractId::ReserveLogic,
        ContractId::NftLogic,
        ContractId::GenericLogic,
        ContractId::ValidationLogic,
        ContractId::SupplyLogic,
        ContractId::BorrowLogic,
        ContractId::LiquidateLogic,
    ];

    /// Key used in the address book
    pub fn name(&self) -> &'static str {
        match self {
            Self::MockIncentivesController => "MockIncentivesController",
            Self::BendProxyAdminTest => "BendProxyAdminTest",
            Self::Bnft => "BNFT",
            Self::BnftRegistryImpl => "BNFTRegistryImpl",
            Self::BnftRegistry => "BNFTRegistry",
            Self::LendPoolAddressesProviderRegistry => "LendPoolAddressesProviderRegistry",
            Self::LendPoolAddressesProvider => "LendPoolAddressesProvider",
            Self::ReserveLogic => "ReserveLogic",
            Self::NftLogic => "NftLogic",
            Self::ValidationLogic => "ValidationLogic",
            Self::GenericLogic => "GenericLogic",
            Self::SupplyLogic => "SupplyLogic",
            Self::BorrowLogic => "BorrowLogic",
            Self::LiquidateLogic => "LiquidateLogic",
            Self::LendPoolImpl => "LendPoolImpl",
            Self::LendPool => "LendPool",
        }
    }

    /// Name of the compiled contract whose artifact holds the bytecode
    pub fn artifact_name(&self) -> &'static str {
        match self {
            Self::BendProxyAdminTest => "BendProxyAdmin",
            Self::BnftRegistryImpl => "BNFTRegistry",
            Self::BnftRegistry => "BendUpgradeableProxy",
            Self::LendPoolImpl | Self::LendPool => "LendPool",
            other => other.name(),
        }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a library placeholder inside creation bytecode
#[derive(Debug, Clone, Deserialize)]
pub struct LinkReference {
    pub start: usize,
    pub length: usize,
}

/// Hardhat compilation artifact (only the fields we need)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    #[serde(default)]
    pub source_name: String,
    pub bytecode: String,
    /// source file -> library name -> placeholder positions
    #[serde(default)]
    pub link_references: HashMap<String, HashMap<String, Vec<LinkReference>>>,
}

impl Artifact {
    pub fn from_json(contract: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Artifact {
            contract: contract.to_string(),
            reason: e.to_string(),
        })
    }

    /// Names of all libraries this bytecode must be linked against
    pub fn library_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .link_references
            .values()
            .flat_map(|libs| libs.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Creation bytecode with every library placeholder replaced
    pub fn linked_bytecode(&self, libraries: &LinkedLibraries) -> Result<Bytes> {
        let mut code = self
            .bytecode
            .trim_start_matches("0x")
            .to_string();
        // Placeholder offsets are byte positions into the hex text
        if !code.is_ascii() {
            return Err(Error::Artifact {
                contract: self.contract_name.clone(),
                reason: "bytecode is not hex text".to_string(),
            });
        }

        for libs in self.link_references.values() {
            for (library, references) in libs {
                let address = libraries.get(library).ok_or_else(|| Error::Artifact {
                    contract: self.contract_name.clone(),
                    reason: format!("unlinked library {}", library),
                })?;
                let address_hex = hex::encode(address.as_slice());

                for reference in references {
                    let from = reference.start * 2;
                    let to = from + reference.length * 2;
                    if reference.length != ADDRESS_LEN || to > code.len() {
                        return Err(Error::Artifact {
                            contract: self.contract_name.clone(),
                            reason: format!(
                                "bad link reference for {} at byte {}",
                                library, reference.start
                            ),
                        });
                    }
                    code.replace_range(from..to, &address_hex);
                }
                debug!(
                    contract = %self.contract_name,
                    library = %library,
                    address = %address,
                    "Linked library"
                );
            }
        }

        let bytes = hex::decode(&code).map_err(|e| Error::Artifact {
            contract: self.contract_name.clone(),
            reason: format!("invalid bytecode: {}", e),
        })?;
        if bytes.is_empty() {
            return Err(Error::Artifact {
                contract: self.contract_name.clone(),
                reason: "empty bytecode (abstract contract or interface?)".to_string(),
            });
        }
        Ok(Bytes::from(bytes))
    }
}

/// Directory of compiled artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact for a contract
    pub fn load(&self, contract: ContractId) -> Result<Artifact> {
        let name = contract.artifact_name();
        let path = find_artifact(&self.root, name)?.ok_or_else(|| Error::Artifact {
            contract: name.to_string(),
            reason: format!("no {}.json below {}", name, self.root.display()),
        })?;
        debug!("Loading artifact {:?}", path);
        let json = std::fs::read_to_string(&path)?;
        Artifact::from_json(name, &json)
    }
}

fn find_artifact(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let file_name = format!("{}.json", name);

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in &entries {
        if path.is_file() && path.file_name().is_some_and(|f| f == file_name.as_str()) {
            return Ok(Some(path.clone()));
        }
    }
    for path in entries.iter().filter(|p| p.is_dir()) {
        if let Some(found) = find_artifact(path, name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
