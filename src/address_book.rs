//! Local address book
//!
//! Records where each contract was deployed, per network, so later test code
//! can find it. Persisted as pretty JSON after every insert:
//!
//! ```json
//! {
//!   "LendPool": {
//!     "hardhat": { "address": "0x…", "deployer": "0x…", "recordedAt": "…" }
//!   }
//! }
//! ```
//!
//! `deployer` and `recordedAt` are optional, so books written by other
//! deployment tooling load as well.
//!
//! Entries are only ever added or superseded, never removed.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::artifacts::ContractId;
use crate::error::{Error, Result};
use crate::markets::Network;

/// Default file name, relative to the working directory
pub const DEFAULT_ADDRESS_BOOK: &str = "deployed-contracts.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressBookEntry {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployer: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

type Entries = BTreeMap<String, BTreeMap<String, AddressBookEntry>>;

/// Contract id -> network -> entry, optionally backed by a file
#[derive(Debug)]
pub struct AddressBook {
    path: Option<PathBuf>,
    network: Network,
    entries: Entries,
}

impl AddressBook {
    /// In-memory book that is never written to disk
    pub fn in_memory(network: Network) -> Self {
        Self {
            path: None,
            network,
            entries: Entries::new(),
        }
    }

    /// Open a file-backed book, loading existing entries if the file exists
    pub fn open(path: impl Into<PathBuf>, network: Network) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Entries::new()
            } else {
                serde_json::from_str(&content).map_err(|e| {
                    Error::AddressBook(format!("failed to parse {}: {}", path.display(), e))
                })?
            }
        } else {
            Entries::new()
        };

        debug!(path = %path.display(), contracts = entries.len(), "Opened address book");

        Ok(Self {
            path: Some(path),
            network,
            entries,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record a deployed address for the current network and persist it
    pub fn insert(
        &mut self,
        contract: ContractId,
        address: Address,
        deployer: Option<Address>,
    ) -> Result<()> {
        let entry = AddressBookEntry {
            address,
            deployer,
            recorded_at: Some(Utc::now()),
        };
        self.entries
            .entry(contract.name().to_string())
            .or_default()
            .insert(self.network.name().to_string(), entry);

        info!("*** {} ***  network: {}  address: {}", contract, self.network, address);

        self.persist()
    }

    /// Current address of a contract on this book's network
    pub fn get(&self, contract: ContractId) -> Option<Address> {
        self.entry(contract).map(|e| e.address)
    }

    pub fn entry(&self, contract: ContractId) -> Option<&AddressBookEntry> {
        self.entries
            .get(contract.name())
            .and_then(|networks| networks.get(self.network.name()))
    }

    /// Number of contracts with an entry on this book's network
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|networks| networks.contains_key(self.network.name()))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| Error::AddressBook(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
