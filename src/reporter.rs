//! Configuration reporter
//!
//! Prints the live state of one pool: the addresses the provider points at,
//! lend pool limits, and the parameters of every configured reserve and NFT
//! asset. All static inputs are resolved before the first contract call, so
//! a bad pool name or a missing per-network parameter never touches the
//! node. Each line is flushed as soon as it is produced; if a call fails
//! midway the lines already printed stay printed.

use alloy::primitives::Address;
use std::fmt::Display;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::address_book::AddressBook;
use crate::artifacts::ContractId;
use crate::error::{Error, Result};
use crate::markets::{load_pool_config_by_name, AssetEntry, ConfigNames, Network, PoolConfig};
use crate::protocol::{
    LendPoolView, NftConfiguration, NftTokenData, ProtocolConnector, ProtocolDataProvider,
    ProtocolProvider, ProtocolRegistry, ReserveConfiguration, ReserveTokenData,
};

/// Inputs of one report
#[derive(Debug, Clone, Copy)]
pub struct ReportRequest<'a> {
    /// Pool identifier, one of [`crate::markets::ConfigNames`]
    pub pool: &'a str,
    pub network: Network,
    /// Registry to use instead of the pool's configured one
    pub registry: Option<Address>,
    /// Consulted when neither `registry` nor the pool config names a registry
    pub address_book: Option<&'a AddressBook>,
}

/// Open the address book a report falls back on. The pool name is checked
/// first, so an unknown pool is reported as such even when the book is
/// unreadable.
pub fn open_report_address_book(
    pool: &str,
    path: &Path,
    network: Network,
) -> Result<AddressBook> {
    pool.parse::<ConfigNames>()?;
    AddressBook::open(path, network)
}

/// Pick the provider registry: explicit override, then pool config, then
/// the local address book.
pub fn resolve_registry(
    config: &PoolConfig,
    network: Network,
    registry: Option<Address>,
    address_book: Option<&AddressBook>,
) -> Result<Address> {
    if let Some(registry) = registry {
        return Ok(registry);
    }
    if let Some(registry) = config.provider_registry(network)? {
        return Ok(registry);
    }
    address_book
        .and_then(|book| book.get(ContractId::LendPoolAddressesProviderRegistry))
        .ok_or_else(|| {
            Error::InvalidConfig(format!(
                "pool '{}' has no provider registry on {} and none was deployed locally",
                config.name, network
            ))
        })
}

/// Print the configuration report for `request.pool` to `out`
pub async fn print_config<C, W>(connector: &C, request: &ReportRequest<'_>, out: &mut W) -> Result<()>
where
    C: ProtocolConnector,
    W: Write,
{
    let network = request.network;
    let config = load_pool_config_by_name(request.pool)?;
    let reserve_assets = config.reserve_assets(network)?;
    let nfts_assets = config.nfts_assets(network)?;
    let registry_address =
        resolve_registry(&config, network, request.registry, request.address_book)?;

    info!(
        pool = %config.name,
        network = %network,
        registry = %registry_address,
        reserves = reserve_assets.len(),
        nfts = nfts_assets.len(),
        "Printing pool configuration"
    );

    let registry = connector.registry(registry_address);
    let providers = registry.addresses_providers_list().await?;
    let provider_address = *providers
        .first()
        .ok_or(Error::NoAddressesProvider(registry_address))?;
    if providers.len() > 1 {
        debug!(count = providers.len(), "Registry lists several providers, using the first");
    }

    let provider = connector.provider(provider_address);
    let data_provider = connector.data_provider(provider.bend_data_provider().await?);

    header(out, "Provider Registry", registry.address())?;
    header(out, "Address Provider", provider.address())?;
    header(out, "Market Id", provider.market_id().await?)?;
    header(out, "Pool Admin", provider.pool_admin().await?)?;
    header(out, "Emergency Admin", provider.emergency_admin().await?)?;
    header(out, "Lend Pool Proxy", provider.lend_pool().await?)?;
    header(out, "Lend Pool Loan Proxy", provider.lend_pool_loan().await?)?;
    header(
        out,
        "Lend Pool Configurator Proxy",
        provider.lend_pool_configurator().await?,
    )?;
    header(out, "Lend Pool Liquidator", provider.lend_pool_liquidator().await?)?;
    header(out, "Reserve Oracle Proxy", provider.reserve_oracle().await?)?;
    header(out, "NFT Oracle Proxy", provider.nft_oracle().await?)?;
    header(out, "BNFT Registry Proxy", provider.bnft_registry().await?)?;
    header(out, "Incentives Controller", provider.incentives_controller().await?)?;
    header(out, "Bend Data Provider", data_provider.address())?;
    header(out, "UI Data Provider", provider.ui_data_provider().await?)?;
    header(
        out,
        "Wallet Balance Provider",
        provider.wallet_balance_provider().await?,
    )?;

    line(out, "- LendPool config")?;
    let lend_pool = connector.lend_pool(provider.lend_pool().await?);
    let limits = lend_pool.limits().await?;
    field(out, "MAX_NUMBER_RESERVES", limits.max_number_reserves)?;
    field(out, "MAX_NUMBER_NFTS", limits.max_number_nfts)?;
    field(out, "paused", limits.paused)?;

    for asset in reserve_assets {
        print_reserve(&data_provider, asset, out).await?;
    }
    for asset in nfts_assets {
        print_nft(&data_provider, asset, out).await?;
    }

    Ok(())
}

async fn print_reserve<D, W>(data_provider: &D, asset: &AssetEntry, out: &mut W) -> Result<()>
where
    D: ProtocolDataProvider,
    W: Write,
{
    line(out, format!("- {} reserve config", asset.symbol))?;
    field(out, "reserve address", asset.address)?;

    let config = data_provider.reserve_configuration(asset.address).await?;
    let tokens = data_provider.reserve_token_data(asset.address).await?;

    for (name, value) in ReserveConfiguration::FIELDS.iter().zip(config.values()) {
        field(out, name, value)?;
    }
    for (name, value) in ReserveTokenData::FIELDS.iter().zip(tokens.values()) {
        field(out, name, value)?;
    }
    Ok(())
}

async fn print_nft<D, W>(data_provider: &D, asset: &AssetEntry, out: &mut W) -> Result<()>
where
    D: ProtocolDataProvider,
    W: Write,
{
    line(out, format!("- {} nft config", asset.symbol))?;
    field(out, "nft address", asset.address)?;

    let config = data_provider.nft_configuration(asset.address).await?;
    let tokens = data_provider.nft_token_data(asset.address).await?;

    for (name, value) in NftConfiguration::FIELDS.iter().zip(config.values()) {
        field(out, name, value)?;
    }
    for (name, value) in NftTokenData::FIELDS.iter().zip(tokens.values()) {
        field(out, name, value)?;
    }
    Ok(())
}

fn line<W: Write>(out: &mut W, text: impl Display) -> Result<()> {
    writeln!(out, "{}", text)?;
    out.flush()?;
    Ok(())
}

fn header<W: Write>(out: &mut W, label: &str, value: impl Display) -> Result<()> {
    line(out, format!("{}: {}", label, value))
}

fn field<W: Write>(out: &mut W, name: &str, value: impl Display) -> Result<()> {
    line(out, format!("  - {}: {}", name, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::LendPoolLimits;
    use crate::testing::MockProtocol;
    use alloy::primitives::U256;

    const HEADER_LABELS: [&str; 16] = [
        "Provider Registry",
        "Address Provider",
        "Market Id",
        "Pool Admin",
        "Emergency Admin",
        "Lend Pool Proxy",
        "Lend Pool Loan Proxy",
        "Lend Pool Configurator Proxy",
        "Lend Pool Liquidator",
        "Reserve Oracle Proxy",
        "NFT Oracle Proxy",
        "BNFT Registry Proxy",
        "Incentives Controller",
        "Bend Data Provider",
        "UI Data Provider",
        "Wallet Balance Provider",
    ];

    #[test]
    fn test_unknown_pool_reported_before_address_book() {
        let path = std::env::temp_dir().join(format!(
            "bend-ops-report-book-{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();

        let err = open_report_address_book("Aave", &path, Network::Hardhat).unwrap_err();
        assert!(matches!(err, Error::UnknownPool(ref pool) if pool == "Aave"));

        let err = open_report_address_book("Bend", &path, Network::Hardhat).unwrap_err();
        assert!(matches!(err, Error::AddressBook(_)));

        std::fs::remove_file(&path).unwrap();
    }

    fn seeded_market(mock: &MockProtocol) -> Address {
        let provider = mock.add_provider("Bend genesis market");
        mock.set_lend_pool_limits(LendPoolLimits {
            max_number_reserves: U256::from(128),
            max_number_nfts: U256::from(256),
            paused: false,
        });
        mock.add_registry(&[provider])
    }

    async fn run(
        mock: &MockProtocol,
        pool: &str,
        network: Network,
        registry: Option<Address>,
    ) -> (Result<()>, Vec<String>) {
        let request = ReportRequest {
            pool,
            network,
            registry,
            address_book: None,
        };
        let mut out = Vec::new();
        let result = print_config(mock, &request, &mut out).await;
        let lines = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(String::from)
            .collect();
        (result, lines)
    }

    /// Field names of every block starting with `- <X> <kind> config`
    fn blocks(lines: &[String], kind: &str) -> Vec<Vec<String>> {
        let suffix = format!(" {} config", kind);
        let mut blocks = Vec::new();
        let mut current: Option<Vec<String>> = None;
        for line in lines {
            if line.starts_with("- ") {
                if let Some(block) = current.take() {
                    blocks.push(block);
                }
                if line.ends_with(&suffix) {
                    current = Some(Vec::new());
                }
            } else if let Some(block) = current.as_mut() {
                let name = line
                    .trim_start_matches("  - ")
                    .split(':')
                    .next()
                    .unwrap()
                    .to_string();
                block.push(name);
            }
        }
        if let Some(block) = current {
            blocks.push(block);
        }
        blocks
    }

    #[tokio::test]
    async fn test_unknown_pool_makes_no_calls() {
        let mock = MockProtocol::default();
        let (result, lines) = run(&mock, "Aave", Network::Main, Some(Address::ZERO)).await;

        let err = result.unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(err.to_string(), "Configuration not found: Aave");
        assert!(lines.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_registry_makes_no_calls() {
        let mock = MockProtocol::default();
        let (result, _) = run(&mock, "Bend", Network::Main, None).await;

        assert!(result.unwrap_err().is_configuration());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_header_order() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);

        let (result, lines) = run(&mock, "Bend", Network::Hardhat, Some(registry)).await;
        result.unwrap();

        let labels: Vec<&str> = lines
            .iter()
            .take(HEADER_LABELS.len())
            .map(|l| l.split(':').next().unwrap())
            .collect();
        assert_eq!(labels, HEADER_LABELS);
        assert_eq!(lines[0], format!("Provider Registry: {}", registry));
        assert_eq!(lines[2], "Market Id: Bend genesis market");

        assert_eq!(
            &lines[16..],
            &[
                "- LendPool config",
                "  - MAX_NUMBER_RESERVES: 128",
                "  - MAX_NUMBER_NFTS: 256",
                "  - paused: false",
            ]
        );
    }

    #[tokio::test]
    async fn test_zero_assets_prints_no_blocks() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);

        let (result, lines) = run(&mock, "Commons", Network::Hardhat, Some(registry)).await;
        result.unwrap();
        assert_eq!(lines.len(), 16 + 4);
        assert!(blocks(&lines, "reserve").is_empty());
        assert!(blocks(&lines, "nft").is_empty());
    }

    #[tokio::test]
    async fn test_every_block_has_the_same_shape() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);

        let (result, lines) = run(&mock, "Bend", Network::Main, Some(registry)).await;
        result.unwrap();

        let config = crate::markets::load_pool_config(crate::markets::ConfigNames::Bend).unwrap();
        let reserves = blocks(&lines, "reserve");
        let nfts = blocks(&lines, "nft");
        assert_eq!(reserves.len(), config.reserve_assets(Network::Main).unwrap().len());
        assert_eq!(nfts.len(), config.nfts_assets(Network::Main).unwrap().len());

        let expected_reserve: Vec<String> = std::iter::once("reserve address")
            .chain(ReserveConfiguration::FIELDS)
            .chain(ReserveTokenData::FIELDS)
            .map(String::from)
            .collect();
        let expected_nft: Vec<String> = std::iter::once("nft address")
            .chain(NftConfiguration::FIELDS)
            .chain(NftTokenData::FIELDS)
            .map(String::from)
            .collect();

        for block in &reserves {
            assert_eq!(block, &expected_reserve);
        }
        for block in &nfts {
            assert_eq!(block, &expected_nft);
        }

        // Reserves come before NFTs, each in config order
        let titles: Vec<&String> = lines.iter().filter(|l| l.ends_with(" config")).collect();
        assert_eq!(titles[0], "- LendPool config");
        assert_eq!(titles[1], "- WETH reserve config");
        assert!(titles.last().unwrap().ends_with("nft config"));
    }

    #[tokio::test]
    async fn test_reserve_values_come_from_data_provider() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);
        let config = crate::markets::load_pool_config(crate::markets::ConfigNames::Bend).unwrap();
        let weth = config.reserve_assets(Network::Main).unwrap()[0].address;

        mock.set_reserve(
            weth,
            ReserveConfiguration {
                decimals: U256::from(18),
                reserve_factor: U256::from(3000),
                borrowing_enabled: true,
                is_active: true,
                is_frozen: false,
            },
            ReserveTokenData {
                b_token_symbol: "bendWETH".to_string(),
                ..Default::default()
            },
        );

        let (result, lines) = run(&mock, "Bend", Network::Main, Some(registry)).await;
        result.unwrap();

        let start = lines
            .iter()
            .position(|l| l == "- WETH reserve config")
            .unwrap();
        assert_eq!(lines[start + 1], format!("  - reserve address: {}", weth));
        assert_eq!(lines[start + 2], "  - decimals: 18");
        assert_eq!(lines[start + 3], "  - reserveFactor: 3000");
        assert_eq!(lines[start + 4], "  - borrowingEnabled: true");
        assert_eq!(lines[start + 7], "  - bTokenSymbol: bendWETH");
    }

    #[tokio::test]
    async fn test_empty_registry_is_rpc_side_error() {
        let mock = MockProtocol::default();
        let registry = mock.add_registry(&[]);

        let (result, lines) = run(&mock, "Bend", Network::Hardhat, Some(registry)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::NoAddressesProvider(a) if a == registry));
        assert!(!err.is_configuration());
        assert!(lines.is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_output() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);
        mock.fail_on("getNftConfigurationData");

        let (result, lines) = run(&mock, "Bend", Network::Main, Some(registry)).await;
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Rpc { method: "getNftConfigurationData", .. }));

        // Headers and all reserve blocks made it out; the first NFT block is cut short
        assert!(lines.iter().any(|l| l == "- WETH reserve config"));
        assert_eq!(lines[lines.len() - 2], "- WPUNKS nft config");
        assert!(lines.last().unwrap().starts_with("  - nft address: "));
        assert_eq!(
            mock.call_labels().last().map(String::as_str),
            Some("getNftConfigurationData")
        );
    }

    #[tokio::test]
    async fn test_registry_from_address_book() {
        let mock = MockProtocol::default();
        let registry = seeded_market(&mock);

        let mut book = AddressBook::in_memory(Network::Hardhat);
        book.insert(ContractId::LendPoolAddressesProviderRegistry, registry, None)
            .unwrap();

        let request = ReportRequest {
            pool: "Bend",
            network: Network::Hardhat,
            registry: None,
            address_book: Some(&book),
        };
        let mut out = Vec::new();
        print_config(&mock, &request, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with(&format!("Provider Registry: {}\n", registry)));
    }
}
