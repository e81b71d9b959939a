//! Bend protocol operations CLI
//!
//! - `bend-ops print-config --pool Bend`  print pool configuration and state
//! - `bend-ops setup --pool Bend`         deploy a local test environment
//! - `bend-ops status`                    show node and address book status

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::Result;
use tracing_subscriber::EnvFilter;

use bend_ops::evm::{self, signer_from_key};
use bend_ops::{
    build_test_env, load_pool_config_by_name, open_report_address_book, print_config,
    AddressBook, ArtifactStore, BuildOutcome, ContractId, ExternalForkDeployer, ForkDeployment,
    Identities, Network, OpsConfig, ReportRequest,
};

#[derive(Parser)]
#[command(name = "bend-ops")]
#[command(about = "Deployment and configuration tooling for Bend lending pools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the configuration of all reserves and NFTs of a pool
    PrintConfig {
        /// Pool name (Commons, Bend)
        #[arg(long)]
        pool: String,

        /// Network whose parameters to use (ignored when FORK is set)
        #[arg(long)]
        network: Option<Network>,

        /// Addresses provider registry, overriding the pool configuration
        #[arg(long)]
        registry: Option<Address>,
    },

    /// Deploy and wire a test environment
    Setup {
        /// Pool name (Commons, Bend)
        #[arg(long, default_value = "Bend")]
        pool: String,
    },

    /// Show node and address book status
    Status,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    // stdout carries the report; logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = OpsConfig::load()?;
    tracing::debug!(?config, "Loaded configuration");

    match cli.command {
        Commands::PrintConfig {
            pool,
            network,
            registry,
        } => {
            let network = config.fork.or(network).unwrap_or(config.network);
            let address_book =
                open_report_address_book(&pool, &config.address_book_path, network)?;
            let protocol = evm::connect(
                &config.rpc_url,
                config.deployer_key.expose(),
                ArtifactStore::new(&config.artifacts_dir),
            )?;

            let request = ReportRequest {
                pool: &pool,
                network,
                registry,
                address_book: Some(&address_book),
            };
            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            print_config(&protocol, &request, &mut out).await?;
        }

        Commands::Setup { pool } => {
            let pool = load_pool_config_by_name(&pool)?;
            let network = config.effective_network();
            tracing::info!(pool = %pool.name, network = %network, "Setting up test environment...");

            let deployer = signer_from_key(config.deployer_key.expose())?.address();
            let secondary = signer_from_key(config.secondary_key.expose())?.address();
            let identities = Identities::from_signers(&pool, &[deployer, secondary])?;

            let mut address_book = AddressBook::open(&config.address_book_path, network)?;
            let protocol = evm::connect(
                &config.rpc_url,
                config.deployer_key.expose(),
                ArtifactStore::new(&config.artifacts_dir),
            )?;
            let fork = config
                .is_fork()
                .then(|| ExternalForkDeployer::new(config.fork_deploy_command.clone()));

            let report = build_test_env(
                &protocol,
                &pool,
                &identities,
                &mut address_book,
                fork.as_ref().map(|f| f as &dyn ForkDeployment),
                |step, success| {
                    if success {
                        tracing::info!("  [OK] {}", step.name());
                    } else {
                        tracing::error!("  [FAIL] {}", step.name());
                    }
                },
            )
            .await?;

            tracing::info!("Setup complete in {:?}", report.duration);
            match report.outcome {
                BuildOutcome::Deployed(contracts) => {
                    tracing::info!("  Addresses provider:  {}", contracts.addresses_provider);
                    tracing::info!("  Provider registry:   {}", contracts.provider_registry);
                    tracing::info!("  BNFT registry:       {}", contracts.bnft_registry);
                    tracing::info!("  Lend pool:           {}", contracts.lend_pool);
                    tracing::info!("Address book: {:?}", config.address_book_path);
                }
                BuildOutcome::Forked => {
                    tracing::info!("Deployment delegated to `{}`", config.fork_deploy_command);
                }
            }
        }

        Commands::Status => {
            let network = config.effective_network();
            println!();
            println!("Configuration:");
            println!("  RPC:           {}", config.rpc_url);
            println!("  Network:       {}", network);
            println!(
                "  Fork:          {}",
                config.fork.map_or("off".to_string(), |n| n.to_string())
            );
            println!("  Artifacts:     {}", config.artifacts_dir.display());
            println!("  Address book:  {}", config.address_book_path.display());
            println!();

            let protocol = evm::connect(
                &config.rpc_url,
                config.deployer_key.expose(),
                ArtifactStore::new(&config.artifacts_dir),
            )?;
            match protocol.node_status().await {
                Ok(status) => {
                    println!("  \x1b[32m●\x1b[0m Node: chain {} at block {}", status.chain_id, status.block_number);
                    println!("    Deployer balance: {} wei", status.deployer_balance);
                }
                Err(e) => {
                    println!("  \x1b[31m●\x1b[0m Node: not responding ({})", e);
                }
            }
            println!();

            let address_book = AddressBook::open(&config.address_book_path, network)?;
            if address_book.is_empty() {
                println!("No contracts recorded for {}", network);
                return Ok(());
            }
            println!("Contracts ({}):", network);
            for contract in ContractId::ALL {
                if let Some(address) = address_book.get(contract) {
                    let deployed = protocol.has_code(address).await.unwrap_or(false);
                    let marker = if deployed { "\x1b[32m●\x1b[0m" } else { "\x1b[33m●\x1b[0m" };
                    println!("  {} {:<36} {}", marker, contract.name(), address);
                }
            }
        }
    }

    Ok(())
}
