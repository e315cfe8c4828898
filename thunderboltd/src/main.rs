//! The Thunderbolt full-node daemon.
//!
//! Wiring only: load configuration, build each component, hand them to
//! one another through constructor arguments, and tear everything down
//! in reverse order on shutdown. There is no global state beyond the
//! configuration loaded here.

mod config;

use std::path::PathBuf;

use color_eyre::eyre::{eyre, Report};
use gumdrop::Options;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use thunderbolt_chain::parameters::Network;
use thunderbolt_consensus::{chain::ChainEngine, mempool::Mempool, service};
use thunderbolt_rpc::Rpc;
use thunderbolt_state::FinalizedState;

use config::ThunderboltdConfig;

#[derive(Debug, Options)]
struct Args {
    #[options(help = "print this help message")]
    help: bool,

    #[options(help = "path to a TOML configuration file")]
    config: Option<PathBuf>,

    #[options(help = "network to join: mainnet or testnet")]
    network: Option<String>,

    #[options(help = "override the data directory")]
    data_dir: Option<PathBuf>,
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let args = Args::parse_args_default_or_exit();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("invalid configuration: {}", error);
            return 1;
        }
    };

    init_tracing(&config);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "failed to start the async runtime");
            return 1;
        }
    };

    match runtime.block_on(run_node(config)) {
        Ok(()) => {
            info!("shutdown complete");
            0
        }
        Err(error) => {
            error!(%error, "fatal error");
            1
        }
    }
}

fn load_config(args: &Args) -> Result<ThunderboltdConfig, Report> {
    let mut config: ThunderboltdConfig = match &args.config {
        Some(path) => {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| eyre!("cannot read {}: {}", path.display(), e))?;
            toml::from_str(&contents)?
        }
        None => ThunderboltdConfig::default(),
    };

    if let Some(network) = &args.network {
        config.network.network = match network.to_ascii_lowercase().as_str() {
            "mainnet" => Network::Mainnet,
            "testnet" => Network::Testnet,
            other => return Err(eyre!("unknown network {:?}", other)),
        };
    }
    if let Some(data_dir) = &args.data_dir {
        config.state.cache_dir = data_dir.clone();
    }

    Ok(config)
}

fn init_tracing(config: &ThunderboltdConfig) {
    let filter = config
        .tracing_filter
        .clone()
        .unwrap_or_else(|| "info".to_owned());
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer())
        .with(ErrorLayer::default())
        .init();

    let _ = color_eyre::install();
}

async fn run_node(config: ThunderboltdConfig) -> Result<(), Report> {
    let network = config.network.network;
    info!(%network, "starting thunderbolt node");

    // Storage first: a state failure here is fatal before anything
    // network-visible happens.
    let state = FinalizedState::new(&config.state, network)?;
    let mempool = Mempool::new(config.min_relay_fee_per_kb);
    let engine = ChainEngine::new(state, mempool, network)?;

    // The engine moves into its actor; everyone else gets handles.
    let (chain, chain_task) = service::spawn(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut net_config = config.network.clone();
    if net_config.address_book_path.is_none() {
        net_config.address_book_path = Some(
            config
                .state
                .network_dir(network)
                .join("peers")
                .join("address_book.dat"),
        );
    }
    let (peers, peer_task) =
        thunderbolt_network::init(net_config, chain.clone(), shutdown_rx).await?;

    let (stop_tx, mut stop_rx) = mpsc::channel(1);
    let rpc = Rpc::new(
        chain.clone(),
        peers.clone(),
        network,
        config.miner_payout_lock()?,
        stop_tx,
    );

    let startup = rpc.get_info().await.map_err(|e| eyre!(e.to_string()))?;
    info!(
        height = startup.height,
        best = %startup.best_block_hash,
        "node ready"
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = stop_rx.recv() => info!("stop requested"),
    }

    // Stop the network first so no new work reaches the engine, then
    // let the engine actor drain and exit.
    let _ = shutdown_tx.send(true);
    let _ = peer_task.await;

    drop(rpc);
    drop(peers);
    drop(chain);
    let _ = chain_task.await;

    Ok(())
}
