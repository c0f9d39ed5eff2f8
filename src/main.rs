//! Bridge relay CLI
//!
//! - `bridge-relay run` - relay deposits between all configured chains
//! - `bridge-relay deposit` - submit a test deposit on one chain
//! - `bridge-relay set-bridge` - point a bridge contract at itself

use alloy::primitives::{Address, U256};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use bridge_relay::codec::{encode_deposit_payload, encode_set_bridge_payload};
use bridge_relay::{api, ChainId, Config, RelayContext, Relayer};

#[derive(Parser)]
#[command(name = "bridge-relay")]
#[command(about = "Cross-chain deposit/withdrawal relay for EVM bridges", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log every polling tick
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Scan logs from every contract, not just the bridge
    #[arg(short, long, global = true)]
    all_addresses: bool,

    /// Load environment from this file instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Relay deposits between all configured chains (default)
    Run,

    /// Submit a bridge deposit
    Deposit {
        /// Source chain ID
        #[arg(long)]
        chain: ChainId,

        /// Destination chain ID encoded in the deposit
        #[arg(long)]
        to_chain: ChainId,

        /// Native value to bridge, in wei
        #[arg(long)]
        value: U256,

        /// Recipient on the destination chain; defaults to the sender
        #[arg(long)]
        recipient: Option<Address>,
    },

    /// Call setBridge on a chain's bridge contract with its own address
    SetBridge {
        #[arg(long)]
        chain: ChainId,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.env_file.as_deref())?;
    config.relay.verbose |= cli.verbose;
    config.relay.all_addresses |= cli.all_addresses;

    init_logging();
    tracing::info!(
        chains = config.chains.len(),
        verbose = config.relay.verbose,
        all_addresses = config.relay.all_addresses,
        "Configuration loaded"
    );

    let ctx = Arc::new(RelayContext::from_config(&config).await?);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(ctx, config.api_bind_addr).await,
        Commands::Deposit {
            chain,
            to_chain,
            value,
            recipient,
        } => {
            let source = ctx.registry.resolve(&chain)?;
            let recipient = recipient.unwrap_or(source.sender);
            let input = encode_deposit_payload(recipient, &to_chain);
            let tx_hash = ctx
                .dispatcher
                .submit_call(&source, input, value)
                .await
                .wrap_err("Deposit failed")?;
            tracing::info!(
                chain_id = %source.id,
                to_chain = %to_chain,
                recipient = %recipient,
                value = %value,
                tx_hash = %tx_hash,
                "Deposit submitted"
            );
            println!("{}", tx_hash);
            Ok(())
        }
        Commands::SetBridge { chain } => {
            let target = ctx.registry.resolve(&chain)?;
            let input = encode_set_bridge_payload(target.bridge_address);
            let tx_hash = ctx
                .dispatcher
                .submit_call(&target, input, U256::ZERO)
                .await
                .wrap_err("setBridge failed")?;
            tracing::info!(chain_id = %target.id, tx_hash = %tx_hash, "setBridge submitted");
            println!("{}", tx_hash);
            Ok(())
        }
    }
}

async fn run(ctx: Arc<RelayContext>, api_addr: Option<SocketAddr>) -> Result<()> {
    tracing::info!("Starting bridge relay");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if let Some(addr) = api_addr {
        let api_ctx = ctx.clone();
        tokio::spawn(async move {
            if let Err(e) = api::start_api_server(addr, api_ctx).await {
                tracing::error!(error = %e, "API server error");
            }
        });
    }

    Relayer::new(ctx).run(shutdown_rx).await?;
    tracing::info!("Bridge relay stopped");
    Ok(())
}

/// Initialize tracing; `LOG_FORMAT=json` switches to JSON lines
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bridge_relay=debug"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

/// Wait for shutdown signals (SIGINT/SIGTERM)
async fn wait_for_shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
