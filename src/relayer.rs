//! Relay coordinator: one poller task per chain

use eyre::{Result, WrapErr};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::chain::Chain;
use crate::config::{Config, RelaySettings};
use crate::dispatcher::WithdrawalDispatcher;
use crate::error::RelayResult;
use crate::events::EventCatalog;
use crate::metrics;
use crate::poller::ChainPoller;
use crate::registry::ChainRegistry;
use crate::rpc::{Dialer, HttpDialer};
use crate::signer::{KeyringSigner, TransactionSigner};
use crate::watermark::{MemoryWatermarkStore, PgWatermarkStore, WatermarkStore};

/// Everything a poller needs, shared read-only across chains
pub struct RelayContext {
    pub registry: ChainRegistry,
    pub catalog: EventCatalog,
    pub dispatcher: WithdrawalDispatcher,
    pub dialer: Arc<dyn Dialer>,
    pub settings: RelaySettings,
    pub watermarks: Arc<dyn WatermarkStore>,
}

impl RelayContext {
    pub fn new(
        registry: ChainRegistry,
        catalog: EventCatalog,
        signer: Arc<dyn TransactionSigner>,
        dialer: Arc<dyn Dialer>,
        settings: RelaySettings,
        watermarks: Arc<dyn WatermarkStore>,
    ) -> Self {
        Self {
            registry,
            catalog,
            dispatcher: WithdrawalDispatcher::new(signer, dialer.clone()),
            dialer,
            settings,
            watermarks,
        }
    }

    /// Load keys, build the registry and open the watermark store
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mut keyring = KeyringSigner::new();
        let mut chains = Vec::with_capacity(config.chains.len());
        for chain_config in &config.chains {
            let sender = chain_config.load_sender(&mut keyring)?;
            chains.push(Chain::new(chain_config, sender));
        }
        let registry = ChainRegistry::new(chains)?;

        let watermarks: Arc<dyn WatermarkStore> = match &config.database_url {
            Some(url) => {
                let store = PgWatermarkStore::connect(url.expose())
                    .await
                    .wrap_err("Failed to open watermark store")?;
                info!("Watermarks persisted to Postgres");
                Arc::new(store)
            }
            None => {
                warn!("DATABASE_URL not set, watermarks kept in memory only");
                Arc::new(MemoryWatermarkStore::new())
            }
        };

        Ok(Self::new(
            registry,
            config.catalog.clone(),
            Arc::new(keyring),
            Arc::new(HttpDialer),
            config.relay.clone(),
            watermarks,
        ))
    }
}

pub struct Relayer {
    ctx: Arc<RelayContext>,
}

impl Relayer {
    pub fn new(ctx: Arc<RelayContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Run every chain's poller until all have stopped.
    ///
    /// A chain whose loop fails stops alone. A process-fatal error aborts
    /// all pollers and is returned.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> RelayResult<()> {
        let mut tasks = JoinSet::new();
        for chain in self.ctx.registry.chains() {
            let poller = ChainPoller::new(self.ctx.clone(), chain.clone(), shutdown.clone());
            let chain_id = chain.id;
            tasks.spawn(async move { (chain_id, poller.run().await) });
        }
        info!(chains = self.ctx.registry.len(), "Relayer started");
        metrics::UP.set(1.0);

        let mut failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((chain_id, Err(e))) if e.is_fatal_for_process() => {
                    error!(chain_id = %chain_id, error = %e, "Fatal error, stopping all chains");
                    tasks.abort_all();
                    metrics::UP.set(0.0);
                    return Err(e);
                }
                Ok((chain_id, Err(e))) => {
                    failed += 1;
                    error!(chain_id = %chain_id, error = %e, "Chain loop ended, other chains continue");
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    failed += 1;
                    error!(error = %e, "Poller task panicked");
                }
            }
        }

        metrics::UP.set(0.0);
        info!(failed, "Relayer stopped");
        Ok(())
    }
}
