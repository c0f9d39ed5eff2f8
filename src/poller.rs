//! Per-chain polling loop
//!
//! ```text
//! Connecting -> Baselining -> Polling -> Stopped
//! ```
//!
//! Each tick fetches logs for `[from_block, latest]`, classifies them and
//! relays deposits one at a time in log order. Ticks never overlap.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::bounded_cache::ReplayCache;
use crate::chain::Chain;
use crate::dedup::DedupTracker;
use crate::error::{RelayError, RelayResult};
use crate::events::EventKind;
use crate::metrics;
use crate::processor::DepositProcessor;
use crate::relayer::RelayContext;
use crate::retry::with_retry;
use crate::rpc::{ChainRpc, LogEntry, LogFilter};
use crate::types::TxHash;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Connecting,
    Baselining,
    Polling,
    Stopped,
}

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Highest block fully processed, if any new blocks were scanned
    pub processed_to: Option<u64>,
    pub events: usize,
    pub withdrawals: Vec<TxHash>,
}

pub struct ChainPoller {
    ctx: Arc<RelayContext>,
    chain: Arc<Chain>,
    state: PollerState,
    from_block: u64,
    replay: ReplayCache,
    shutdown: watch::Receiver<bool>,
    /// Set from `max_run_duration` when the poller is built
    deadline: Option<Instant>,
}

impl ChainPoller {
    pub fn new(ctx: Arc<RelayContext>, chain: Arc<Chain>, shutdown: watch::Receiver<bool>) -> Self {
        let replay = ReplayCache::new(
            ctx.settings.replay_cache_size,
            ctx.settings.replay_cache_ttl,
        );
        let from_block = chain.start_block;
        let deadline = ctx.settings.max_run_duration.map(|d| Instant::now() + d);
        Self {
            ctx,
            chain,
            state: PollerState::Connecting,
            from_block,
            replay,
            shutdown,
            deadline,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Next block to scan
    pub fn from_block(&self) -> u64 {
        self.from_block
    }

    /// Run until stopped. Errors returned here ended this chain's loop.
    pub async fn run(mut self) -> RelayResult<()> {
        let result = self.run_inner().await;
        self.state = PollerState::Stopped;
        match &result {
            Ok(()) => info!(chain_id = %self.chain.id, "Poller stopped"),
            Err(e) => {
                metrics::record_error(&self.chain.id.to_string(), e.kind());
                error!(chain_id = %self.chain.id, error = %e, "Poller aborted");
            }
        }
        result
    }

    async fn run_inner(&mut self) -> RelayResult<()> {
        let client = self.connect().await?;
        self.baseline(client.as_ref()).await?;
        if self.state != PollerState::Polling {
            return Ok(());
        }
        self.poll_loop(client).await
    }

    /// Dial the chain; failure is fatal to this poller
    pub async fn connect(&mut self) -> RelayResult<Arc<dyn ChainRpc>> {
        self.state = PollerState::Connecting;
        self.chain.connect(self.ctx.dialer.as_ref()).await
    }

    /// Load the account nonce and pick the first block to scan.
    ///
    /// Failed queries are retried until they succeed. If shutdown or the run
    /// deadline comes first the poller stays in `Baselining` and returns.
    pub async fn baseline(&mut self, client: &dyn ChainRpc) -> RelayResult<()> {
        self.state = PollerState::Baselining;
        let sender = self.chain.sender;

        let Some(nonce) = self
            .until_ready("account_nonce", || client.account_nonce(sender))
            .await?
        else {
            return Ok(());
        };
        {
            let mut slot = self.chain.lock_nonce().await;
            if slot.map_or(true, |current| nonce > current) {
                *slot = Some(nonce);
            }
        }

        let Some(latest) = self
            .until_ready("latest_block_number", || client.latest_block_number())
            .await?
        else {
            return Ok(());
        };

        self.from_block = match self.ctx.watermarks.load(self.chain.id).await {
            Ok(Some(block)) => block + 1,
            Ok(None) => self.chain.start_block,
            Err(e) => {
                warn!(chain_id = %self.chain.id, error = %e, "Watermark load failed, using start block");
                self.chain.start_block
            }
        };

        if self.from_block > latest.saturating_add(1) {
            warn!(
                chain_id = %self.chain.id,
                from_block = self.from_block,
                latest_block = latest,
                "Resume point is ahead of the node, waiting for it to catch up"
            );
        }

        info!(
            chain_id = %self.chain.id,
            name = %self.chain.name,
            sender = %self.chain.sender,
            nonce,
            latest_block = latest,
            from_block = self.from_block,
            "Baseline established"
        );
        self.state = PollerState::Polling;
        Ok(())
    }

    /// Run `query` with backoff, starting over after each exhausted round of
    /// retries. `None` when shutdown or the deadline arrives first.
    async fn until_ready<T, F, Fut>(&mut self, label: &'static str, mut query: F) -> RelayResult<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RelayResult<T>>,
    {
        loop {
            if *self.shutdown.borrow() {
                return Ok(None);
            }

            match with_retry(&self.ctx.settings.retry, label, &mut query).await {
                Ok(value) => return Ok(Some(value)),
                Err(e @ RelayError::RpcQuery { .. }) => {
                    metrics::record_error(&self.chain.id.to_string(), e.kind());
                    warn!(chain_id = %self.chain.id, query = label, error = %e, "Baseline query failed, retrying");
                }
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.ctx.settings.retry.max_backoff) => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(None);
                    }
                }
                _ = wait_for(self.deadline) => {
                    info!(chain_id = %self.chain.id, "Maximum run duration reached");
                    return Ok(None);
                }
            }
        }
    }

    async fn poll_loop(&mut self, client: Arc<dyn ChainRpc>) -> RelayResult<()> {
        let mut ticker = interval(self.ctx.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *self.shutdown.borrow() {
                return Ok(());
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    continue;
                }
                _ = wait_for(self.deadline) => {
                    info!(chain_id = %self.chain.id, "Maximum run duration reached");
                    return Ok(());
                }
            }

            match self.tick(&client).await {
                Ok(summary) => {
                    if self.ctx.settings.verbose {
                        info!(
                            chain_id = %self.chain.id,
                            processed_to = ?summary.processed_to,
                            events = summary.events,
                            withdrawals = summary.withdrawals.len(),
                            "Tick complete"
                        );
                    }
                }
                Err(e) if e.is_fatal_for_chain() => return Err(e),
                Err(e) => {
                    metrics::record_error(&self.chain.id.to_string(), e.kind());
                    warn!(
                        chain_id = %self.chain.id,
                        from_block = self.from_block,
                        error = %e,
                        "Tick failed, range retried next tick"
                    );
                }
            }
        }
    }

    /// One polling cycle. Blocks up to the last fully processed chunk are
    /// committed even if a later chunk fails.
    pub async fn tick(&mut self, client: &Arc<dyn ChainRpc>) -> RelayResult<TickSummary> {
        let mut summary = TickSummary::default();
        let latest = with_retry(&self.ctx.settings.retry, "latest_block_number", || {
            client.latest_block_number()
        })
        .await?;

        if latest < self.from_block {
            debug!(chain_id = %self.chain.id, latest, from_block = self.from_block, "No new blocks");
            return Ok(summary);
        }

        let chain_label = self.chain.id.to_string();
        let range = self.ctx.settings.max_block_range.max(1);
        let mut dedup = DedupTracker::new();

        while self.from_block <= latest {
            let start = self.from_block;
            let end = start.saturating_add(range - 1).min(latest);

            let filter = LogFilter {
                from_block: start,
                to_block: end,
                addresses: if self.ctx.settings.all_addresses {
                    Vec::new()
                } else {
                    vec![self.chain.bridge_address]
                },
            };
            let logs = client.filter_logs(&filter).await?;

            self.process_logs(client, &logs, &mut dedup, &mut summary)
                .await?;

            self.from_block = end + 1;
            summary.processed_to = Some(end);
            metrics::record_blocks_processed(&chain_label, start, end);

            if let Err(e) = self.ctx.watermarks.store(self.chain.id, end).await {
                metrics::record_error(&chain_label, e.kind());
                warn!(chain_id = %self.chain.id, block_number = end, error = %e, "Watermark store failed");
            }
        }

        metrics::record_successful_poll(&chain_label);
        Ok(summary)
    }

    async fn process_logs(
        &mut self,
        client: &Arc<dyn ChainRpc>,
        logs: &[LogEntry],
        dedup: &mut DedupTracker,
        summary: &mut TickSummary,
    ) -> RelayResult<()> {
        let chain_label = self.chain.id.to_string();

        for log in logs {
            let Some(tx_hash) = log.transaction_hash else {
                continue;
            };
            if dedup.seen(&tx_hash) {
                continue;
            }

            let Some(kind) = log
                .topics
                .iter()
                .find_map(|topic| self.ctx.catalog.classify(topic))
            else {
                if self.ctx.settings.verbose {
                    debug!(chain_id = %self.chain.id, tx_hash = %tx_hash, address = %log.address, "Ignoring unknown event");
                }
                continue;
            };

            dedup.mark_seen(tx_hash);
            summary.events += 1;
            metrics::record_event(&chain_label, kind.as_str());

            match kind {
                EventKind::Deposit => {
                    if let Some(withdrawal) = self
                        .handle_deposit(client, tx_hash, log.block_number)
                        .await?
                    {
                        summary.withdrawals.push(withdrawal);
                    }
                }
                other => {
                    info!(
                        chain_id = %self.chain.id,
                        tx_hash = %tx_hash,
                        block_number = ?log.block_number,
                        event = %other,
                        "Bridge event observed"
                    );
                }
            }
        }
        Ok(())
    }

    /// Only process-fatal errors propagate; everything else drops this
    /// deposit and is reported.
    async fn handle_deposit(
        &mut self,
        client: &Arc<dyn ChainRpc>,
        tx_hash: TxHash,
        block_number: Option<u64>,
    ) -> RelayResult<Option<TxHash>> {
        let chain_label = self.chain.id.to_string();
        metrics::record_deposit_detected(&chain_label);

        if self.replay.contains(&tx_hash) {
            debug!(chain_id = %self.chain.id, tx_hash = %tx_hash, "Deposit already relayed");
            return Ok(None);
        }

        let result = DepositProcessor::new(&self.ctx, &self.chain, client.clone())
            .process(tx_hash)
            .await;

        match result {
            Ok(withdrawal) => {
                self.replay.insert(tx_hash);
                Ok(Some(withdrawal))
            }
            Err(e) if e.is_fatal_for_process() => Err(e),
            Err(RelayError::NotABridgeCall) => {
                debug!(chain_id = %self.chain.id, tx_hash = %tx_hash, ?block_number, "Not a bridge call");
                Ok(None)
            }
            Err(e) => {
                metrics::record_error(&chain_label, e.kind());
                warn!(
                    chain_id = %self.chain.id,
                    tx_hash = %tx_hash,
                    block_number = ?block_number,
                    error = %e,
                    "Deposit dropped"
                );
                Ok(None)
            }
        }
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
