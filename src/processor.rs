//! Deposit processing: mined transaction to withdrawal

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::codec::{decode_deposit_payload, WithdrawalRequest};
use crate::error::{RelayError, RelayResult};
use crate::relayer::RelayContext;
use crate::rpc::{ChainRpc, ChainTransaction};
use crate::types::TxHash;

/// Turns one deposit on `source` into a withdrawal on its destination
pub struct DepositProcessor<'a> {
    ctx: &'a RelayContext,
    source: &'a Chain,
    client: Arc<dyn ChainRpc>,
}

impl<'a> DepositProcessor<'a> {
    pub fn new(ctx: &'a RelayContext, source: &'a Chain, client: Arc<dyn ChainRpc>) -> Self {
        Self { ctx, source, client }
    }

    /// Returns the withdrawal transaction hash on the destination chain
    pub async fn process(&self, tx_hash: TxHash) -> RelayResult<TxHash> {
        let tx = self.await_mined(tx_hash).await?;
        let payload = decode_deposit_payload(&tx.input)?;
        let destination = self.ctx.registry.resolve(&payload.destination_chain)?;

        let request = WithdrawalRequest::new(
            payload.recipient,
            tx.value,
            self.source.id,
            destination.id,
        )?;

        info!(
            chain_id = %self.source.id,
            tx_hash = %tx_hash,
            destination_chain = %destination.id,
            recipient = %request.recipient,
            value = %request.value,
            "Relaying deposit"
        );

        self.ctx.dispatcher.dispatch(&destination, &request).await
    }

    /// Wait until the transaction is mined, polling with backoff.
    async fn await_mined(&self, tx_hash: TxHash) -> RelayResult<ChainTransaction> {
        let timeout = self.ctx.settings.tx_confirm_timeout;
        let retry = &self.ctx.settings.retry;
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            match self.client.transaction_by_hash(tx_hash).await {
                Ok(Some(tx)) if !tx.is_pending => return Ok(tx),
                Ok(Some(_)) => debug!(chain_id = %self.source.id, tx_hash = %tx_hash, "Deposit pending"),
                Ok(None) => debug!(chain_id = %self.source.id, tx_hash = %tx_hash, "Deposit not visible yet"),
                Err(e @ RelayError::RpcQuery { .. }) => {
                    warn!(chain_id = %self.source.id, tx_hash = %tx_hash, error = %e, "Deposit lookup failed");
                }
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                return Err(RelayError::DepositUnresolved {
                    chain_id: self.source.id,
                    tx_hash,
                    waited_ms: elapsed.as_millis(),
                });
            }

            let backoff = retry.backoff_for_attempt(attempt).min(timeout - elapsed);
            tokio::time::sleep(backoff).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
