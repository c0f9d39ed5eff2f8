//! Withdrawal dispatch onto the destination chain

use alloy::primitives::{Bytes, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chain::Chain;
use crate::codec::{withdrawal_calldata, WithdrawalRequest};
use crate::error::RelayResult;
use crate::metrics;
use crate::rpc::{ChainRpc, Dialer};
use crate::signer::{TransactionSigner, UnsignedTransaction};
use crate::types::TxHash;

/// Signs and broadcasts bridge calls, one nonce at a time per chain
#[derive(Clone)]
pub struct WithdrawalDispatcher {
    signer: Arc<dyn TransactionSigner>,
    dialer: Arc<dyn Dialer>,
}

impl WithdrawalDispatcher {
    pub fn new(signer: Arc<dyn TransactionSigner>, dialer: Arc<dyn Dialer>) -> Self {
        Self { signer, dialer }
    }

    /// Submit `withdraw(...)` to the destination bridge with zero native value.
    pub async fn dispatch(
        &self,
        destination: &Chain,
        request: &WithdrawalRequest,
    ) -> RelayResult<TxHash> {
        let calldata = withdrawal_calldata(request)?;
        let chain_label = destination.id.to_string();

        match self.submit_call(destination, calldata, U256::ZERO).await {
            Ok(tx_hash) => {
                metrics::record_withdrawal_submitted(&chain_label, true);
                info!(
                    source_chain = %request.source_chain,
                    chain_id = %destination.id,
                    recipient = %request.recipient,
                    value = %request.value,
                    tx_hash = %tx_hash,
                    "Withdrawal submitted"
                );
                Ok(tx_hash)
            }
            Err(e) => {
                metrics::record_withdrawal_submitted(&chain_label, false);
                Err(e)
            }
        }
    }

    /// Sign and broadcast a call to `chain`'s bridge contract.
    ///
    /// The chain's nonce lock is held from nonce read to nonce refresh. A
    /// failed broadcast leaves the nonce untouched.
    pub async fn submit_call(&self, chain: &Chain, input: Bytes, value: U256) -> RelayResult<TxHash> {
        let client = chain.connect(self.dialer.as_ref()).await?;
        let signing_chain_id = chain.signing_chain_id()?;

        let mut nonce = chain.lock_nonce().await;
        let used = match *nonce {
            Some(n) => n,
            None => client.account_nonce(chain.sender).await?,
        };

        let tx = UnsignedTransaction {
            nonce: used,
            to: chain.bridge_address,
            value,
            gas_limit: chain.gas_limit,
            gas_price: chain.gas_price,
            input,
            chain_id: signing_chain_id,
        };
        debug!(chain_id = %chain.id, nonce = used, to = %chain.bridge_address, "Signing transaction");

        let raw = self.signer.sign_transaction(chain.sender, tx).await?;
        let tx_hash = client.submit_signed_transaction(raw).await?;

        *nonce = Some(refreshed_nonce(client.as_ref(), chain, used).await);
        Ok(tx_hash)
    }
}

/// On-chain pending nonce, never below `used + 1`
async fn refreshed_nonce(client: &dyn ChainRpc, chain: &Chain, used: u64) -> u64 {
    let floor = used + 1;
    match client.account_nonce(chain.sender).await {
        Ok(onchain) => onchain.max(floor),
        Err(e) => {
            warn!(chain_id = %chain.id, error = %e, "Nonce refresh failed, using local count");
            floor
        }
    }
}
