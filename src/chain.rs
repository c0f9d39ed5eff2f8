//! Per-network runtime state

use alloy::primitives::Address;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{info, warn};

use crate::config::ChainConfig;
use crate::error::{RelayError, RelayResult};
use crate::rpc::{ChainRpc, Dialer};
use crate::types::ChainId;

/// One configured network.
///
/// Built once at startup. Only the client handle (set on first connect) and
/// the account nonce change afterwards.
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    /// Primary first, then fallbacks
    pub rpc_urls: Vec<String>,
    pub bridge_address: Address,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Account that signs transactions on this chain
    pub sender: Address,
    pub start_block: u64,
    client: OnceCell<Arc<dyn ChainRpc>>,
    /// `None` until the first on-chain nonce query
    nonce: Mutex<Option<u64>>,
}

impl Chain {
    pub fn new(config: &ChainConfig, sender: Address) -> Self {
        Self {
            id: config.chain_id,
            name: config.name.clone(),
            rpc_urls: config.rpc_urls.clone(),
            bridge_address: config.bridge_address,
            gas_price: config.gas_price,
            gas_limit: config.gas_limit,
            sender,
            start_block: config.start_block,
            client: OnceCell::new(),
            nonce: Mutex::new(None),
        }
    }

    /// Connected client, dialing on first use.
    ///
    /// Concurrent callers share a single dial; the handle then lives for the
    /// rest of the process.
    pub async fn connect(&self, dialer: &dyn Dialer) -> RelayResult<Arc<dyn ChainRpc>> {
        self.client
            .get_or_try_init(|| self.dial_any(dialer))
            .await
            .cloned()
    }

    /// Client handle if already connected
    pub fn client(&self) -> Option<Arc<dyn ChainRpc>> {
        self.client.get().cloned()
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    async fn dial_any(&self, dialer: &dyn Dialer) -> RelayResult<Arc<dyn ChainRpc>> {
        let mut last_error = String::from("no RPC URLs configured");

        for (i, url) in self.rpc_urls.iter().enumerate() {
            let client = match dialer.dial(self.id, url).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(chain_id = %self.id, url_index = i, error = %e, "Dial failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            match client.chain_id().await {
                Ok(remote) => {
                    if remote != self.id.to_u256() {
                        warn!(
                            chain_id = %self.id,
                            remote_chain_id = %remote,
                            "Node reports a different chain ID than configured"
                        );
                    }
                    if i > 0 {
                        info!(chain_id = %self.id, url_index = i, "Connected via fallback RPC");
                    } else {
                        info!(chain_id = %self.id, name = %self.name, "Connected");
                    }
                    return Ok(client);
                }
                Err(e) => {
                    warn!(chain_id = %self.id, url_index = i, error = %e, "Chain ID probe failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(RelayError::Connection {
            chain_id: self.id,
            message: last_error,
        })
    }

    /// EIP-155 chain ID for signing
    pub fn signing_chain_id(&self) -> RelayResult<u64> {
        self.id.to_u64().ok_or_else(|| RelayError::Signing {
            chain_id: self.id,
            message: "chain ID does not fit in 64 bits".into(),
        })
    }

    /// Exclusive access to the account nonce. Hold it across sign, broadcast
    /// and refresh so two withdrawals never share a nonce.
    pub async fn lock_nonce(&self) -> MutexGuard<'_, Option<u64>> {
        self.nonce.lock().await
    }

    pub async fn current_nonce(&self) -> Option<u64> {
        *self.nonce.lock().await
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("rpc_urls", &self.rpc_urls.len())
            .field("bridge_address", &self.bridge_address)
            .field("sender", &self.sender)
            .field("connected", &self.is_connected())
            .finish()
    }
}
