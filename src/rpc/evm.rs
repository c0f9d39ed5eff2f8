//! alloy HTTP implementation of [`ChainRpc`]

use alloy::consensus::Transaction as _;
use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes, U256};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::types::Filter;
use alloy::transports::http::reqwest::Url;
use alloy::transports::http::{Client, Http};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::{ChainRpc, ChainTransaction, Dialer, LogEntry, LogFilter};
use crate::error::{RelayError, RelayResult};
use crate::types::{ChainId, TxHash};

/// Parse a comma-separated RPC URL string into individual trimmed URLs.
pub fn parse_rpc_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// JSON-RPC client for one EVM endpoint
pub struct EvmRpc {
    provider: RootProvider<Http<Client>>,
    chain_id: ChainId,
}

impl EvmRpc {
    pub fn new(chain_id: ChainId, url: &str) -> RelayResult<Self> {
        let parsed: Url = url.parse().map_err(|e| RelayError::Connection {
            chain_id,
            message: format!("invalid RPC URL {}: {}", url, e),
        })?;
        Ok(Self {
            provider: ProviderBuilder::new().on_http(parsed),
            chain_id,
        })
    }
}

#[async_trait]
impl ChainRpc for EvmRpc {
    async fn chain_id(&self) -> RelayResult<U256> {
        let id = self
            .provider
            .get_chain_id()
            .await
            .map_err(|e| RelayError::rpc(self.chain_id, "chain_id", e))?;
        Ok(U256::from(id))
    }

    async fn latest_block_number(&self) -> RelayResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map_err(|e| RelayError::rpc(self.chain_id, "latest_block_number", e))
    }

    async fn account_nonce(&self, address: Address) -> RelayResult<u64> {
        self.provider
            .get_transaction_count(address)
            .block_id(BlockId::pending())
            .await
            .map_err(|e| RelayError::rpc(self.chain_id, "account_nonce", e))
    }

    async fn filter_logs(&self, filter: &LogFilter) -> RelayResult<Vec<LogEntry>> {
        let mut query = Filter::new()
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        if !filter.addresses.is_empty() {
            query = query.address(filter.addresses.clone());
        }

        let logs = self
            .provider
            .get_logs(&query)
            .await
            .map_err(|e| RelayError::rpc(self.chain_id, "filter_logs", e))?;

        debug!(
            chain_id = %self.chain_id,
            from_block = filter.from_block,
            to_block = filter.to_block,
            count = logs.len(),
            "Fetched logs"
        );

        Ok(logs
            .into_iter()
            .map(|log| LogEntry {
                address: log.address(),
                topics: log.topics().to_vec(),
                transaction_hash: log.transaction_hash,
                block_number: log.block_number,
            })
            .collect())
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> RelayResult<Option<ChainTransaction>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| RelayError::rpc(self.chain_id, "transaction_by_hash", e))?;

        Ok(tx.map(|tx| ChainTransaction {
            input: tx.input().clone(),
            value: tx.value(),
            is_pending: tx.block_number.is_none(),
        }))
    }

    async fn submit_signed_transaction(&self, raw: Bytes) -> RelayResult<TxHash> {
        let pending = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| RelayError::Broadcast {
                chain_id: self.chain_id,
                message: e.to_string(),
            })?;
        Ok(*pending.tx_hash())
    }
}

/// Dials plain HTTP endpoints
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpDialer;

#[async_trait]
impl Dialer for HttpDialer {
    async fn dial(&self, chain_id: ChainId, url: &str) -> RelayResult<Arc<dyn ChainRpc>> {
        Ok(Arc::new(EvmRpc::new(chain_id, url)?))
    }
}
