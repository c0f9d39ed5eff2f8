//! Chain RPC collaborator interface
//!
//! The relay core talks to chains only through these traits. `evm` holds the
//! alloy HTTP implementation used by the binary; tests plug in fakes.

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RelayResult;
use crate::types::{ChainId, TxHash};

pub mod evm;

pub use evm::{parse_rpc_urls, EvmRpc, HttpDialer};

/// A log entry as returned by `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub transaction_hash: Option<TxHash>,
    pub block_number: Option<u64>,
}

/// Inclusive block range, optionally restricted to contract addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: u64,
    pub to_block: u64,
    /// Empty means every address
    pub addresses: Vec<Address>,
}

/// The parts of a transaction the relay reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub input: Bytes,
    pub value: U256,
    pub is_pending: bool,
}

/// A connected chain client
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Chain ID reported by the node
    async fn chain_id(&self) -> RelayResult<U256>;

    async fn latest_block_number(&self) -> RelayResult<u64>;

    /// Next nonce for `address`, counting pending transactions
    async fn account_nonce(&self, address: Address) -> RelayResult<u64>;

    async fn filter_logs(&self, filter: &LogFilter) -> RelayResult<Vec<LogEntry>>;

    /// `None` when the node does not know the transaction
    async fn transaction_by_hash(&self, hash: TxHash) -> RelayResult<Option<ChainTransaction>>;

    async fn submit_signed_transaction(&self, raw: Bytes) -> RelayResult<TxHash>;
}

/// Opens a client for one RPC endpoint
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, chain_id: ChainId, url: &str) -> RelayResult<Arc<dyn ChainRpc>>;
}
