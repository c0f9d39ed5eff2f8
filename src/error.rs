//! Relay error taxonomy
//!
//! Each variant carries its own propagation policy: some drop a single
//! deposit, some end one chain's poller, and signing failures stop the
//! whole process.

use thiserror::Error;

use crate::codec::CodecError;
use crate::types::{ChainId, TxHash};

pub type RelayResult<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Could not dial any RPC endpoint of a chain
    #[error("chain {chain_id}: connection failed: {message}")]
    Connection { chain_id: ChainId, message: String },

    /// A read query against a connected chain failed
    #[error("chain {chain_id}: rpc query `{query}` failed: {message}")]
    RpcQuery {
        chain_id: ChainId,
        query: &'static str,
        message: String,
    },

    /// Deposit names a destination chain that is not configured
    #[error("unknown destination chain {0}")]
    UnknownChain(ChainId),

    /// Deposit calldata carries the deposit selector but cannot be decoded
    #[error("malformed deposit payload: {0}")]
    MalformedPayload(String),

    /// Transaction input is not a bridge deposit call at all
    #[error("transaction is not a bridge deposit call")]
    NotABridgeCall,

    /// A value does not fit in one 32-byte ABI word
    #[error("payload too large: {0} hex chars exceeds one 32-byte word")]
    PayloadTooLarge(usize),

    /// The deposit transaction never left the pending state in time
    #[error("deposit {tx_hash} on chain {chain_id} still unresolved after {waited_ms} ms")]
    DepositUnresolved {
        chain_id: ChainId,
        tx_hash: TxHash,
        waited_ms: u128,
    },

    /// No usable signing key for an account
    #[error("chain {chain_id}: signing failed: {message}")]
    Signing { chain_id: ChainId, message: String },

    /// Signed transaction was rejected by the node
    #[error("chain {chain_id}: broadcast failed: {message}")]
    Broadcast { chain_id: ChainId, message: String },

    /// Watermark store failure
    #[error("chain {chain_id}: watermark store: {message}")]
    Watermark { chain_id: ChainId, message: String },
}

impl RelayError {
    /// Error ends the poller of the chain it occurred on
    pub fn is_fatal_for_chain(&self) -> bool {
        matches!(self, RelayError::Connection { .. }) || self.is_fatal_for_process()
    }

    /// Error must stop every poller
    pub fn is_fatal_for_process(&self) -> bool {
        matches!(self, RelayError::Signing { .. })
    }

    /// Short label used for the errors metric
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Connection { .. } => "connection",
            RelayError::RpcQuery { .. } => "rpc_query",
            RelayError::UnknownChain(_) => "unknown_chain",
            RelayError::MalformedPayload(_) => "malformed_payload",
            RelayError::NotABridgeCall => "not_a_bridge_call",
            RelayError::PayloadTooLarge(_) => "payload_too_large",
            RelayError::DepositUnresolved { .. } => "deposit_unresolved",
            RelayError::Signing { .. } => "signing",
            RelayError::Broadcast { .. } => "broadcast",
            RelayError::Watermark { .. } => "watermark",
        }
    }

    pub(crate) fn rpc(chain_id: ChainId, query: &'static str, err: impl std::fmt::Display) -> Self {
        RelayError::RpcQuery {
            chain_id,
            query,
            message: err.to_string(),
        }
    }
}

impl From<CodecError> for RelayError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::NotABridgeCall => RelayError::NotABridgeCall,
            CodecError::PayloadTooLarge(len) => RelayError::PayloadTooLarge(len),
            other => RelayError::MalformedPayload(other.to_string()),
        }
    }
}
