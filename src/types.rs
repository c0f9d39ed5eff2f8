//! Common types for cross-chain relaying
//!
//! Chain identifiers arrive both from configuration (decimal text) and from
//! deposit calldata (a 32-byte ABI word). Both forms collapse into the same
//! fixed-width [`ChainId`] so lookups compare by value.

use alloy::primitives::{B256, U256};
use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Transaction hash on any configured chain
pub type TxHash = B256;

/// Chain identifier, stored as a 32-byte big-endian word.
///
/// Equality and hashing are on the bytes, so two independently decoded
/// copies of the same numeric ID are interchangeable as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ChainId(pub [u8; 32]);

impl ChainId {
    /// Create from u64
    pub fn from_u64(id: u64) -> Self {
        Self::from_u256(U256::from(id))
    }

    /// Create from a 256-bit integer
    pub fn from_u256(id: U256) -> Self {
        ChainId(id.to_be_bytes::<32>())
    }

    /// Create from a 32-byte big-endian slice
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let word: [u8; 32] = bytes
            .try_into()
            .map_err(|_| eyre!("ChainId must be 32 bytes, got {}", bytes.len()))?;
        Ok(ChainId(word))
    }

    /// Create from hex string (with or without 0x prefix), at most 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        if hex.is_empty() || hex.len() > 64 {
            return Err(eyre!("ChainId hex must be 1-64 chars, got {}", hex.len()));
        }
        let padded = format!("{:0>64}", hex);
        let bytes = hex::decode(padded)?;
        Self::from_slice(&bytes)
    }

    /// The numeric value
    pub fn to_u256(&self) -> U256 {
        U256::from_be_bytes(self.0)
    }

    /// The numeric value if it fits in 64 bits (EIP-155 signing needs this)
    pub fn to_u64(&self) -> Option<u64> {
        self.to_u256().try_into().ok()
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 64 hex characters, no prefix
    pub fn to_padded_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_u256())
    }
}

impl FromStr for ChainId {
    type Err = eyre::Error;

    /// Accepts decimal (`56`) or 0x-prefixed hex (`0x38`)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("0x") {
            return Self::from_hex(s);
        }
        let value = U256::from_str_radix(s, 10).map_err(|e| eyre!("Invalid chain ID {:?}: {}", s, e))?;
        Ok(Self::from_u256(value))
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId::from_u64(id)
    }
}

impl From<U256> for ChainId {
    fn from(id: U256) -> Self {
        ChainId::from_u256(id)
    }
}
