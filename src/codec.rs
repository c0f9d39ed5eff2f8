//! Bridge contract calldata encoding
//!
//! The bridge contract exposes a fixed, unversioned calling convention. All
//! selectors and byte offsets live here and nowhere else.
//!
//! ## Deposit frame
//!
//! ```text
//! [0, 4)    deposit selector 0x47e7ef24
//! [4, 16)   zero padding of the address word
//! [16, 36)  recipient address on the destination chain
//! [36, 68)  destination chain ID (uint256)
//! ```
//!
//! ## Withdrawal call
//!
//! ```text
//! withdraw selector 0xb5c5f672 | 12 zero bytes | recipient (20) | value (32) | source chain (32)
//! ```

use alloy::primitives::{Address, Bytes, U256};
use std::ops::Range;
use thiserror::Error;

use crate::types::ChainId;

/// `deposit(address,uint256)`
pub const DEPOSIT_SELECTOR: [u8; 4] = [0x47, 0xe7, 0xef, 0x24];
/// `withdraw(address,uint256,uint256)`
pub const WITHDRAW_SELECTOR: [u8; 4] = [0xb5, 0xc5, 0xf6, 0x72];
/// `setBridge(address)`
pub const SET_BRIDGE_SELECTOR: [u8; 4] = [0x8d, 0xd1, 0x48, 0x02];

/// Zero bytes preceding a 20-byte address inside a 32-byte word
pub const ADDRESS_PADDING: [u8; 12] = [0u8; 12];

/// One ABI word, in hex characters
pub const WORD_HEX_LEN: usize = 64;

const SELECTOR_LEN: usize = 4;
const RECIPIENT_RANGE: Range<usize> = 16..36;
const DEST_CHAIN_RANGE: Range<usize> = 36..68;

/// Minimum byte length of a decodable deposit call
pub const DEPOSIT_FRAME_LEN: usize = DEST_CHAIN_RANGE.end;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("input is not a deposit call")]
    NotABridgeCall,

    #[error("deposit call truncated: {len} bytes, need {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("value needs {0} hex chars, exceeds one 32-byte word")]
    PayloadTooLarge(usize),

    #[error("invalid hex payload: {0}")]
    InvalidHex(String),
}

/// Fields recovered from a deposit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositPayload {
    pub recipient: Address,
    pub destination_chain: ChainId,
}

/// A withdrawal to perform on the destination chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalRequest {
    pub recipient: Address,
    pub value: U256,
    pub source_chain: ChainId,
    pub destination_chain: ChainId,
    /// `recipient_hex + pad32(value) + pad32(source_chain)`
    pub data: String,
}

impl WithdrawalRequest {
    pub fn new(
        recipient: Address,
        value: U256,
        source_chain: ChainId,
        destination_chain: ChainId,
    ) -> Result<Self, CodecError> {
        let value_word = encode_fixed_width(&value.to_be_bytes::<32>())?;
        let data = format!(
            "{}{}{}",
            hex::encode(recipient),
            value_word,
            source_chain.to_padded_hex()
        );
        Ok(Self {
            recipient,
            value,
            source_chain,
            destination_chain,
            data,
        })
    }
}

/// Hex-encode a big-endian integer and left-pad it to exactly one word.
///
/// Leading zero bytes are not part of the natural representation, so a
/// 33-byte input starting with a zero byte still fits.
pub fn encode_fixed_width(bytes: &[u8]) -> Result<String, CodecError> {
    let first_nonzero = bytes.iter().position(|&b| b != 0).unwrap_or(bytes.len());
    let natural = hex::encode(&bytes[first_nonzero..]);
    if natural.len() > WORD_HEX_LEN {
        return Err(CodecError::PayloadTooLarge(natural.len()));
    }
    Ok(format!("{:0>width$}", natural, width = WORD_HEX_LEN))
}

/// Extract recipient and destination chain from deposit calldata.
pub fn decode_deposit_payload(input: &[u8]) -> Result<DepositPayload, CodecError> {
    if input.len() < SELECTOR_LEN || input[..SELECTOR_LEN] != DEPOSIT_SELECTOR {
        return Err(CodecError::NotABridgeCall);
    }
    if input.len() < DEPOSIT_FRAME_LEN {
        return Err(CodecError::Truncated {
            len: input.len(),
            needed: DEPOSIT_FRAME_LEN,
        });
    }

    let recipient = Address::from_slice(&input[RECIPIENT_RANGE]);
    let mut chain_word = [0u8; 32];
    chain_word.copy_from_slice(&input[DEST_CHAIN_RANGE]);

    Ok(DepositPayload {
        recipient,
        destination_chain: ChainId(chain_word),
    })
}

/// Build deposit calldata; inverse of [`decode_deposit_payload`].
pub fn encode_deposit_payload(recipient: Address, destination_chain: &ChainId) -> Bytes {
    let mut data = Vec::with_capacity(DEPOSIT_FRAME_LEN);
    data.extend_from_slice(&DEPOSIT_SELECTOR);
    data.extend_from_slice(&ADDRESS_PADDING);
    data.extend_from_slice(recipient.as_slice());
    data.extend_from_slice(destination_chain.as_bytes());
    data.into()
}

/// Full withdrawal call as hex (no 0x prefix).
pub fn encode_withdrawal_payload(withdrawal: &WithdrawalRequest) -> String {
    format!(
        "{}{}{}",
        hex::encode(WITHDRAW_SELECTOR),
        hex::encode(ADDRESS_PADDING),
        withdrawal.data
    )
}

/// Withdrawal call as transaction input bytes
pub fn withdrawal_calldata(withdrawal: &WithdrawalRequest) -> Result<Bytes, CodecError> {
    let payload = encode_withdrawal_payload(withdrawal);
    hex::decode(&payload)
        .map(Bytes::from)
        .map_err(|e| CodecError::InvalidHex(e.to_string()))
}

/// `setBridge(contract)` calldata
pub fn encode_set_bridge_payload(contract: Address) -> Bytes {
    let mut data = Vec::with_capacity(SELECTOR_LEN + 32);
    data.extend_from_slice(&SET_BRIDGE_SELECTOR);
    data.extend_from_slice(&ADDRESS_PADDING);
    data.extend_from_slice(contract.as_slice());
    data.into()
}
