//! Bridge event catalog and topic classification

use alloy::primitives::B256;
use eyre::{eyre, Result};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

/// Semantic kind of a bridge contract event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    BridgeCreated,
    Withdraw,
    BridgeSet,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::BridgeCreated => "bridge_created",
            EventKind::Withdraw => "withdraw",
            EventKind::BridgeSet => "bridge_set",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topic hashes of the four bridge events. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCatalog {
    deposit: B256,
    bridge_created: B256,
    withdraw: B256,
    bridge_set: B256,
}

impl EventCatalog {
    pub fn new(deposit: B256, bridge_created: B256, withdraw: B256, bridge_set: B256) -> Result<Self> {
        let catalog = Self {
            deposit,
            bridge_created,
            withdraw,
            bridge_set,
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Map a log topic to its event kind; unknown topics yield `None`
    pub fn classify(&self, topic: &B256) -> Option<EventKind> {
        self.entries()
            .into_iter()
            .find(|(_, hash)| hash == topic)
            .map(|(kind, _)| kind)
    }

    pub fn topic(&self, kind: EventKind) -> B256 {
        match kind {
            EventKind::Deposit => self.deposit,
            EventKind::BridgeCreated => self.bridge_created,
            EventKind::Withdraw => self.withdraw,
            EventKind::BridgeSet => self.bridge_set,
        }
    }

    fn entries(&self) -> [(EventKind, B256); 4] {
        [
            (EventKind::Deposit, self.deposit),
            (EventKind::BridgeCreated, self.bridge_created),
            (EventKind::Withdraw, self.withdraw),
            (EventKind::BridgeSet, self.bridge_set),
        ]
    }

    fn validate(&self) -> Result<()> {
        let entries = self.entries();
        for (i, (kind, hash)) in entries.iter().enumerate() {
            if let Some((other, _)) = entries[i + 1..].iter().find(|(_, h)| h == hash) {
                return Err(eyre!("{} and {} share topic {}", kind, other, hash));
            }
        }
        Ok(())
    }
}

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

/// Parse a configured topic: either a 0x-prefixed 32-byte hash or an event
/// signature such as `Deposit(address,uint256)`.
pub fn parse_topic(value: &str) -> Result<B256> {
    let value = value.trim();
    if let Some(hex_part) = value.strip_prefix("0x") {
        let bytes = hex::decode(hex_part).map_err(|e| eyre!("Invalid topic hash {}: {}", value, e))?;
        if bytes.len() != 32 {
            return Err(eyre!("Topic hash must be 32 bytes, got {}", bytes.len()));
        }
        return Ok(B256::from_slice(&bytes));
    }
    if value.contains('(') && value.ends_with(')') {
        return Ok(B256::from(keccak256(value.as_bytes())));
    }
    Err(eyre!(
        "Topic {:?} is neither a 0x hash nor an event signature",
        value
    ))
}
