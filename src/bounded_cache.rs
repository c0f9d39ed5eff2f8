//! Replay guard for dispatched deposits.
//!
//! Each cycle starts with a fresh dedup set, so a deposit whose logs straddle
//! two cycles, or a watermark rewind after restart, could otherwise be relayed
//! twice. The guard remembers dispatched deposit hashes across cycles with a
//! TTL and a hard capacity.
//!
//! Each entry is ~48 bytes (32-byte key, Instant, sequence), so the default
//! 100k entries stay under 5 MB.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::TxHash;

pub const DEFAULT_REPLAY_CACHE_SIZE: usize = 100_000;
pub const DEFAULT_REPLAY_CACHE_TTL_SECS: u64 = 86_400; // 24 hours

/// Bounded set of deposit transaction hashes with TTL and capacity limits.
///
/// - When full, the oldest entry is evicted on insert.
/// - Expired entries are dropped before every insert.
#[derive(Debug)]
pub struct ReplayCache {
    map: HashMap<TxHash, (Instant, u64)>,
    max_size: usize,
    ttl: Duration,
    seq: u64,
}

impl ReplayCache {
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            max_size: max_size.max(1),
            ttl,
            seq: 0,
        }
    }

    pub fn contains(&self, hash: &TxHash) -> bool {
        self.map
            .get(hash)
            .is_some_and(|(t, _)| t.elapsed() < self.ttl)
    }

    /// Record `hash`; returns false if it was already present and live.
    pub fn insert(&mut self, hash: TxHash) -> bool {
        if self.contains(&hash) {
            return false;
        }

        let now = Instant::now();
        let ttl = self.ttl;
        self.map.retain(|_, (t, _)| now.duration_since(*t) < ttl);

        while self.map.len() >= self.max_size {
            let oldest = self
                .map
                .iter()
                .min_by_key(|(_, (_, seq))| *seq)
                .map(|(h, _)| *h);
            match oldest {
                Some(h) => {
                    self.map.remove(&h);
                }
                None => break,
            }
        }

        self.seq += 1;
        self.map.insert(hash, (now, self.seq));
        true
    }

    /// Forget `hash` so a later cycle may retry it
    pub fn remove(&mut self, hash: &TxHash) {
        self.map.remove(hash);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new(
            DEFAULT_REPLAY_CACHE_SIZE,
            Duration::from_secs(DEFAULT_REPLAY_CACHE_TTL_SECS),
        )
    }
}
