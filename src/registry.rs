//! Chain registry: lookup of configured chains by ID value

use eyre::{eyre, Result};
use std::collections::HashMap;
use std::sync::Arc;

use crate::chain::Chain;
use crate::error::{RelayError, RelayResult};
use crate::types::ChainId;

/// All configured chains. Read-only after construction.
#[derive(Debug, Default)]
pub struct ChainRegistry {
    by_id: HashMap<ChainId, Arc<Chain>>,
    ordered: Vec<Arc<Chain>>,
}

impl ChainRegistry {
    pub fn new(chains: Vec<Chain>) -> Result<Self> {
        let mut registry = Self::default();
        for chain in chains {
            let chain = Arc::new(chain);
            if registry.by_id.contains_key(&chain.id) {
                return Err(eyre!("Duplicate chain ID {} ({})", chain.id, chain.name));
            }
            registry.by_id.insert(chain.id, chain.clone());
            registry.ordered.push(chain);
        }
        Ok(registry)
    }

    /// Look up a chain by numeric value
    pub fn resolve(&self, id: &ChainId) -> RelayResult<Arc<Chain>> {
        self.by_id
            .get(id)
            .cloned()
            .ok_or(RelayError::UnknownChain(*id))
    }

    /// Chains in configuration order
    pub fn chains(&self) -> impl Iterator<Item = &Arc<Chain>> {
        self.ordered.iter()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
