//! Transaction signing for relayer accounts

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{RelayError, RelayResult};
use crate::redact::Redacted;
use crate::types::ChainId;

/// A legacy transaction ready to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub input: Bytes,
    pub chain_id: u64,
}

/// Signs transactions on behalf of configured sender accounts
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// EIP-2718 encoded signed transaction
    async fn sign_transaction(&self, from: Address, tx: UnsignedTransaction) -> RelayResult<Bytes>;
}

/// Local keys indexed by account address
#[derive(Default)]
pub struct KeyringSigner {
    wallets: HashMap<Address, EthereumWallet>,
}

impl KeyringSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hex private key, with or without 0x prefix
    pub fn add_private_key(&mut self, private_key: &Redacted<String>) -> Result<Address> {
        let signer: PrivateKeySigner = private_key
            .expose()
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid private key: {}", e))?;
        Ok(self.add_signer(signer))
    }

    /// Decrypt a JSON keystore file
    pub fn add_keystore(&mut self, path: &Path, password: &Redacted<String>) -> Result<Address> {
        let signer = PrivateKeySigner::decrypt_keystore(path, password.expose())
            .wrap_err_with(|| format!("Failed to decrypt keystore {}", path.display()))?;
        Ok(self.add_signer(signer))
    }

    fn add_signer(&mut self, signer: PrivateKeySigner) -> Address {
        let address = signer.address();
        self.wallets.insert(address, EthereumWallet::from(signer));
        info!(address = %address, "Loaded signing key");
        address
    }

    pub fn has_key(&self, address: &Address) -> bool {
        self.wallets.contains_key(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.wallets.keys()
    }
}

impl std::fmt::Debug for KeyringSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringSigner")
            .field("accounts", &self.wallets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl TransactionSigner for KeyringSigner {
    async fn sign_transaction(&self, from: Address, tx: UnsignedTransaction) -> RelayResult<Bytes> {
        let chain_id = ChainId::from_u64(tx.chain_id);
        let wallet = self.wallets.get(&from).ok_or_else(|| RelayError::Signing {
            chain_id,
            message: format!("no signing key for account {}", from),
        })?;

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(tx.to)
            .with_nonce(tx.nonce)
            .with_value(tx.value)
            .with_gas_limit(tx.gas_limit)
            .with_gas_price(tx.gas_price)
            .with_input(tx.input)
            .with_chain_id(tx.chain_id);

        let envelope = request
            .build(wallet)
            .await
            .map_err(|e| RelayError::Signing {
                chain_id,
                message: e.to_string(),
            })?;

        Ok(envelope.encoded_2718().into())
    }
}
