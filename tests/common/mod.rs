//! In-memory chain, dialer and signer fakes for relay tests

#![allow(dead_code)]

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bridge_relay::codec::encode_deposit_payload;
use bridge_relay::events::keccak256;
use bridge_relay::redact::Redacted;
use bridge_relay::retry::RetryConfig;
use bridge_relay::rpc::{ChainRpc, ChainTransaction, Dialer, LogEntry, LogFilter};
use bridge_relay::signer::{TransactionSigner, UnsignedTransaction};
use bridge_relay::watermark::{MemoryWatermarkStore, WatermarkStore};
use bridge_relay::{
    Chain, ChainConfig, ChainId, ChainRegistry, Credential, EventCatalog, RelayContext,
    RelayError, RelayResult, RelaySettings, TxHash,
};

pub fn sender() -> Address {
    Address::repeat_byte(0xaa)
}

pub fn deposit_topic() -> B256 {
    B256::repeat_byte(0xd1)
}
pub fn bridge_created_topic() -> B256 {
    B256::repeat_byte(0xd2)
}
pub fn withdraw_topic() -> B256 {
    B256::repeat_byte(0xd3)
}
pub fn bridge_set_topic() -> B256 {
    B256::repeat_byte(0xd4)
}

pub fn catalog() -> EventCatalog {
    EventCatalog::new(
        deposit_topic(),
        bridge_created_topic(),
        withdraw_topic(),
        bridge_set_topic(),
    )
    .unwrap()
}

pub fn bridge_of(chain_id: u64) -> Address {
    let mut bytes = [0xbbu8; 20];
    bytes[12..].copy_from_slice(&chain_id.to_be_bytes());
    Address::from(bytes)
}

pub fn url_of(chain_id: u64) -> String {
    format!("http://chain-{}", chain_id)
}

/// A chain whose RPC URL is `http://chain-{id}` and whose bridge address
/// encodes its ID
pub fn chain(chain_id: u64) -> Chain {
    let mut config = ChainConfig::new(
        ChainId::from_u64(chain_id),
        &url_of(chain_id),
        bridge_of(chain_id),
        1_000_000_000 + chain_id as u128,
        Credential::PrivateKey(Redacted(String::new())),
    );
    config.gas_limit = 4_600_000;
    Chain::new(&config, sender())
}

pub fn fast_settings() -> RelaySettings {
    RelaySettings {
        poll_interval: Duration::from_millis(10),
        tx_confirm_timeout: Duration::from_millis(300),
        retry: RetryConfig {
            max_retries: 3,
            initial_backoff: Duration::from_millis(5),
            max_backoff: Duration::from_millis(20),
            backoff_multiplier: 2.0,
        },
        ..RelaySettings::default()
    }
}

pub struct Harness {
    pub ctx: Arc<RelayContext>,
    pub dialer: Arc<MockDialer>,
    pub signer: Arc<RecordingSigner>,
    pub watermarks: Arc<MemoryWatermarkStore>,
}

/// Build a context over `chains`, each backed by a fresh [`MockChain`]
pub fn harness(chain_ids: &[u64], settings: RelaySettings) -> Harness {
    harness_with(chain_ids, settings, Arc::new(MemoryWatermarkStore::new()))
}

pub fn harness_with(
    chain_ids: &[u64],
    settings: RelaySettings,
    watermarks: Arc<MemoryWatermarkStore>,
) -> Harness {
    let dialer = Arc::new(MockDialer::default());
    for &id in chain_ids {
        dialer.route(&url_of(id), Arc::new(MockChain::new(id)));
    }
    let signer = Arc::new(RecordingSigner::default());
    let registry = ChainRegistry::new(chain_ids.iter().map(|&id| chain(id)).collect()).unwrap();
    let store: Arc<dyn WatermarkStore> = watermarks.clone();

    let ctx = Arc::new(RelayContext::new(
        registry,
        catalog(),
        signer.clone(),
        dialer.clone(),
        settings,
        store,
    ));

    Harness {
        ctx,
        dialer,
        signer,
        watermarks,
    }
}

impl Harness {
    pub fn mock(&self, chain_id: u64) -> Arc<MockChain> {
        self.dialer.get(&url_of(chain_id)).unwrap()
    }

    pub fn chain(&self, chain_id: u64) -> Arc<Chain> {
        self.ctx.registry.resolve(&ChainId::from_u64(chain_id)).unwrap()
    }
}

/// Scriptable in-memory chain
pub struct MockChain {
    pub chain_id: u64,
    pub latest_block: AtomicU64,
    pub nonce: AtomicU64,
    pub fail_broadcast: AtomicBool,
    pub fail_logs: AtomicBool,
    /// Number of upcoming `account_nonce` calls that time out
    pub nonce_failures: AtomicU32,
    pub nonce_queries: AtomicU32,
    logs: Mutex<Vec<LogEntry>>,
    transactions: Mutex<HashMap<TxHash, ChainTransaction>>,
    submitted: Mutex<Vec<Bytes>>,
    filters: Mutex<Vec<LogFilter>>,
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            latest_block: AtomicU64::new(0),
            nonce: AtomicU64::new(0),
            fail_broadcast: AtomicBool::new(false),
            fail_logs: AtomicBool::new(false),
            nonce_failures: AtomicU32::new(0),
            nonce_queries: AtomicU32::new(0),
            logs: Mutex::new(Vec::new()),
            transactions: Mutex::new(HashMap::new()),
            submitted: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
        }
    }

    pub fn set_latest(&self, block: u64) {
        self.latest_block.store(block, Ordering::SeqCst);
    }

    pub fn add_log(&self, log: LogEntry) {
        self.logs.lock().unwrap().push(log);
    }

    pub fn clear_logs(&self) {
        self.logs.lock().unwrap().clear();
    }

    pub fn set_transaction(&self, hash: TxHash, tx: ChainTransaction) {
        self.transactions.lock().unwrap().insert(hash, tx);
    }

    /// Mined deposit to `dest_chain` carrying `value`
    pub fn add_deposit_tx(&self, hash: TxHash, recipient: Address, dest_chain: u64, value: u64) {
        self.set_transaction(
            hash,
            ChainTransaction {
                input: encode_deposit_payload(recipient, &ChainId::from_u64(dest_chain)),
                value: U256::from(value),
                is_pending: false,
            },
        );
    }

    pub fn submitted(&self) -> Vec<Bytes> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn filters(&self) -> Vec<LogFilter> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn chain_id(&self) -> RelayResult<U256> {
        Ok(U256::from(self.chain_id))
    }

    async fn latest_block_number(&self) -> RelayResult<u64> {
        Ok(self.latest_block.load(Ordering::SeqCst))
    }

    async fn account_nonce(&self, _address: Address) -> RelayResult<u64> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .nonce_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RelayError::RpcQuery {
                chain_id: ChainId::from_u64(self.chain_id),
                query: "account_nonce",
                message: "transient timeout".into(),
            });
        }
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn filter_logs(&self, filter: &LogFilter) -> RelayResult<Vec<LogEntry>> {
        self.filters.lock().unwrap().push(filter.clone());
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(RelayError::RpcQuery {
                chain_id: ChainId::from_u64(self.chain_id),
                query: "filter_logs",
                message: "query timeout".into(),
            });
        }
        let logs = self.logs.lock().unwrap();
        Ok(logs
            .iter()
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= filter.from_block && b <= filter.to_block)
            })
            .filter(|log| filter.addresses.is_empty() || filter.addresses.contains(&log.address))
            .cloned()
            .collect())
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> RelayResult<Option<ChainTransaction>> {
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }

    async fn submit_signed_transaction(&self, raw: Bytes) -> RelayResult<TxHash> {
        if self.fail_broadcast.load(Ordering::SeqCst) {
            return Err(RelayError::Broadcast {
                chain_id: ChainId::from_u64(self.chain_id),
                message: "nonce too low".into(),
            });
        }
        let hash = B256::from(keccak256(&raw));
        self.submitted.lock().unwrap().push(raw);
        self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(hash)
    }
}

/// Routes URLs to mock chains; unknown URLs fail to dial
#[derive(Default)]
pub struct MockDialer {
    routes: Mutex<HashMap<String, Arc<MockChain>>>,
    dials: Mutex<Vec<String>>,
}

impl MockDialer {
    pub fn route(&self, url: &str, chain: Arc<MockChain>) {
        self.routes.lock().unwrap().insert(url.to_string(), chain);
    }

    pub fn unroute(&self, url: &str) {
        self.routes.lock().unwrap().remove(url);
    }

    pub fn get(&self, url: &str) -> Option<Arc<MockChain>> {
        self.routes.lock().unwrap().get(url).cloned()
    }

    pub fn dials(&self) -> Vec<String> {
        self.dials.lock().unwrap().clone()
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(&self, chain_id: ChainId, url: &str) -> RelayResult<Arc<dyn ChainRpc>> {
        self.dials.lock().unwrap().push(url.to_string());
        match self.get(url) {
            Some(chain) => Ok(chain as Arc<dyn ChainRpc>),
            None => Err(RelayError::Connection {
                chain_id,
                message: format!("connection refused: {}", url),
            }),
        }
    }
}

/// Records every transaction and returns its calldata as the "signed" bytes
#[derive(Default)]
pub struct RecordingSigner {
    pub fail: AtomicBool,
    signed: Mutex<Vec<(Address, UnsignedTransaction)>>,
}

impl RecordingSigner {
    pub fn signed(&self) -> Vec<(Address, UnsignedTransaction)> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransactionSigner for RecordingSigner {
    async fn sign_transaction(&self, from: Address, tx: UnsignedTransaction) -> RelayResult<Bytes> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::Signing {
                chain_id: ChainId::from_u64(tx.chain_id),
                message: "keystore locked".into(),
            });
        }
        let raw = tx.input.clone();
        self.signed.lock().unwrap().push((from, tx));
        Ok(raw)
    }
}

pub fn tx_hash(n: u8) -> TxHash {
    TxHash::repeat_byte(n)
}

pub fn log(address: Address, topic: B256, tx: TxHash, block: u64) -> LogEntry {
    LogEntry {
        address,
        topics: vec![topic],
        transaction_hash: Some(tx),
        block_number: Some(block),
    }
}
