use alloy::primitives::Address;
use eyre::{eyre, Result, WrapErr};
use std::collections::HashSet;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::bounded_cache::{DEFAULT_REPLAY_CACHE_SIZE, DEFAULT_REPLAY_CACHE_TTL_SECS};
use crate::events::{parse_topic, EventCatalog};
use crate::redact::Redacted;
use crate::retry::RetryConfig;
use crate::rpc::parse_rpc_urls;
use crate::signer::KeyringSigner;
use crate::types::ChainId;

pub const DEFAULT_GAS_LIMIT: u64 = 4_600_000;
pub const DEFAULT_START_BLOCK: u64 = 1;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_MAX_BLOCK_RANGE: u64 = 10_000;
pub const DEFAULT_TX_CONFIRM_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_API_BIND_ADDR: &str = "0.0.0.0:9090";

/// Main configuration for the relay
#[derive(Debug, Clone)]
pub struct Config {
    pub chains: Vec<ChainConfig>,
    pub catalog: EventCatalog,
    pub relay: RelaySettings,
    /// Postgres URL for durable watermarks; in-memory when unset
    pub database_url: Option<Redacted<String>>,
    /// `None` disables the health/metrics listener
    pub api_bind_addr: Option<SocketAddr>,
}

/// How a chain's sender account signs
#[derive(Debug, Clone)]
pub enum Credential {
    PrivateKey(Redacted<String>),
    Keystore {
        path: PathBuf,
        password: Redacted<String>,
    },
}

/// One network, as configured
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub chain_id: ChainId,
    /// Primary first, then fallbacks
    pub rpc_urls: Vec<String>,
    pub bridge_address: Address,
    /// Legacy gas price in wei
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Expected sender; must match the credential when set
    pub from_address: Option<Address>,
    pub credential: Credential,
    pub start_block: u64,
}

impl ChainConfig {
    /// Chain with default gas limit and start block
    pub fn new(
        chain_id: ChainId,
        rpc_url: &str,
        bridge_address: Address,
        gas_price: u128,
        credential: Credential,
    ) -> Self {
        Self {
            name: format!("chain_{}", chain_id),
            chain_id,
            rpc_urls: parse_rpc_urls(rpc_url),
            bridge_address,
            gas_price,
            gas_limit: DEFAULT_GAS_LIMIT,
            from_address: None,
            credential,
            start_block: DEFAULT_START_BLOCK,
        }
    }

    /// Load the credential into `keyring` and return the sender address
    pub fn load_sender(&self, keyring: &mut KeyringSigner) -> Result<Address> {
        let address = match &self.credential {
            Credential::PrivateKey(key) => keyring
                .add_private_key(key)
                .wrap_err_with(|| format!("Chain {}: bad private key", self.name))?,
            Credential::Keystore { path, password } => keyring.add_keystore(path, password)?,
        };

        if let Some(expected) = self.from_address {
            if expected != address {
                return Err(eyre!(
                    "Chain {}: from address {} does not match credential address {}",
                    self.name,
                    expected,
                    address
                ));
            }
        }
        Ok(address)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(eyre!("Chain {}: at least one RPC URL is required", self.name));
        }
        for url in &self.rpc_urls {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(eyre!(
                    "Chain {}: RPC URL must start with http:// or https://",
                    self.name
                ));
            }
        }
        if self.gas_limit == 0 {
            return Err(eyre!("Chain {}: gas limit must be positive", self.name));
        }
        if self.chain_id.to_u64().is_none() {
            return Err(eyre!(
                "Chain {}: chain ID {} does not fit in 64 bits and cannot sign transactions",
                self.name,
                self.chain_id
            ));
        }
        Ok(())
    }
}

/// Polling and dispatch tuning shared by every chain
#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub poll_interval: Duration,
    /// Widest block range requested in one log query
    pub max_block_range: u64,
    /// How long to wait for a pending deposit to be mined
    pub tx_confirm_timeout: Duration,
    pub retry: RetryConfig,
    /// Stop polling after this long; `None` runs until shutdown
    pub max_run_duration: Option<Duration>,
    pub verbose: bool,
    /// Fetch logs from every address instead of only the bridge contract
    pub all_addresses: bool,
    pub replay_cache_size: usize,
    pub replay_cache_ttl: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_block_range: DEFAULT_MAX_BLOCK_RANGE,
            tx_confirm_timeout: Duration::from_millis(DEFAULT_TX_CONFIRM_TIMEOUT_MS),
            retry: RetryConfig::default(),
            max_run_duration: None,
            verbose: false,
            all_addresses: false,
            replay_cache_size: DEFAULT_REPLAY_CACHE_SIZE,
            replay_cache_ttl: Duration::from_secs(DEFAULT_REPLAY_CACHE_TTL_SECS),
        }
    }
}

impl RelaySettings {
    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(eyre!("POLL_INTERVAL_MS must be positive"));
        }
        if self.max_block_range == 0 {
            return Err(eyre!("MAX_BLOCK_RANGE must be positive"));
        }
        if self.tx_confirm_timeout.is_zero() {
            return Err(eyre!("TX_CONFIRM_TIMEOUT_MS must be positive"));
        }
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(eyre!(
                "RETRY_INITIAL_BACKOFF_MS cannot exceed RETRY_MAX_BACKOFF_MS"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration, reading `env_file` first when given, otherwise a
    /// `.env` in the working directory if present.
    pub fn load(env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(path) => {
                dotenvy::from_path(path)
                    .wrap_err_with(|| format!("Failed to load env file {}", path.display()))?;
            }
            None => {
                dotenvy::dotenv().ok();
            }
        }
        Self::load_from_env()
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Self> {
        let count: usize = required("CHAINS_COUNT")?
            .parse()
            .map_err(|_| eyre!("Invalid CHAINS_COUNT"))?;

        let fallback_key = optional("RELAYER_PRIVATE_KEY").map(Redacted);
        let mut chains = Vec::with_capacity(count);
        for i in 1..=count {
            chains.push(load_chain(i, fallback_key.as_ref())?);
        }

        let catalog = EventCatalog::new(
            parse_topic(&required("DEPOSIT_TOPIC")?).wrap_err("DEPOSIT_TOPIC")?,
            parse_topic(&required("BRIDGE_CREATED_TOPIC")?).wrap_err("BRIDGE_CREATED_TOPIC")?,
            parse_topic(&required("WITHDRAW_TOPIC")?).wrap_err("WITHDRAW_TOPIC")?,
            parse_topic(&required("BRIDGE_SET_TOPIC")?).wrap_err("BRIDGE_SET_TOPIC")?,
        )?;

        let relay = RelaySettings {
            poll_interval: Duration::from_millis(parse_or("POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)?),
            max_block_range: parse_or("MAX_BLOCK_RANGE", DEFAULT_MAX_BLOCK_RANGE)?,
            tx_confirm_timeout: Duration::from_millis(parse_or(
                "TX_CONFIRM_TIMEOUT_MS",
                DEFAULT_TX_CONFIRM_TIMEOUT_MS,
            )?),
            retry: RetryConfig {
                max_retries: parse_or("RETRY_ATTEMPTS", 5)?,
                initial_backoff: Duration::from_millis(parse_or("RETRY_INITIAL_BACKOFF_MS", 500)?),
                max_backoff: Duration::from_millis(parse_or("RETRY_MAX_BACKOFF_MS", 10_000)?),
                ..RetryConfig::default()
            },
            max_run_duration: optional("MAX_RUN_SECS")
                .map(|v| v.parse().map(Duration::from_secs))
                .transpose()
                .map_err(|_| eyre!("Invalid MAX_RUN_SECS"))?,
            verbose: flag("RELAY_VERBOSE")?,
            all_addresses: flag("RELAY_ALL_ADDRESSES")?,
            replay_cache_size: parse_or("REPLAY_CACHE_SIZE", DEFAULT_REPLAY_CACHE_SIZE)?,
            replay_cache_ttl: Duration::from_secs(parse_or(
                "REPLAY_CACHE_TTL_SECS",
                DEFAULT_REPLAY_CACHE_TTL_SECS,
            )?),
        };

        let api_bind_addr: Option<SocketAddr> = match optional("API_BIND_ADDR").as_deref() {
            Some("off") => None,
            Some(addr) => Some(addr.parse().map_err(|_| eyre!("Invalid API_BIND_ADDR {}", addr))?),
            None => Some(
                DEFAULT_API_BIND_ADDR
                    .parse()
                    .map_err(|_| eyre!("Invalid default API address"))?,
            ),
        };

        let config = Config {
            chains,
            catalog,
            relay,
            database_url: optional("DATABASE_URL").map(Redacted),
            api_bind_addr,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("At least one chain must be configured (CHAINS_COUNT)"));
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            chain.validate()?;
            if !seen.insert(chain.chain_id) {
                return Err(eyre!("Duplicate chain ID {}", chain.chain_id));
            }
        }

        self.relay.validate()
    }
}

fn load_chain(index: usize, fallback_key: Option<&Redacted<String>>) -> Result<ChainConfig> {
    let prefix = format!("CHAIN_{}", index);
    let key = |suffix: &str| format!("{}_{}", prefix, suffix);

    let name = optional(&key("NAME")).unwrap_or_else(|| format!("chain_{}", index));

    let chain_id: ChainId = required(&key("CHAIN_ID"))?
        .parse()
        .wrap_err_with(|| format!("Invalid {}", key("CHAIN_ID")))?;

    let rpc_urls = parse_rpc_urls(&required(&key("RPC_URL"))?);

    let bridge_address = parse_address(&key("BRIDGE_ADDRESS"), &required(&key("BRIDGE_ADDRESS"))?)?;

    let gas_price: u128 = required(&key("GAS_PRICE"))?
        .parse()
        .map_err(|_| eyre!("Invalid {}", key("GAS_PRICE")))?;

    let from_address = optional(&key("FROM_ADDRESS"))
        .map(|v| parse_address(&key("FROM_ADDRESS"), &v))
        .transpose()?;

    let credential = if let Some(private_key) = optional(&key("PRIVATE_KEY")) {
        Credential::PrivateKey(Redacted(private_key))
    } else if let Some(path) = optional(&key("KEYSTORE_PATH")) {
        let password = env::var(key("KEYSTORE_PASSWORD"))
            .map_err(|_| eyre!("Missing {} for keystore", key("KEYSTORE_PASSWORD")))?;
        Credential::Keystore {
            path: PathBuf::from(path),
            password: Redacted(password),
        }
    } else if let Some(private_key) = fallback_key {
        Credential::PrivateKey(private_key.clone())
    } else {
        return Err(eyre!(
            "{}: no credential; set {}, {} or RELAYER_PRIVATE_KEY",
            prefix,
            key("PRIVATE_KEY"),
            key("KEYSTORE_PATH")
        ));
    };

    Ok(ChainConfig {
        name,
        chain_id,
        rpc_urls,
        bridge_address,
        gas_price,
        gas_limit: parse_or(&key("GAS_LIMIT"), DEFAULT_GAS_LIMIT)?,
        from_address,
        credential,
        start_block: parse_or(&key("START_BLOCK"), DEFAULT_START_BLOCK)?,
    })
}

fn required(name: &str) -> Result<String> {
    optional(name).ok_or_else(|| eyre!("{} environment variable is required", name))
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match optional(name) {
        Some(v) => v.parse().map_err(|_| eyre!("Invalid {}: {:?}", name, v)),
        None => Ok(default),
    }
}

fn flag(name: &str) -> Result<bool> {
    match optional(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") => Ok(false),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some(other) => Err(eyre!("Invalid {}: {:?}", name, other)),
    }
}

/// 0x-prefixed, 40 hex chars
fn parse_address(name: &str, value: &str) -> Result<Address> {
    if !value.starts_with("0x") || value.len() != 42 {
        return Err(eyre!("{} must be a 0x-prefixed 20-byte address", name));
    }
    value
        .parse()
        .map_err(|e| eyre!("Invalid {}: {}", name, e))
}
