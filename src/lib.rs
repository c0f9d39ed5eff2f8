//! Bridge relay - library interface
//!
//! Watches bridge contracts on several EVM chains and turns each deposit on
//! one chain into a withdrawal on the chain it names.
//!
//! Modules are public for use in integration tests.

pub mod api;
pub mod bounded_cache;
pub mod chain;
pub mod codec;
pub mod config;
pub mod dedup;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod metrics;
pub mod poller;
pub mod processor;
pub mod redact;
pub mod registry;
pub mod relayer;
pub mod retry;
pub mod rpc;
pub mod signer;
pub mod types;
pub mod watermark;

pub use chain::Chain;
pub use codec::WithdrawalRequest;
pub use config::{ChainConfig, Config, Credential, RelaySettings};
pub use error::{RelayError, RelayResult};
pub use events::{EventCatalog, EventKind};
pub use registry::ChainRegistry;
pub use relayer::{RelayContext, Relayer};
pub use types::{ChainId, TxHash};
