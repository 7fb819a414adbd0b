//! Chain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment variable (private key)
//!     → wallet.rs (key loading, envelope signing)
//! keys.rs (round-robin proposal key + sequence number)
//!     → envelope.rs (payload/envelope encoding)
//!     → transaction.rs (build, sign, submit, wait for seal)
//!     → gateway.rs (access API contract)
//!         → client.rs (REST access node, timeouts + failover)
//!         → memory.rs (in-process chain)
//! cadence.rs: argument values in, event fields out
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod cadence;
pub mod client;
pub mod envelope;
pub mod gateway;
pub mod keys;
pub mod memory;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::FlowRestGateway;
pub use gateway::ChainGateway;
pub use keys::KeySource;
pub use memory::InMemoryChain;
pub use transaction::TransactionSender;
pub use types::{Address, ChainError, ChainEvent, ChainResult, TransactionId};
pub use wallet::Wallet;
