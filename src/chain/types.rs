//! Chain-specific types and error definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Transaction identifier as returned by the access API (lowercase hex).
pub type TransactionId = String;

/// An 8-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 8]);

impl Address {
    pub const ZERO: Address = Address([0u8; 8]);

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Hex form without the `0x` prefix, as used in event type identifiers.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl FromStr for Address {
    type Err = ChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        if raw.is_empty() || raw.len() > 16 {
            return Err(ChainError::InvalidAddress(s.to_string()));
        }
        // Short forms such as 0xf8d6 are left padded.
        let padded = format!("{:0>16}", raw);
        let bytes = hex::decode(&padded).map_err(|_| ChainError::InvalidAddress(s.to_string()))?;
        let mut out = [0u8; 8];
        out.copy_from_slice(&bytes);
        Ok(Address(out))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Errors that can occur during chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Address is not valid hex or has the wrong length.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Invalid private key format or signing error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// A configured proposal key is missing or revoked on the account.
    #[error("Proposal key {key_index} unavailable on account {address}")]
    KeyUnavailable { address: Address, key_index: u32 },

    /// Transaction was not sealed within the bounded wait.
    #[error("Transaction {0} not sealed within {1} seconds")]
    SealTimeout(TransactionId, u64),

    /// Transaction was sealed with an execution error.
    #[error("Transaction {id} failed: {message}")]
    Execution { id: TransactionId, message: String },

    /// Transaction was rejected for a stale proposal key sequence number.
    #[error("Transaction {id} lost a sequence number race: {message}")]
    SequenceRace { id: TransactionId, message: String },

    /// Reference block went out of range before the transaction sealed.
    #[error("Transaction {0} expired before sealing")]
    Expired(TransactionId),

    /// Chain integration disabled by configuration.
    #[error("Chain not available: {0}")]
    NotAvailable(String),
}

impl ChainError {
    /// False when the submitted transaction itself is at fault. Anything
    /// else is worth trying again on a later tick.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Execution { .. } | Self::InvalidAddress(_))
    }

    /// The node or the service account is unusable, so every other
    /// submission would fail the same way.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Rpc(_) | Self::Timeout(_) | Self::Wallet(_) | Self::KeyUnavailable { .. } | Self::NotAvailable(_)
        )
    }
}

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;

/// Error code the access node reports for a stale proposal sequence number.
const SEQUENCE_NUMBER_ERROR_CODE: &str = "[Error Code: 1007]";

pub fn is_sequence_number_error(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    message.contains(SEQUENCE_NUMBER_ERROR_CODE)
        || (lower.contains("invalid proposal key") && lower.contains("sequence number"))
}

/// Header of a sealed block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block id (hex).
    pub id: String,
    pub height: u64,
}

/// Lifecycle status of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Unknown,
    Pending,
    Finalized,
    Executed,
    Sealed,
    Expired,
}

impl TransactionStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "Pending" => Self::Pending,
            "Finalized" => Self::Finalized,
            "Executed" => Self::Executed,
            "Sealed" => Self::Sealed,
            "Expired" => Self::Expired,
            _ => Self::Unknown,
        }
    }
}

/// Execution result of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    pub status: TransactionStatus,
    /// Non-empty when execution failed.
    pub error_message: Option<String>,
}

impl TransactionResult {
    pub fn sealed() -> Self {
        Self { status: TransactionStatus::Sealed, error_message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { status: TransactionStatus::Sealed, error_message: Some(message.into()) }
    }

    pub fn with_status(status: TransactionStatus) -> Self {
        Self { status, error_message: None }
    }
}

/// Subset of a submitted transaction needed by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub authorizers: Vec<Address>,
}

/// A public key registered on an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKey {
    pub index: u32,
    pub sequence_number: u64,
    pub revoked: bool,
}

/// Account state as seen by the access API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub keys: Vec<AccountKey>,
}

impl Account {
    pub fn key(&self, index: u32) -> Option<&AccountKey> {
        self.keys.iter().find(|k| k.index == index && !k.revoked)
    }

    pub fn key_mut(&mut self, index: u32) -> Option<&mut AccountKey> {
        self.keys.iter_mut().find(|k| k.index == index && !k.revoked)
    }
}

/// A chain event with its JSON-Cadence payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainEvent {
    pub event_type: String,
    pub transaction_id: TransactionId,
    pub block_height: u64,
    pub payload: serde_json::Value,
}
