//! Persisted transaction envelope and its submission state machine.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::chain::cadence;
use crate::chain::types::{is_sequence_number_error, TransactionResult, TransactionStatus};
use crate::chain::TransactionId;
use crate::domain::TransitionError;
use crate::error::PdsResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Init,
    Retry,
    Sent,
    Failed,
    Complete,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Retry => "retry",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of inspecting a sent transaction's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Not final yet; check again later.
    Pending,
    Complete,
    /// Resubmit with a fresh proposal key. `sequence_race` asks the caller
    /// to drop its cached key sequence numbers.
    Retry { sequence_race: bool, reason: String },
    Failed(String),
}

pub fn classify(result: &TransactionResult) -> Classification {
    if let Some(message) = result.error_message.as_deref().filter(|m| !m.is_empty()) {
        if is_sequence_number_error(message) {
            return Classification::Retry { sequence_race: true, reason: message.to_string() };
        }
        return Classification::Failed(message.to_string());
    }
    match result.status {
        TransactionStatus::Sealed => Classification::Complete,
        TransactionStatus::Expired => Classification::Retry {
            sequence_race: false,
            reason: "transaction expired".to_string(),
        },
        _ => Classification::Pending,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorableTransaction {
    pub id: Uuid,
    /// Kind tag, e.g. `settle`, `mint`, `reveal`.
    pub name: String,
    pub script: String,
    /// JSON array of base64-encoded JSON-Cadence argument blobs.
    pub arguments: String,
    pub state: TransactionState,
    pub retry_count: u32,
    pub error: Option<String>,
    pub transaction_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StorableTransaction {
    pub fn new(name: impl Into<String>, script: impl Into<String>, arguments: &[Value]) -> PdsResult<Self> {
        let blobs = arguments
            .iter()
            .map(|arg| cadence::encode(arg).map(|bytes| STANDARD.encode(bytes)))
            .collect::<Result<Vec<_>, _>>()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            script: script.into(),
            arguments: serde_json::to_string(&blobs)?,
            state: TransactionState::Init,
            retry_count: 0,
            error: None,
            transaction_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Argument blobs ready for the transaction envelope.
    pub fn decode_arguments(&self) -> PdsResult<Vec<Vec<u8>>> {
        let blobs: Vec<String> = serde_json::from_str(&self.arguments)?;
        blobs.iter().map(|b| Ok(STANDARD.decode(b)?)).collect()
    }

    /// Arguments as JSON-Cadence values.
    pub fn argument_values(&self) -> PdsResult<Vec<Value>> {
        self.decode_arguments()?
            .iter()
            .map(|bytes| Ok(serde_json::from_slice(bytes)?))
            .collect()
    }

    pub fn is_sendable(&self) -> bool {
        matches!(self.state, TransactionState::Init | TransactionState::Retry)
    }

    pub fn mark_sent(&mut self, transaction_id: TransactionId) -> Result<(), TransitionError> {
        if !self.is_sendable() {
            return Err(TransitionError::new("transaction", "send", self.state));
        }
        self.state = TransactionState::Sent;
        self.transaction_id = Some(transaction_id);
        self.touch();
        Ok(())
    }

    /// Submission failed before reaching the chain; stays sendable.
    pub fn record_send_error(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.error = Some(error.into());
        self.touch();
    }

    /// Apply a result classification to a sent transaction.
    pub fn apply(&mut self, classification: &Classification) -> Result<(), TransitionError> {
        if self.state != TransactionState::Sent {
            return Err(TransitionError::new("transaction", "record the result of", self.state));
        }
        match classification {
            Classification::Pending => return Ok(()),
            Classification::Complete => {
                self.state = TransactionState::Complete;
                self.error = None;
            }
            Classification::Retry { reason, .. } => {
                self.state = TransactionState::Retry;
                self.retry_count += 1;
                self.error = Some(reason.clone());
            }
            Classification::Failed(message) => {
                self.state = TransactionState::Failed;
                self.error = Some(message.clone());
            }
        }
        self.touch();
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
