//! Crate-level error type.
//!
//! Errors fall into four classes: template validation, state-guard
//! violations, chain submission failures and infrastructure failures.
//! Event handlers skip an event on a state guard and abort the enclosing
//! store transaction on anything else. The poller aborts a whole pass only
//! on infrastructure failures; anything else stays with the one
//! distribution that raised it.

use thiserror::Error;

use crate::chain::ChainError;
use crate::config::ConfigError;
use crate::domain::{TemplateError, TransitionError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PdsError {
    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Stored transaction arguments could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PdsError {
    /// Wrong-state transition, expected under duplicate or re-delivered events.
    pub fn is_state_guard(&self) -> bool {
        matches!(self, Self::Transition(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::Store(StoreError::Locked { .. }))
    }

    /// The store or the access node failed, not the entity being worked on.
    pub fn is_infrastructure(&self) -> bool {
        match self {
            Self::Store(e) => !matches!(e, StoreError::NotFound { .. } | StoreError::Locked { .. }),
            Self::Chain(e) => e.is_infrastructure(),
            Self::Config(_) => true,
            _ => false,
        }
    }

    /// Trying again cannot change the outcome.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Template(_) | Self::Encoding(_) | Self::Internal(_) => true,
            Self::Chain(e) => !e.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PdsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

impl From<base64::DecodeError> for PdsError {
    fn from(e: base64::DecodeError) -> Self {
        Self::Encoding(e.to_string())
    }
}

pub type PdsResult<T> = Result<T, PdsError>;
