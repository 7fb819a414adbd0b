//! Distribution entity and its lifecycle.
//!
//! # States
//! ```text
//! Init → Resolved → Settling → Settled → Minting → Complete
//!   │       │          │          │         │
//!   ╰───────┴──────────┴──────────┴─────────┴──→ Invalid   (abort)
//! Init → Cancelled
//! ```
//! Every transition checks the current state first. Concurrent pollers rely
//! on that check to avoid processing a distribution twice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::chain::Address;
use crate::domain::collectible::FlowId;
use crate::domain::error::TransitionError;
use crate::domain::template::PackTemplate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionState {
    Init,
    Resolved,
    Settling,
    Settled,
    Minting,
    Complete,
    Invalid,
    Cancelled,
}

impl DistributionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Resolved => "resolved",
            Self::Settling => "settling",
            Self::Settled => "settled",
            Self::Minting => "minting",
            Self::Complete => "complete",
            Self::Invalid => "invalid",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Invalid | Self::Cancelled)
    }

    /// Numeric state understood by the on-chain registry.
    pub fn chain_state(&self) -> Option<u8> {
        match self {
            Self::Invalid => Some(1),
            Self::Complete => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for DistributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display metadata supplied by the issuer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionMeta {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub id: Uuid,
    /// Distribution id in the on-chain registry.
    pub flow_id: FlowId,
    pub issuer: Address,
    pub state: DistributionState,
    pub meta: DistributionMeta,
    pub pack_template: PackTemplate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Distribution {
    pub fn new(flow_id: FlowId, issuer: Address, meta: DistributionMeta, pack_template: PackTemplate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            flow_id,
            issuer,
            state: DistributionState::Init,
            meta,
            pack_template,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fail unless the distribution is in `expected`.
    pub fn ensure(&self, expected: DistributionState, action: &'static str) -> Result<(), TransitionError> {
        if self.state != expected {
            return Err(TransitionError::new("distribution", action, self.state));
        }
        Ok(())
    }

    pub fn resolve(&mut self) -> Result<(), TransitionError> {
        self.advance(DistributionState::Init, DistributionState::Resolved, "resolve")
    }

    pub fn start_settlement(&mut self) -> Result<(), TransitionError> {
        self.advance(DistributionState::Resolved, DistributionState::Settling, "start settlement for")
    }

    pub fn settle(&mut self) -> Result<(), TransitionError> {
        self.advance(DistributionState::Settling, DistributionState::Settled, "settle")
    }

    pub fn start_minting(&mut self) -> Result<(), TransitionError> {
        self.advance(DistributionState::Settled, DistributionState::Minting, "start minting for")
    }

    pub fn complete(&mut self) -> Result<(), TransitionError> {
        self.advance(DistributionState::Minting, DistributionState::Complete, "complete")
    }

    pub fn abort(&mut self) -> Result<(), TransitionError> {
        if self.state.is_terminal() {
            return Err(TransitionError::new("distribution", "abort", self.state));
        }
        self.set_state(DistributionState::Invalid);
        Ok(())
    }

    /// Only possible before anything reached the chain. Resolution is
    /// off-chain, so a `Resolved` distribution can still be cancelled until
    /// settlement starts.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, DistributionState::Init | DistributionState::Resolved) {
            return Err(TransitionError::new("distribution", "cancel", self.state));
        }
        self.set_state(DistributionState::Cancelled);
        Ok(())
    }

    fn advance(
        &mut self,
        from: DistributionState,
        to: DistributionState,
        action: &'static str,
    ) -> Result<(), TransitionError> {
        self.ensure(from, action)?;
        self.set_state(to);
        Ok(())
    }

    fn set_state(&mut self, state: DistributionState) {
        self.state = state;
        self.updated_at = Utc::now();
    }
}
