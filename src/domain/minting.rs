//! Minting: one pack token per sealed pack.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minting {
    pub id: Uuid,
    pub distribution_id: Uuid,
    pub total: u64,
    pub minted: u64,
    /// Last block height checked for mint events.
    pub start_at_block: u64,
}

impl Minting {
    pub fn new(distribution_id: Uuid, total: u64, start_at_block: u64) -> Self {
        Self { id: Uuid::new_v4(), distribution_id, total, minted: 0, start_at_block }
    }

    pub fn is_complete(&self) -> bool {
        self.minted >= self.total
    }

    pub fn increment_count(&mut self) -> Result<(), TransitionError> {
        if self.is_complete() {
            return Err(TransitionError::new("minting", "count a mint for", "complete"));
        }
        self.minted += 1;
        Ok(())
    }
}
