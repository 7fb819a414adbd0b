//! Settlement: escrow of every packed collectible into custody.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chain::Address;
use crate::domain::collectible::Collectible;
use crate::domain::error::TransitionError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub id: Uuid,
    pub distribution_id: Uuid,
    pub total: u64,
    pub settled: u64,
    /// Custody account the collectibles are deposited to.
    pub escrow_address: Address,
    /// Last block height checked for deposits.
    pub start_at_block: u64,
}

impl Settlement {
    pub fn new(distribution_id: Uuid, total: u64, escrow_address: Address, start_at_block: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            distribution_id,
            total,
            settled: 0,
            escrow_address,
            start_at_block,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.settled >= self.total
    }

    pub fn increment_count(&mut self) -> Result<(), TransitionError> {
        if self.is_complete() {
            return Err(TransitionError::new("settlement", "count a deposit for", "complete"));
        }
        self.settled += 1;
        Ok(())
    }
}

/// One collectible awaiting its deposit into escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementCollectible {
    pub id: Uuid,
    pub settlement_id: Uuid,
    pub collectible: Collectible,
    pub settled: bool,
}

impl SettlementCollectible {
    pub fn new(settlement_id: Uuid, collectible: Collectible) -> Self {
        Self { id: Uuid::new_v4(), settlement_id, collectible, settled: false }
    }

    pub fn mark_settled(&mut self) -> Result<(), TransitionError> {
        if self.settled {
            return Err(TransitionError::new("settlement collectible", "settle", "settled"));
        }
        self.settled = true;
        Ok(())
    }
}
