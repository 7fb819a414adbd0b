//! Pack contracts monitored for holder-initiated reveal and open requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::collectible::ContractRef;

/// One row per pack contract ever used; shared across distributions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculatingPackContract {
    pub id: Uuid,
    pub contract: ContractRef,
    /// Last block height checked for pack events.
    pub start_at_block: u64,
}

impl CirculatingPackContract {
    pub fn new(contract: ContractRef, start_at_block: u64) -> Self {
        Self { id: Uuid::new_v4(), contract, start_at_block }
    }

    pub fn event_type(&self, event: &str) -> String {
        self.contract.event_type(event)
    }
}
