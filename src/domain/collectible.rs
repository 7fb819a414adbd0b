//! Contract references and collectible identities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::chain::Address;

/// Chain-assigned numeric identifier.
pub type FlowId = u64;

/// A deployed contract, identified by account address and contract name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContractRef {
    pub address: Address,
    pub name: String,
}

impl ContractRef {
    pub fn new(address: Address, name: impl Into<String>) -> Self {
        Self { address, name: name.into() }
    }

    /// Fully-qualified event type, e.g. `A.01cf0e2f2f715450.ExampleNFT.Deposit`.
    pub fn event_type(&self, event: &str) -> String {
        format!("{}.{}", self, event)
    }
}

impl fmt::Display for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A.{}.{}", self.address.to_hex(), self.name)
    }
}

/// One collectible: a token id within a collectible contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Collectible {
    pub contract: ContractRef,
    pub id: FlowId,
}

impl Collectible {
    pub fn new(contract: ContractRef, id: FlowId) -> Self {
        Self { contract, id }
    }

    /// Zero is never assigned by the chain and marks an empty slot.
    pub fn is_zero(&self) -> bool {
        self.id == 0
    }
}

impl fmt::Display for Collectible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.contract, self.id)
    }
}
