//! Persistence seam.
//!
//! # Data Flow
//! ```text
//! poller task / app operation
//!     → Store::begin()            one outer transaction
//!     → StoreTx list/get (LockMode) row locks held until commit/rollback
//!     → entity updates + outbox inserts
//!     → commit (or rollback on any error, or drop)
//! ```
//!
//! `SkipLocked` lists skip rows held by another transaction, so cooperating
//! pollers never process the same row within one pass. `NoWait` fails fast
//! instead.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    CirculatingPackContract, ContractRef, Distribution, DistributionState, FlowId, Minting, Pack,
    Settlement, SettlementCollectible,
};
use crate::outbox::{StorableTransaction, TransactionState};

pub use memory::MemoryStore;

/// Row locking behaviour for reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Plain read, no lock taken.
    None,
    /// Lock matching rows, silently skipping rows locked elsewhere.
    SkipLocked,
    /// Lock matching rows, failing if any is locked elsewhere.
    NoWait,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} is locked by another transaction")]
    Locked { entity: &'static str, id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} already exists")]
    Conflict { entity: &'static str, id: String },

    #[error("Transaction already committed or rolled back")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Another store has the snapshot open; stop it or remove a stale lock file.
    #[error("Snapshot lock {0} is held by another store")]
    SnapshotInUse(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

/// One store transaction. Dropping it uncommitted rolls back.
#[async_trait]
pub trait StoreTx: Send {
    async fn insert_distribution(&mut self, distribution: &Distribution) -> StoreResult<()>;
    async fn update_distribution(&mut self, distribution: &Distribution) -> StoreResult<()>;
    async fn get_distribution(&mut self, id: Uuid, lock: LockMode) -> StoreResult<Distribution>;
    /// All distributions in creation order.
    async fn list_distributions(&mut self, offset: usize, limit: usize) -> StoreResult<Vec<Distribution>>;
    async fn list_distributions_in_state(
        &mut self,
        state: DistributionState,
        lock: LockMode,
    ) -> StoreResult<Vec<Distribution>>;

    async fn insert_packs(&mut self, packs: &[Pack]) -> StoreResult<()>;
    async fn update_pack(&mut self, pack: &Pack) -> StoreResult<()>;
    async fn list_packs(&mut self, distribution_id: Uuid) -> StoreResult<Vec<Pack>>;
    async fn find_pack_by_commitment(
        &mut self,
        distribution_id: Uuid,
        commitment_hash: &str,
    ) -> StoreResult<Option<Pack>>;
    /// Pack minted on `pack_contract` under token id `flow_id`.
    async fn find_pack_by_flow_id(
        &mut self,
        pack_contract: &ContractRef,
        flow_id: FlowId,
    ) -> StoreResult<Option<Pack>>;

    async fn insert_settlement(&mut self, settlement: &Settlement) -> StoreResult<()>;
    async fn update_settlement(&mut self, settlement: &Settlement) -> StoreResult<()>;
    async fn find_settlement(&mut self, distribution_id: Uuid) -> StoreResult<Option<Settlement>>;
    async fn insert_settlement_collectibles(&mut self, rows: &[SettlementCollectible]) -> StoreResult<()>;
    async fn update_settlement_collectible(&mut self, row: &SettlementCollectible) -> StoreResult<()>;
    async fn list_pending_settlement_collectibles(
        &mut self,
        settlement_id: Uuid,
    ) -> StoreResult<Vec<SettlementCollectible>>;

    async fn insert_minting(&mut self, minting: &Minting) -> StoreResult<()>;
    async fn update_minting(&mut self, minting: &Minting) -> StoreResult<()>;
    async fn find_minting(&mut self, distribution_id: Uuid) -> StoreResult<Option<Minting>>;

    async fn insert_circulating(&mut self, contract: &CirculatingPackContract) -> StoreResult<()>;
    async fn update_circulating(&mut self, contract: &CirculatingPackContract) -> StoreResult<()>;
    async fn find_circulating(&mut self, contract: &ContractRef) -> StoreResult<Option<CirculatingPackContract>>;
    async fn list_circulating(&mut self, lock: LockMode) -> StoreResult<Vec<CirculatingPackContract>>;

    async fn insert_transaction(&mut self, transaction: &StorableTransaction) -> StoreResult<()>;
    async fn update_transaction(&mut self, transaction: &StorableTransaction) -> StoreResult<()>;
    /// Transactions in any of `states`, oldest first.
    async fn list_transactions(
        &mut self,
        states: &[TransactionState],
        limit: Option<usize>,
        lock: LockMode,
    ) -> StoreResult<Vec<StorableTransaction>>;

    async fn commit(&mut self) -> StoreResult<()>;
    async fn rollback(&mut self) -> StoreResult<()>;
}
