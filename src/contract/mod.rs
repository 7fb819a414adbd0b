//! Contract service: turns lifecycle stages into chain transactions and
//! folds observed chain events back into entity state.
//!
//! # Data Flow
//! ```text
//! poller ─→ DistributionContract ─┬→ TransactionSender     (synchronous setup)
//!                                 ├→ StoreTx outbox rows   (settle, mint, reveal, open, state)
//!                                 └→ ChainGateway events   (Deposit, Mint, Reveal*, Open*)
//! ```
//!
//! Every operation runs inside the caller's store transaction. A state guard
//! on a single event skips that event; any other error aborts the operation
//! so the caller rolls back and retries from the persisted cursor.

pub mod events;
pub mod flow;
pub mod noop;
pub mod scripts;

use async_trait::async_trait;

use crate::chain::Address;
use crate::domain::{CirculatingPackContract, Distribution};
use crate::error::PdsResult;
use crate::store::StoreTx;

pub use flow::FlowContract;
pub use noop::NoopContract;

#[async_trait]
pub trait DistributionContract: Send + Sync {
    /// Link the escrow provider capability for every collectible contract.
    async fn setup_distribution(&self, tx: &mut dyn StoreTx, distribution: &Distribution) -> PdsResult<()>;

    /// Share the distribution capability with an issuer account.
    async fn set_distribution_capability(&self, issuer: Address) -> PdsResult<()>;

    async fn start_settlement(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()>;

    async fn update_settlement_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()>;

    async fn start_minting(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()>;

    async fn update_minting_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()>;

    async fn update_circulating_pack_contract(
        &self,
        tx: &mut dyn StoreTx,
        contract: &mut CirculatingPackContract,
    ) -> PdsResult<()>;

    async fn abort(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()>;
}

/// Inclusive height window following `cursor`, capped at `latest` and at
/// `max_blocks` past its start. `None` when there is nothing new.
pub fn block_window(cursor: u64, latest: u64, max_blocks: u64) -> Option<(u64, u64)> {
    let start = cursor.saturating_add(1);
    let end = latest.min(start.saturating_add(max_blocks));
    (start <= end).then_some((start, end))
}
