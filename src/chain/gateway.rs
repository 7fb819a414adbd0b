//! The access API contract consumed by the service.

use async_trait::async_trait;

use crate::chain::envelope::SignedTransaction;
use crate::chain::types::{
    Account, Address, BlockHeader, ChainEvent, ChainResult, TransactionId, TransactionInfo,
    TransactionResult,
};

/// Thin RPC surface over a chain access node.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TransactionId>;

    async fn get_transaction_result(&self, id: &str) -> ChainResult<TransactionResult>;

    /// Latest sealed block.
    async fn get_latest_block_header(&self) -> ChainResult<BlockHeader>;

    /// Events of one type in the inclusive height range `[start, end]`.
    async fn get_events_for_height_range(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> ChainResult<Vec<ChainEvent>>;

    async fn get_transaction(&self, id: &str) -> ChainResult<TransactionInfo>;

    async fn get_account(&self, address: &Address) -> ChainResult<Account>;
}
