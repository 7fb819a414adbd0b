//! In-process chain used by tests and local dry runs.
//!
//! Submitted transactions are checked against the proposer's key sequence
//! number the way an access node would: a stale sequence number produces a
//! sealed result carrying error code 1007, a matching one bumps the counter.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::chain::envelope::SignedTransaction;
use crate::chain::gateway::ChainGateway;
use crate::chain::types::{
    Account, AccountKey, Address, BlockHeader, ChainError, ChainEvent, ChainResult, TransactionId,
    TransactionInfo, TransactionResult, TransactionStatus,
};

#[derive(Debug, Default)]
struct ChainState {
    height: u64,
    events: Vec<ChainEvent>,
    sent: Vec<(TransactionId, SignedTransaction)>,
    results: HashMap<TransactionId, TransactionResult>,
    transactions: HashMap<TransactionId, TransactionInfo>,
    accounts: HashMap<Address, Account>,
    offline: bool,
    next_tx: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new(start_height: u64) -> Self {
        let chain = Self::default();
        chain.lock().height = start_height;
        chain
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        // A poisoned lock only means a test panicked mid-update.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an account with the given key indexes, all at sequence 0.
    pub fn add_account(&self, address: Address, key_indexes: &[u32]) {
        let keys = key_indexes
            .iter()
            .map(|&index| AccountKey { index, sequence_number: 0, revoked: false })
            .collect();
        self.lock().accounts.insert(address, Account { address, keys });
    }

    pub fn height(&self) -> u64 {
        self.lock().height
    }

    pub fn advance(&self, blocks: u64) -> u64 {
        let mut state = self.lock();
        state.height += blocks;
        state.height
    }

    /// Emit an event at the next block height and return that height.
    pub fn emit(&self, event_type: &str, payload: Value) -> u64 {
        self.emit_from(event_type, payload, None)
    }

    /// Emit an event from a transaction authorized by `authorizer`.
    pub fn emit_from(&self, event_type: &str, payload: Value, authorizer: Option<Address>) -> u64 {
        let mut state = self.lock();
        state.height += 1;
        state.next_tx += 1;
        let tx_id = format!("{:064x}", u64::MAX - state.next_tx);
        let height = state.height;
        state.transactions.insert(
            tx_id.clone(),
            TransactionInfo { id: tx_id.clone(), authorizers: authorizer.into_iter().collect() },
        );
        state.events.push(ChainEvent {
            event_type: event_type.to_string(),
            transaction_id: tx_id,
            block_height: height,
            payload,
        });
        height
    }

    pub fn sent(&self) -> Vec<(TransactionId, SignedTransaction)> {
        self.lock().sent.clone()
    }

    pub fn set_result(&self, id: &str, result: TransactionResult) {
        self.lock().results.insert(id.to_string(), result);
    }

    /// Simulate the access node being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    pub fn sequence_number(&self, address: &Address, key_index: u32) -> Option<u64> {
        self.lock().accounts.get(address).and_then(|a| a.key(key_index)).map(|k| k.sequence_number)
    }

    fn online(&self) -> ChainResult<MutexGuard<'_, ChainState>> {
        let state = self.lock();
        if state.offline {
            return Err(ChainError::Rpc("access node unreachable".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl ChainGateway for InMemoryChain {
    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TransactionId> {
        let mut state = self.online()?;
        state.next_tx += 1;
        let id = format!("{:064x}", state.next_tx);
        let proposal = tx.transaction.proposal_key;

        let key = state
            .accounts
            .get_mut(&proposal.address)
            .and_then(|a| a.key_mut(proposal.key_index));
        let result = match key {
            Some(key) if key.sequence_number == proposal.sequence_number => {
                key.sequence_number += 1;
                TransactionResult::sealed()
            }
            Some(key) => TransactionResult::failed(format!(
                "[Error Code: 1007] invalid proposal key: public key {} on account {} does not have a valid signature: expected sequence number {}, got {}",
                proposal.key_index, proposal.address, key.sequence_number, proposal.sequence_number
            )),
            None => TransactionResult::failed(format!(
                "[Error Code: 1006] invalid proposal key: account {} has no key {}",
                proposal.address, proposal.key_index
            )),
        };

        state.results.insert(id.clone(), result);
        state.transactions.insert(
            id.clone(),
            TransactionInfo { id: id.clone(), authorizers: tx.transaction.authorizers.clone() },
        );
        state.sent.push((id.clone(), tx.clone()));
        state.height += 1;
        Ok(id)
    }

    async fn get_transaction_result(&self, id: &str) -> ChainResult<TransactionResult> {
        let state = self.online()?;
        Ok(state
            .results
            .get(id)
            .cloned()
            .unwrap_or_else(|| TransactionResult::with_status(TransactionStatus::Unknown)))
    }

    async fn get_latest_block_header(&self) -> ChainResult<BlockHeader> {
        let state = self.online()?;
        Ok(BlockHeader { id: format!("{:064x}", state.height), height: state.height })
    }

    async fn get_events_for_height_range(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        let state = self.online()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter(|e| e.block_height >= start_height && e.block_height <= end_height)
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, id: &str) -> ChainResult<TransactionInfo> {
        let state = self.online()?;
        state
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("transaction {} not found", id)))
    }

    async fn get_account(&self, address: &Address) -> ChainResult<Account> {
        let state = self.online()?;
        state
            .accounts
            .get(address)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("account {} not found", address)))
    }
}
