//! Proposal key rotation.
//!
//! # Responsibilities
//! - Rotate round-robin through the service account's proposal key indexes
//! - Hand out `(key index, sequence number)` pairs without two concurrent
//!   submissions receiving the same pair
//! - Cache the account and track sequence numbers locally between refreshes
//!
//! Two locks: `next` serializes selection end to end, `accounts` guards the
//! lazily filled account cache. Selection takes `next` before `accounts`.

use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::chain::envelope::ProposalKey;
use crate::chain::gateway::ChainGateway;
use crate::chain::types::{Account, Address, ChainError, ChainResult};

#[derive(Debug)]
pub struct KeySource {
    address: Address,
    key_indexes: Vec<u32>,
    next: Mutex<usize>,
    accounts: Mutex<HashMap<Address, Account>>,
}

impl KeySource {
    pub fn new(address: Address, key_indexes: Vec<u32>) -> ChainResult<Self> {
        if key_indexes.is_empty() {
            return Err(ChainError::Wallet("no proposal key indexes configured".into()));
        }
        Ok(Self {
            address,
            key_indexes,
            next: Mutex::new(0),
            accounts: Mutex::new(HashMap::new()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Select the next proposal key and reserve its current sequence number.
    pub async fn next_proposal_key(&self, gateway: &dyn ChainGateway) -> ChainResult<ProposalKey> {
        let mut next = self.next.lock().await;
        let key_index = self.key_indexes[*next % self.key_indexes.len()];
        *next = (*next + 1) % self.key_indexes.len();

        let mut accounts = self.accounts.lock().await;
        if !accounts.contains_key(&self.address) {
            let account = gateway.get_account(&self.address).await?;
            tracing::debug!(address = %self.address, keys = account.keys.len(), "Account cached");
            accounts.insert(self.address, account);
        }

        let key = accounts
            .get_mut(&self.address)
            .and_then(|account| account.key_mut(key_index))
            .ok_or(ChainError::KeyUnavailable { address: self.address, key_index })?;

        let sequence_number = key.sequence_number;
        key.sequence_number += 1;

        Ok(ProposalKey { address: self.address, key_index, sequence_number })
    }

    /// Drop cached sequence numbers so the next selection re-reads the chain.
    pub async fn invalidate(&self) {
        self.accounts.lock().await.remove(&self.address);
        tracing::debug!(address = %self.address, "Account cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::memory::InMemoryChain;
    use std::sync::Arc;

    fn service() -> Address {
        "0xf8d6e0586b0a20c7".parse().unwrap()
    }

    #[test]
    fn test_requires_key_indexes() {
        assert!(KeySource::new(service(), vec![]).is_err());
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let chain = InMemoryChain::new(0);
        chain.add_account(service(), &[0, 1, 2]);
        let keys = KeySource::new(service(), vec![0, 1, 2]).unwrap();

        let picked: Vec<(u32, u64)> = {
            let mut out = Vec::new();
            for _ in 0..5 {
                let k = keys.next_proposal_key(&chain).await.unwrap();
                out.push((k.key_index, k.sequence_number));
            }
            out
        };
        assert_eq!(picked, vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1)]);
    }

    #[tokio::test]
    async fn test_invalidate_rereads_chain() {
        let chain = InMemoryChain::new(0);
        chain.add_account(service(), &[0]);
        let keys = KeySource::new(service(), vec![0]).unwrap();

        assert_eq!(keys.next_proposal_key(&chain).await.unwrap().sequence_number, 0);
        assert_eq!(keys.next_proposal_key(&chain).await.unwrap().sequence_number, 1);

        // Nothing reached the chain, so a refresh starts from 0 again.
        keys.invalidate().await;
        assert_eq!(keys.next_proposal_key(&chain).await.unwrap().sequence_number, 0);
    }

    #[tokio::test]
    async fn test_missing_key_index() {
        let chain = InMemoryChain::new(0);
        chain.add_account(service(), &[0]);
        let keys = KeySource::new(service(), vec![5]).unwrap();
        let err = keys.next_proposal_key(&chain).await.unwrap_err();
        assert!(matches!(err, ChainError::KeyUnavailable { key_index: 5, .. }));
    }

    #[tokio::test]
    async fn test_concurrent_selection_never_repeats() {
        let chain = Arc::new(InMemoryChain::new(0));
        chain.add_account(service(), &[0, 1]);
        let keys = Arc::new(KeySource::new(service(), vec![0, 1]).unwrap());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let chain = chain.clone();
            let keys = keys.clone();
            handles.push(tokio::spawn(async move {
                let k = keys.next_proposal_key(chain.as_ref()).await.unwrap();
                (k.key_index, k.sequence_number)
            }));
        }
        let mut pairs = Vec::new();
        for h in handles {
            pairs.push(h.await.unwrap());
        }
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), 20);
    }
}
