//! Transaction building, signing and synchronous seal waiting.
//!
//! # Responsibilities
//! - Pick a reference block and a rotated proposal key
//! - Sign the envelope with the service wallet and submit
//! - Wait (bounded) for seal on synchronous operations

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::chain::envelope::{SignedTransaction, UnsignedTransaction};
use crate::chain::gateway::ChainGateway;
use crate::chain::keys::KeySource;
use crate::chain::types::{
    is_sequence_number_error, ChainConfig, ChainError, ChainResult, TransactionId, TransactionStatus,
};
use crate::chain::wallet::Wallet;
use crate::resilience::backoff::calculate_backoff;

/// Builds and submits transactions on behalf of the service account.
#[derive(Clone)]
pub struct TransactionSender {
    gateway: Arc<dyn ChainGateway>,
    keys: Arc<KeySource>,
    wallet: Wallet,
    gas_limit: u64,
    seal_timeout_secs: u64,
    poll_base_ms: u64,
    poll_max_ms: u64,
}

impl TransactionSender {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        keys: Arc<KeySource>,
        wallet: Wallet,
        config: &ChainConfig,
    ) -> Self {
        Self {
            gateway,
            keys,
            wallet,
            gas_limit: config.gas_limit,
            seal_timeout_secs: config.seal_timeout_secs,
            poll_base_ms: config.seal_poll_base_ms,
            poll_max_ms: config.seal_poll_max_ms,
        }
    }

    pub fn gateway(&self) -> &dyn ChainGateway {
        self.gateway.as_ref()
    }

    pub fn keys(&self) -> &KeySource {
        &self.keys
    }

    /// Build and sign a transaction proposed by the next rotated key.
    pub async fn build(&self, script: &str, arguments: Vec<Vec<u8>>) -> ChainResult<SignedTransaction> {
        let reference = self.gateway.get_latest_block_header().await?;
        let proposal_key = self.keys.next_proposal_key(self.gateway.as_ref()).await?;
        let payer = self.wallet.address();

        let tx = UnsignedTransaction {
            script: script.to_string(),
            arguments,
            reference_block_id: reference.id,
            gas_limit: self.gas_limit,
            proposal_key,
            payer,
            authorizers: vec![payer],
        };
        self.wallet.sign_envelope(tx)
    }

    /// Submit without waiting for the result.
    pub async fn send(&self, script: &str, arguments: Vec<Vec<u8>>) -> ChainResult<TransactionId> {
        let signed = self.build(script, arguments).await?;
        let proposal = signed.transaction.proposal_key;
        match self.gateway.send_transaction(&signed).await {
            Ok(id) => {
                tracing::debug!(
                    tx_id = %id,
                    key_index = proposal.key_index,
                    sequence_number = proposal.sequence_number,
                    "Transaction submitted"
                );
                Ok(id)
            }
            Err(e) => {
                // The reserved sequence number may not have been consumed.
                self.keys.invalidate().await;
                Err(e)
            }
        }
    }

    /// Submit and block until the transaction is sealed without error.
    pub async fn send_and_wait(&self, script: &str, arguments: Vec<Vec<u8>>) -> ChainResult<TransactionId> {
        let id = self.send(script, arguments).await?;
        self.wait_for_seal(&id).await?;
        Ok(id)
    }

    /// Poll the result with jittered backoff until sealed or the deadline.
    pub async fn wait_for_seal(&self, id: &str) -> ChainResult<()> {
        let result = timeout(Duration::from_secs(self.seal_timeout_secs), async {
            let mut attempt = 0u32;
            loop {
                attempt = attempt.saturating_add(1);
                let result = self.gateway.get_transaction_result(id).await?;

                if let Some(message) = result.error_message {
                    if is_sequence_number_error(&message) {
                        self.keys.invalidate().await;
                        return Err(ChainError::SequenceRace { id: id.to_string(), message });
                    }
                    return Err(ChainError::Execution { id: id.to_string(), message });
                }
                match result.status {
                    TransactionStatus::Sealed => return Ok(()),
                    TransactionStatus::Expired => return Err(ChainError::Expired(id.to_string())),
                    status => tracing::debug!(tx_id = %id, ?status, "Waiting for seal"),
                }

                sleep(calculate_backoff(attempt, self.poll_base_ms, self.poll_max_ms)).await;
            }
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(_) => Err(ChainError::SealTimeout(id.to_string(), self.seal_timeout_secs)),
        }
    }
}
