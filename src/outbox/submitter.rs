//! Outbox submitter and result checker.
//!
//! Both passes run inside one store transaction and list their rows with
//! `SkipLocked`, so several instances can drain the same outbox without
//! sending a row twice.

use crate::chain::TransactionSender;
use crate::error::PdsResult;
use crate::observability::metrics;
use crate::outbox::transaction::{classify, Classification, TransactionState};
use crate::store::{LockMode, Store};

#[derive(Clone)]
pub struct Outbox {
    sender: TransactionSender,
    batch_size: usize,
}

impl Outbox {
    pub fn new(sender: TransactionSender, batch_size: usize) -> Self {
        Self { sender, batch_size }
    }

    /// Submit `Init` and `Retry` rows. Returns the number marked `Sent`.
    ///
    /// A failed submission is recorded on its row and the pass moves on, so
    /// rows already sent in this pass are still committed as `Sent`.
    pub async fn send_pending(&self, store: &dyn Store) -> PdsResult<usize> {
        let mut tx = store.begin().await?;
        let rows = tx
            .list_transactions(
                &[TransactionState::Init, TransactionState::Retry],
                Some(self.batch_size),
                LockMode::SkipLocked,
            )
            .await?;

        let mut sent = 0;
        for mut row in rows {
            let arguments = match row.decode_arguments() {
                Ok(arguments) => arguments,
                Err(e) => {
                    tracing::error!(id = %row.id, name = %row.name, error = %e, "Stored arguments are corrupt");
                    row.record_send_error(e.to_string());
                    tx.update_transaction(&row).await?;
                    continue;
                }
            };

            match self.sender.send(&row.script, arguments).await {
                Ok(tx_id) => {
                    tracing::info!(
                        id = %row.id,
                        name = %row.name,
                        tx_id = %tx_id,
                        retry_count = row.retry_count,
                        "Transaction sent"
                    );
                    row.mark_sent(tx_id)?;
                    metrics::record_outbox_transition(&row.name, TransactionState::Sent.as_str());
                    sent += 1;
                }
                Err(e) => {
                    tracing::warn!(id = %row.id, name = %row.name, error = %e, "Transaction submission failed");
                    row.record_send_error(e.to_string());
                }
            }
            tx.update_transaction(&row).await?;
        }

        tx.commit().await?;
        Ok(sent)
    }

    /// Fetch results for `Sent` rows and classify them.
    pub async fn check_sent(&self, store: &dyn Store) -> PdsResult<usize> {
        let mut tx = store.begin().await?;
        let rows = tx
            .list_transactions(&[TransactionState::Sent], Some(self.batch_size), LockMode::SkipLocked)
            .await?;

        let mut settled = 0;
        for mut row in rows {
            let Some(tx_id) = row.transaction_id.clone() else {
                tracing::warn!(id = %row.id, "Sent transaction has no chain id");
                continue;
            };
            let result = self.sender.gateway().get_transaction_result(&tx_id).await?;
            let class = classify(&result);
            if class == Classification::Pending {
                continue;
            }

            match &class {
                Classification::Complete => {
                    tracing::info!(id = %row.id, name = %row.name, tx_id = %tx_id, "Transaction sealed");
                }
                Classification::Retry { sequence_race, reason } => {
                    tracing::warn!(
                        id = %row.id,
                        name = %row.name,
                        tx_id = %tx_id,
                        reason = %reason,
                        "Transaction will be retried"
                    );
                    if *sequence_race {
                        self.sender.keys().invalidate().await;
                    }
                }
                Classification::Failed(message) => {
                    tracing::error!(
                        id = %row.id,
                        name = %row.name,
                        tx_id = %tx_id,
                        error = %message,
                        "Transaction failed"
                    );
                }
                Classification::Pending => {}
            }

            row.apply(&class)?;
            metrics::record_outbox_transition(&row.name, row.state.as_str());
            tx.update_transaction(&row).await?;
            settled += 1;
        }

        tx.commit().await?;
        Ok(settled)
    }
}
