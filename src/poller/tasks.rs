use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::contract::DistributionContract;
use crate::domain::DistributionState;
use crate::error::PdsResult;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::outbox::Outbox;
use crate::store::{LockMode, Store, StoreError};

/// One reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Resolved,
    Settling,
    Settled,
    Minting,
    Circulating,
    SendTransactions,
    CheckTransactions,
}

impl Task {
    pub const ALL: [Task; 7] = [
        Task::Resolved,
        Task::Settling,
        Task::Settled,
        Task::Minting,
        Task::Circulating,
        Task::SendTransactions,
        Task::CheckTransactions,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Resolved => "resolved",
            Self::Settling => "settling",
            Self::Settled => "settled",
            Self::Minting => "minting",
            Self::Circulating => "circulating",
            Self::SendTransactions => "send_transactions",
            Self::CheckTransactions => "check_transactions",
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    store: Arc<dyn Store>,
    contract: Arc<dyn DistributionContract>,
    outbox: Option<Outbox>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        store: Arc<dyn Store>,
        contract: Arc<dyn DistributionContract>,
        outbox: Option<Outbox>,
        interval: Duration,
    ) -> Self {
        Self { store, contract, outbox, interval }
    }

    /// Tick until shutdown, then wait for in-flight tasks.
    pub async fn run(self, shutdown: Shutdown) {
        let mut shutdown_rx = shutdown.subscribe();
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Poller started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for task in Task::ALL {
                        if !self.is_enabled(task) {
                            continue;
                        }
                        let poller = self.clone();
                        in_flight.spawn(async move {
                            poller.run_task(task).await;
                        });
                    }
                }
                Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Reconciliation task panicked");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Poller stopping, draining tasks");
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Reconciliation task panicked");
            }
        }
        tracing::info!("Poller stopped");
    }

    fn is_enabled(&self, task: Task) -> bool {
        !matches!(task, Task::SendTransactions | Task::CheckTransactions) || self.outbox.is_some()
    }

    /// Run one task, logging and recording the outcome.
    pub async fn run_task(&self, task: Task) {
        let start = Instant::now();
        let result = self.execute(task).await;
        metrics::record_reconcile(task.name(), start, result.is_ok());
        if let Err(e) = result {
            tracing::warn!(task = task.name(), error = %e, "Reconciliation pass rolled back");
        }
    }

    /// Run every task once, in lifecycle order.
    pub async fn run_once(&self) -> PdsResult<()> {
        for task in Task::ALL {
            if self.is_enabled(task) {
                self.execute(task).await?;
            }
        }
        Ok(())
    }

    pub async fn execute(&self, task: Task) -> PdsResult<()> {
        match task {
            Task::Resolved => self.distributions(DistributionState::Resolved).await,
            Task::Settling => self.distributions(DistributionState::Settling).await,
            Task::Settled => self.distributions(DistributionState::Settled).await,
            Task::Minting => self.distributions(DistributionState::Minting).await,
            Task::Circulating => self.circulating().await,
            Task::SendTransactions => match &self.outbox {
                Some(outbox) => outbox.send_pending(self.store.as_ref()).await.map(|_| ()),
                None => Ok(()),
            },
            Task::CheckTransactions => match &self.outbox {
                Some(outbox) => outbox.check_sent(self.store.as_ref()).await.map(|_| ()),
                None => Ok(()),
            },
        }
    }

    /// Advance every unlocked distribution in `state` by one stage, each in
    /// its own store transaction. Only infrastructure failures abort the
    /// pass. A terminal failure parks the distribution as invalid; a
    /// retryable one leaves it for the next tick.
    async fn distributions(&self, state: DistributionState) -> PdsResult<()> {
        let ids: Vec<Uuid> = {
            let mut tx = self.store.begin().await?;
            let listed = tx.list_distributions_in_state(state, LockMode::SkipLocked).await?;
            tx.rollback().await?;
            listed.into_iter().map(|d| d.id).collect()
        };

        for id in ids {
            let err = match self.advance(id, state).await {
                Ok(()) => continue,
                Err(e) => e,
            };
            if err.is_infrastructure() {
                return Err(err);
            }
            if err.is_state_guard() || err.is_locked() || err.is_not_found() {
                tracing::debug!(distribution_id = %id, stage = state.as_str(), error = %err, "Distribution skipped");
                continue;
            }

            if err.is_terminal() {
                tracing::error!(
                    distribution_id = %id,
                    stage = state.as_str(),
                    error = %err,
                    "Distribution stage failed"
                );
                metrics::record_distribution_failure(state.as_str(), "parked");
                self.park(id, state).await?;
            } else {
                tracing::warn!(
                    distribution_id = %id,
                    stage = state.as_str(),
                    error = %err,
                    "Distribution stage deferred"
                );
                metrics::record_distribution_failure(state.as_str(), "deferred");
            }
        }
        Ok(())
    }

    async fn advance(&self, id: Uuid, state: DistributionState) -> PdsResult<()> {
        let mut tx = self.store.begin().await?;
        let mut distribution = tx.get_distribution(id, LockMode::NoWait).await?;
        if distribution.state != state {
            return tx.rollback().await.map_err(Into::into);
        }

        let result = {
            let tx = tx.as_mut();
            match state {
                DistributionState::Resolved => match self.contract.setup_distribution(tx, &distribution).await {
                    Ok(()) => self.contract.start_settlement(tx, &mut distribution).await,
                    Err(e) => Err(e),
                },
                DistributionState::Settling => self.contract.update_settlement_status(tx, &mut distribution).await,
                DistributionState::Settled => self.contract.start_minting(tx, &mut distribution).await,
                DistributionState::Minting => self.contract.update_minting_status(tx, &mut distribution).await,
                _ => Ok(()),
            }
        };

        match result {
            Ok(()) => tx.commit().await.map_err(Into::into),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(distribution_id = %id, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Abort a distribution whose stage can never succeed so it stops
    /// resubmitting and shows up as invalid.
    async fn park(&self, id: Uuid, state: DistributionState) -> PdsResult<()> {
        let mut tx = self.store.begin().await?;
        let mut distribution = match tx.get_distribution(id, LockMode::NoWait).await {
            Ok(d) => d,
            Err(StoreError::Locked { .. }) => return tx.rollback().await.map_err(Into::into),
            Err(e) => return Err(e.into()),
        };
        if distribution.state != state {
            return tx.rollback().await.map_err(Into::into);
        }
        self.contract.abort(tx.as_mut(), &mut distribution).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn circulating(&self) -> PdsResult<()> {
        let mut tx = self.store.begin().await?;
        for mut contract in tx.list_circulating(LockMode::SkipLocked).await? {
            self.contract.update_circulating_pack_contract(tx.as_mut(), &mut contract).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
