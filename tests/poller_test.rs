mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use pds_custodian::app::build_offline;
use pds_custodian::chain::envelope::SignedTransaction;
use pds_custodian::chain::types::{Account, BlockHeader, ChainEvent, TransactionInfo, TransactionResult};
use pds_custodian::chain::{Address, ChainGateway, ChainResult, InMemoryChain, TransactionId};
use pds_custodian::domain::{ContractRef, DistributionState};
use pds_custodian::poller::Task;
use pds_custodian::store::{LockMode, MemoryStore, Store};
use pds_custodian::Shutdown;

fn bad_nft() -> ContractRef {
    ContractRef::new("0x01cf0e2f2f715450".parse().unwrap(), "BadNFT")
}

/// Seals every transaction that imports `BadNFT` with an execution error.
struct RejectingChain(Arc<InMemoryChain>);

#[async_trait]
impl ChainGateway for RejectingChain {
    async fn send_transaction(&self, tx: &SignedTransaction) -> ChainResult<TransactionId> {
        let id = self.0.send_transaction(tx).await?;
        if tx.transaction.script.contains("import BadNFT") {
            self.0.set_result(
                &id,
                TransactionResult::failed("[Error Code: 1101] cadence runtime error: cannot find declaration BadNFT"),
            );
        }
        Ok(id)
    }

    async fn get_transaction_result(&self, id: &str) -> ChainResult<TransactionResult> {
        self.0.get_transaction_result(id).await
    }

    async fn get_latest_block_header(&self) -> ChainResult<BlockHeader> {
        self.0.get_latest_block_header().await
    }

    async fn get_events_for_height_range(
        &self,
        event_type: &str,
        start_height: u64,
        end_height: u64,
    ) -> ChainResult<Vec<ChainEvent>> {
        self.0.get_events_for_height_range(event_type, start_height, end_height).await
    }

    async fn get_transaction(&self, id: &str) -> ChainResult<TransactionInfo> {
        self.0.get_transaction(id).await
    }

    async fn get_account(&self, address: &Address) -> ChainResult<Account> {
        self.0.get_account(address).await
    }
}

fn rejecting_fixture() -> Fixture {
    Fixture::with_gateway(test_config(), |chain| Arc::new(RejectingChain(chain)) as Arc<dyn ChainGateway>)
}

fn sends_importing(fx: &Fixture, name: &str) -> usize {
    let import = format!("import {name} ");
    fx.chain.sent().iter().filter(|(_, tx)| tx.transaction.script.contains(&import)).count()
}

#[tokio::test]
async fn test_offline_poller_completes_and_drains_on_shutdown() {
    let mut config = test_config();
    config.chain.enabled = false;
    let store = Arc::new(MemoryStore::new());
    let services = build_offline(&config, store.clone());
    let id = services.app.create_distribution(request(3)).await.unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(services.poller.clone().run(shutdown.clone()));

    let state = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let state = services.app.get_distribution(id).await.unwrap().distribution.state;
            if state == DistributionState::Complete {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("distribution did not complete");
    assert_eq!(state, DistributionState::Complete);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
    assert_eq!(store.held_locks(), 0);
}

#[tokio::test]
async fn test_locked_distribution_is_skipped() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(2)).await.unwrap();

    let mut holder = fx.store.begin().await.unwrap();
    holder.get_distribution(id, LockMode::NoWait).await.unwrap();

    fx.run(Task::Resolved).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Resolved);
    assert!(fx.chain.sent().is_empty());

    // Abort fails fast instead of waiting on the holder.
    assert!(fx.services.app.abort_distribution(id).await.is_err());

    holder.rollback().await.unwrap();
    fx.run(Task::Resolved).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Settling);
}

#[tokio::test]
async fn test_failed_pass_rolls_back() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(1)).await.unwrap();
    fx.run(Task::Resolved).await;
    for c in &fx.packs(id).await[0].collectibles {
        fx.emit_deposit(c, service_address());
    }

    fx.chain.set_offline(true);
    assert!(fx.services.poller.execute(Task::Settling).await.is_err());
    assert!(fx.services.poller.run_once().await.is_err());
    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.distribution.state, DistributionState::Settling);
    assert_eq!(view.settlement.unwrap().done, 0);
    assert_eq!(fx.store.held_locks(), 0);

    fx.chain.set_offline(false);
    fx.run(Task::Settling).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Settled);
}

#[tokio::test]
async fn test_run_once_advances_one_stage_per_distribution() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(1)).await.unwrap();

    fx.services.poller.run_once().await.unwrap();
    assert_eq!(fx.distribution(id).await.state, DistributionState::Settling);
    // Settle rows queued by the resolved task go out later in the same pass.
    assert!(fx.transactions(Some("settle")).await.iter().all(|t| !t.is_sendable()));
}

#[tokio::test]
async fn test_rejected_setup_does_not_block_other_distributions() {
    let fx = rejecting_fixture();
    let bad = fx.services.app.create_distribution(request_for(bad_nft(), 2)).await.unwrap();
    let good = fx.services.app.create_distribution(request(2)).await.unwrap();

    fx.run(Task::Resolved).await;
    assert_eq!(fx.distribution(good).await.state, DistributionState::Settling);
    assert_eq!(fx.transactions(Some("settle")).await.len(), 1);

    // The rejected distribution is parked instead of retried every tick.
    assert_eq!(fx.distribution(bad).await.state, DistributionState::Invalid);
    assert_eq!(fx.transactions(Some("update_distribution_state")).await.len(), 1);
    assert_eq!(sends_importing(&fx, "BadNFT"), 1);

    fx.run(Task::Resolved).await;
    fx.services.poller.run_once().await.unwrap();
    assert_eq!(sends_importing(&fx, "BadNFT"), 1);
    assert_eq!(sends_importing(&fx, "ExampleNFT"), 2);
    assert_eq!(fx.store.held_locks(), 0);
}

#[tokio::test]
async fn test_cancelled_distribution_is_never_set_up() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(2)).await.unwrap();
    fx.services.app.cancel_distribution(id).await.unwrap();

    fx.services.poller.run_once().await.unwrap();
    assert_eq!(fx.distribution(id).await.state, DistributionState::Cancelled);
    assert!(fx.chain.sent().is_empty());
}
