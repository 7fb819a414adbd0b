//! End-to-end distribution lifecycle against the in-memory chain.

mod common;

use common::*;
use pds_custodian::app::Progress;
use pds_custodian::domain::{Collectible, DistributionState, PackState};
use pds_custodian::outbox::TransactionState;
use pds_custodian::poller::Task;

#[tokio::test]
async fn test_distribution_runs_to_complete() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(4)).await.unwrap();
    assert_eq!(fx.distribution(id).await.state, DistributionState::Resolved);

    // Escrow links go out synchronously, settle batches through the outbox.
    fx.run(Task::Resolved).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Settling);
    assert_eq!(fx.chain.sent().len(), 1);
    let settles = fx.transactions(Some("settle")).await;
    assert_eq!(settles.len(), 2);
    assert!(settles.iter().all(|t| t.state == TransactionState::Init));

    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.settlement, Some(Progress { done: 0, total: 16 }));

    let packs = fx.packs(id).await;
    let collectibles: Vec<Collectible> = packs.iter().flat_map(|p| p.collectibles.clone()).collect();
    // A deposit elsewhere does not count toward settlement.
    fx.emit_deposit(&collectibles[0], holder_address());
    for c in &collectibles[..15] {
        fx.emit_deposit(c, service_address());
    }
    fx.run(Task::Settling).await;
    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.distribution.state, DistributionState::Settling);
    assert_eq!(view.settlement, Some(Progress { done: 15, total: 16 }));

    // Replayed deposits in a later window are not counted twice.
    fx.emit_deposit(&collectibles[0], service_address());
    fx.emit_deposit(&collectibles[15], service_address());
    fx.run(Task::Settling).await;
    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.distribution.state, DistributionState::Settled);
    assert_eq!(view.settlement, Some(Progress { done: 16, total: 16 }));

    fx.run(Task::Settled).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Minting);
    assert_eq!(fx.transactions(Some("mint")).await.len(), 2);

    // Mints from an unrelated distribution on the same contract are ignored.
    fx.emit_mint(900, &"ab".repeat(32));
    for (i, pack) in packs.iter().enumerate() {
        fx.emit_mint(101 + i as u64, pack.commitment_hash.as_deref().unwrap());
    }
    fx.run(Task::Minting).await;

    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.distribution.state, DistributionState::Complete);
    assert_eq!(view.minting, Some(Progress { done: 4, total: 4 }));
    let minted = fx.packs(id).await;
    assert!(minted.iter().all(|p| p.state == PackState::Sealed));
    let mut flow_ids: Vec<u64> = minted.iter().filter_map(|p| p.flow_id).collect();
    flow_ids.sort_unstable();
    assert_eq!(flow_ids, vec![101, 102, 103, 104]);
    assert_eq!(fx.transactions(Some("update_distribution_state")).await.len(), 1);

    // Drain the outbox.
    fx.run(Task::SendTransactions).await;
    fx.run(Task::CheckTransactions).await;
    let all = fx.transactions(None).await;
    assert_eq!(all.len(), 5);
    assert!(all.iter().all(|t| t.state == TransactionState::Complete), "{:?}", all);
}

#[tokio::test]
async fn test_settlement_waits_for_new_blocks() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(2)).await.unwrap();
    fx.run(Task::Resolved).await;

    // No blocks since settlement started: the pass is a no-op.
    fx.run(Task::Settling).await;
    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.distribution.state, DistributionState::Settling);
    assert_eq!(view.settlement, Some(Progress { done: 0, total: 8 }));
}

#[tokio::test]
async fn test_events_before_window_start_are_ignored() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(1)).await.unwrap();
    let packs = fx.packs(id).await;

    // Deposited before settlement started.
    for c in &packs[0].collectibles {
        fx.emit_deposit(c, service_address());
    }
    fx.run(Task::Resolved).await;
    fx.chain.advance(3);
    fx.run(Task::Settling).await;

    let view = fx.services.app.get_distribution(id).await.unwrap();
    assert_eq!(view.settlement, Some(Progress { done: 0, total: 4 }));
}

#[tokio::test]
async fn test_abort_queues_state_update() {
    let fx = Fixture::new();
    let id = fx.services.app.create_distribution(request(2)).await.unwrap();
    fx.run(Task::Resolved).await;

    fx.services.app.abort_distribution(id).await.unwrap();
    assert_eq!(fx.distribution(id).await.state, DistributionState::Invalid);
    assert_eq!(fx.transactions(Some("update_distribution_state")).await.len(), 1);

    // Aborted distributions are no longer picked up.
    fx.chain.advance(1);
    fx.run(Task::Settling).await;
    assert_eq!(fx.distribution(id).await.state, DistributionState::Invalid);

    let err = fx.services.app.abort_distribution(id).await.unwrap_err();
    assert!(err.is_state_guard());
}

#[tokio::test]
async fn test_distributions_sharing_a_pack_contract() {
    let fx = Fixture::new();
    let (first, _) = fx.complete_distribution(2).await;

    let second = fx.services.app.create_distribution(request(2)).await.unwrap();
    fx.run(Task::Resolved).await;
    let packs = fx.packs(second).await;
    for pack in &packs {
        for c in &pack.collectibles {
            fx.emit_deposit(c, service_address());
        }
    }
    fx.run(Task::Settling).await;
    fx.run(Task::Settled).await;
    for (i, pack) in packs.iter().enumerate() {
        fx.emit_mint(201 + i as u64, pack.commitment_hash.as_deref().unwrap());
    }
    fx.run(Task::Minting).await;

    assert_eq!(fx.distribution(first).await.state, DistributionState::Complete);
    assert_eq!(fx.distribution(second).await.state, DistributionState::Complete);
}

#[tokio::test]
async fn test_set_distribution_capability_waits_for_seal() {
    let fx = Fixture::new();
    fx.services.app.set_distribution_capability(issuer_address()).await.unwrap();

    let sent = fx.chain.sent();
    assert_eq!(sent.len(), 1);
    let arg: serde_json::Value = serde_json::from_slice(&sent[0].1.transaction.arguments[0]).unwrap();
    assert_eq!(arg["value"], issuer_address().to_string());

    // An unreachable node surfaces to the caller.
    fx.chain.set_offline(true);
    assert!(fx.services.app.set_distribution_capability(issuer_address()).await.is_err());
}
