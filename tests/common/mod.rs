//! Shared fixture for integration tests: an in-memory chain and store wired
//! into the real contract service, outbox and poller.
#![allow(dead_code)]

use std::sync::Arc;
use uuid::Uuid;

use pds_custodian::app::{build_with_gateway, Services};
use pds_custodian::chain::cadence::{address, boolean, event_payload, optional, string, uint64};
use pds_custodian::chain::{Address, ChainGateway, InMemoryChain, Wallet};
use pds_custodian::config::ServiceConfig;
use pds_custodian::domain::{Bucket, Collectible, ContractRef, Distribution, DistributionMeta, Pack, PackTemplate};
use pds_custodian::outbox::{StorableTransaction, TransactionState};
use pds_custodian::poller::Task;
use pds_custodian::store::{LockMode, MemoryStore, Store};
use pds_custodian::CreateDistributionRequest;

pub const TEST_PRIVATE_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const ALL_STATES: [TransactionState; 5] = [
    TransactionState::Init,
    TransactionState::Retry,
    TransactionState::Sent,
    TransactionState::Failed,
    TransactionState::Complete,
];

pub fn service_address() -> Address {
    "0xf8d6e0586b0a20c7".parse().unwrap()
}

pub fn issuer_address() -> Address {
    "0x179b6b1cb6755e31".parse().unwrap()
}

pub fn holder_address() -> Address {
    "0xe03daebed8ca0615".parse().unwrap()
}

pub fn nft() -> ContractRef {
    ContractRef::new("0x01cf0e2f2f715450".parse().unwrap(), "ExampleNFT")
}

pub fn pack_contract() -> ContractRef {
    ContractRef::new("0x01cf0e2f2f715450".parse().unwrap(), "PackNFT")
}

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.chain.enabled = true;
    config.chain.seal_timeout_secs = 2;
    config.chain.seal_poll_base_ms = 5;
    config.chain.seal_poll_max_ms = 20;
    config.account.address = service_address().to_string();
    config.account.key_indexes = vec![0, 1];
    config.batching.settlement_batch_size = 2;
    config.batching.mint_batch_size = 2;
    config.batching.insert_batch_size = 3;
    config.poller.interval_ms = 10;
    config
}

/// Two buckets of 80 and 20, two draws each, four slots.
pub fn request(pack_count: u32) -> CreateDistributionRequest {
    CreateDistributionRequest {
        flow_id: 7,
        issuer: issuer_address(),
        meta: DistributionMeta { title: "Series 1".into(), ..Default::default() },
        pack_template: PackTemplate {
            pack_reference: pack_contract(),
            pack_count,
            buckets: vec![
                Bucket { collectible_reference: nft(), per_pack: 2, pool: (1..=80).collect() },
                Bucket { collectible_reference: nft(), per_pack: 2, pool: (81..=100).collect() },
            ],
            slots: vec![vec![0], vec![0, 1], vec![1], vec![0, 1]],
        },
    }
}

/// `request` with every bucket drawing from `collectible`.
pub fn request_for(collectible: ContractRef, pack_count: u32) -> CreateDistributionRequest {
    let mut request = request(pack_count);
    for bucket in &mut request.pack_template.buckets {
        bucket.collectible_reference = collectible.clone();
    }
    request
}

pub struct Fixture {
    pub chain: Arc<InMemoryChain>,
    pub store: Arc<MemoryStore>,
    pub services: Services,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        Self::with_gateway(config, |chain| chain as Arc<dyn ChainGateway>)
    }

    /// Route the services through `wrap`, which sits in front of the
    /// in-memory chain.
    pub fn with_gateway(
        config: ServiceConfig,
        wrap: impl FnOnce(Arc<InMemoryChain>) -> Arc<dyn ChainGateway>,
    ) -> Self {
        let chain = Arc::new(InMemoryChain::new(100));
        chain.add_account(service_address(), &config.account.key_indexes);
        let store = Arc::new(MemoryStore::new());
        let wallet = Wallet::from_private_key(service_address(), TEST_PRIVATE_KEY).unwrap();
        let gateway = wrap(chain.clone());
        let services = build_with_gateway(&config, store.clone(), gateway, wallet).unwrap();
        Self { chain, store, services }
    }

    pub async fn run(&self, task: Task) {
        self.services.poller.execute(task).await.unwrap();
    }

    pub async fn distribution(&self, id: Uuid) -> Distribution {
        let mut tx = self.store.begin().await.unwrap();
        tx.get_distribution(id, LockMode::None).await.unwrap()
    }

    pub async fn packs(&self, id: Uuid) -> Vec<Pack> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_packs(id).await.unwrap()
    }

    /// Stored transactions, optionally filtered by kind tag.
    pub async fn transactions(&self, name: Option<&str>) -> Vec<StorableTransaction> {
        let mut tx = self.store.begin().await.unwrap();
        tx.list_transactions(&ALL_STATES, None, LockMode::None)
            .await
            .unwrap()
            .into_iter()
            .filter(|t| name.map_or(true, |n| t.name == n))
            .collect()
    }

    pub fn emit_deposit(&self, collectible: &Collectible, to: Address) -> u64 {
        self.chain.emit(
            &collectible.contract.event_type("Deposit"),
            event_payload("Deposit", vec![("id", uint64(collectible.id)), ("to", optional(address(&to)))]),
        )
    }

    pub fn emit_mint(&self, flow_id: u64, commit_hash: &str) -> u64 {
        self.chain.emit(
            &pack_contract().event_type("Mint"),
            event_payload("Mint", vec![("id", uint64(flow_id)), ("commitHash", string(commit_hash))]),
        )
    }

    pub fn emit_reveal_request(&self, flow_id: u64, open_request: bool) -> u64 {
        self.chain.emit_from(
            &pack_contract().event_type("RevealRequest"),
            event_payload(
                "RevealRequest",
                vec![("id", uint64(flow_id)), ("openRequest", boolean(open_request))],
            ),
            Some(holder_address()),
        )
    }

    pub fn emit_pack_event(&self, event: &str, flow_id: u64) -> u64 {
        self.chain.emit_from(
            &pack_contract().event_type(event),
            event_payload(event, vec![("id", uint64(flow_id))]),
            Some(holder_address()),
        )
    }

    /// Create a distribution and drive it to `Complete`, minting pack token
    /// ids 101, 102, ... in pack order.
    pub async fn complete_distribution(&self, pack_count: u32) -> (Uuid, Vec<Pack>) {
        let id = self.services.app.create_distribution(request(pack_count)).await.unwrap();
        self.run(Task::Resolved).await;

        for pack in self.packs(id).await {
            for c in &pack.collectibles {
                self.emit_deposit(c, service_address());
            }
        }
        self.run(Task::Settling).await;
        self.run(Task::Settled).await;

        for (i, pack) in self.packs(id).await.iter().enumerate() {
            self.emit_mint(101 + i as u64, pack.commitment_hash.as_deref().unwrap());
        }
        self.run(Task::Minting).await;
        (id, self.packs(id).await)
    }
}
