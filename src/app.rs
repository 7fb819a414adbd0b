//! Inbound operations and service wiring.
//!
//! `App` is the API surface the CLI (or any transport) calls. `build` wires
//! store, chain collaborators, contract service and poller from config.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::chain::{Address, ChainGateway, FlowRestGateway, KeySource, TransactionSender, Wallet};
use crate::config::ServiceConfig;
use crate::contract::{DistributionContract, FlowContract, NoopContract};
use crate::domain::resolution;
use crate::domain::{Collectible, Distribution, DistributionMeta, FlowId, PackTemplate};
use crate::error::PdsResult;
use crate::observability::metrics;
use crate::outbox::Outbox;
use crate::poller::Poller;
use crate::store::{LockMode, MemoryStore, Store};

/// Request to create a distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDistributionRequest {
    /// Distribution id already registered on chain by the issuer.
    pub flow_id: FlowId,
    pub issuer: Address,
    #[serde(default)]
    pub meta: DistributionMeta,
    pub pack_template: PackTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: u64,
    pub total: u64,
}

/// A distribution with its stage progress.
#[derive(Debug, Clone, Serialize)]
pub struct DistributionView {
    #[serde(flatten)]
    pub distribution: Distribution,
    pub pack_count: usize,
    pub packs_by_state: BTreeMap<&'static str, usize>,
    pub settlement: Option<Progress>,
    pub minting: Option<Progress>,
}

#[derive(Clone)]
pub struct App {
    store: Arc<dyn Store>,
    contract: Arc<dyn DistributionContract>,
}

impl App {
    pub fn new(store: Arc<dyn Store>, contract: Arc<dyn DistributionContract>) -> Self {
        Self { store, contract }
    }

    /// Validate, resolve and persist a distribution with its sealed packs.
    pub async fn create_distribution(&self, request: CreateDistributionRequest) -> PdsResult<Uuid> {
        let mut distribution =
            Distribution::new(request.flow_id, request.issuer, request.meta, request.pack_template);
        let packs = resolution::resolve(&mut distribution)?;

        let mut tx = self.store.begin().await?;
        tx.insert_distribution(&distribution).await?;
        tx.insert_packs(&packs).await?;
        tx.commit().await?;

        metrics::record_distribution_transition(distribution.state.as_str());
        tracing::info!(
            distribution_id = %distribution.id,
            flow_id = distribution.flow_id,
            issuer = %distribution.issuer,
            packs = packs.len(),
            "Distribution created"
        );
        Ok(distribution.id)
    }

    pub async fn get_distribution(&self, id: Uuid) -> PdsResult<DistributionView> {
        let mut tx = self.store.begin().await?;
        let distribution = tx.get_distribution(id, LockMode::None).await?;
        let packs = tx.list_packs(id).await?;
        let settlement = tx
            .find_settlement(id)
            .await?
            .map(|s| Progress { done: s.settled, total: s.total });
        let minting = tx
            .find_minting(id)
            .await?
            .map(|m| Progress { done: m.minted, total: m.total });
        tx.rollback().await?;

        let mut packs_by_state = BTreeMap::new();
        for pack in &packs {
            *packs_by_state.entry(pack.state.as_str()).or_insert(0) += 1;
        }
        Ok(DistributionView {
            distribution,
            pack_count: packs.len(),
            packs_by_state,
            settlement,
            minting,
        })
    }

    pub async fn list_distributions(&self, offset: usize, limit: usize) -> PdsResult<Vec<Distribution>> {
        let mut tx = self.store.begin().await?;
        let distributions = tx.list_distributions(offset, limit).await?;
        tx.rollback().await?;
        Ok(distributions)
    }

    /// Abort a distribution. Fails fast if a poller currently holds it.
    pub async fn abort_distribution(&self, id: Uuid) -> PdsResult<()> {
        let mut tx = self.store.begin().await?;
        let mut distribution = tx.get_distribution(id, LockMode::NoWait).await?;
        self.contract.abort(tx.as_mut(), &mut distribution).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Cancel a distribution whose settlement has not started.
    pub async fn cancel_distribution(&self, id: Uuid) -> PdsResult<()> {
        let mut tx = self.store.begin().await?;
        let mut distribution = tx.get_distribution(id, LockMode::NoWait).await?;
        distribution.cancel()?;
        tx.update_distribution(&distribution).await?;
        tx.commit().await?;
        metrics::record_distribution_transition(distribution.state.as_str());
        tracing::info!(distribution_id = %id, "Distribution cancelled");
        Ok(())
    }

    pub async fn set_distribution_capability(&self, issuer: Address) -> PdsResult<()> {
        self.contract.set_distribution_capability(issuer).await
    }

    /// Every packed collectible, freshly shuffled on each call.
    pub async fn resolved_collection(&self, id: Uuid) -> PdsResult<Vec<Collectible>> {
        let mut tx = self.store.begin().await?;
        let distribution = tx.get_distribution(id, LockMode::None).await?;
        let packs = tx.list_packs(id).await?;
        tx.rollback().await?;
        resolution::resolved_collection(&distribution, &packs)
    }
}

/// Wired service components.
pub struct Services {
    pub app: App,
    pub poller: Poller,
}

/// Wire everything from configuration.
pub fn build(config: &ServiceConfig) -> PdsResult<Services> {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::from_config(&config.store)?);
    if !config.chain.enabled {
        tracing::warn!("Chain disabled, distributions advance without on-chain effects");
        return Ok(build_offline(config, store));
    }

    let gateway: Arc<dyn ChainGateway> = Arc::new(FlowRestGateway::new(&config.chain)?);
    let account = config.account.address()?;
    let wallet = Wallet::from_env(account, &config.account.private_key_env)?;
    build_with_gateway(config, store, gateway, wallet)
}

/// Wire the chain-backed contract against an explicit gateway.
pub fn build_with_gateway(
    config: &ServiceConfig,
    store: Arc<dyn Store>,
    gateway: Arc<dyn ChainGateway>,
    wallet: Wallet,
) -> PdsResult<Services> {
    let keys = Arc::new(KeySource::new(wallet.address(), config.account.key_indexes.clone())?);
    let sender = TransactionSender::new(gateway, keys, wallet, &config.chain);
    let contract: Arc<dyn DistributionContract> =
        Arc::new(FlowContract::new(sender.clone(), &config.contracts, config.batching.clone())?);
    let outbox = Outbox::new(sender, config.batching.outbox_batch_size);

    Ok(Services {
        app: App::new(store.clone(), contract.clone()),
        poller: Poller::new(store, contract, Some(outbox), poll_interval(config)),
    })
}

pub fn build_offline(config: &ServiceConfig, store: Arc<dyn Store>) -> Services {
    let contract: Arc<dyn DistributionContract> = Arc::new(NoopContract);
    Services {
        app: App::new(store.clone(), contract.clone()),
        poller: Poller::new(store, contract, None, poll_interval(config)),
    }
}

fn poll_interval(config: &ServiceConfig) -> Duration {
    Duration::from_millis(config.poller.interval_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::template::tests::two_bucket_template;
    use crate::domain::{DistributionState, TemplateError};
    use crate::error::PdsError;
    use crate::store::StoreError;

    fn app() -> App {
        build_offline(&ServiceConfig::default(), Arc::new(MemoryStore::new())).app
    }

    fn request(pack_count: u32) -> CreateDistributionRequest {
        CreateDistributionRequest {
            flow_id: 1,
            issuer: Address::ZERO,
            meta: DistributionMeta { title: "Series 1".into(), ..Default::default() },
            pack_template: two_bucket_template(pack_count),
        }
    }

    #[tokio::test]
    async fn test_create_and_show() {
        let app = app();
        let id = app.create_distribution(request(4)).await.unwrap();

        let view = app.get_distribution(id).await.unwrap();
        assert_eq!(view.distribution.state, DistributionState::Resolved);
        assert_eq!(view.pack_count, 4);
        assert_eq!(view.packs_by_state.get("sealed"), Some(&4));
        assert!(view.settlement.is_none());

        assert_eq!(app.list_distributions(0, 10).await.unwrap().len(), 1);
        assert_eq!(app.resolved_collection(id).await.unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_invalid_template_is_not_persisted() {
        let app = app();
        let err = app.create_distribution(request(0)).await.unwrap_err();
        assert!(matches!(err, PdsError::Template(TemplateError::ZeroPackCount)));
        assert!(app.list_distributions(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_abort() {
        let app = app();
        let id = app.create_distribution(request(2)).await.unwrap();
        app.abort_distribution(id).await.unwrap();
        let view = app.get_distribution(id).await.unwrap();
        assert_eq!(view.distribution.state, DistributionState::Invalid);
        assert!(app.abort_distribution(id).await.unwrap_err().is_state_guard());
        assert!(app.cancel_distribution(id).await.unwrap_err().is_state_guard());
    }

    #[tokio::test]
    async fn test_cancel_resolved_distribution() {
        let app = app();
        let id = app.create_distribution(request(2)).await.unwrap();
        app.cancel_distribution(id).await.unwrap();

        let view = app.get_distribution(id).await.unwrap();
        assert_eq!(view.distribution.state, DistributionState::Cancelled);
        assert!(app.abort_distribution(id).await.unwrap_err().is_state_guard());
    }

    #[tokio::test]
    async fn test_unknown_distribution() {
        let err = app().get_distribution(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PdsError::Store(StoreError::NotFound { .. })));
    }
}
