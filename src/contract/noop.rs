//! Contract implementation without chain side effects.
//!
//! Used when the chain is disabled: distributions still walk the lifecycle,
//! but nothing is escrowed or minted.

use async_trait::async_trait;

use crate::chain::Address;
use crate::contract::DistributionContract;
use crate::domain::{CirculatingPackContract, Distribution, DistributionState};
use crate::error::PdsResult;
use crate::observability::metrics;
use crate::store::StoreTx;

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContract;

async fn save(tx: &mut dyn StoreTx, distribution: &Distribution) -> PdsResult<()> {
    tx.update_distribution(distribution).await?;
    metrics::record_distribution_transition(distribution.state.as_str());
    tracing::debug!(
        distribution_id = %distribution.id,
        state = %distribution.state,
        "Distribution advanced without chain"
    );
    Ok(())
}

#[async_trait]
impl DistributionContract for NoopContract {
    async fn setup_distribution(&self, _tx: &mut dyn StoreTx, _distribution: &Distribution) -> PdsResult<()> {
        Ok(())
    }

    async fn set_distribution_capability(&self, issuer: Address) -> PdsResult<()> {
        tracing::debug!(issuer = %issuer, "Skipping capability transaction, chain disabled");
        Ok(())
    }

    async fn start_settlement(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.start_settlement()?;
        save(tx, distribution).await
    }

    async fn update_settlement_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.settle()?;
        save(tx, distribution).await
    }

    async fn start_minting(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.start_minting()?;
        save(tx, distribution).await
    }

    async fn update_minting_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.complete()?;
        save(tx, distribution).await
    }

    async fn update_circulating_pack_contract(
        &self,
        _tx: &mut dyn StoreTx,
        _contract: &mut CirculatingPackContract,
    ) -> PdsResult<()> {
        Ok(())
    }

    async fn abort(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.abort()?;
        save(tx, distribution).await
    }
}
