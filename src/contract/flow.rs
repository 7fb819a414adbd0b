//! Chain-backed contract service.
//!
//! # Responsibilities
//! - Queue settle, mint, reveal, open and state-update transactions in the outbox
//! - Poll bounded block windows for Deposit, Mint and pack events
//! - Advance Distribution, Settlement, Minting and Pack state from those events

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::chain::cadence::{address, array, boolean, encode, string, uint64, uint8};
use crate::chain::{Address, ChainEvent, TransactionSender};
use crate::config::{BatchConfig, ContractsConfig};
use crate::contract::events::{DepositEvent, MintEvent, PackEvent, PackEventKind, DEPOSIT, MINT};
use crate::contract::scripts::Scripts;
use crate::contract::{block_window, DistributionContract};
use crate::domain::{
    CirculatingPackContract, ContractRef, Distribution, DistributionState, FlowId, Minting, Pack,
    Settlement, SettlementCollectible,
};
use crate::error::{PdsError, PdsResult};
use crate::observability::metrics;
use crate::outbox::StorableTransaction;
use crate::store::{LockMode, StoreError, StoreTx};

/// Result of applying one pack event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventOutcome {
    Applied,
    Skipped(&'static str),
}

#[derive(Clone)]
pub struct FlowContract {
    sender: TransactionSender,
    scripts: Scripts,
    batching: BatchConfig,
}

impl FlowContract {
    pub fn new(sender: TransactionSender, contracts: &ContractsConfig, batching: BatchConfig) -> PdsResult<Self> {
        let pds = ContractRef::new(contracts.pds_address()?, contracts.pds_name.clone());
        let scripts = Scripts::new(pds, contracts.non_fungible_token_address()?);
        Ok(Self { sender, scripts, batching })
    }

    /// The service account doubles as escrow.
    fn escrow(&self) -> Address {
        self.sender.keys().address()
    }

    async fn window(&self, cursor: u64) -> PdsResult<Option<(u64, u64)>> {
        let latest = self.sender.gateway().get_latest_block_header().await?.height;
        Ok(block_window(cursor, latest, self.batching.max_blocks_per_check))
    }

    async fn events(&self, event_type: &str, (start, end): (u64, u64)) -> PdsResult<Vec<ChainEvent>> {
        Ok(self.sender.gateway().get_events_for_height_range(event_type, start, end).await?)
    }

    fn state_update(&self, distribution: &Distribution) -> PdsResult<StorableTransaction> {
        let state = distribution.state.chain_state().ok_or_else(|| {
            PdsError::Internal(format!("state {} has no on-chain value", distribution.state))
        })?;
        StorableTransaction::new(
            "update_distribution_state",
            self.scripts.update_dist_state(),
            &[uint64(distribution.flow_id), uint8(state)],
        )
    }

    /// First authorizer of the transaction that emitted `event`.
    async fn requester(&self, event: &ChainEvent) -> PdsResult<Option<Address>> {
        let info = self.sender.gateway().get_transaction(&event.transaction_id).await?;
        Ok(info.authorizers.first().copied())
    }

    fn reveal_transaction(
        &self,
        contract: &ContractRef,
        distribution: &Distribution,
        pack: &Pack,
        owner: Address,
    ) -> PdsResult<StorableTransaction> {
        let salt = pack
            .salt
            .clone()
            .ok_or_else(|| PdsError::Internal(format!("pack {} has no salt", pack.id)))?;
        let mut args = unsealing_args(distribution, pack)?;
        args.push(string(salt));
        args.push(address(&owner));
        args.push(boolean(pack.open_on_reveal));
        StorableTransaction::new("reveal", self.scripts.reveal(contract), &args)
    }

    fn open_transaction(
        &self,
        contract: &ContractRef,
        distribution: &Distribution,
        pack: &Pack,
        owner: Address,
    ) -> PdsResult<StorableTransaction> {
        let mut args = unsealing_args(distribution, pack)?;
        args.push(address(&owner));
        StorableTransaction::new("open", self.scripts.open(contract), &args)
    }

    async fn handle_pack_event(
        &self,
        tx: &mut dyn StoreTx,
        contract: &ContractRef,
        kind: PackEventKind,
        event: &ChainEvent,
    ) -> PdsResult<EventOutcome> {
        let decoded = match PackEvent::decode(kind, event) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(
                    event_type = %event.event_type,
                    tx_id = %event.transaction_id,
                    error = %e,
                    "Malformed pack event"
                );
                return Ok(EventOutcome::Skipped("malformed"));
            }
        };
        let Some(mut pack) = tx.find_pack_by_flow_id(contract, decoded.pack_id()).await? else {
            return Ok(EventOutcome::Skipped("unknown_pack"));
        };
        let distribution = tx.get_distribution(pack.distribution_id, LockMode::None).await?;
        if matches!(distribution.state, DistributionState::Invalid | DistributionState::Cancelled) {
            return Ok(EventOutcome::Skipped("aborted"));
        }

        match decoded {
            PackEvent::RevealRequest { open_request, .. } => {
                pack.acknowledge_reveal_request(open_request)?;
                let Some(owner) = self.requester(event).await? else {
                    return Ok(EventOutcome::Skipped("no_requester"));
                };
                let reveal = self.reveal_transaction(contract, &distribution, &pack, owner)?;
                tx.insert_transaction(&reveal).await?;
                if open_request {
                    let open = self.open_transaction(contract, &distribution, &pack, owner)?;
                    tx.insert_transaction(&open).await?;
                }
            }
            PackEvent::Revealed { .. } => pack.reveal()?,
            PackEvent::OpenRequest { .. } => {
                pack.acknowledge_open_request()?;
                let Some(owner) = self.requester(event).await? else {
                    return Ok(EventOutcome::Skipped("no_requester"));
                };
                let open = self.open_transaction(contract, &distribution, &pack, owner)?;
                tx.insert_transaction(&open).await?;
            }
            PackEvent::Opened { .. } => {
                pack.open()?;
                pack.empty()?;
            }
        }

        tx.update_pack(&pack).await?;
        tracing::info!(
            distribution_id = %distribution.id,
            pack_id = %pack.id,
            flow_id = ?pack.flow_id,
            state = %pack.state,
            event_type = kind.name(),
            "Pack event applied"
        );
        Ok(EventOutcome::Applied)
    }
}

/// `distId, packId, contract addresses, contract names, collectible ids`.
fn unsealing_args(distribution: &Distribution, pack: &Pack) -> PdsResult<Vec<Value>> {
    let flow_id = pack
        .flow_id
        .ok_or_else(|| PdsError::Internal(format!("pack {} was never minted", pack.id)))?;
    let addresses = pack.collectibles.iter().map(|c| address(&c.contract.address)).collect();
    let names = pack.collectibles.iter().map(|c| string(c.contract.name.clone())).collect();
    let ids = pack.collectibles.iter().map(|c| uint64(c.id)).collect();
    Ok(vec![uint64(distribution.flow_id), uint64(flow_id), array(addresses), array(names), array(ids)])
}

fn skipped(event: &str, reason: &'static str, error: &PdsError) {
    tracing::warn!(event_type = event, reason, error = %error, "Event skipped");
    metrics::record_event_skipped(event, reason);
}

fn transitioned(distribution: &Distribution) {
    metrics::record_distribution_transition(distribution.state.as_str());
    tracing::info!(distribution_id = %distribution.id, state = %distribution.state, "Distribution transitioned");
}

#[async_trait]
impl DistributionContract for FlowContract {
    async fn setup_distribution(&self, _tx: &mut dyn StoreTx, distribution: &Distribution) -> PdsResult<()> {
        for collectible in distribution.pack_template.collectible_contracts() {
            let tx_id = self
                .sender
                .send_and_wait(&self.scripts.link_escrow_provider(&collectible), vec![])
                .await?;
            tracing::info!(
                distribution_id = %distribution.id,
                contract = %collectible,
                tx_id = %tx_id,
                "Escrow provider linked"
            );
        }
        Ok(())
    }

    async fn set_distribution_capability(&self, issuer: Address) -> PdsResult<()> {
        let arguments = vec![encode(&address(&issuer))?];
        let tx_id = self.sender.send_and_wait(&self.scripts.set_pack_issuer_cap(), arguments).await?;
        tracing::info!(issuer = %issuer, tx_id = %tx_id, "Distribution capability shared");
        Ok(())
    }

    async fn start_settlement(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.start_settlement()?;

        let packs = tx.list_packs(distribution.id).await?;
        let latest = self.sender.gateway().get_latest_block_header().await?.height;
        let total = packs.iter().map(|p| p.collectibles.len() as u64).sum();
        let settlement = Settlement::new(distribution.id, total, self.escrow(), latest);
        tx.insert_settlement(&settlement).await?;

        let mut queued = 0;
        for batch in packs.chunks(self.batching.settlement_batch_size.max(1)) {
            let rows: Vec<SettlementCollectible> = batch
                .iter()
                .flat_map(|p| p.collectibles.iter())
                .map(|c| SettlementCollectible::new(settlement.id, c.clone()))
                .collect();
            for chunk in rows.chunks(self.batching.insert_batch_size.max(1)) {
                tx.insert_settlement_collectibles(chunk).await?;
            }

            let mut by_contract: BTreeMap<ContractRef, Vec<Value>> = BTreeMap::new();
            for row in rows.iter().filter(|r| !r.settled) {
                by_contract
                    .entry(row.collectible.contract.clone())
                    .or_default()
                    .push(uint64(row.collectible.id));
            }
            for (contract, ids) in by_contract {
                let settle = StorableTransaction::new(
                    "settle",
                    self.scripts.settle(&contract),
                    &[uint64(distribution.flow_id), array(ids)],
                )?;
                tx.insert_transaction(&settle).await?;
                queued += 1;
            }
        }

        tx.update_distribution(distribution).await?;
        transitioned(distribution);
        tracing::info!(
            distribution_id = %distribution.id,
            total,
            transactions = queued,
            start_at_block = latest,
            "Settlement started"
        );
        Ok(())
    }

    async fn update_settlement_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.ensure(DistributionState::Settling, "update the settlement of")?;
        let mut settlement = tx.find_settlement(distribution.id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "settlement",
            id: distribution.id.to_string(),
        })?;
        let Some(window) = self.window(settlement.start_at_block).await? else {
            return Ok(());
        };

        let mut pending: BTreeMap<ContractRef, HashMap<FlowId, SettlementCollectible>> = BTreeMap::new();
        for row in tx.list_pending_settlement_collectibles(settlement.id).await? {
            pending
                .entry(row.collectible.contract.clone())
                .or_default()
                .insert(row.collectible.id, row);
        }

        let mut matched = 0u64;
        for (contract, mut rows) in pending {
            for event in self.events(&contract.event_type(DEPOSIT), window).await? {
                let deposit = match DepositEvent::decode(&event) {
                    Ok(deposit) => deposit,
                    Err(e) => {
                        skipped(DEPOSIT, "malformed", &e.into());
                        continue;
                    }
                };
                if deposit.to != Some(settlement.escrow_address) {
                    continue;
                }
                let Some(mut row) = rows.remove(&deposit.id) else {
                    continue;
                };
                if let Err(e) = row.mark_settled().and_then(|_| settlement.increment_count()) {
                    skipped(DEPOSIT, "state_guard", &e.into());
                    continue;
                }
                tx.update_settlement_collectible(&row).await?;
                metrics::record_event_processed(DEPOSIT);
                matched += 1;
            }
        }

        settlement.start_at_block = window.1;
        tracing::debug!(
            distribution_id = %distribution.id,
            height_range = ?window,
            matched,
            settled = settlement.settled,
            total = settlement.total,
            "Settlement window checked"
        );
        if settlement.is_complete() {
            distribution.settle()?;
            tx.update_distribution(distribution).await?;
            transitioned(distribution);
        }
        tx.update_settlement(&settlement).await?;
        Ok(())
    }

    async fn start_minting(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.start_minting()?;

        let latest = self.sender.gateway().get_latest_block_header().await?.height;
        let pack_contract = distribution.pack_template.pack_reference.clone();
        match tx.find_circulating(&pack_contract).await? {
            Some(existing) => tracing::debug!(
                contract = %pack_contract,
                start_at_block = existing.start_at_block,
                "Pack contract already monitored"
            ),
            None => {
                tx.insert_circulating(&CirculatingPackContract::new(pack_contract.clone(), latest)).await?;
            }
        }

        let packs = tx.list_packs(distribution.id).await?;
        let minting = Minting::new(distribution.id, packs.len() as u64, latest);
        tx.insert_minting(&minting).await?;

        for batch in packs.chunks(self.batching.mint_batch_size.max(1)) {
            let hashes = batch
                .iter()
                .map(|p| {
                    p.commitment_hash
                        .clone()
                        .map(string)
                        .ok_or_else(|| PdsError::Internal(format!("pack {} has no commitment", p.id)))
                })
                .collect::<PdsResult<Vec<_>>>()?;
            let mint = StorableTransaction::new(
                "mint",
                self.scripts.mint(&pack_contract),
                &[uint64(distribution.flow_id), array(hashes), address(&distribution.issuer)],
            )?;
            tx.insert_transaction(&mint).await?;
        }

        tx.update_distribution(distribution).await?;
        transitioned(distribution);
        Ok(())
    }

    async fn update_minting_status(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.ensure(DistributionState::Minting, "update the minting of")?;
        let mut minting = tx.find_minting(distribution.id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "minting",
            id: distribution.id.to_string(),
        })?;
        let Some(window) = self.window(minting.start_at_block).await? else {
            return Ok(());
        };

        let event_type = distribution.pack_template.pack_reference.event_type(MINT);
        for event in self.events(&event_type, window).await? {
            let mint = match MintEvent::decode(&event) {
                Ok(mint) => mint,
                Err(e) => {
                    skipped(MINT, "malformed", &e.into());
                    continue;
                }
            };
            // Packs of other distributions share the contract.
            let Some(mut pack) = tx.find_pack_by_commitment(distribution.id, &mint.commit_hash).await? else {
                continue;
            };
            if let Err(e) = pack.set_flow_id(mint.id).and_then(|_| minting.increment_count()) {
                skipped(MINT, "state_guard", &e.into());
                continue;
            }
            tx.update_pack(&pack).await?;
            metrics::record_event_processed(MINT);
        }

        minting.start_at_block = window.1;
        if minting.is_complete() {
            distribution.complete()?;
            tx.insert_transaction(&self.state_update(distribution)?).await?;
            tx.update_distribution(distribution).await?;
            transitioned(distribution);
        }
        tx.update_minting(&minting).await?;
        Ok(())
    }

    async fn update_circulating_pack_contract(
        &self,
        tx: &mut dyn StoreTx,
        contract: &mut CirculatingPackContract,
    ) -> PdsResult<()> {
        let Some(window) = self.window(contract.start_at_block).await? else {
            return Ok(());
        };

        for kind in PackEventKind::ALL {
            for event in self.events(&contract.event_type(kind.name()), window).await? {
                match self.handle_pack_event(tx, &contract.contract, kind, &event).await {
                    Ok(EventOutcome::Applied) => metrics::record_event_processed(kind.name()),
                    Ok(EventOutcome::Skipped(reason)) => {
                        tracing::debug!(
                            event_type = kind.name(),
                            tx_id = %event.transaction_id,
                            reason,
                            "Event skipped"
                        );
                        metrics::record_event_skipped(kind.name(), reason);
                    }
                    Err(e) if e.is_state_guard() => skipped(kind.name(), "state_guard", &e),
                    Err(e) => return Err(e),
                }
            }
        }

        contract.start_at_block = window.1;
        tx.update_circulating(contract).await?;
        Ok(())
    }

    async fn abort(&self, tx: &mut dyn StoreTx, distribution: &mut Distribution) -> PdsResult<()> {
        distribution.abort()?;
        tx.insert_transaction(&self.state_update(distribution)?).await?;
        tx.update_distribution(distribution).await?;
        transitioned(distribution);
        Ok(())
    }
}
