//! In-memory store with row locks and an optional JSON snapshot.
//!
//! Writes go to a per-transaction overlay and become visible to other
//! transactions on commit (read committed). Row locks are taken by locking
//! reads and by every write, and are released on commit, rollback or drop.
//! With a snapshot path, committed state is written to disk after each
//! commit and loaded again on open. The snapshot belongs to one process at a
//! time: `open` creates a `.lock` file next to it and fails with
//! [`StoreError::SnapshotInUse`] while another store holds it, so CLI
//! commands against a snapshot need `run` stopped first.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::domain::{
    CirculatingPackContract, ContractRef, Distribution, DistributionState, FlowId, Minting, Pack,
    Settlement, SettlementCollectible,
};
use crate::outbox::{StorableTransaction, TransactionState};
use crate::store::{LockMode, Store, StoreError, StoreResult, StoreTx};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Row<T> {
    seq: u64,
    value: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Table<T> {
    rows: HashMap<Uuid, Row<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { rows: HashMap::new() }
    }
}

impl<T> Table<T> {
    fn merge(&mut self, other: Table<T>) {
        self.rows.extend(other.rows);
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    #[serde(default)]
    next_seq: u64,
    distributions: Table<Distribution>,
    packs: Table<Pack>,
    settlements: Table<Settlement>,
    settlement_collectibles: Table<SettlementCollectible>,
    mintings: Table<Minting>,
    circulating: Table<CirculatingPackContract>,
    transactions: Table<StorableTransaction>,
}

impl Tables {
    fn merge(&mut self, other: Tables) {
        self.distributions.merge(other.distributions);
        self.packs.merge(other.packs);
        self.settlements.merge(other.settlements);
        self.settlement_collectibles.merge(other.settlement_collectibles);
        self.mintings.merge(other.mintings);
        self.circulating.merge(other.circulating);
        self.transactions.merge(other.transactions);
    }
}

trait Entity: Clone + Send + 'static {
    const NAME: &'static str;
    fn key(&self) -> Uuid;
    fn table(tables: &Tables) -> &Table<Self>;
    fn table_mut(tables: &mut Tables) -> &mut Table<Self>;
}

macro_rules! entity {
    ($ty:ty, $name:literal, $field:ident) => {
        impl Entity for $ty {
            const NAME: &'static str = $name;
            fn key(&self) -> Uuid {
                self.id
            }
            fn table(tables: &Tables) -> &Table<Self> {
                &tables.$field
            }
            fn table_mut(tables: &mut Tables) -> &mut Table<Self> {
                &mut tables.$field
            }
        }
    };
}

entity!(Distribution, "distribution", distributions);
entity!(Pack, "pack", packs);
entity!(Settlement, "settlement", settlements);
entity!(SettlementCollectible, "settlement collectible", settlement_collectibles);
entity!(Minting, "minting", mintings);
entity!(CirculatingPackContract, "circulating pack contract", circulating);
entity!(StorableTransaction, "transaction", transactions);

type RowKey = (&'static str, Uuid);

#[derive(Debug, Default)]
struct Shared {
    tables: Tables,
    locks: HashMap<RowKey, u64>,
    next_tx: u64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// Exclusive claim on a snapshot path, released on drop.
#[derive(Debug)]
struct SnapshotLock {
    path: PathBuf,
}

impl SnapshotLock {
    fn acquire(snapshot: &Path) -> StoreResult<Self> {
        let path = snapshot.with_extension("lock");
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::SnapshotInUse(path.display().to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for SnapshotLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove snapshot lock");
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    snapshot: Option<PathBuf>,
    _lock: Option<Arc<SnapshotLock>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a store persisted at `path`, loading it if it exists.
    ///
    /// Fails with [`StoreError::SnapshotInUse`] while another store, in this
    /// process or another, has the same path open.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let lock = SnapshotLock::acquire(&path)?;
        let tables = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content).map_err(|e| StoreError::Serialization(e.to_string()))?
        } else {
            Tables::default()
        };
        tracing::info!(path = %path.display(), "Store snapshot opened");
        Ok(Self {
            shared: Arc::new(Mutex::new(Shared { tables, ..Shared::default() })),
            snapshot: Some(path),
            _lock: Some(Arc::new(lock)),
        })
    }

    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        match &config.snapshot_path {
            Some(path) => Self::open(path),
            None => Ok(Self::new()),
        }
    }

    /// Number of row locks currently held by open transactions.
    pub fn held_locks(&self) -> usize {
        lock(&self.shared).locks.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx_id = {
            let mut shared = lock(&self.shared);
            shared.next_tx += 1;
            shared.next_tx
        };
        Ok(Box::new(MemoryTx {
            shared: Arc::clone(&self.shared),
            snapshot: self.snapshot.clone(),
            tx_id,
            pending: Tables::default(),
            held: HashSet::new(),
            finished: false,
        }))
    }
}

struct MemoryTx {
    shared: Arc<Mutex<Shared>>,
    snapshot: Option<PathBuf>,
    tx_id: u64,
    pending: Tables,
    held: HashSet<RowKey>,
    finished: bool,
}

impl MemoryTx {
    fn check_open(&self) -> StoreResult<()> {
        if self.finished {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Take the row lock unless another transaction holds it.
    fn acquire(&mut self, shared: &mut Shared, key: RowKey) -> bool {
        match shared.locks.get(&key) {
            Some(&owner) if owner != self.tx_id => false,
            _ => {
                shared.locks.insert(key, self.tx_id);
                self.held.insert(key);
                true
            }
        }
    }

    fn release(&mut self, shared: &mut Shared) {
        for key in self.held.drain() {
            if shared.locks.get(&key) == Some(&self.tx_id) {
                shared.locks.remove(&key);
            }
        }
    }

    fn insert<T: Entity>(&mut self, value: &T) -> StoreResult<()> {
        self.check_open()?;
        let arc = Arc::clone(&self.shared);
        let mut shared = lock(&arc);
        let id = value.key();
        if T::table(&shared.tables).rows.contains_key(&id) || T::table(&self.pending).rows.contains_key(&id) {
            return Err(StoreError::Conflict { entity: T::NAME, id: id.to_string() });
        }
        shared.tables.next_seq += 1;
        let seq = shared.tables.next_seq;
        self.acquire(&mut shared, (T::NAME, id));
        T::table_mut(&mut self.pending).rows.insert(id, Row { seq, value: value.clone() });
        Ok(())
    }

    fn insert_all<T: Entity>(&mut self, values: &[T]) -> StoreResult<()> {
        for value in values {
            self.insert(value)?;
        }
        Ok(())
    }

    fn update<T: Entity>(&mut self, value: &T) -> StoreResult<()> {
        self.check_open()?;
        let arc = Arc::clone(&self.shared);
        let mut shared = lock(&arc);
        let id = value.key();
        let seq = T::table(&self.pending)
            .rows
            .get(&id)
            .or_else(|| T::table(&shared.tables).rows.get(&id))
            .map(|row| row.seq)
            .ok_or_else(|| StoreError::NotFound { entity: T::NAME, id: id.to_string() })?;
        if !self.acquire(&mut shared, (T::NAME, id)) {
            return Err(StoreError::Locked { entity: T::NAME, id: id.to_string() });
        }
        T::table_mut(&mut self.pending).rows.insert(id, Row { seq, value: value.clone() });
        Ok(())
    }

    fn get<T: Entity>(&mut self, id: Uuid, mode: LockMode) -> StoreResult<T> {
        self.check_open()?;
        let arc = Arc::clone(&self.shared);
        let mut shared = lock(&arc);
        let value = T::table(&self.pending)
            .rows
            .get(&id)
            .or_else(|| T::table(&shared.tables).rows.get(&id))
            .map(|row| row.value.clone())
            .ok_or_else(|| StoreError::NotFound { entity: T::NAME, id: id.to_string() })?;
        if mode != LockMode::None && !self.acquire(&mut shared, (T::NAME, id)) {
            return Err(StoreError::Locked { entity: T::NAME, id: id.to_string() });
        }
        Ok(value)
    }

    /// Rows matching `filter` in insertion order, locked according to `mode`.
    fn select<T: Entity>(
        &mut self,
        mode: LockMode,
        limit: Option<usize>,
        filter: impl Fn(&T) -> bool,
    ) -> StoreResult<Vec<T>> {
        self.check_open()?;
        let arc = Arc::clone(&self.shared);
        let mut shared = lock(&arc);

        let pending = T::table(&self.pending);
        let mut rows: Vec<(u64, Uuid, T)> = T::table(&shared.tables)
            .rows
            .iter()
            .filter(|(id, _)| !pending.rows.contains_key(*id))
            .chain(pending.rows.iter())
            .filter(|(_, row)| filter(&row.value))
            .map(|(id, row)| (row.seq, *id, row.value.clone()))
            .collect();
        rows.sort_by_key(|(seq, _, _)| *seq);

        let mut out = Vec::new();
        for (_, id, value) in rows {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            if mode != LockMode::None && !self.acquire(&mut shared, (T::NAME, id)) {
                if mode == LockMode::NoWait {
                    return Err(StoreError::Locked { entity: T::NAME, id: id.to_string() });
                }
                continue;
            }
            out.push(value);
        }
        Ok(out)
    }

    fn first<T: Entity>(&mut self, filter: impl Fn(&T) -> bool) -> StoreResult<Option<T>> {
        Ok(self.select(LockMode::None, Some(1), filter)?.into_iter().next())
    }

    fn finish(&mut self, keep: bool) -> StoreResult<Option<Tables>> {
        self.check_open()?;
        let arc = Arc::clone(&self.shared);
        let mut shared = lock(&arc);
        let pending = std::mem::take(&mut self.pending);
        if keep {
            shared.tables.merge(pending);
        }
        self.release(&mut shared);
        self.finished = true;
        Ok(if keep && self.snapshot.is_some() { Some(shared.tables.clone()) } else { None })
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if !self.finished {
            let arc = Arc::clone(&self.shared);
            let mut shared = lock(&arc);
            self.release(&mut shared);
        }
    }
}

fn write_snapshot(path: &Path, tables: &Tables) -> StoreResult<()> {
    let json = serde_json::to_string(tables).map_err(|e| StoreError::Serialization(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn insert_distribution(&mut self, distribution: &Distribution) -> StoreResult<()> {
        self.insert(distribution)
    }

    async fn update_distribution(&mut self, distribution: &Distribution) -> StoreResult<()> {
        self.update(distribution)
    }

    async fn get_distribution(&mut self, id: Uuid, lock: LockMode) -> StoreResult<Distribution> {
        self.get(id, lock)
    }

    async fn list_distributions(&mut self, offset: usize, limit: usize) -> StoreResult<Vec<Distribution>> {
        let all = self.select::<Distribution>(LockMode::None, None, |_| true)?;
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_distributions_in_state(
        &mut self,
        state: DistributionState,
        lock: LockMode,
    ) -> StoreResult<Vec<Distribution>> {
        self.select(lock, None, |d: &Distribution| d.state == state)
    }

    async fn insert_packs(&mut self, packs: &[Pack]) -> StoreResult<()> {
        self.insert_all(packs)
    }

    async fn update_pack(&mut self, pack: &Pack) -> StoreResult<()> {
        self.update(pack)
    }

    async fn list_packs(&mut self, distribution_id: Uuid) -> StoreResult<Vec<Pack>> {
        self.select(LockMode::None, None, |p: &Pack| p.distribution_id == distribution_id)
    }

    async fn find_pack_by_commitment(
        &mut self,
        distribution_id: Uuid,
        commitment_hash: &str,
    ) -> StoreResult<Option<Pack>> {
        self.first(|p: &Pack| {
            p.distribution_id == distribution_id && p.commitment_hash.as_deref() == Some(commitment_hash)
        })
    }

    async fn find_pack_by_flow_id(
        &mut self,
        pack_contract: &ContractRef,
        flow_id: FlowId,
    ) -> StoreResult<Option<Pack>> {
        let candidates = self.select(LockMode::None, None, |p: &Pack| p.flow_id == Some(flow_id))?;
        for pack in candidates {
            let distribution: Distribution = self.get(pack.distribution_id, LockMode::None)?;
            if distribution.pack_template.pack_reference == *pack_contract {
                return Ok(Some(pack));
            }
        }
        Ok(None)
    }

    async fn insert_settlement(&mut self, settlement: &Settlement) -> StoreResult<()> {
        self.insert(settlement)
    }

    async fn update_settlement(&mut self, settlement: &Settlement) -> StoreResult<()> {
        self.update(settlement)
    }

    async fn find_settlement(&mut self, distribution_id: Uuid) -> StoreResult<Option<Settlement>> {
        self.first(|s: &Settlement| s.distribution_id == distribution_id)
    }

    async fn insert_settlement_collectibles(&mut self, rows: &[SettlementCollectible]) -> StoreResult<()> {
        self.insert_all(rows)
    }

    async fn update_settlement_collectible(&mut self, row: &SettlementCollectible) -> StoreResult<()> {
        self.update(row)
    }

    async fn list_pending_settlement_collectibles(
        &mut self,
        settlement_id: Uuid,
    ) -> StoreResult<Vec<SettlementCollectible>> {
        self.select(LockMode::None, None, |r: &SettlementCollectible| {
            r.settlement_id == settlement_id && !r.settled
        })
    }

    async fn insert_minting(&mut self, minting: &Minting) -> StoreResult<()> {
        self.insert(minting)
    }

    async fn update_minting(&mut self, minting: &Minting) -> StoreResult<()> {
        self.update(minting)
    }

    async fn find_minting(&mut self, distribution_id: Uuid) -> StoreResult<Option<Minting>> {
        self.first(|m: &Minting| m.distribution_id == distribution_id)
    }

    async fn insert_circulating(&mut self, contract: &CirculatingPackContract) -> StoreResult<()> {
        self.insert(contract)
    }

    async fn update_circulating(&mut self, contract: &CirculatingPackContract) -> StoreResult<()> {
        self.update(contract)
    }

    async fn find_circulating(&mut self, contract: &ContractRef) -> StoreResult<Option<CirculatingPackContract>> {
        self.first(|c: &CirculatingPackContract| c.contract == *contract)
    }

    async fn list_circulating(&mut self, lock: LockMode) -> StoreResult<Vec<CirculatingPackContract>> {
        self.select(lock, None, |_: &CirculatingPackContract| true)
    }

    async fn insert_transaction(&mut self, transaction: &StorableTransaction) -> StoreResult<()> {
        self.insert(transaction)
    }

    async fn update_transaction(&mut self, transaction: &StorableTransaction) -> StoreResult<()> {
        self.update(transaction)
    }

    async fn list_transactions(
        &mut self,
        states: &[TransactionState],
        limit: Option<usize>,
        lock: LockMode,
    ) -> StoreResult<Vec<StorableTransaction>> {
        self.select(lock, limit, |t: &StorableTransaction| states.contains(&t.state))
    }

    async fn commit(&mut self) -> StoreResult<()> {
        if let Some(tables) = self.finish(true)? {
            if let Some(path) = &self.snapshot {
                write_snapshot(path, &tables)?;
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.finish(false)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;
    use crate::domain::template::tests::two_bucket_template;
    use crate::domain::DistributionMeta;

    fn distribution() -> Distribution {
        Distribution::new(1, Address::ZERO, DistributionMeta::default(), two_bucket_template(4))
    }

    async fn seeded(store: &MemoryStore) -> Distribution {
        let d = distribution();
        let mut tx = store.begin().await.unwrap();
        tx.insert_distribution(&d).await.unwrap();
        tx.commit().await.unwrap();
        d
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let d = distribution();

        let mut writer = store.begin().await.unwrap();
        writer.insert_distribution(&d).await.unwrap();
        assert!(writer.get_distribution(d.id, LockMode::None).await.is_ok());

        let mut reader = store.begin().await.unwrap();
        assert!(matches!(
            reader.get_distribution(d.id, LockMode::None).await,
            Err(StoreError::NotFound { .. })
        ));

        writer.commit().await.unwrap();
        assert!(reader.get_distribution(d.id, LockMode::None).await.is_ok());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = MemoryStore::new();
        let mut d = seeded(&store).await;

        let mut tx = store.begin().await.unwrap();
        d.resolve().unwrap();
        tx.update_distribution(&d).await.unwrap();
        tx.rollback().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Closed)));

        let mut tx = store.begin().await.unwrap();
        let stored = tx.get_distribution(d.id, LockMode::None).await.unwrap();
        assert_eq!(stored.state, DistributionState::Init);
    }

    #[tokio::test]
    async fn test_skip_locked_and_no_wait() {
        let store = MemoryStore::new();
        let d = seeded(&store).await;

        let mut first = store.begin().await.unwrap();
        let locked = first.list_distributions_in_state(DistributionState::Init, LockMode::SkipLocked).await.unwrap();
        assert_eq!(locked.len(), 1);

        let mut second = store.begin().await.unwrap();
        let skipped = second.list_distributions_in_state(DistributionState::Init, LockMode::SkipLocked).await.unwrap();
        assert!(skipped.is_empty());
        assert!(matches!(
            second.get_distribution(d.id, LockMode::NoWait).await,
            Err(StoreError::Locked { .. })
        ));
        assert!(matches!(second.update_distribution(&d).await, Err(StoreError::Locked { .. })));
        // Plain reads still see the committed row.
        assert!(second.get_distribution(d.id, LockMode::None).await.is_ok());

        drop(first);
        assert_eq!(store.held_locks(), 0);
        assert!(second.get_distribution(d.id, LockMode::NoWait).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let store = MemoryStore::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(seeded(&store).await.id);
        }
        let mut tx = store.begin().await.unwrap();
        let page: Vec<Uuid> = tx.list_distributions(1, 3).await.unwrap().iter().map(|d| d.id).collect();
        assert_eq!(page, ids[1..4].to_vec());
    }

    #[tokio::test]
    async fn test_insert_conflict() {
        let store = MemoryStore::new();
        let d = seeded(&store).await;
        let mut tx = store.begin().await.unwrap();
        assert!(matches!(tx.insert_distribution(&d).await, Err(StoreError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = MemoryStore::open(&path).unwrap();
        let d = seeded(&store).await;
        assert!(path.exists());
        drop(store);

        let reopened = MemoryStore::open(&path).unwrap();
        let mut tx = reopened.begin().await.unwrap();
        assert_eq!(tx.get_distribution(d.id, LockMode::None).await.unwrap(), d);

        // New rows still sort after restored ones.
        let later = seeded(&reopened).await;
        let all = tx.list_distributions(0, 10).await.unwrap();
        assert_eq!(all.last().map(|x| x.id), Some(later.id));
    }

    #[tokio::test]
    async fn test_snapshot_is_held_by_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let running = MemoryStore::open(&path).unwrap();
        let d = seeded(&running).await;
        assert!(matches!(MemoryStore::open(&path), Err(StoreError::SnapshotInUse(_))));

        // Clones share the claim; it is released with the last handle.
        let clone = running.clone();
        drop(running);
        assert!(matches!(MemoryStore::open(&path), Err(StoreError::SnapshotInUse(_))));
        drop(clone);
        assert!(!dir.path().join("store.lock").exists());

        let reopened = MemoryStore::open(&path).unwrap();
        let mut tx = reopened.begin().await.unwrap();
        assert_eq!(tx.get_distribution(d.id, LockMode::None).await.unwrap(), d);
    }
}
