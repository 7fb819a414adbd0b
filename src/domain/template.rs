//! Pack templates: buckets, per-pack draw counts and the slot layout.
//!
//! A template describes what every pack of a distribution contains. Each
//! bucket contributes exactly `per_pack` collectibles to every pack; each
//! slot lists the buckets allowed to fill it. A template is valid only when
//! every pack can be filled slot by slot without exceeding any quota.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::domain::collectible::{Collectible, ContractRef, FlowId};
use crate::domain::error::TemplateError;

/// A pool of candidate collectibles from one collectible contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub collectible_reference: ContractRef,
    /// Number of collectibles every pack draws from this bucket.
    pub per_pack: u32,
    pub pool: Vec<FlowId>,
}

impl Bucket {
    pub fn collectible(&self, id: FlowId) -> Collectible {
        Collectible::new(self.collectible_reference.clone(), id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackTemplate {
    pub pack_reference: ContractRef,
    pub pack_count: u32,
    pub buckets: Vec<Bucket>,
    /// Allowed bucket indexes per slot. Empty means one slot per draw,
    /// pinned to its bucket in bucket order.
    #[serde(default)]
    pub slots: Vec<Vec<usize>>,
}

impl PackTemplate {
    /// The effective slot layout.
    pub fn layout(&self) -> Vec<Vec<usize>> {
        if !self.slots.is_empty() {
            return self.slots.clone();
        }
        self.buckets
            .iter()
            .enumerate()
            .flat_map(|(i, b)| std::iter::repeat(vec![i]).take(b.per_pack as usize))
            .collect()
    }

    pub fn slot_count(&self) -> usize {
        self.layout().len()
    }

    /// Total collectibles consumed across all packs.
    pub fn collectible_count(&self) -> usize {
        self.pack_count as usize * self.slot_count()
    }

    /// Distinct collectible contracts referenced by the buckets, sorted.
    pub fn collectible_contracts(&self) -> Vec<ContractRef> {
        self.buckets
            .iter()
            .map(|b| b.collectible_reference.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn quotas(&self) -> Vec<u32> {
        self.buckets.iter().map(|b| b.per_pack).collect()
    }

    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.pack_count == 0 {
            return Err(TemplateError::ZeroPackCount);
        }
        if self.buckets.is_empty() {
            return Err(TemplateError::NoBuckets);
        }
        if let Some(bucket) = self.buckets.iter().position(|b| b.per_pack == 0) {
            return Err(TemplateError::ZeroDrawCount { bucket });
        }

        let layout = self.layout();
        for (slot, allowed) in layout.iter().enumerate() {
            if allowed.is_empty() {
                return Err(TemplateError::EmptySlot { slot });
            }
            if let Some(&index) = allowed.iter().find(|&&i| i >= self.buckets.len()) {
                return Err(TemplateError::BucketIndexOutOfRange {
                    slot,
                    index,
                    buckets: self.buckets.len(),
                });
            }
        }

        let draws: usize = self.buckets.iter().map(|b| b.per_pack as usize).sum();
        if draws != layout.len() {
            return Err(TemplateError::SlotCountMismatch { slots: layout.len(), draws });
        }
        if !can_fill(&layout, &self.quotas()) {
            return Err(TemplateError::UnsatisfiableLayout);
        }

        for (bucket, b) in self.buckets.iter().enumerate() {
            let required = self.pack_count as usize * b.per_pack as usize;
            if required > b.pool.len() {
                return Err(TemplateError::InsufficientSupply {
                    bucket,
                    required,
                    available: b.pool.len(),
                });
            }
        }

        let mut seen = HashSet::new();
        for b in &self.buckets {
            for &id in &b.pool {
                let collectible = b.collectible(id);
                if !seen.insert(collectible.clone()) {
                    return Err(TemplateError::DuplicateCollectible(collectible.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// Whether every slot in `slots` can be assigned a bucket without any bucket
/// exceeding its quota. Bipartite matching over slots and bucket capacity.
pub(crate) fn can_fill(slots: &[Vec<usize>], quota: &[u32]) -> bool {
    let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); quota.len()];
    for slot in 0..slots.len() {
        let mut seen = vec![false; quota.len()];
        if !augment(slot, slots, quota, &mut assigned, &mut seen) {
            return false;
        }
    }
    true
}

fn augment(
    slot: usize,
    slots: &[Vec<usize>],
    quota: &[u32],
    assigned: &mut [Vec<usize>],
    seen: &mut [bool],
) -> bool {
    for &bucket in &slots[slot] {
        if bucket >= quota.len() || seen[bucket] {
            continue;
        }
        seen[bucket] = true;
        if assigned[bucket].len() < quota[bucket] as usize {
            assigned[bucket].push(slot);
            return true;
        }
        for i in 0..assigned[bucket].len() {
            let other = assigned[bucket][i];
            if augment(other, slots, quota, assigned, seen) {
                assigned[bucket][i] = slot;
                return true;
            }
        }
    }
    false
}
