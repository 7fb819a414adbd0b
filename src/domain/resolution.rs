//! Resolution engine: assigns bucket pools to packs and seals them.
//!
//! Every pool is shuffled once. Slots are then filled slot-major: for each
//! slot position, every pack in turn picks one of the slot's allowed buckets
//! (uniformly among those that keep the rest of its layout fillable) and
//! takes the next collectible from that bucket's shuffled pool.
//!
//! One OS-seeded generator drives a whole resolution: the shuffles, the
//! bucket choices and every pack salt.

use rand::rngs::{OsRng, StdRng};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

use crate::domain::collectible::{Collectible, FlowId};
use crate::domain::distribution::{Distribution, DistributionState};
use crate::domain::error::{TemplateError, TransitionError};
use crate::domain::pack::Pack;
use crate::domain::template::can_fill;
use crate::error::{PdsError, PdsResult};

/// Resolve an `Init` distribution into sealed packs and mark it `Resolved`.
///
/// Nothing is changed on failure: the distribution stays in `Init` and no
/// pack is returned.
pub fn resolve(distribution: &mut Distribution) -> PdsResult<Vec<Pack>> {
    distribution.ensure(DistributionState::Init, "resolve")?;
    let template = &distribution.pack_template;
    template.validate()?;

    let mut rng = seeded_rng()?;
    let layout = template.layout();
    let pack_count = template.pack_count as usize;

    let mut pools: Vec<VecDeque<FlowId>> = template
        .buckets
        .iter()
        .map(|b| {
            let mut pool = b.pool.clone();
            pool.shuffle(&mut rng);
            pool.into()
        })
        .collect();
    let mut quotas = vec![template.quotas(); pack_count];
    let mut contents: Vec<Vec<Collectible>> = vec![Vec::with_capacity(layout.len()); pack_count];

    for (slot, allowed) in layout.iter().enumerate() {
        let rest = &layout[slot + 1..];
        for pack in 0..pack_count {
            let bucket = choose_bucket(allowed, rest, &quotas[pack], &mut rng)
                .ok_or(TemplateError::UnsatisfiableLayout)?;
            quotas[pack][bucket] -= 1;

            let id = pools[bucket].pop_front().ok_or_else(|| TemplateError::InsufficientSupply {
                bucket,
                required: pack_count * template.buckets[bucket].per_pack as usize,
                available: template.buckets[bucket].pool.len(),
            })?;
            contents[pack].push(template.buckets[bucket].collectible(id));
        }
    }

    let mut packs = Vec::with_capacity(pack_count);
    for collectibles in contents {
        let mut pack = Pack::new(distribution.id, collectibles);
        pack.seal(&mut rng)?;
        packs.push(pack);
    }

    distribution.resolve()?;
    Ok(packs)
}

/// Every collectible of a resolved distribution, in a fresh random order.
pub fn resolved_collection(distribution: &Distribution, packs: &[Pack]) -> PdsResult<Vec<Collectible>> {
    if matches!(distribution.state, DistributionState::Init | DistributionState::Cancelled) {
        return Err(TransitionError::new("distribution", "preview the collection of", distribution.state).into());
    }
    let mut collection: Vec<Collectible> =
        packs.iter().flat_map(|p| p.collectibles.iter().cloned()).collect();
    collection.shuffle(&mut seeded_rng()?);
    Ok(collection)
}

fn seeded_rng() -> PdsResult<StdRng> {
    StdRng::from_rng(OsRng).map_err(|e| PdsError::Internal(format!("entropy unavailable: {}", e)))
}

fn choose_bucket<R: Rng + ?Sized>(
    allowed: &[usize],
    rest: &[Vec<usize>],
    quota: &[u32],
    rng: &mut R,
) -> Option<usize> {
    let mut candidates: Vec<usize> = Vec::with_capacity(allowed.len());
    for &bucket in allowed {
        if quota[bucket] == 0 || candidates.contains(&bucket) {
            continue;
        }
        let mut after = quota.to_vec();
        after[bucket] -= 1;
        if can_fill(rest, &after) {
            candidates.push(bucket);
        }
    }
    candidates.choose(rng).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Address;
    use crate::domain::distribution::DistributionMeta;
    use crate::domain::pack::PackState;
    use crate::domain::template::tests::{bucket, contract, two_bucket_template};
    use crate::domain::template::PackTemplate;
    use std::collections::HashSet;

    fn distribution(template: PackTemplate) -> Distribution {
        Distribution::new(1, Address::ZERO, DistributionMeta::default(), template)
    }

    #[test]
    fn test_resolve_four_packs_from_two_buckets() {
        let mut d = distribution(two_bucket_template(4));
        let packs = resolve(&mut d).unwrap();

        assert_eq!(d.state, DistributionState::Resolved);
        assert_eq!(packs.len(), 4);

        let mut seen = HashSet::new();
        for pack in &packs {
            assert_eq!(pack.state, PackState::Sealed);
            assert_eq!(pack.distribution_id, d.id);
            assert_eq!(pack.collectibles.len(), 4);
            assert!(pack.verify_commitment());

            let from_first = pack.collectibles.iter().filter(|c| c.id <= 80).count();
            assert_eq!(from_first, 2, "two draws per pack from the first bucket");
            assert!(pack.collectibles[0].id <= 80, "slot 0 is pinned to bucket 0");
            assert!(pack.collectibles[2].id > 80, "slot 2 is pinned to bucket 1");

            for c in &pack.collectibles {
                assert!((1..=100).contains(&c.id));
                assert!(seen.insert(c.clone()), "collectible {} assigned twice", c);
            }
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn test_salts_are_unique_per_pack() {
        let mut d = distribution(two_bucket_template(10));
        let packs = resolve(&mut d).unwrap();
        let salts: HashSet<_> = packs.iter().map(|p| p.salt.clone().unwrap()).collect();
        assert_eq!(salts.len(), 10);
    }

    #[test]
    fn test_insufficient_supply_leaves_init() {
        let mut d = distribution(two_bucket_template(11));
        let err = resolve(&mut d).unwrap_err();
        assert!(matches!(err, PdsError::Template(TemplateError::InsufficientSupply { .. })));
        assert_eq!(d.state, DistributionState::Init);
    }

    #[test]
    fn test_resolve_requires_init() {
        let mut d = distribution(two_bucket_template(4));
        resolve(&mut d).unwrap();
        assert!(resolve(&mut d).unwrap_err().is_state_guard());
    }

    #[test]
    fn test_exact_supply_uses_every_collectible() {
        let template = PackTemplate {
            pack_reference: contract("PackNFT"),
            pack_count: 5,
            buckets: vec![bucket("ExampleNFT", 3, 1..=15)],
            slots: vec![],
        };
        let mut d = distribution(template);
        let packs = resolve(&mut d).unwrap();
        let mut ids: Vec<u64> = packs.iter().flat_map(|p| p.collectibles.iter().map(|c| c.id)).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=15).collect::<Vec<_>>());
    }

    #[test]
    fn test_resolved_collection_reshuffles() {
        let template = PackTemplate {
            pack_reference: contract("PackNFT"),
            pack_count: 40,
            buckets: vec![bucket("ExampleNFT", 5, 1..=400)],
            slots: vec![],
        };
        let mut d = distribution(template);
        assert!(resolved_collection(&d, &[]).is_err());

        let packs = resolve(&mut d).unwrap();
        let first = resolved_collection(&d, &packs).unwrap();
        let second = resolved_collection(&d, &packs).unwrap();
        assert_eq!(first.len(), 200);
        assert_ne!(first, second);

        let mut a = first.clone();
        let mut b = second.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[test]
    fn test_flexible_slots_respect_quotas() {
        let mut template = two_bucket_template(10);
        template.slots = vec![vec![0, 1]; 4];
        let mut d = distribution(template);
        for pack in resolve(&mut d).unwrap() {
            let from_first = pack.collectibles.iter().filter(|c| c.id <= 80).count();
            assert_eq!(from_first, 2);
        }
    }
}
