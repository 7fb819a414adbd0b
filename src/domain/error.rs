//! Validation and state-guard errors for domain entities.

use thiserror::Error;

/// A pack template or pack contents failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("pack count must be greater than zero")]
    ZeroPackCount,

    #[error("template has no buckets")]
    NoBuckets,

    #[error("slot {slot} allows no buckets")]
    EmptySlot { slot: usize },

    #[error("slot {slot} references bucket {index}, but only {buckets} buckets exist")]
    BucketIndexOutOfRange { slot: usize, index: usize, buckets: usize },

    #[error("bucket {bucket} has a per-pack count of zero")]
    ZeroDrawCount { bucket: usize },

    #[error("per-pack draws add up to {draws}, but the layout has {slots} slots")]
    SlotCountMismatch { slots: usize, draws: usize },

    #[error("slot layout cannot be filled with the per-pack draw counts")]
    UnsatisfiableLayout,

    #[error("bucket {bucket} needs {required} collectibles, but its pool holds {available}")]
    InsufficientSupply { bucket: usize, required: usize, available: usize },

    #[error("collectible {0} appears more than once in the pools")]
    DuplicateCollectible(String),

    #[error("pack has no collectibles")]
    EmptyPack,

    #[error("slot {slot} holds an uninitialized collectible")]
    UnpopulatedSlot { slot: usize },
}

/// A transition was attempted from a state other than its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot {action} {entity} in state {state}")]
pub struct TransitionError {
    pub entity: &'static str,
    pub action: &'static str,
    pub state: String,
}

impl TransitionError {
    pub fn new(entity: &'static str, action: &'static str, state: impl ToString) -> Self {
        Self { entity, action, state: state.to_string() }
    }
}
