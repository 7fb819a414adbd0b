//! Domain entities and the pure resolution engine.
//!
//! Nothing in this module performs I/O. Entities reference each other by
//! id; the store resolves those references.

pub mod circulating;
pub mod collectible;
pub mod distribution;
pub mod error;
pub mod minting;
pub mod pack;
pub mod resolution;
pub mod settlement;
pub mod template;

pub use circulating::CirculatingPackContract;
pub use collectible::{Collectible, ContractRef, FlowId};
pub use distribution::{Distribution, DistributionMeta, DistributionState};
pub use error::{TemplateError, TransitionError};
pub use minting::Minting;
pub use pack::{Pack, PackState};
pub use settlement::{Settlement, SettlementCollectible};
pub use template::{Bucket, PackTemplate};
