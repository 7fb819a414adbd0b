//! Custodial pack distribution service.
//!
//! Turns a declarative pack distribution into on-chain transactions and keeps
//! the off-chain store consistent with what the chain eventually reports.

pub mod app;
pub mod chain;
pub mod config;
pub mod contract;
pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod outbox;
pub mod poller;
pub mod resilience;
pub mod store;

pub use app::{App, CreateDistributionRequest, Services};
pub use config::schema::ServiceConfig;
pub use error::{PdsError, PdsResult};
pub use lifecycle::Shutdown;
