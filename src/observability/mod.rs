//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events with structured fields (distribution_id, pack_id, tx_id, ...)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → logging.rs subscriber (stdout, pretty or JSON)
//!     → Prometheus scrape endpoint
//! ```
//!
//! # Design Decisions
//! - Skipped events are counted separately from processed ones so duplicate
//!   delivery is distinguishable from genuine faults
//! - Recording without an installed exporter is a no-op

pub mod logging;
pub mod metrics;
