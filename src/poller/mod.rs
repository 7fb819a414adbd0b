//! Reconciliation driver.
//!
//! # Data Flow
//! ```text
//! ticker (interval) ──┬─→ resolved     setup + start settlement
//!                     ├─→ settling     deposits → settled
//!                     ├─→ settled      start minting
//!                     ├─→ minting      mints → complete
//!                     ├─→ circulating  reveal/open requests
//!                     ├─→ send         outbox Init/Retry → Sent
//!                     └─→ check        outbox Sent → Complete/Retry/Failed
//! ```
//!
//! Each task is its own tokio task, so a slow RPC only delays that task.
//! Distribution stages commit one distribution at a time; a store or node
//! failure stops the pass, any other failure stays with its distribution.
//! On shutdown the ticker stops and in-flight tasks are awaited before
//! `run` returns.

pub mod tasks;

pub use tasks::{Poller, Task};
