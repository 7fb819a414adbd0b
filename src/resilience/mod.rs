//! Resilience helpers.
//!
//! Reconciliation itself needs no retry loop: every pass resumes from a
//! persisted cursor on the next tick. Only synchronous seal waits poll in
//! place, with jittered exponential backoff between result queries.

pub mod backoff;
