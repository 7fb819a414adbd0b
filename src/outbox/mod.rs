//! Durable transaction outbox.
//!
//! # Data Flow
//! ```text
//! contract service ── insert ──→ StorableTransaction (Init)
//!                                    │ submitter: sign with rotated key, send
//!                                    ▼
//!                                  Sent ──── checker: fetch result ────┐
//!                                    ▲                                 │
//!                      Retry ────────┘   ◀── sequence race / expired ──┤
//!                                          Complete ◀── sealed, no error
//!                                          Failed   ◀── other error
//! ```

pub mod submitter;
pub mod transaction;

pub use submitter::Outbox;
pub use transaction::{Classification, StorableTransaction, TransactionState};
