//! Custody ledger: the per-product record of where a product is, what state
//! it reached, and which fingerprint was bound at each step.
//!
//! ## Invariants
//!
//! - `fingerprint_ingest` is set iff the status is at least INGESTED, and is
//!   never overwritten once set
//! - `fingerprint_processed` is set iff the status is at least PROCESSED
//! - `fingerprint_archive` is set iff the product has reached the archive
//!
//! Every [`LedgerStore`] checks these before accepting a commit, so a
//! half-prepared record can never become the stored truth.
//!
//! ## Architecture
//!
//! - [`status`]: lifecycle states and the legal transitions between them
//! - [`record`]: the custody record and its event history
//! - [`store`]: JSON-file and in-memory ledger backends

pub mod record;
pub mod status;
pub mod store;

pub use record::{CONFIDENTIALITY_ENCRYPTED, CustodyEvent, CustodyRecord, ProductId};
pub use status::ProductStatus;
pub use store::{JsonLedgerStore, LedgerStore, MemoryLedger};
