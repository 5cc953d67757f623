//! Chain-of-custody integrity primitives.
//!
//! A product's content is bound to a SHA-256 fingerprint at every lifecycle
//! transition. Later stages recompute the fingerprint of the bytes they are
//! about to consume and refuse to proceed on a mismatch.
//!
//! ## Usage
//!
//! ```
//! use eo_custody::integrity::{fingerprint_bytes, IntegrityCheck};
//! use eo_custody::zones::Zone;
//!
//! let baseline = fingerprint_bytes(b"level-0 samples");
//! let live = fingerprint_bytes(b"level-0 samples");
//!
//! let check = IntegrityCheck::compare("S2_L0_0001", Zone::Processing, baseline, Some(live));
//! assert!(check.passed);
//! ```
//!
//! ## Architecture
//!
//! - [`hasher`]: streaming fingerprint computation
//! - [`verifier`]: comparison and diagnostics

pub mod hasher;
pub mod verifier;

pub use hasher::{
    CancelFlag, Fingerprint, HASH_ALGORITHM, fingerprint_bytes, fingerprint_file, fingerprint_reader,
    fingerprint_reader_cancellable,
};
pub use verifier::IntegrityCheck;
