//! # EO Custody - Secure Lifecycle for Earth Observation Products
//!
//! Moves satellite data products through acquisition, ingestion, processing
//! and encrypted archival while keeping a verifiable chain of custody. Every
//! transition is authorized, fingerprinted and audited; a tampered archive is
//! detected and restored from an isolated backup.
//!
//! ## Quick Start
//!
//! ```no_run
//! use eo_custody::config::PipelineConfig;
//!
//! # fn example() -> eo_custody::error::Result<()> {
//! let config = PipelineConfig::load()?;
//! let pipeline = config.open()?;
//!
//! let session = pipeline.access().login("emanuele_admin")?;
//! let id = pipeline.scan(&session, false)?;
//! pipeline.ingest(&session, &id)?;
//! pipeline.process(&session, &id)?;
//! pipeline.archive(&session, &id)?;
//!
//! let check = pipeline.verify(&session, &id)?;
//! println!("{}", check.format_cli());
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`lifecycle`]: the orchestrator and its stage transitions
//! - [`custody`]: custody records, statuses and ledger backends
//! - [`zones`]: trust-separated storage areas (filesystem or in-memory)
//! - [`integrity`]: SHA-256 fingerprints and comparisons
//! - [`cipher`]: AES-256-GCM encryption at rest
//! - [`access`]: identities, roles and permission checks
//! - [`resilience`]: backup, verification and self-healing restore
//! - [`audit`]: the security audit trail
//! - [`ids`]: intrusion detection over the audit trail
//! - [`source`]: simulated sensor products, quality gate and calibration
//! - [`console`]: interactive operator console
//! - [`config`]: persistent configuration
//! - [`logging`]: terminal and rotating-file diagnostics
//! - [`error`]: error kinds and context helpers

#![warn(clippy::all, rust_2018_idioms)]

pub mod access;
pub mod audit;
pub mod cipher;
pub mod config;
pub mod console;
pub mod custody;
pub mod error;
pub mod ids;
pub mod integrity;
pub mod lifecycle;
pub mod logging;
pub mod resilience;
pub mod source;
pub mod zones;
