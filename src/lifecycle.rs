//! Product lifecycle orchestration.
//!
//! The [`Orchestrator`] drives each product through its states:
//! - **GENERATED**: synthetic payload and metadata landed in the ingest zone
//! - **INGESTED**: metadata validated, ingest fingerprint bound, payload staged
//! - **PROCESSED**: staged bytes re-verified, quality-checked and calibrated
//! - **ARCHIVED**: encrypted into the archive with a verified backup
//! - **CORRUPTED**: archive bytes tampered with, pending recovery
//!
//! ## Key Principles
//!
//! - **Authorize under the lock**: every transition takes the product's lock,
//!   then re-checks the session's identity against the access table
//! - **Fingerprint before commit**: the next record is prepared in full and
//!   committed once; a failed step leaves the ledger as it was and rolls back
//!   any bytes already staged
//! - **Fail closed**: missing or damaged input is an error, never replaced by
//!   defaults
//!
//! ## Example Usage
//!
//! ```
//! use eo_custody::access::AccessController;
//! use eo_custody::cipher::AesGcmCipher;
//! use eo_custody::custody::{MemoryLedger, ProductStatus};
//! use eo_custody::lifecycle::{LifecycleOptions, Orchestrator};
//! use eo_custody::zones::MemoryZoneStore;
//! use std::sync::Arc;
//!
//! # fn example() -> eo_custody::error::Result<()> {
//! let access = AccessController::default();
//! let session = access.login("emanuele_admin")?;
//! let pipeline = Orchestrator::new(
//!     Arc::new(MemoryZoneStore::new()),
//!     MemoryLedger::new(),
//!     AesGcmCipher::generate(),
//!     access,
//!     LifecycleOptions::default(),
//! );
//!
//! let id = pipeline.scan(&session, false)?;
//! pipeline.ingest(&session, &id)?;
//! pipeline.process(&session, &id)?;
//! let record = pipeline.archive(&session, &id)?;
//! assert_eq!(record.status, ProductStatus::Archived);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod stages;

pub use stages::RecoveryReport;

use crate::access::{AccessController, Action, Session};
use crate::audit::{AuditLog, Component};
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::integrity::{
    CancelFlag, Fingerprint, IntegrityCheck, fingerprint_reader_cancellable,
};
use crate::resilience::ResilienceEngine;
use crate::source::{DEFAULT_REQUIRED_FIELDS, DataSource};
use crate::zones::{ObjectKind, Zone, ZoneStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Behaviour switches for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOptions {
    /// Delete the cleartext staging copy once the archive commit succeeds
    pub purge_staging_after_archive: bool,
    /// Metadata fields that must be present and non-null at ingestion
    pub required_fields: Vec<String>,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            purge_staging_after_archive: false,
            required_fields: DEFAULT_REQUIRED_FIELDS.iter().map(|f| (*f).to_owned()).collect(),
        }
    }
}

/// One mutex per product id.
#[derive(Debug, Default)]
struct ProductLocks {
    locks: Mutex<HashMap<ProductId, Arc<Mutex<()>>>>,
}

impl ProductLocks {
    fn handle(&self, id: &ProductId) -> Result<Arc<Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|e| PipelineError::Other(format!("Lock poisoned: {e}")))?;
        Ok(Arc::clone(locks.entry(id.clone()).or_default()))
    }
}

/// Clears a pending cancel request when the transition that saw it ends.
struct CancelScope<'a>(&'a CancelFlag);

impl Drop for CancelScope<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

fn hold(lock: &Mutex<()>) -> Result<MutexGuard<'_, ()>> {
    lock.lock()
        .map_err(|e| PipelineError::Other(format!("Lock poisoned: {e}")))
}

pub struct Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    zones: Arc<Z>,
    ledger: L,
    cipher: C,
    access: AccessController,
    resilience: ResilienceEngine<Z>,
    source: DataSource,
    options: LifecycleOptions,
    locks: ProductLocks,
    audit: AuditLog,
    cancel: CancelFlag,
}

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    pub fn new(
        zones: Arc<Z>,
        ledger: L,
        cipher: C,
        access: AccessController,
        options: LifecycleOptions,
    ) -> Self {
        let audit = access.audit().clone();
        let cancel = CancelFlag::new();
        let resilience =
            ResilienceEngine::new(Arc::clone(&zones), audit.clone()).with_cancel(cancel.clone());

        Self {
            zones,
            ledger,
            cipher,
            access,
            resilience,
            source: DataSource::default(),
            options,
            locks: ProductLocks::default(),
            audit,
            cancel,
        }
    }

    #[must_use]
    pub fn with_source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn zones(&self) -> &Z {
        &self.zones
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    /// Flag that aborts the running transition at its next fingerprint chunk.
    /// If nothing is running, the next transition is aborted instead. The
    /// request is consumed once that transition ends.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn cancel_scope(&self) -> CancelScope<'_> {
        CancelScope(&self.cancel)
    }

    /// Create a product in the ingest landing zone.
    ///
    /// With `dead_pixel` set the payload carries a NaN sample and will be
    /// stopped by the quality gate.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthorizationDenied`] without the write permission, or
    /// a storage error (the landing zone is cleaned up).
    pub fn scan(&self, session: &Session, dead_pixel: bool) -> Result<ProductId> {
        let mut id = ProductId::generate();
        while self.ledger.contains(&id) {
            id = ProductId::generate();
        }

        let lock = self.locks.handle(&id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Scan)?;

        let result = self.scan_locked(session, &id, dead_pixel);
        self.audited(Component::Source, &id, result)?;
        Ok(id)
    }

    fn scan_locked(&self, session: &Session, id: &ProductId, dead_pixel: bool) -> Result<()> {
        let product = self.source.generate(id, dead_pixel);
        let metadata_bytes = product.metadata.to_json_bytes()?;
        let metadata = match serde_json::to_value(&product.metadata)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };

        let record = CustodyRecord::new(id.clone(), metadata, &session.identity);
        let staged = self
            .zones
            .write(Zone::Ingest, id, ObjectKind::Payload, &product.payload)
            .and_then(|()| {
                self.zones
                    .write(Zone::Ingest, id, ObjectKind::Metadata, &metadata_bytes)
            })
            .and_then(|()| self.ledger.commit(&record));

        if let Err(e) = staged {
            self.discard(Zone::Ingest, id, ObjectKind::Payload);
            self.discard(Zone::Ingest, id, ObjectKind::Metadata);
            return Err(e);
        }

        self.audit.info(
            Component::Source,
            format!("Product {id} generated in the {} (dead_pixel={dead_pixel})", Zone::Ingest),
        );
        Ok(())
    }

    /// Read-only integrity audit of the archived ciphertext.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidTransition`] if the product never reached the
    /// archive. A mismatch is reported in the returned check, not as an error.
    pub fn verify(&self, session: &Session, id: &ProductId) -> Result<IntegrityCheck> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Verify)?;

        let result = self.verify_locked(id);
        self.audited(Component::Resilience, id, result)
    }

    fn verify_locked(&self, id: &ProductId) -> Result<IntegrityCheck> {
        let record = self.ledger.load(id)?;
        let Some(expected) = record.fingerprint_archive else {
            return Err(PipelineError::InvalidTransition(format!(
                "{id} is {} and has no archive copy to verify",
                record.status
            )));
        };

        let actual = self.live_fingerprint(Zone::Archive, id)?;
        let check = IntegrityCheck::compare(id.as_str(), Zone::Archive, expected, actual);
        if check.passed {
            self.audit
                .info(Component::Resilience, format!("Verification of {id} passed"));
        } else {
            self.audit.critical(
                Component::Resilience,
                format!("Verification of {id} failed: {}", check.message),
            );
        }
        Ok(check)
    }

    /// Current ledger record. Status display is not gated.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ResourceMissing`] for unknown ids.
    pub fn record(&self, id: &ProductId) -> Result<CustodyRecord> {
        self.ledger.load(id)
    }

    /// Every product in the ledger, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub fn list(&self) -> Result<Vec<CustodyRecord>> {
        self.ledger.list()
    }

    /// Wipe every zone and the ledger. The audit trail is kept.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthorizationDenied`] without the delete permission.
    pub fn reset(&self, session: &Session) -> Result<()> {
        let mut locks = self
            .locks
            .locks
            .lock()
            .map_err(|e| PipelineError::Other(format!("Lock poisoned: {e}")))?;
        self.access.require(session, Action::Reset)?;

        self.zones.clear()?;
        self.ledger.clear()?;
        locks.clear();

        self.audit.warning(
            Component::System,
            format!("Simulated storage reset by '{}'", session.identity),
        );
        Ok(())
    }

    /// Load the record and check it is in one of `allowed`.
    fn expect_status(
        &self,
        id: &ProductId,
        action: Action,
        allowed: &[ProductStatus],
    ) -> Result<CustodyRecord> {
        let record = self.ledger.load(id)?;
        if allowed.contains(&record.status) {
            return Ok(record);
        }

        let expected: Vec<&str> = allowed.iter().map(ProductStatus::as_str).collect();
        Err(PipelineError::InvalidTransition(format!(
            "cannot {action} {id}: status is {}, expected {}",
            record.status,
            expected.join(" or ")
        )))
    }

    /// Streaming fingerprint of a payload; `None` if the copy is missing.
    fn live_fingerprint(&self, zone: Zone, id: &ProductId) -> Result<Option<Fingerprint>> {
        match self.zones.reader(zone, id, ObjectKind::Payload) {
            Ok(reader) => fingerprint_reader_cancellable(reader, &self.cancel).map(Some),
            Err(PipelineError::ResourceMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Best-effort removal during rollback.
    fn discard(&self, zone: Zone, id: &ProductId, kind: ObjectKind) {
        if let Err(e) = self.zones.delete(zone, id, kind) {
            tracing::error!("Rollback could not remove {kind:?} of {id} from the {zone}: {e}");
        }
    }

    /// Best-effort restore of previous bytes during rollback.
    fn put_back(&self, zone: Zone, id: &ProductId, bytes: &[u8]) {
        if let Err(e) = self.zones.write(zone, id, ObjectKind::Payload, bytes) {
            tracing::error!("Rollback could not restore {id} in the {zone}: {e}");
        }
    }

    /// Audit a failed transition. Denials are already audited by the access
    /// controller.
    fn audited<T>(&self, component: Component, id: &ProductId, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            match e {
                PipelineError::AuthorizationDenied { .. } => {}
                PipelineError::IntegrityViolation(_) | PipelineError::AuthenticationFailure(_) => {
                    self.audit.critical(
                        component,
                        format!("SECURITY ALERT on {id}: {} ({})", e, e.kind()),
                    );
                }
                PipelineError::QualityRejected(_) | PipelineError::Validation(_) => {
                    self.audit
                        .warning(component, format!("{id} rejected: {e}"));
                }
                _ => self.audit.error(component, format!("{id} failed: {e}")),
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::AesGcmCipher;
    use crate::custody::MemoryLedger;
    use crate::zones::MemoryZoneStore;

    type TestPipeline = Orchestrator<MemoryZoneStore, MemoryLedger, AesGcmCipher>;

    fn pipeline() -> TestPipeline {
        Orchestrator::new(
            Arc::new(MemoryZoneStore::new()),
            MemoryLedger::new(),
            AesGcmCipher::generate(),
            AccessController::default(),
            LifecycleOptions::default(),
        )
    }

    #[test]
    fn test_scan_creates_generated_record() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();

        let id = pipeline.scan(&admin, false).unwrap();
        let record = pipeline.record(&id).unwrap();

        assert_eq!(record.status, ProductStatus::Generated);
        assert_eq!(record.metadata["product_id"], id.as_str());
        assert!(pipeline.zones().exists(Zone::Ingest, &id, ObjectKind::Payload));
        assert!(pipeline.zones().exists(Zone::Ingest, &id, ObjectKind::Metadata));
    }

    #[test]
    fn test_scan_denied_for_user() {
        let pipeline = pipeline();
        let user = pipeline.access().login("charlie_user").unwrap();

        assert!(matches!(
            pipeline.scan(&user, false),
            Err(PipelineError::AuthorizationDenied { .. })
        ));
        assert!(pipeline.list().unwrap().is_empty());
        assert_eq!(pipeline.zones().count(Zone::Ingest), 0);
    }

    #[test]
    fn test_out_of_order_transition_is_rejected() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();

        assert!(matches!(
            pipeline.archive(&admin, &id),
            Err(PipelineError::InvalidTransition(_))
        ));
        assert!(matches!(
            pipeline.verify(&admin, &id),
            Err(PipelineError::InvalidTransition(_))
        ));
        assert_eq!(pipeline.record(&id).unwrap().status, ProductStatus::Generated);
    }

    #[test]
    fn test_reset_requires_delete_and_wipes() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let analyst = pipeline.access().login("bob_analyst").unwrap();
        pipeline.scan(&admin, false).unwrap();

        assert!(pipeline.reset(&analyst).is_err());
        assert_eq!(pipeline.list().unwrap().len(), 1);

        pipeline.reset(&admin).unwrap();
        assert!(pipeline.list().unwrap().is_empty());
        assert_eq!(pipeline.zones().count(Zone::Ingest), 0);
        assert!(!pipeline.audit().is_empty());
    }

    #[test]
    fn test_cancel_aborts_one_transition_only() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let first = pipeline.scan(&admin, false).unwrap();
        let second = pipeline.scan(&admin, false).unwrap();

        pipeline.cancel_handle().cancel();
        assert!(matches!(
            pipeline.ingest(&admin, &first),
            Err(PipelineError::Cancelled)
        ));
        assert_eq!(pipeline.record(&first).unwrap().status, ProductStatus::Generated);
        assert!(!pipeline.zones().exists(Zone::Processing, &first, ObjectKind::Payload));
        assert!(!pipeline.cancel_handle().is_cancelled());

        pipeline.ingest(&admin, &second).unwrap();
        pipeline.ingest(&admin, &first).unwrap();
        assert_eq!(pipeline.record(&first).unwrap().status, ProductStatus::Ingested);
    }

    #[test]
    fn test_logged_out_identity_cannot_act() {
        let pipeline = pipeline();
        let ghost = Session::new("mallory", crate::access::Role::Admin);
        assert!(pipeline.scan(&ghost, false).is_err());
    }
}
