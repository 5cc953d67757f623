//! CORRUPTED → ARCHIVED

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::integrity::fingerprint_bytes;
use crate::lifecycle::{Orchestrator, hold};
use crate::resilience::RecoveryOutcome;
use crate::zones::{ObjectKind, Zone, ZoneStore};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub outcome: RecoveryOutcome,
    pub record: CustodyRecord,
}

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    /// Verify the archive against its trusted fingerprint, restore it from
    /// the backup if needed, and prove the result decrypts to the processed
    /// payload.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::IntegrityViolation`] for irrecoverable loss or if
    ///   the restored copy does not decrypt to the processed payload; the
    ///   product stays CORRUPTED
    /// - [`PipelineError::AuthenticationFailure`] if the restored ciphertext
    ///   does not authenticate
    pub fn recover(&self, session: &Session, id: &ProductId) -> Result<RecoveryReport> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Recover)?;

        let result = self.recover_locked(session, id);
        self.audited(Component::Resilience, id, result)
    }

    fn recover_locked(&self, session: &Session, id: &ProductId) -> Result<RecoveryReport> {
        let mut record = self.expect_status(
            id,
            Action::Recover,
            &[ProductStatus::Archived, ProductStatus::Corrupted],
        )?;

        let trusted = record.fingerprint_archive;
        let outcome = self.resilience.verify_and_restore(id, |_| trusted)?;

        let ciphertext = self.zones.read(Zone::Archive, id, ObjectKind::Payload)?;
        let plaintext = self.cipher.decrypt(&ciphertext)?;
        if Some(fingerprint_bytes(&plaintext)) != record.fingerprint_processed {
            return Err(PipelineError::IntegrityViolation(format!(
                "archive of {id} decrypts to bytes that do not match the processed fingerprint"
            )));
        }

        let note = match outcome {
            RecoveryOutcome::Healthy { .. } => "Archive verified healthy",
            RecoveryOutcome::Restored { .. } => "Archive restored from backup",
        };
        record.advance(ProductStatus::Archived, &session.identity, trusted, note);
        self.ledger.commit(&record)?;

        self.audit
            .info(Component::Resilience, format!("{note} for {id}"));
        Ok(RecoveryReport { outcome, record })
    }
}

#[cfg(test)]
mod tests {
    use crate::access::AccessController;
    use crate::cipher::AesGcmCipher;
    use crate::custody::{MemoryLedger, ProductId, ProductStatus};
    use crate::error::PipelineError;
    use crate::lifecycle::{LifecycleOptions, Orchestrator};
    use crate::zones::{MemoryZoneStore, ObjectKind, Zone, ZoneStore as _};
    use std::sync::Arc;

    type Pipeline = Orchestrator<MemoryZoneStore, MemoryLedger, AesGcmCipher>;

    fn archived() -> (Pipeline, ProductId) {
        let pipeline = Orchestrator::new(
            Arc::new(MemoryZoneStore::new()),
            MemoryLedger::new(),
            AesGcmCipher::generate(),
            AccessController::default(),
            LifecycleOptions::default(),
        );
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();
        pipeline.ingest(&admin, &id).unwrap();
        pipeline.process(&admin, &id).unwrap();
        pipeline.archive(&admin, &id).unwrap();
        (pipeline, id)
    }

    #[test]
    fn test_recover_after_fault() {
        let (pipeline, id) = archived();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let good = pipeline.zones().read(Zone::Archive, &id, ObjectKind::Payload).unwrap();

        pipeline.inject_fault(&admin, &id).unwrap();
        let report = pipeline.recover(&admin, &id).unwrap();

        assert!(report.outcome.was_restored());
        assert_eq!(report.record.status, ProductStatus::Archived);
        assert_eq!(
            pipeline.zones().read(Zone::Archive, &id, ObjectKind::Payload).unwrap(),
            good
        );

        let again = pipeline.recover(&admin, &id).unwrap();
        assert!(!again.outcome.was_restored());
    }

    #[test]
    fn test_only_admin_recovers() {
        let (pipeline, id) = archived();
        let analyst = pipeline.access().login("bob_analyst").unwrap();

        assert!(matches!(
            pipeline.recover(&analyst, &id),
            Err(PipelineError::AuthorizationDenied { .. })
        ));
    }

    #[test]
    fn test_irrecoverable_loss_leaves_corrupted() {
        let (pipeline, id) = archived();
        let admin = pipeline.access().login("emanuele_admin").unwrap();

        pipeline.inject_fault(&admin, &id).unwrap();
        pipeline.zones().delete(Zone::Backup, &id, ObjectKind::Payload).unwrap();

        assert!(matches!(
            pipeline.recover(&admin, &id),
            Err(PipelineError::IntegrityViolation(_))
        ));
        assert_eq!(pipeline.record(&id).unwrap().status, ProductStatus::Corrupted);
    }
}
