//! Authorized read-back of an archived product

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{LedgerStore, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::integrity::fingerprint_bytes;
use crate::lifecycle::{Orchestrator, hold};
use crate::zones::{ObjectKind, Zone, ZoneStore};

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    /// Decrypt the archived payload after checking both the ciphertext and
    /// the plaintext against the ledger. The ledger is not changed.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidTransition`] unless the product is ARCHIVED
    /// - [`PipelineError::IntegrityViolation`] on any fingerprint mismatch
    /// - [`PipelineError::AuthenticationFailure`] if decryption fails
    pub fn retrieve(&self, session: &Session, id: &ProductId) -> Result<Vec<u8>> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Retrieve)?;

        let result = self.retrieve_locked(session, id);
        self.audited(Component::Retrieval, id, result)
    }

    fn retrieve_locked(&self, session: &Session, id: &ProductId) -> Result<Vec<u8>> {
        let record = self.expect_status(id, Action::Retrieve, &[ProductStatus::Archived])?;

        let ciphertext = self.zones.read(Zone::Archive, id, ObjectKind::Payload)?;
        if Some(fingerprint_bytes(&ciphertext)) != record.fingerprint_archive {
            return Err(PipelineError::IntegrityViolation(format!(
                "archive copy of {id} does not match its archive fingerprint"
            )));
        }

        let plaintext = self.cipher.decrypt(&ciphertext)?;
        if Some(fingerprint_bytes(&plaintext)) != record.fingerprint_processed {
            return Err(PipelineError::IntegrityViolation(format!(
                "decrypted payload of {id} does not match its processed fingerprint"
            )));
        }

        self.audit.info(
            Component::Retrieval,
            format!("Product {id} retrieved by '{}'", session.identity),
        );
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::AccessController;
    use crate::cipher::AesGcmCipher;
    use crate::custody::MemoryLedger;
    use crate::error::PipelineError;
    use crate::lifecycle::{LifecycleOptions, Orchestrator};
    use crate::source::{PAYLOAD_LEN, decode_samples, quality_check};
    use crate::zones::MemoryZoneStore;
    use std::sync::Arc;

    #[test]
    fn test_retrieve_round_trip_and_corruption() {
        let pipeline = Orchestrator::new(
            Arc::new(MemoryZoneStore::new()),
            MemoryLedger::new(),
            AesGcmCipher::generate(),
            AccessController::default(),
            LifecycleOptions::default(),
        );
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let user = pipeline.access().login("charlie_user").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();
        pipeline.ingest(&admin, &id).unwrap();
        pipeline.process(&admin, &id).unwrap();

        assert!(matches!(
            pipeline.retrieve(&user, &id),
            Err(PipelineError::InvalidTransition(_))
        ));

        pipeline.archive(&admin, &id).unwrap();
        let plaintext = pipeline.retrieve(&user, &id).unwrap();
        assert_eq!(plaintext.len(), PAYLOAD_LEN);
        quality_check(&decode_samples(&plaintext).unwrap()).unwrap();

        pipeline.inject_fault(&admin, &id).unwrap();
        assert!(pipeline.retrieve(&user, &id).is_err());
    }
}
