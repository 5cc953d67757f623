//! PROCESSED → ARCHIVED

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{CONFIDENTIALITY_ENCRYPTED, CustodyRecord, LedgerStore, ProductId, ProductStatus};
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
    /// Encrypt the processed payload into the archive and take a backup.
    ///
    /// The archive and backup copies are removed again if the backup or the
    /// ledger commit fails. With `purge_staging_after_archive` set, the
    /// cleartext staging copy is deleted after the commit.
    ///
    /// # Errors
    ///
    /// [`PipelineError::IntegrityViolation`] if the staged payload no longer
    /// matches the processed fingerprint, or the failing storage error.
    pub fn archive(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Archive)?;

        let result = self.archive_locked(session, id);
        self.audited(Component::Archive, id, result)
    }

    fn archive_locked(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let mut record = self.expect_status(id, Action::Archive, &[ProductStatus::Processed])?;
        let Some(expected) = record.fingerprint_processed else {
            return Err(PipelineError::IntegrityViolation(format!(
                "{id} has no processed fingerprint to verify against"
            )));
        };

        let staged = self.zones.read(Zone::Processing, id, ObjectKind::Payload)?;
        if fingerprint_bytes(&staged) != expected {
            return Err(PipelineError::IntegrityViolation(format!(
                "staged payload of {id} was modified after processing"
            )));
        }

        let ciphertext = self.cipher.encrypt(&staged)?;
        let fingerprint = fingerprint_bytes(&ciphertext);

        record.fingerprint_archive = Some(fingerprint);
        record.payload_location = Zone::Archive;
        record.confidentiality_label = Some(CONFIDENTIALITY_ENCRYPTED.to_owned());
        record.advance(
            ProductStatus::Archived,
            &session.identity,
            Some(fingerprint),
            "Encrypted into the secure archive; backup taken",
        );

        let committed = self
            .zones
            .write(Zone::Archive, id, ObjectKind::Payload, &ciphertext)
            .and_then(|()| self.resilience.backup(&record))
            .and_then(|_| self.ledger.commit(&record));

        if let Err(e) = committed {
            self.discard(Zone::Archive, id, ObjectKind::Payload);
            self.discard(Zone::Backup, id, ObjectKind::Payload);
            return Err(e);
        }

        self.audit.info(
            Component::Archive,
            format!(
                "Product {id} encrypted and archived (ciphertext {})",
                fingerprint.short()
            ),
        );

        if self.options.purge_staging_after_archive {
            match self.zones.delete(Zone::Processing, id, ObjectKind::Payload) {
                Ok(_) => self.audit.info(
                    Component::Archive,
                    format!("Cleartext staging copy of {id} purged"),
                ),
                Err(e) => self.audit.error(
                    Component::Archive,
                    format!("Could not purge staging copy of {id}: {e}"),
                ),
            }
        }

        Ok(record)
    }
}
