//! ARCHIVED → CORRUPTED (simulated attack)

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId, ProductStatus};
use crate::error::Result;
use crate::integrity::fingerprint_bytes;
use crate::lifecycle::{Orchestrator, hold};
use crate::zones::{ObjectKind, Zone, ZoneStore};

/// Bytes written over the archived ciphertext.
pub const CORRUPTION_MARKER: &[u8] = b"MALICIOUS_CORRUPTION_EVENT_000";

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    /// Overwrite the archived ciphertext, as an insider attack would.
    ///
    /// # Errors
    ///
    /// [`crate::error::PipelineError::InvalidTransition`] unless the product
    /// is ARCHIVED.
    pub fn inject_fault(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::InjectFault)?;

        let result = self.inject_fault_locked(session, id);
        self.audited(Component::Attack, id, result)
    }

    fn inject_fault_locked(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let mut record =
            self.expect_status(id, Action::InjectFault, &[ProductStatus::Archived])?;
        let original = self.zones.read(Zone::Archive, id, ObjectKind::Payload)?;

        record.advance(
            ProductStatus::Corrupted,
            &session.identity,
            Some(fingerprint_bytes(CORRUPTION_MARKER)),
            "Archive ciphertext overwritten",
        );

        let committed = self
            .zones
            .write(Zone::Archive, id, ObjectKind::Payload, CORRUPTION_MARKER)
            .and_then(|()| self.ledger.commit(&record));

        if let Err(e) = committed {
            self.put_back(Zone::Archive, id, &original);
            return Err(e);
        }

        self.audit.critical(
            Component::Attack,
            format!(
                "Archive payload of {id} overwritten by '{}'",
                session.identity
            ),
        );
        Ok(record)
    }
}
