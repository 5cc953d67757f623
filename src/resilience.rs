//! Backup and self-healing of archived products.
//!
//! The archive copy is checked against a trusted fingerprint supplied by the
//! caller. On mismatch the independent backup copy, if it still verifies,
//! replaces the archive. Nothing here consults the ledger directly, so the
//! source of the trusted reference can change without touching this module.

use crate::audit::{AuditLog, Component};
use crate::custody::{CustodyRecord, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::integrity::{CancelFlag, Fingerprint, fingerprint_bytes, fingerprint_reader_cancellable};
use crate::zones::{ObjectKind, Zone, ZoneStore};
use serde::Serialize;
use std::sync::Arc;

/// Result of a successful [`ResilienceEngine::verify_and_restore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecoveryOutcome {
    /// Archive matches the reference; nothing was touched
    Healthy { fingerprint: Fingerprint },
    /// Archive was replaced from the backup
    Restored {
        /// Fingerprint of the damaged copy, `None` if it was missing or unreadable
        damaged: Option<Fingerprint>,
        restored: Fingerprint,
    },
}

impl RecoveryOutcome {
    pub fn was_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

pub struct ResilienceEngine<Z: ZoneStore> {
    zones: Arc<Z>,
    audit: AuditLog,
    cancel: CancelFlag,
}

impl<Z: ZoneStore> ResilienceEngine<Z> {
    pub fn new(zones: Arc<Z>, audit: AuditLog) -> Self {
        Self {
            zones,
            audit,
            cancel: CancelFlag::new(),
        }
    }

    /// Share a cancellation flag with the caller.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Copy the archived ciphertext verbatim into the backup zone.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidTransition`] unless `record` is archived,
    /// [`PipelineError::ResourceMissing`] if the archive copy is absent, or
    /// [`PipelineError::IntegrityViolation`] if the written backup does not
    /// read back identical.
    pub fn backup(&self, record: &CustodyRecord) -> Result<Fingerprint> {
        if record.status != ProductStatus::Archived {
            return Err(PipelineError::InvalidTransition(format!(
                "backup of {} requires ARCHIVED, found {}",
                record.id, record.status
            )));
        }

        let id = &record.id;
        let bytes = self.zones.read(Zone::Archive, id, ObjectKind::Payload)?;
        let expected = fingerprint_bytes(&bytes);
        self.zones.write(Zone::Backup, id, ObjectKind::Payload, &bytes)?;

        let written = self.fingerprint(Zone::Backup, id)?;
        if written != Some(expected) {
            return Err(PipelineError::IntegrityViolation(format!(
                "backup of {id} does not match the archive copy"
            )));
        }

        self.audit.info(
            Component::Resilience,
            format!("Backup of {id} stored in the {} ({})", Zone::Backup, expected.short()),
        );
        Ok(expected)
    }

    /// Compare the archive against the trusted reference and repair it from
    /// the backup when they differ. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ResourceMissing`] if `reference` yields nothing
    /// - [`PipelineError::IntegrityViolation`] if the archive is damaged and no
    ///   verifying backup exists (irrecoverable loss)
    /// - [`PipelineError::Cancelled`] if cancelled mid-hash
    pub fn verify_and_restore<F>(&self, id: &ProductId, reference: F) -> Result<RecoveryOutcome>
    where
        F: FnOnce(&ProductId) -> Option<Fingerprint>,
    {
        let Some(trusted) = reference(id) else {
            return Err(PipelineError::ResourceMissing(format!(
                "no trusted archive fingerprint for {id}"
            )));
        };

        let live = self.fingerprint(Zone::Archive, id)?;
        if live == Some(trusted) {
            self.audit.info(
                Component::Resilience,
                format!("Archive copy of {id} verified healthy ({})", trusted.short()),
            );
            return Ok(RecoveryOutcome::Healthy { fingerprint: trusted });
        }

        let found = live.map_or_else(|| "missing".to_owned(), |f| f.short());
        self.audit.critical(
            Component::Resilience,
            format!(
                "Integrity mismatch on {id}: expected {}, found {found}",
                trusted.short()
            ),
        );

        let backup = match self.zones.read(Zone::Backup, id, ObjectKind::Payload) {
            Ok(bytes) => bytes,
            Err(PipelineError::ResourceMissing(_)) => {
                self.audit.critical(
                    Component::Resilience,
                    format!("No backup for {id}: irrecoverable data loss"),
                );
                return Err(PipelineError::IntegrityViolation(format!(
                    "archive copy of {id} is damaged and no backup exists"
                )));
            }
            Err(e) => return Err(e),
        };

        if fingerprint_bytes(&backup) != trusted {
            self.audit.critical(
                Component::Resilience,
                format!("Backup of {id} also fails verification: irrecoverable data loss"),
            );
            return Err(PipelineError::IntegrityViolation(format!(
                "archive and backup copies of {id} are both damaged"
            )));
        }

        self.zones.write(Zone::Archive, id, ObjectKind::Payload, &backup)?;
        if self.fingerprint(Zone::Archive, id)? != Some(trusted) {
            return Err(PipelineError::IntegrityViolation(format!(
                "restored archive copy of {id} does not verify"
            )));
        }

        self.audit.warning(
            Component::Resilience,
            format!("Archive copy of {id} restored from the {}", Zone::Backup),
        );
        Ok(RecoveryOutcome::Restored {
            damaged: live,
            restored: trusted,
        })
    }

    /// Fingerprint of a payload, `None` if absent or unreadable.
    fn fingerprint(&self, zone: Zone, id: &ProductId) -> Result<Option<Fingerprint>> {
        let reader = match self.zones.reader(zone, id, ObjectKind::Payload) {
            Ok(reader) => reader,
            Err(PipelineError::ResourceMissing(_)) => return Ok(None),
            Err(e) => {
                tracing::warn!("Treating unreadable {zone} copy of {id} as damaged: {e}");
                return Ok(None);
            }
        };

        match fingerprint_reader_cancellable(reader, &self.cancel) {
            Ok(fingerprint) => Ok(Some(fingerprint)),
            Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
            Err(e) => {
                tracing::warn!("Treating unreadable {zone} copy of {id} as damaged: {e}");
                Ok(None)
            }
        }
    }
}
