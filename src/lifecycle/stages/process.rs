//! INGESTED → PROCESSED

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::integrity::fingerprint_bytes;
use crate::lifecycle::{Orchestrator, hold};
use crate::source::{calibrate, decode_samples, encode_samples, quality_check};
use crate::zones::{ObjectKind, Zone, ZoneStore};
use chrono::Utc;
use serde_json::Value;

/// Processing level written into the metadata.
pub const PROCESSING_LEVEL: &str = "L1";

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    /// Re-verify the staged payload, run the quality gate and calibrate.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::IntegrityViolation`] if the staged bytes no longer
    ///   match the ingest fingerprint
    /// - [`PipelineError::QualityRejected`] for NaN or infinite samples
    pub fn process(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Process)?;

        let result = self.process_locked(session, id);
        self.audited(Component::Processing, id, result)
    }

    fn process_locked(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let mut record = self.expect_status(id, Action::Process, &[ProductStatus::Ingested])?;
        let Some(expected) = record.fingerprint_ingest else {
            return Err(PipelineError::IntegrityViolation(format!(
                "{id} has no ingest fingerprint to verify against"
            )));
        };

        let staged = self.zones.read(Zone::Processing, id, ObjectKind::Payload)?;
        let actual = fingerprint_bytes(&staged);
        if actual != expected {
            return Err(PipelineError::IntegrityViolation(format!(
                "staged payload of {id} was modified after ingestion (expected {}, found {})",
                expected.short(),
                actual.short()
            )));
        }

        let mut samples = decode_samples(&staged)?;
        quality_check(&samples)?;
        calibrate(&mut samples);

        let processed = encode_samples(&samples);
        let fingerprint = fingerprint_bytes(&processed);

        record.fingerprint_processed = Some(fingerprint);
        record
            .metadata
            .insert("processing_level".to_owned(), Value::from(PROCESSING_LEVEL));
        record.metadata.insert(
            "processing_timestamp".to_owned(),
            Value::from(Utc::now().to_rfc3339()),
        );
        record.advance(
            ProductStatus::Processed,
            &session.identity,
            Some(fingerprint),
            "Quality control passed; radiometric calibration applied",
        );

        let committed = self
            .zones
            .write(Zone::Processing, id, ObjectKind::Payload, &processed)
            .and_then(|()| self.ledger.commit(&record));

        if let Err(e) = committed {
            self.put_back(Zone::Processing, id, &staged);
            return Err(e);
        }

        self.audit.info(
            Component::Processing,
            format!(
                "Product {id} processed to {PROCESSING_LEVEL} (fingerprint {})",
                fingerprint.short()
            ),
        );
        Ok(record)
    }
}
