//! GENERATED → INGESTED

use crate::access::{Action, Session};
use crate::audit::Component;
use crate::cipher::PayloadCipher;
use crate::custody::{CustodyRecord, LedgerStore, ProductId, ProductStatus};
use crate::error::{PipelineError, Result};
use crate::lifecycle::{Orchestrator, hold};
use crate::source::validate_metadata;
use crate::zones::{ObjectKind, Zone, ZoneStore};

impl<Z, L, C> Orchestrator<Z, L, C>
where
    Z: ZoneStore,
    L: LedgerStore,
    C: PayloadCipher,
{
    /// Validate metadata, bind the ingest fingerprint and stage the payload
    /// for processing.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ResourceMissing`] if payload or metadata is absent
    /// - [`PipelineError::Validation`] for missing required fields
    /// - [`PipelineError::IntegrityViolation`] if the staged copy differs
    pub fn ingest(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let lock = self.locks.handle(id)?;
        let _guard = hold(&lock)?;
        let _scope = self.cancel_scope();
        self.access.require(session, Action::Ingest)?;

        let result = self.ingest_locked(session, id);
        self.audited(Component::Ingestion, id, result)
    }

    fn ingest_locked(&self, session: &Session, id: &ProductId) -> Result<CustodyRecord> {
        let mut record = self.expect_status(id, Action::Ingest, &[ProductStatus::Generated])?;

        if !self.zones.exists(Zone::Ingest, id, ObjectKind::Payload) {
            return Err(PipelineError::ResourceMissing(format!(
                "payload of {id} is not in the {}",
                Zone::Ingest
            )));
        }
        let metadata_bytes = self.zones.read(Zone::Ingest, id, ObjectKind::Metadata)?;
        let metadata = validate_metadata(&metadata_bytes, &self.options.required_fields)?;

        if let Some(declared) = metadata.get("product_id")
            && declared.as_str() != Some(id.as_str())
        {
            return Err(PipelineError::Validation(format!(
                "metadata names product {declared}, expected {id}"
            )));
        }

        let fingerprint = self.live_fingerprint(Zone::Ingest, id)?.ok_or_else(|| {
            PipelineError::ResourceMissing(format!("payload of {id} vanished during ingestion"))
        })?;

        record.fingerprint_ingest = Some(fingerprint);
        record.payload_location = Zone::Processing;
        record.metadata = metadata;
        record.advance(
            ProductStatus::Ingested,
            &session.identity,
            Some(fingerprint),
            "Metadata validated; payload staged for processing",
        );

        let staged = self
            .zones
            .copy(Zone::Ingest, Zone::Processing, id, ObjectKind::Payload)
            .and_then(|()| self.live_fingerprint(Zone::Processing, id))
            .and_then(|staged| {
                if staged == Some(fingerprint) {
                    Ok(())
                } else {
                    Err(PipelineError::IntegrityViolation(format!(
                        "staged copy of {id} does not match the ingest payload"
                    )))
                }
            })
            .and_then(|()| self.ledger.commit(&record));

        if let Err(e) = staged {
            self.discard(Zone::Processing, id, ObjectKind::Payload);
            return Err(e);
        }

        self.audit.info(
            Component::Ingestion,
            format!("Product {id} ingested (fingerprint {})", fingerprint.short()),
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use crate::access::AccessController;
    use crate::cipher::AesGcmCipher;
    use crate::custody::{MemoryLedger, ProductStatus};
    use crate::error::PipelineError;
    use crate::integrity::fingerprint_bytes;
    use crate::lifecycle::{LifecycleOptions, Orchestrator};
    use crate::zones::{MemoryZoneStore, ObjectKind, Zone, ZoneStore as _};
    use std::sync::Arc;

    fn pipeline() -> Orchestrator<MemoryZoneStore, MemoryLedger, AesGcmCipher> {
        Orchestrator::new(
            Arc::new(MemoryZoneStore::new()),
            MemoryLedger::new(),
            AesGcmCipher::generate(),
            AccessController::default(),
            LifecycleOptions::default(),
        )
    }

    #[test]
    fn test_ingest_binds_fingerprint_and_stages() {
        let pipeline = pipeline();
        let analyst = pipeline.access().login("bob_analyst").unwrap();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();

        let record = pipeline.ingest(&analyst, &id).unwrap();
        let raw = pipeline.zones().read(Zone::Ingest, &id, ObjectKind::Payload).unwrap();

        assert_eq!(record.status, ProductStatus::Ingested);
        assert_eq!(record.fingerprint_ingest, Some(fingerprint_bytes(&raw)));
        assert_eq!(record.payload_location, Zone::Processing);
        assert_eq!(
            pipeline.zones().read(Zone::Processing, &id, ObjectKind::Payload).unwrap(),
            raw
        );
    }

    #[test]
    fn test_missing_required_field_is_validation_error() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();
        pipeline
            .zones()
            .write(Zone::Ingest, &id, ObjectKind::Metadata, br#"{"product_id": "x"}"#)
            .unwrap();

        assert!(matches!(
            pipeline.ingest(&admin, &id),
            Err(PipelineError::Validation(_))
        ));
        assert_eq!(pipeline.record(&id).unwrap().status, ProductStatus::Generated);
        assert!(!pipeline.zones().exists(Zone::Processing, &id, ObjectKind::Payload));
    }

    #[test]
    fn test_mismatched_product_id_is_rejected() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();
        pipeline
            .zones()
            .write(
                Zone::Ingest,
                &id,
                ObjectKind::Metadata,
                br#"{"product_id": "S2_L0_other", "timestamp": 1, "sensor_id": "MSI"}"#,
            )
            .unwrap();

        assert!(matches!(
            pipeline.ingest(&admin, &id),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_payload_is_resource_missing() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();
        pipeline
            .zones()
            .delete(Zone::Ingest, &id, ObjectKind::Payload)
            .unwrap();

        assert!(matches!(
            pipeline.ingest(&admin, &id),
            Err(PipelineError::ResourceMissing(_))
        ));
        assert!(pipeline.list().unwrap().iter().all(|r| r.status == ProductStatus::Generated));
    }

    #[test]
    fn test_user_cannot_ingest() {
        let pipeline = pipeline();
        let admin = pipeline.access().login("emanuele_admin").unwrap();
        let user = pipeline.access().login("charlie_user").unwrap();
        let id = pipeline.scan(&admin, false).unwrap();

        assert!(matches!(
            pipeline.ingest(&user, &id),
            Err(PipelineError::AuthorizationDenied { .. })
        ));
        assert_eq!(pipeline.record(&id).unwrap().status, ProductStatus::Generated);
    }
}
