//! Custody record and event history

use super::status::ProductStatus;
use crate::error::{PipelineError, Result};
use crate::integrity::Fingerprint;
use crate::zones::Zone;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Label applied once the payload is only held as ciphertext.
pub const CONFIDENTIALITY_ENCRYPTED: &str = "encrypted";

/// Opaque, immutable product identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ProductId(String);

impl ProductId {
    pub const PREFIX: &'static str = "S2_L0_";

    /// Fresh identifier, e.g. `S2_L0_3f9a0c1e`.
    pub fn generate() -> Self {
        let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
        Self(format!("{}{suffix}", Self::PREFIX))
    }

    /// Parse an operator-supplied identifier. Only ASCII letters, digits, `_`
    /// and `-` are accepted since ids become file names.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] for empty or unsafe ids.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PipelineError::Validation("product id is empty".to_owned()));
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(PipelineError::Validation(format!(
                "product id '{s}' contains unsupported characters"
            )));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
impl From<&str> for ProductId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl TryFrom<String> for ProductId {
    type Error = PipelineError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<ProductId> for String {
    fn from(id: ProductId) -> Self {
        id.0
    }
}

impl FromStr for ProductId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for ProductId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// One committed step in the chain of custody.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyEvent {
    pub status: ProductStatus,
    pub at: DateTime<Utc>,
    pub actor: String,
    pub zone: Zone,
    /// Fingerprint bound at this step, if any
    pub fingerprint: Option<Fingerprint>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub id: ProductId,
    pub status: ProductStatus,
    /// Zone holding the authoritative bytes
    pub payload_location: Zone,
    pub fingerprint_ingest: Option<Fingerprint>,
    pub fingerprint_processed: Option<Fingerprint>,
    /// Ciphertext fingerprint taken as the payload entered the archive
    pub fingerprint_archive: Option<Fingerprint>,
    pub confidentiality_label: Option<String>,
    /// Source metadata document, enriched as the product advances
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub history: Vec<CustodyEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CustodyRecord {
    /// Record for a freshly generated product in the ingest landing zone.
    pub fn new(
        id: ProductId,
        metadata: serde_json::Map<String, serde_json::Value>,
        actor: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: ProductStatus::Generated,
            payload_location: Zone::Ingest,
            fingerprint_ingest: None,
            fingerprint_processed: None,
            fingerprint_archive: None,
            confidentiality_label: None,
            metadata,
            history: vec![CustodyEvent {
                status: ProductStatus::Generated,
                at: now,
                actor: actor.to_owned(),
                zone: Zone::Ingest,
                fingerprint: None,
                note: "Product generated by data source".to_owned(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `status` and append the matching history event.
    ///
    /// Only touches the in-memory copy; nothing is durable until the record is
    /// committed to a [`super::LedgerStore`].
    pub fn advance(
        &mut self,
        status: ProductStatus,
        actor: &str,
        fingerprint: Option<Fingerprint>,
        note: impl Into<String>,
    ) {
        let now = Utc::now();
        self.status = status;
        self.updated_at = now;
        self.history.push(CustodyEvent {
            status,
            at: now,
            actor: actor.to_owned(),
            zone: self.payload_location,
            fingerprint,
            note: note.into(),
        });
    }

    pub fn is_encrypted(&self) -> bool {
        self.confidentiality_label.as_deref() == Some(CONFIDENTIALITY_ENCRYPTED)
    }

    /// Check the fingerprint/status invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IntegrityViolation`] naming the first broken rule.
    pub fn check_invariants(&self) -> Result<()> {
        let rules = [
            (
                "fingerprint_ingest",
                self.fingerprint_ingest.is_some(),
                self.status.is_at_least(ProductStatus::Ingested),
            ),
            (
                "fingerprint_processed",
                self.fingerprint_processed.is_some(),
                self.status.is_at_least(ProductStatus::Processed),
            ),
            (
                "fingerprint_archive",
                self.fingerprint_archive.is_some(),
                self.status.is_at_least(ProductStatus::Archived),
            ),
        ];

        for (field, present, required) in rules {
            if present != required {
                return Err(PipelineError::IntegrityViolation(format!(
                    "custody record {} in state {} {} {field}",
                    self.id,
                    self.status,
                    if required { "is missing" } else { "must not carry" }
                )));
            }
        }

        if self.status.is_at_least(ProductStatus::Archived) && !self.is_encrypted() {
            return Err(PipelineError::IntegrityViolation(format!(
                "archived product {} is not labelled {CONFIDENTIALITY_ENCRYPTED}",
                self.id
            )));
        }

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::fingerprint_bytes;

    fn archived_record() -> CustodyRecord {
        let mut record = CustodyRecord::new(ProductId::from("S2_L0_0001"), Default::default(), "tester");
        record.fingerprint_ingest = Some(fingerprint_bytes(b"raw"));
        record.advance(ProductStatus::Ingested, "tester", record.fingerprint_ingest, "ingested");
        record.fingerprint_processed = Some(fingerprint_bytes(b"calibrated"));
        record.advance(ProductStatus::Processed, "tester", record.fingerprint_processed, "processed");
        record.fingerprint_archive = Some(fingerprint_bytes(b"ciphertext"));
        record.confidentiality_label = Some(CONFIDENTIALITY_ENCRYPTED.to_owned());
        record.payload_location = Zone::Archive;
        record.advance(ProductStatus::Archived, "tester", record.fingerprint_archive, "archived");
        record
    }

    #[test]
    fn test_generated_id_shape() {
        let id = ProductId::generate();
        assert!(id.as_str().starts_with(ProductId::PREFIX));
        assert_eq!(id.as_str().len(), ProductId::PREFIX.len() + 8);
        assert_ne!(id, ProductId::generate());
    }

    #[test]
    fn test_parse_rejects_path_characters() {
        assert!(ProductId::parse("S2_L0_abc").is_ok());
        assert!(matches!(
            ProductId::parse("../etc/passwd"),
            Err(PipelineError::Validation(_))
        ));
        assert!(ProductId::parse("  ").is_err());
    }

    #[test]
    fn test_deserialize_rejects_path_characters() {
        let id: ProductId = serde_json::from_str("\"S2_L0_abc\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"S2_L0_abc\"");
        assert!(serde_json::from_str::<ProductId>("\"../x\"").is_err());

        let record = CustodyRecord::new(id, Default::default(), "tester");
        let tampered = record.to_json().unwrap().replace("S2_L0_abc", "../../etc");
        assert!(CustodyRecord::from_json(&tampered).is_err());
    }

    #[test]
    fn test_new_record_is_consistent() {
        let record = CustodyRecord::new(ProductId::from("S2_L0_0002"), Default::default(), "tester");
        assert_eq!(record.status, ProductStatus::Generated);
        assert_eq!(record.payload_location, Zone::Ingest);
        assert_eq!(record.history.len(), 1);
        record.check_invariants().unwrap();
    }

    #[test]
    fn test_invariants_catch_missing_fingerprint() {
        let mut record = archived_record();
        record.check_invariants().unwrap();

        record.fingerprint_processed = None;
        let err = record.check_invariants().unwrap_err();
        assert!(err.to_string().contains("fingerprint_processed"));
    }

    #[test]
    fn test_invariants_catch_premature_fingerprint() {
        let mut record = CustodyRecord::new(ProductId::from("S2_L0_0003"), Default::default(), "tester");
        record.fingerprint_processed = Some(fingerprint_bytes(b"early"));
        assert!(matches!(
            record.check_invariants(),
            Err(PipelineError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_history() {
        let record = archived_record();
        let parsed = CustodyRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.history.len(), 4);
    }
}
