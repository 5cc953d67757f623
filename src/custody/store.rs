//! Ledger persistence backends

use super::record::{CustodyRecord, ProductId};
use super::status::ProductStatus;
use crate::error::{PipelineError, Result, ResultExt as _};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Durable home of custody records.
///
/// `commit` is all-or-nothing: a reader sees either the previous record or the
/// new one, never a mix. Implementations reject records that break the custody
/// invariants.
pub trait LedgerStore: Send + Sync {
    /// # Errors
    ///
    /// [`PipelineError::ResourceMissing`] if no record exists for `id`.
    fn load(&self, id: &ProductId) -> Result<CustodyRecord>;

    /// # Errors
    ///
    /// Fails without changing the stored record if the record is inconsistent,
    /// its status does not follow from the stored one, or the backend cannot
    /// persist it.
    fn commit(&self, record: &CustodyRecord) -> Result<()>;

    /// All records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be enumerated.
    fn list(&self) -> Result<Vec<CustodyRecord>>;

    fn contains(&self, id: &ProductId) -> bool;

    /// # Errors
    ///
    /// Returns an error if any record cannot be removed.
    fn clear(&self) -> Result<()>;
}

/// A new product starts GENERATED; after that every commit must be one legal
/// step from the stored status.
fn check_transition(stored: Option<&CustodyRecord>, record: &CustodyRecord) -> Result<()> {
    match stored {
        None if record.status == ProductStatus::Generated => Ok(()),
        None => Err(PipelineError::InvalidTransition(format!(
            "first record of {} must be {}, found {}",
            record.id,
            ProductStatus::Generated,
            record.status
        ))),
        Some(stored) if stored.status.can_transition_to(record.status) => Ok(()),
        Some(stored) => Err(PipelineError::InvalidTransition(format!(
            "ledger refuses {} -> {} for {}",
            stored.status, record.status, record.id
        ))),
    }
}

/// One pretty-printed JSON document per product.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    dir: PathBuf,
}

impl JsonLedgerStore {
    /// # Errors
    ///
    /// Returns an error if the ledger directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create ledger directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, id: &ProductId) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self, id: &ProductId) -> Result<CustodyRecord> {
        let path = self.record_path(id);
        let json = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PipelineError::ResourceMissing(format!("No custody record for {id}"))
            } else {
                PipelineError::Io(e)
            }
        })?;

        CustodyRecord::from_json(&json)
            .map_err(|e| PipelineError::Other(format!("Custody record {} is unreadable: {e}", path.display())))
    }

    fn commit(&self, record: &CustodyRecord) -> Result<()> {
        record.check_invariants()?;
        let stored = match self.load(&record.id) {
            Ok(stored) => Some(stored),
            Err(PipelineError::ResourceMissing(_)) => None,
            Err(e) => return Err(e),
        };
        check_transition(stored.as_ref(), record)?;
        let json = record.to_json()?;

        // Write beside the target so the rename stays on one filesystem
        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("Failed to stage record in {}", self.dir.display()))?;
        temp.write_all(json.as_bytes())?;
        temp.as_file().sync_all()?;

        let path = self.record_path(&record.id);
        temp.persist(&path)
            .map_err(|e| PipelineError::Io(e.error))
            .with_context(|| format!("Failed to commit {}", path.display()))?;

        tracing::debug!("Committed custody record {} ({})", record.id, record.status);
        Ok(())
    }

    fn list(&self) -> Result<Vec<CustodyRecord>> {
        let mut records = Vec::new();
        if !self.dir.exists() {
            return Ok(records);
        }

        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read ledger {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let json = fs::read_to_string(&path)?;
            match CustodyRecord::from_json(&json) {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!("Skipping unreadable ledger entry {}: {e}", path.display()),
            }
        }

        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn contains(&self, id: &ProductId) -> bool {
        self.record_path(id).is_file()
    }

    fn clear(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to delete {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// Ledger held in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: RwLock<HashMap<ProductId, CustodyRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Other(format!("Lock poisoned: {e}"))
}

impl LedgerStore for MemoryLedger {
    fn load(&self, id: &ProductId) -> Result<CustodyRecord> {
        self.records
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::ResourceMissing(format!("No custody record for {id}")))
    }

    fn commit(&self, record: &CustodyRecord) -> Result<()> {
        record.check_invariants()?;
        let mut records = self.records.write().map_err(poisoned)?;
        check_transition(records.get(&record.id), record)?;
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<CustodyRecord>> {
        let mut records: Vec<CustodyRecord> =
            self.records.read().map_err(poisoned)?.values().cloned().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn contains(&self, id: &ProductId) -> bool {
        self.records
            .read()
            .map(|records| records.contains_key(id))
            .unwrap_or(false)
    }

    fn clear(&self) -> Result<()> {
        self.records.write().map_err(poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::ProductStatus;
    use crate::integrity::fingerprint_bytes;
    use tempfile::TempDir;

    fn record(id: &str) -> CustodyRecord {
        CustodyRecord::new(ProductId::from(id), Default::default(), "tester")
    }

    fn exercise(store: &dyn LedgerStore) {
        let mut first = record("S2_L0_aaaa");
        store.commit(&first).unwrap();
        store.commit(&record("S2_L0_bbbb")).unwrap();

        assert!(store.contains(&first.id));
        assert_eq!(store.list().unwrap().len(), 2);

        first.fingerprint_ingest = Some(fingerprint_bytes(b"raw"));
        first.advance(ProductStatus::Ingested, "tester", first.fingerprint_ingest, "ingested");
        store.commit(&first).unwrap();
        assert_eq!(store.load(&first.id).unwrap().status, ProductStatus::Ingested);

        // Inconsistent record is refused and the stored one is untouched
        let mut broken = first.clone();
        broken.status = ProductStatus::Processed;
        assert!(matches!(
            store.commit(&broken),
            Err(PipelineError::IntegrityViolation(_))
        ));
        assert_eq!(store.load(&first.id).unwrap(), first);

        // Status may not move backwards or skip ahead
        let rewound = record("S2_L0_aaaa");
        assert!(matches!(
            store.commit(&rewound),
            Err(PipelineError::InvalidTransition(_))
        ));
        assert!(matches!(
            store.commit(&first),
            Err(PipelineError::InvalidTransition(_))
        ));
        assert_eq!(store.load(&first.id).unwrap(), first);

        // A product enters the ledger GENERATED
        let mut late = record("S2_L0_eeee");
        late.fingerprint_ingest = Some(fingerprint_bytes(b"raw"));
        late.advance(ProductStatus::Ingested, "tester", late.fingerprint_ingest, "ingested");
        assert!(matches!(
            store.commit(&late),
            Err(PipelineError::InvalidTransition(_))
        ));
        assert!(!store.contains(&late.id));

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(matches!(
            store.load(&first.id),
            Err(PipelineError::ResourceMissing(_))
        ));
    }

    #[test]
    fn test_memory_ledger() {
        exercise(&MemoryLedger::new());
    }

    #[test]
    fn test_json_ledger() {
        let temp = TempDir::new().unwrap();
        exercise(&JsonLedgerStore::new(temp.path().join("ledger")).unwrap());
    }

    #[test]
    fn test_json_commit_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = JsonLedgerStore::new(temp.path()).unwrap();
        let mut cccc = record("S2_L0_cccc");
        store.commit(&cccc).unwrap();
        cccc.fingerprint_ingest = Some(fingerprint_bytes(b"raw"));
        cccc.advance(ProductStatus::Ingested, "tester", cccc.fingerprint_ingest, "ingested");
        store.commit(&cccc).unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["S2_L0_cccc.json".to_owned()]);
    }

    #[test]
    fn test_json_list_skips_garbage() {
        let temp = TempDir::new().unwrap();
        let store = JsonLedgerStore::new(temp.path()).unwrap();
        store.commit(&record("S2_L0_dddd")).unwrap();
        fs::write(temp.path().join("junk.json"), "{not json").unwrap();

        let records = store.list().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "S2_L0_dddd");
    }
}
