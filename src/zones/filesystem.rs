//! Directory-per-zone storage backend.
//!
//! Layout under the base path (directory names configurable):
//!
//! ```text
//! simulation_data/
//!   ingest_landing_zone/   {id}.bin  {id}.json
//!   processing_staging/    {id}.bin
//!   secure_archive/        {id}.enc
//!   backup_storage/        {id}.enc
//! ```

use super::{ObjectKind, Zone, ZoneStore};
use crate::custody::ProductId;
use crate::error::{PipelineError, Result, ResultExt as _};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};

/// Default directory name for each zone.
pub fn default_dir_name(zone: Zone) -> &'static str {
    match zone {
        Zone::Ingest => "ingest_landing_zone",
        Zone::Processing => "processing_staging",
        Zone::Archive => "secure_archive",
        Zone::Backup => "backup_storage",
    }
}

#[derive(Debug, Clone)]
pub struct FsZoneStore {
    roots: BTreeMap<Zone, PathBuf>,
}

impl FsZoneStore {
    /// Store with the default directory names under `base_path`.
    pub fn new(base_path: &Path) -> Self {
        let roots = Zone::ALL
            .into_iter()
            .map(|zone| (zone, base_path.join(default_dir_name(zone))))
            .collect();
        Self { roots }
    }

    /// Store with explicit zone directories. Zones left out fall back to the
    /// default name under `base_path`.
    pub fn with_dirs(base_path: &Path, dirs: &BTreeMap<Zone, PathBuf>) -> Self {
        let mut store = Self::new(base_path);
        for (zone, dir) in dirs {
            store.roots.insert(*zone, dir.clone());
        }
        store
    }

    /// Create every zone directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn bootstrap(&self) -> Result<()> {
        for (zone, dir) in &self.roots {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {zone} at {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn zone_dir(&self, zone: Zone) -> &Path {
        // Every zone is inserted by `new`
        self.roots.get(&zone).map_or_else(|| Path::new("."), PathBuf::as_path)
    }

    /// On-disk location of an object.
    pub fn object_path(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> PathBuf {
        let file_name = match kind {
            ObjectKind::Metadata => format!("{product}.json"),
            ObjectKind::Payload if zone.holds_ciphertext() => format!("{product}.enc"),
            ObjectKind::Payload => format!("{product}.bin"),
        };
        self.zone_dir(zone).join(file_name)
    }
}

fn not_found(path: &Path, zone: Zone, err: std::io::Error) -> PipelineError {
    if err.kind() == ErrorKind::NotFound {
        PipelineError::ResourceMissing(format!("{} not found in the {zone}", path.display()))
    } else {
        PipelineError::Io(err)
    }
}

impl ZoneStore for FsZoneStore {
    fn read(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Vec<u8>> {
        let path = self.object_path(zone, product, kind);
        fs::read(&path).map_err(|e| not_found(&path, zone, e))
    }

    fn reader(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Box<dyn Read + '_>> {
        let path = self.object_path(zone, product, kind);
        let file = File::open(&path).map_err(|e| not_found(&path, zone, e))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn write(&self, zone: Zone, product: &ProductId, kind: ObjectKind, bytes: &[u8]) -> Result<()> {
        let dir = self.zone_dir(zone);
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {zone} at {}", dir.display()))?;

        let path = self.object_path(zone, product, kind);
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))
    }

    fn delete(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<bool> {
        let path = self.object_path(zone, product, kind);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to delete {}: {e}", path.display()),
            ))),
        }
    }

    fn exists(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> bool {
        self.object_path(zone, product, kind).is_file()
    }

    fn clear(&self) -> Result<()> {
        for dir in self.roots.values() {
            if !dir.exists() {
                continue;
            }

            for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
                let path = entry?.path();
                if path.is_file() {
                    fs::remove_file(&path)
                        .with_context(|| format!("Failed to delete {}", path.display()))?;
                }
            }
        }
        Ok(())
    }
}
