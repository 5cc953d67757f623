//! In-memory zone store: an arena of objects indexed by zone, product and kind.

use super::{ObjectKind, Zone, ZoneStore};
use crate::custody::ProductId;
use crate::error::{PipelineError, Result};
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type ObjectMap = HashMap<(Zone, ProductId, ObjectKind), Vec<u8>>;

#[derive(Debug, Default)]
pub struct MemoryZoneStore {
    objects: RwLock<ObjectMap>,
}

impl MemoryZoneStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently held in `zone`.
    pub fn count(&self, zone: Zone) -> usize {
        self.objects
            .read()
            .map(|objects| objects.keys().filter(|(z, _, _)| *z == zone).count())
            .unwrap_or(0)
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, ObjectMap>> {
        self.objects
            .read()
            .map_err(|e| PipelineError::Other(format!("Lock poisoned: {e}")))
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, ObjectMap>> {
        self.objects
            .write()
            .map_err(|e| PipelineError::Other(format!("Lock poisoned: {e}")))
    }
}

fn missing(zone: Zone, product: &ProductId, kind: ObjectKind) -> PipelineError {
    PipelineError::ResourceMissing(format!("{kind:?} for {product} not found in the {zone}"))
}

impl ZoneStore for MemoryZoneStore {
    fn read(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Vec<u8>> {
        self.read_guard()?
            .get(&(zone, product.clone(), kind))
            .cloned()
            .ok_or_else(|| missing(zone, product, kind))
    }

    fn reader(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Box<dyn Read + '_>> {
        let bytes = self.read(zone, product, kind)?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn write(&self, zone: Zone, product: &ProductId, kind: ObjectKind, bytes: &[u8]) -> Result<()> {
        self.write_guard()?
            .insert((zone, product.clone(), kind), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<bool> {
        Ok(self
            .write_guard()?
            .remove(&(zone, product.clone(), kind))
            .is_some())
    }

    fn exists(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> bool {
        self.objects
            .read()
            .map(|objects| objects.contains_key(&(zone, product.clone(), kind)))
            .unwrap_or(false)
    }

    fn clear(&self) -> Result<()> {
        self.write_guard()?.clear();
        Ok(())
    }
}
