//! Trust zones and the byte stores behind them.
//!
//! Products cross four isolated zones, each with its own trust level:
//! - **Ingest**: landing zone for untrusted data straight from the source
//! - **Processing**: staging workspace where validated data is transformed
//! - **Archive**: long-term store; holds ciphertext only
//! - **Backup**: independent copy of the archive ciphertext
//!
//! The lifecycle never touches paths directly. It talks to a [`ZoneStore`],
//! a key-value byte store addressed by zone, product and object kind, so the
//! state machine works the same over a directory tree or an in-memory arena.

pub mod filesystem;
pub mod memory;

pub use filesystem::FsZoneStore;
pub use memory::MemoryZoneStore;

use crate::custody::ProductId;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Read;

/// A storage area with a defined trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Ingest,
    Processing,
    Archive,
    Backup,
}

impl Zone {
    pub const ALL: [Self; 4] = [Self::Ingest, Self::Processing, Self::Archive, Self::Backup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Processing => "processing",
            Self::Archive => "archive",
            Self::Backup => "backup",
        }
    }

    /// Whether payloads in this zone are stored encrypted.
    pub fn holds_ciphertext(&self) -> bool {
        matches!(self, Self::Archive | Self::Backup)
    }

    pub fn trust_level(&self) -> &'static str {
        match self {
            Self::Ingest => "LOW",
            Self::Processing => "MEDIUM",
            Self::Archive | Self::Backup => "HIGH",
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingest => write!(f, "ingest landing zone"),
            Self::Processing => write!(f, "processing staging"),
            Self::Archive => write!(f, "secure archive"),
            Self::Backup => write!(f, "backup vault"),
        }
    }
}

/// What a stored object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKind {
    /// Product samples (cleartext) or ciphertext, depending on the zone
    Payload,
    /// Source metadata document delivered alongside the payload
    Metadata,
}

/// Byte store partitioned by trust zone.
///
/// Implementations must be safe to share between threads; the lifecycle
/// serializes access per product, not per store.
pub trait ZoneStore: Send + Sync {
    /// Read a whole object.
    ///
    /// # Errors
    ///
    /// [`crate::error::PipelineError::ResourceMissing`] if the object is absent.
    fn read(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Vec<u8>>;

    /// Open an object for streaming reads.
    ///
    /// # Errors
    ///
    /// [`crate::error::PipelineError::ResourceMissing`] if the object is absent.
    fn reader(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<Box<dyn Read + '_>>;

    /// Create or replace an object. The zone is created on demand.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot persist the bytes.
    fn write(&self, zone: Zone, product: &ProductId, kind: ObjectKind, bytes: &[u8]) -> Result<()>;

    /// Remove an object. Returns whether anything was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to remove an existing object.
    fn delete(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> Result<bool>;

    fn exists(&self, zone: Zone, product: &ProductId, kind: ObjectKind) -> bool;

    /// Remove every object in every zone.
    ///
    /// # Errors
    ///
    /// Returns an error if any object cannot be removed.
    fn clear(&self) -> Result<()>;

    /// Copy an object verbatim from one zone to another.
    ///
    /// # Errors
    ///
    /// Propagates the read or write failure.
    fn copy(&self, from: Zone, to: Zone, product: &ProductId, kind: ObjectKind) -> Result<()> {
        let bytes = self.read(from, product, kind)?;
        self.write(to, product, kind, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_vault_zones_hold_ciphertext() {
        assert!(!Zone::Ingest.holds_ciphertext());
        assert!(!Zone::Processing.holds_ciphertext());
        assert!(Zone::Archive.holds_ciphertext());
        assert!(Zone::Backup.holds_ciphertext());
    }

    #[test]
    fn test_zone_names() {
        assert_eq!(Zone::Archive.as_str(), "archive");
        assert_eq!(Zone::Archive.to_string(), "secure archive");
        assert_eq!(serde_json::to_string(&Zone::Processing).unwrap(), "\"processing\"");
    }
}
