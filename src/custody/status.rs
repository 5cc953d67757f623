//! Product lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a product stands in its lifecycle.
///
/// Progress is monotonic except for the `Archived -> Corrupted -> Archived`
/// recovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    /// Synthetic payload and metadata sit in the ingest landing zone
    Generated,
    /// Metadata validated, ingest fingerprint bound, payload staged
    Ingested,
    /// Quality-checked and calibrated
    Processed,
    /// Encrypted in the archive with a backup copy
    Archived,
    /// Archive bytes were tampered with; awaiting recovery
    Corrupted,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "GENERATED",
            Self::Ingested => "INGESTED",
            Self::Processed => "PROCESSED",
            Self::Archived => "ARCHIVED",
            Self::Corrupted => "CORRUPTED",
        }
    }

    /// Position in the forward chain. A corrupted product has still reached the
    /// archive, so it ranks with `Archived`.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Generated => 0,
            Self::Ingested => 1,
            Self::Processed => 2,
            Self::Archived | Self::Corrupted => 3,
        }
    }

    pub fn is_at_least(&self, other: Self) -> bool {
        self.rank() >= other.rank()
    }

    /// Check if this status can move to `target` in one committed step.
    pub fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Generated, Self::Ingested)
                | (Self::Ingested, Self::Processed)
                | (Self::Processed, Self::Archived)
                | (Self::Archived, Self::Corrupted)
                | (Self::Corrupted, Self::Archived)
                // A healthy recovery re-commits the same state
                | (Self::Archived, Self::Archived)
        )
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
