//! Fingerprint comparison with diagnostics.
//!
//! Produces a pass/fail [`IntegrityCheck`] describing which copy was examined,
//! what was expected and what was actually found, suitable for audit records
//! and console display.

use super::hasher::Fingerprint;
use crate::zones::Zone;
use serde::Serialize;

/// Result of comparing a live fingerprint against a trusted reference.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityCheck {
    /// Whether the live bytes matched the reference
    pub passed: bool,

    /// Human-readable message describing the result
    pub message: String,

    /// Product whose bytes were examined
    pub product_id: String,

    /// Zone holding the examined copy
    pub zone: Zone,

    /// Reference fingerprint
    pub expected: Fingerprint,

    /// Live fingerprint, if the bytes could be read at all
    pub actual: Option<Fingerprint>,
}

impl IntegrityCheck {
    /// Compare `actual` against `expected`. A missing copy is a mismatch.
    pub fn compare(
        product_id: impl Into<String>,
        zone: Zone,
        expected: Fingerprint,
        actual: Option<Fingerprint>,
    ) -> Self {
        let (passed, message) = match actual {
            Some(found) if found == expected => (true, "Integrity verified".to_owned()),
            Some(_) => (false, "Fingerprint mismatch detected".to_owned()),
            None => (false, format!("No readable copy in the {zone}")),
        };

        Self {
            passed,
            message,
            product_id: product_id.into(),
            zone,
            expected,
            actual,
        }
    }

    /// Format the check for terminal display.
    pub fn format_cli(&self) -> String {
        if self.passed {
            format!(
                "✓ PASS: {}\n  Product: {}\n  Zone: {}\n  Fingerprint: {}",
                self.message,
                self.product_id,
                self.zone,
                self.expected.short()
            )
        } else {
            let mut output = format!(
                "✗ FAIL: {}\n  Product: {}\n  Zone: {}\n  Expected: {}\n  ",
                self.message, self.product_id, self.zone, self.expected
            );

            if let Some(actual) = &self.actual {
                output.push_str(&format!("Actual:   {actual}\n  "));
            }

            output.push_str("Copy may have been modified or corrupted");
            output
        }
    }
}
