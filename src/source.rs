//! Synthetic Earth Observation products and their payload format.
//!
//! A product is a 100×100 image with 3 spectral bands, stored as little-endian
//! `f32` samples in row-major, band-interleaved order, plus a JSON metadata
//! document. The generator can plant a NaN "dead pixel" so the quality gate
//! has something to catch.

use crate::custody::ProductId;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ROWS: usize = 100;
pub const COLS: usize = 100;
pub const BANDS: usize = 3;
pub const SAMPLE_COUNT: usize = ROWS * COLS * BANDS;
pub const PAYLOAD_LEN: usize = SAMPLE_COUNT * size_of::<f32>();

/// Digital numbers to top-of-atmosphere reflectance.
pub const CALIBRATION_DIVISOR: f32 = 255.0;

pub const DEFAULT_REQUIRED_FIELDS: [&str; 3] = ["product_id", "timestamp", "sensor_id"];

/// Metadata delivered alongside each payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub product_id: String,
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub orbit: u32,
    pub cloud_cover_percentage: f64,
}

impl SourceMetadata {
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedProduct {
    pub payload: Vec<u8>,
    pub metadata: SourceMetadata,
}

/// The simulated instrument.
#[derive(Debug, Clone)]
pub struct DataSource {
    sensor_id: String,
    orbit: u32,
}

impl Default for DataSource {
    fn default() -> Self {
        Self {
            sensor_id: "Simulated-MSI".to_owned(),
            orbit: 1234,
        }
    }
}

impl DataSource {
    pub fn new(sensor_id: impl Into<String>, orbit: u32) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            orbit,
        }
    }

    /// Acquire one product. With `dead_pixel` set, sample (50, 50, band 0) is NaN.
    pub fn generate(&self, id: &ProductId, dead_pixel: bool) -> GeneratedProduct {
        let mut rng = rand::thread_rng();
        let mut samples: Vec<f32> = (0..SAMPLE_COUNT).map(|_| rng.r#gen::<f32>()).collect();

        if dead_pixel && let Some(sample) = samples.get_mut(sample_index(50, 50, 0)) {
            *sample = f32::NAN;
        }

        let metadata = SourceMetadata {
            product_id: id.to_string(),
            timestamp: Utc::now(),
            sensor_id: self.sensor_id.clone(),
            orbit: self.orbit,
            cloud_cover_percentage: rng.gen_range(0.0..100.0),
        };

        tracing::debug!("Generated {id} ({} bytes, dead_pixel={dead_pixel})", PAYLOAD_LEN);
        GeneratedProduct {
            payload: encode_samples(&samples),
            metadata,
        }
    }
}

fn sample_index(row: usize, col: usize, band: usize) -> usize {
    (row * COLS + col) * BANDS + band
}

pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// # Errors
///
/// [`PipelineError::QualityRejected`] if the byte length is not a whole
/// number of samples.
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>> {
    let (chunks, rest) = bytes.as_chunks::<4>();
    if !rest.is_empty() {
        return Err(PipelineError::QualityRejected(format!(
            "payload length {} is not a multiple of 4 bytes",
            bytes.len()
        )));
    }
    Ok(chunks.iter().map(|c| f32::from_le_bytes(*c)).collect())
}

/// Reject payloads holding NaN or infinite samples.
///
/// # Errors
///
/// [`PipelineError::QualityRejected`] naming the first bad sample.
pub fn quality_check(samples: &[f32]) -> Result<()> {
    let bad = samples.iter().filter(|s| !s.is_finite()).count();
    if let Some(first) = samples.iter().position(|s| !s.is_finite()) {
        return Err(PipelineError::QualityRejected(format!(
            "{bad} non-finite sample(s), first at index {first}"
        )));
    }
    Ok(())
}

pub fn calibrate(samples: &mut [f32]) {
    for sample in samples.iter_mut() {
        *sample /= CALIBRATION_DIVISOR;
    }
}

/// Parse a metadata document and check the required fields.
///
/// # Errors
///
/// [`PipelineError::Validation`] if the document is not a JSON object or a
/// required field is absent or null.
pub fn validate_metadata(bytes: &[u8], required: &[String]) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PipelineError::Validation(format!("metadata is not valid JSON: {e}")))?;

    let Value::Object(map) = value else {
        return Err(PipelineError::Validation(
            "metadata is not a JSON object".to_owned(),
        ));
    };

    let missing: Vec<&str> = required
        .iter()
        .filter(|field| map.get(field.as_str()).is_none_or(Value::is_null))
        .map(String::as_str)
        .collect();

    if !missing.is_empty() {
        return Err(PipelineError::Validation(format!(
            "missing required metadata field(s): {}",
            missing.join(", ")
        )));
    }

    Ok(map)
}
