//! Streaming cryptographic fingerprints.
//!
//! Payloads are hashed in fixed-size chunks so memory stays bounded regardless
//! of product size. The functions here are stateless: nothing is cached between
//! calls, and identical bytes always produce identical fingerprints.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest as _, Sha256};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Chunk size for streaming reads (8 KB).
pub const BUFFER_SIZE: usize = 8192;

/// Hash algorithm identifier recorded in custody records.
pub const HASH_ALGORITHM: &str = "SHA-256";

/// A 256-bit content fingerprint.
///
/// Renders and serializes as 64 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 16 hex characters, for log lines and console output.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(16);
        hex
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| PipelineError::Validation(format!("Invalid fingerprint '{s}': {e}")))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Cooperative cancellation flag checked between chunks.
///
/// Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Fingerprint an in-memory buffer.
pub fn fingerprint_bytes(bytes: &[u8]) -> Fingerprint {
    Fingerprint(Sha256::digest(bytes).into())
}

/// Fingerprint any byte stream, reading it in [`BUFFER_SIZE`] chunks.
///
/// # Errors
///
/// Returns an I/O error if the reader fails mid-stream.
pub fn fingerprint_reader<R: Read>(reader: R) -> Result<Fingerprint> {
    stream_digest(reader, None)
}

/// Like [`fingerprint_reader`], but checks `cancel` at every chunk boundary.
///
/// # Errors
///
/// Returns [`PipelineError::Cancelled`] as soon as the flag is observed set;
/// a partial digest is never returned.
pub fn fingerprint_reader_cancellable<R: Read>(reader: R, cancel: &CancelFlag) -> Result<Fingerprint> {
    stream_digest(reader, Some(cancel))
}

/// Fingerprint a file on disk.
///
/// # Errors
///
/// Returns [`PipelineError::ResourceMissing`] if the file does not exist, or an
/// I/O error for any other read failure.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            PipelineError::ResourceMissing(format!("Cannot fingerprint {}: not found", path.display()))
        } else {
            PipelineError::Io(e)
        }
    })?;

    fingerprint_reader(BufReader::with_capacity(BUFFER_SIZE, file))
}

fn stream_digest<R: Read>(mut reader: R, cancel: Option<&CancelFlag>) -> Result<Fingerprint> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; BUFFER_SIZE];

    loop {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            return Err(PipelineError::Cancelled);
        }

        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break, // EOF
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(PipelineError::Io(e)),
        };

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Fingerprint(hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write as _};
    use tempfile::NamedTempFile;

    #[test]
    fn test_fingerprint_empty() {
        let fp = fingerprint_reader(Cursor::new(Vec::<u8>::new())).unwrap();

        // SHA-256 of empty string
        assert_eq!(
            fp.to_hex(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_known_value() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"hello world").unwrap();
        temp_file.flush().unwrap();

        let fp = fingerprint_file(temp_file.path()).unwrap();

        assert_eq!(
            fp.to_hex(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_streaming_matches_in_memory() {
        // Larger than the buffer to exercise chunking
        let data: Vec<u8> = (0..BUFFER_SIZE * 3 + 100).map(|i| (i % 251) as u8).collect();

        let streamed = fingerprint_reader(Cursor::new(&data)).unwrap();
        assert_eq!(streamed, fingerprint_bytes(&data));
    }

    #[test]
    fn test_missing_file_is_resource_missing() {
        let result = fingerprint_file(Path::new("/nonexistent/payload.bin"));
        assert!(matches!(result, Err(PipelineError::ResourceMissing(_))));
    }

    #[test]
    fn test_deterministic_fingerprint() {
        let data = b"radiance samples";
        assert_eq!(fingerprint_bytes(data), fingerprint_bytes(data), "Fingerprint should be deterministic");
    }

    #[test]
    fn test_single_bit_flips_change_fingerprint() {
        let original: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
        let reference = fingerprint_bytes(&original);

        for (byte, bit) in [(0usize, 0u8), (1, 7), (2048, 3), (4095, 1)] {
            let mut mutated = original.clone();
            mutated[byte] ^= 1 << bit;
            assert_ne!(
                fingerprint_bytes(&mutated),
                reference,
                "flipping bit {bit} of byte {byte} must change the fingerprint"
            );
        }
    }

    #[test]
    fn test_cancelled_before_first_chunk() {
        let cancel = CancelFlag::new();
        cancel.cancel();

        let result = fingerprint_reader_cancellable(Cursor::new(vec![1u8; 64]), &cancel);
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        cancel.reset();
        let fp = fingerprint_reader_cancellable(Cursor::new(vec![1u8; 64]), &cancel).unwrap();
        assert_eq!(fp, fingerprint_bytes(&[1u8; 64]));
    }

    #[test]
    fn test_hex_round_trip_through_serde() {
        let fp = fingerprint_bytes(b"custody");
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", fp.to_hex()));

        let parsed: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, fp);
        assert!("not-hex".parse::<Fingerprint>().is_err());
    }
}
