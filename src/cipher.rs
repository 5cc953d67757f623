//! Authenticated encryption of product payloads at rest.
//!
//! One AES-256-GCM key protects the archive for the lifetime of the system.
//! Every call to [`PayloadCipher::encrypt`] draws a fresh 96-bit nonce, so
//! identical plaintexts never produce identical ciphertexts. The wire layout is
//!
//! ```text
//! | nonce (12 bytes) | ciphertext | tag (16 bytes) |
//! ```
//!
//! Decryption authenticates before returning anything: a flipped bit, a
//! truncated blob or the wrong key all surface as
//! [`PipelineError::AuthenticationFailure`], never as garbled plaintext.
//!
//! Losing the key file makes every archived product unreadable. There is no
//! escrow or recovery path.

use crate::error::{PipelineError, Result, ResultExt as _};
use aes_gcm::aead::{Aead as _, KeyInit as _};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore as _;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret as _, SecretBox};
use std::fs;
use std::io::{ErrorKind, Write as _};
use std::path::Path;

/// Key length in bytes (256-bit key).
pub const KEY_LEN: usize = 32;

/// Nonce length in bytes, stored as the ciphertext prefix.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended by GCM.
pub const TAG_LEN: usize = 16;

/// Symmetric payload encryption.
pub trait PayloadCipher: Send + Sync {
    /// Encrypt under a fresh nonce.
    ///
    /// # Errors
    ///
    /// Returns an error only if the underlying primitive rejects the input.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Authenticate and decrypt.
    ///
    /// # Errors
    ///
    /// [`PipelineError::AuthenticationFailure`] for any tampering, truncation or
    /// key mismatch.
    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// AES-256-GCM cipher holding the system key.
pub struct AesGcmCipher {
    key: SecretBox<[u8; KEY_LEN]>,
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher").field("key", &"[REDACTED]").finish()
    }
}

impl AesGcmCipher {
    pub fn from_key(key: [u8; KEY_LEN]) -> Self {
        Self {
            key: SecretBox::new(Box::new(key)),
        }
    }

    /// Fresh random key, held only in memory.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::from_key(key)
    }

    /// Load the key at `path`, generating and persisting one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if an existing key file is malformed;
    /// a damaged key is never silently replaced.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_key_file(path);
        }

        tracing::warn!(target: "audit", "No encryption key at {}; generating a new one", path.display());
        Self::generate_key_file(path)
    }

    /// Read a hex-encoded key file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or not exactly 32 hex-encoded bytes.
    pub fn load_key_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                PipelineError::ResourceMissing(format!("Encryption key not found at {}", path.display()))
            } else {
                PipelineError::Io(e)
            }
        })?;

        let mut key = [0u8; KEY_LEN];
        hex::decode_to_slice(text.trim(), &mut key).map_err(|e| {
            PipelineError::Config(format!("Key file {} is malformed: {e}", path.display()))
        })?;

        Ok(Self::from_key(key))
    }

    /// Generate a key and write it to `path` with owner-only permissions.
    ///
    /// # Errors
    ///
    /// Fails if `path` already exists or cannot be written.
    pub fn generate_key_file(path: &Path) -> Result<Self> {
        let cipher = Self::generate();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create key directory {}", parent.display()))?;
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt as _;
            options.mode(0o600);
        }

        let mut file = options
            .open(path)
            .with_context(|| format!("Failed to create key file {}", path.display()))?;
        file.write_all(hex::encode(cipher.key.expose_secret()).as_bytes())
            .with_context(|| format!("Failed to write key file {}", path.display()))?;
        file.sync_all()?;

        tracing::info!(target: "audit", "New encryption key written to {}", path.display());
        Ok(cipher)
    }

    fn aead(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(self.key.expose_secret()))
    }
}

impl PayloadCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let sealed = self
            .aead()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| PipelineError::Other(format!("Encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(PipelineError::AuthenticationFailure(format!(
                "ciphertext too short ({} bytes)",
                ciphertext.len()
            )));
        }

        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        self.aead()
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_err| {
                PipelineError::AuthenticationFailure(
                    "tag verification failed (tampered data or wrong key)".to_owned(),
                )
            })
    }
}
