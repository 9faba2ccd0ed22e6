// SPDX-License-Identifier: MIT OR Apache-2.0
//! AES-256-GCM envelope encryption.
//!
//! Key = SHA-256(password). A random 12-byte nonce is prepended to the
//! ciphertext (which carries its GCM tag), and the whole blob is base64'd
//! into the outer envelope. Truncated data and tag mismatches both map to
//! `DecryptionFailed`; a wrong password is indistinguishable from
//! corruption, by construction.

use crate::envelope::BackupEnvelope;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shc_error::{Error, ErrorKind};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypted wrapper around a serialized [`BackupEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedBackup {
    /// Envelope format version (mirrors the inner envelope).
    pub version: u32,
    /// Creation timestamp (mirrors the inner envelope).
    pub created_at: DateTime<Utc>,
    /// Source device model, kept readable for identification.
    pub device_model: String,
    /// Source device id, kept readable for identification.
    pub device_id: String,
    /// base64 of `nonce(12B) || ciphertext-with-tag`.
    pub encrypted_data: String,
}

impl EncryptedBackup {
    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> shc_error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::new(ErrorKind::EncryptionFailed, "encrypted envelope not serializable")
                .with_source(e)
        })
    }

    /// Parse an encrypted envelope from bytes.
    pub fn parse(bytes: &[u8]) -> shc_error::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            Error::new(ErrorKind::InvalidBackup, "backup is not an encrypted envelope")
                .with_source(e)
        })
    }
}

fn derive_key(password: &str) -> Aes256Gcm {
    let key = Sha256::digest(password.as_bytes());
    Aes256Gcm::new(&key)
}

/// Encrypt an envelope under a password.
pub fn encrypt_envelope(
    envelope: &BackupEnvelope,
    password: &str,
) -> shc_error::Result<EncryptedBackup> {
    let plaintext = serde_json::to_vec(envelope).map_err(|e| {
        Error::new(ErrorKind::EncryptionFailed, "envelope not serializable").with_source(e)
    })?;

    let cipher = derive_key(password);
    let nonce_bytes: [u8; NONCE_LEN] = rand::random();
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| Error::new(ErrorKind::EncryptionFailed, "AES-GCM encryption failed"))?;

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);

    Ok(EncryptedBackup {
        version: envelope.version,
        created_at: envelope.created_at,
        device_model: envelope.device_info.model.clone(),
        device_id: envelope.device_info.id.clone(),
        encrypted_data: STANDARD.encode(blob),
    })
}

/// Decrypt an encrypted backup with a password.
pub fn decrypt_envelope(
    encrypted: &EncryptedBackup,
    password: &str,
) -> shc_error::Result<BackupEnvelope> {
    let blob = STANDARD.decode(&encrypted.encrypted_data).map_err(|e| {
        Error::new(ErrorKind::DecryptionFailed, "encrypted data is not valid base64")
            .with_source(e)
    })?;
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(Error::new(ErrorKind::DecryptionFailed, "encrypted data is too short")
            .with_context("len", blob.len()));
    }

    let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
    let cipher = derive_key(password);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| {
            Error::new(ErrorKind::DecryptionFailed, "wrong password or corrupted data")
        })?;

    BackupEnvelope::parse(&plaintext)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
