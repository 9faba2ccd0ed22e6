// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crypto;
mod envelope;
mod manager;

pub use crypto::{EncryptedBackup, decrypt_envelope, encrypt_envelope};
pub use envelope::{BackupEnvelope, SUPPORTED_VERSION, SectionSelection};
pub use manager::{RestoreOptions, RestoreReport, export, restore};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
