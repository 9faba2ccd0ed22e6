// SPDX-License-Identifier: MIT OR Apache-2.0
//! The backup envelope and section selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shc_core::DeviceInfo;
use shc_error::{Error, ErrorKind};

/// Newest envelope format this library reads and writes.
pub const SUPPORTED_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// SectionSelection
// ---------------------------------------------------------------------------

/// Which optional sections an export or restore touches.
///
/// The default selects everything except credentials (`auth`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSelection {
    /// WiFi configuration.
    pub wifi: bool,
    /// Cloud connection configuration.
    pub cloud: bool,
    /// Bluetooth configuration.
    pub ble: bool,
    /// MQTT configuration.
    pub mqtt: bool,
    /// Webhook registrations.
    pub webhooks: bool,
    /// Schedule jobs.
    pub schedules: bool,
    /// Scripts, including their source.
    pub scripts: bool,
    /// Key-value store entries.
    pub kvs: bool,
    /// Authentication settings (export only; never reconstructed).
    pub auth: bool,
    /// Component inventory snapshot.
    pub components: bool,
}

impl Default for SectionSelection {
    fn default() -> Self {
        Self {
            wifi: true,
            cloud: true,
            ble: true,
            mqtt: true,
            webhooks: true,
            schedules: true,
            scripts: true,
            kvs: true,
            auth: false,
            components: true,
        }
    }
}

impl SectionSelection {
    /// Select every section.
    #[must_use]
    pub fn all() -> Self {
        Self {
            auth: true,
            ..Self::default()
        }
    }

    /// Select nothing (base config only).
    #[must_use]
    pub fn none() -> Self {
        Self {
            wifi: false,
            cloud: false,
            ble: false,
            mqtt: false,
            webhooks: false,
            schedules: false,
            scripts: false,
            kvs: false,
            auth: false,
            components: false,
        }
    }

    /// The migration default: network identity (WiFi) stays off so the
    /// target keeps its own address, and credentials are never carried.
    #[must_use]
    pub fn for_migration() -> Self {
        Self {
            wifi: false,
            auth: false,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// BackupEnvelope
// ---------------------------------------------------------------------------

/// A versioned snapshot of one device's configuration.
///
/// Sections are opaque JSON blobs; the engine never introspects them
/// beyond the array/map key needed for item-level restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEnvelope {
    /// Envelope format version.
    pub version: u32,
    /// Creation timestamp (UTC).
    pub created_at: DateTime<Utc>,
    /// Identity snapshot of the source device.
    pub device_info: DeviceInfo,
    /// Base configuration blob.
    pub config: Value,
    /// WiFi configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wifi: Option<Value>,
    /// Cloud configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<Value>,
    /// Bluetooth configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ble: Option<Value>,
    /// MQTT configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<Value>,
    /// Webhook registrations (`{"hooks": [...]}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhooks: Option<Value>,
    /// Schedule jobs (`{"jobs": [...]}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedules: Option<Value>,
    /// Scripts with their source (`{"scripts": [...]}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<Value>,
    /// Key-value store entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kvs: Option<Value>,
    /// Authentication settings snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// Component inventory snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Value>,
}

impl BackupEnvelope {
    /// Start an envelope for the given device.
    #[must_use]
    pub fn new(device_info: DeviceInfo, config: Value) -> Self {
        Self {
            version: SUPPORTED_VERSION,
            created_at: Utc::now(),
            device_info,
            config,
            wifi: None,
            cloud: None,
            ble: None,
            mqtt: None,
            webhooks: None,
            schedules: None,
            scripts: None,
            kvs: None,
            auth: None,
            components: None,
        }
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> shc_error::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::new(ErrorKind::InvalidBackup, "envelope not serializable").with_source(e)
        })
    }

    /// Parse an envelope from bytes.
    pub fn parse(bytes: &[u8]) -> shc_error::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            Error::new(ErrorKind::InvalidBackup, "backup is not a valid envelope").with_source(e)
        })
    }

    /// Fail with `VersionMismatch` when this envelope is newer than the
    /// library supports.
    pub fn check_version(&self) -> shc_error::Result<()> {
        if self.version > SUPPORTED_VERSION {
            return Err(Error::new(ErrorKind::VersionMismatch, "backup format is too new")
                .with_context("version", self.version)
                .with_context("supported", SUPPORTED_VERSION));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
