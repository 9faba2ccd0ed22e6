// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod component;
mod endpoint;
mod event;

pub use component::{ComponentRef, rpc_type_name};
pub use endpoint::{Endpoint, Scheme};
pub use event::{DeviceEvent, EventKind};

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Hardware protocol family of a device.
///
/// Gen1 speaks a URL-parameter REST dialect; Gen2 and later speak
/// JSON-RPC-2.0. Generation never changes over the lifetime of a device
/// handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Generation {
    /// First-generation devices (REST dialect).
    Gen1,
    /// Second-generation devices (JSON-RPC-2.0).
    Gen2,
    /// Third-generation devices (JSON-RPC-2.0).
    Gen3,
    /// Fourth-generation devices (JSON-RPC-2.0).
    Gen4,
}

impl Generation {
    /// Returns `true` for every generation that speaks JSON-RPC-2.0.
    #[must_use]
    pub fn is_rpc(self) -> bool {
        self != Self::Gen1
    }

    /// Numeric form as it appears on the wire (`1`..`4`).
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Gen1 => 1,
            Self::Gen2 => 2,
            Self::Gen3 => 3,
            Self::Gen4 => 4,
        }
    }
}

impl TryFrom<u8> for Generation {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Gen1),
            2 => Ok(Self::Gen2),
            3 => Ok(Self::Gen3),
            4 => Ok(Self::Gen4),
            other => Err(format!("unknown device generation: {other}")),
        }
    }
}

impl From<Generation> for u8 {
    fn from(generation: Generation) -> Self {
        generation.as_u8()
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen{}", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// DeviceInfo
// ---------------------------------------------------------------------------

/// Identity snapshot of a device.
///
/// Only `generation` is guaranteed stable; every other field is a snapshot
/// taken at probe time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device id in vendor-MAC-hex form (e.g. `shellyplus1-a8032ab12345`).
    pub id: String,
    /// Model code (e.g. `SNSW-001X16EU`).
    pub model: String,
    /// Hardware protocol generation.
    #[serde(rename = "gen")]
    pub generation: Generation,
    /// Firmware version string.
    #[serde(rename = "ver")]
    pub firmware: String,
    /// Whether the device requires authentication, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_required: Option<bool>,
}

impl DeviceInfo {
    /// Create a minimal identity snapshot.
    pub fn new(
        id: impl Into<String>,
        model: impl Into<String>,
        generation: Generation,
        firmware: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            generation,
            firmware: firmware.into(),
            auth_required: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Serde helper — `Duration` as integer milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serialize a `Duration` as integer milliseconds.
    pub fn serialize<S: Serializer>(val: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        val.as_millis().serialize(ser)
    }

    /// Deserialize a `Duration` from integer milliseconds.
    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let ms: u64 = u64::deserialize(de)?;
        Ok(Duration::from_millis(ms))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
