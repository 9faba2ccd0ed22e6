// SPDX-License-Identifier: MIT OR Apache-2.0
//! Component references and the wire-name capitalization table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exact RPC capitalizations per component kind.
///
/// The wire expects names like `Switch.GetStatus` or `EMData.GetStatus`
/// with specific capitalizations that no general CamelCase rule produces.
/// Kinds missing from this table must fail at encode time rather than go
/// out mis-capitalized.
const RPC_TYPE_NAMES: &[(&str, &str)] = &[
    ("ble", "BLE"),
    ("cloud", "Cloud"),
    ("cover", "Cover"),
    ("devicepower", "DevicePower"),
    ("em", "EM"),
    ("em1", "EM1"),
    ("em1data", "EM1Data"),
    ("emdata", "EMData"),
    ("eth", "Eth"),
    ("humidity", "Humidity"),
    ("input", "Input"),
    ("kvs", "KVS"),
    ("light", "Light"),
    ("meter", "Meter"),
    ("mqtt", "MQTT"),
    ("schedule", "Schedule"),
    ("script", "Script"),
    ("sensor", "Sensor"),
    ("shelly", "Shelly"),
    ("smoke", "Smoke"),
    ("switch", "Switch"),
    ("sys", "Sys"),
    ("temperature", "Temperature"),
    ("voltmeter", "Voltmeter"),
    ("webhook", "Webhook"),
    ("wifi", "WiFi"),
    ("ws", "WS"),
];

/// Look up the exact wire capitalization for a component kind.
///
/// Returns `None` for unknown kinds; callers are expected to surface that
/// as an encode-time error, never to guess a name.
#[must_use]
pub fn rpc_type_name(kind: &str) -> Option<&'static str> {
    RPC_TYPE_NAMES
        .binary_search_by_key(&kind, |&(k, _)| k)
        .ok()
        .map(|idx| RPC_TYPE_NAMES[idx].1)
}

// ---------------------------------------------------------------------------
// ComponentRef
// ---------------------------------------------------------------------------

/// Names one instance of a device component, e.g. `(switch, 0)`.
///
/// The kind catalog is data: this type carries any string and the
/// protocol layers decide whether they can encode it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ComponentRef {
    /// Component kind from the device catalog (`switch`, `cover`, `emdata`, ...).
    pub kind: String,
    /// Instance index for multi-instance kinds; `None` for singletons
    /// such as `sys` or `wifi`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u8>,
}

impl ComponentRef {
    /// Reference an indexed component instance.
    pub fn indexed(kind: impl Into<String>, index: u8) -> Self {
        Self {
            kind: kind.into(),
            index: Some(index),
        }
    }

    /// Reference a singleton component.
    pub fn singleton(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            index: None,
        }
    }

    /// The exact RPC capitalization for this component's kind, if known.
    #[must_use]
    pub fn rpc_type(&self) -> Option<&'static str> {
        rpc_type_name(&self.kind)
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(idx) => write!(f, "{}:{idx}", self.kind),
            None => f.write_str(&self.kind),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
