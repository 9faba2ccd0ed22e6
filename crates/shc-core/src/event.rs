// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed device events as delivered by the streaming ingresses.

use crate::ComponentRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// EventKind
// ---------------------------------------------------------------------------

/// Kind of an inbound device event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The device came online.
    Online,
    /// The device went offline.
    Offline,
    /// A generic status change (Gen1 and cloud).
    StatusChange,
    /// Gen2+ partial status notification.
    NotifyStatus,
    /// Gen2+ full status notification.
    NotifyFullStatus,
    /// Gen2+ domain event notification.
    NotifyEvent,
}

impl EventKind {
    /// Name of this kind as it appears on the cloud WebSocket wire.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Online => "Shelly:Online",
            Self::Offline => "Shelly:Offline",
            Self::StatusChange => "Shelly:StatusChange",
            Self::NotifyStatus => "NotifyStatus",
            Self::NotifyFullStatus => "NotifyFullStatus",
            Self::NotifyEvent => "NotifyEvent",
        }
    }

    /// Parse a wire event name.
    #[must_use]
    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "Shelly:Online" => Some(Self::Online),
            "Shelly:Offline" => Some(Self::Offline),
            "Shelly:StatusChange" => Some(Self::StatusChange),
            "NotifyStatus" => Some(Self::NotifyStatus),
            "NotifyFullStatus" => Some(Self::NotifyFullStatus),
            "NotifyEvent" => Some(Self::NotifyEvent),
            _ => None,
        }
    }

    /// All kinds, in a fixed order. Handy for exhaustive tests and filters.
    #[must_use]
    pub fn all() -> &'static [EventKind] {
        &[
            Self::Online,
            Self::Offline,
            Self::StatusChange,
            Self::NotifyStatus,
            Self::NotifyFullStatus,
            Self::NotifyEvent,
        ]
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ---------------------------------------------------------------------------
// DeviceEvent
// ---------------------------------------------------------------------------

/// An event received from a device over any streaming ingress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceEvent {
    /// Id of the originating device; `"unknown"` when the ingress could
    /// not extract one (non-JSON CoAP payloads).
    pub device_id: String,
    /// Event kind.
    pub kind: EventKind,
    /// Component the event concerns, when the payload names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<ComponentRef>,
    /// Receive timestamp (UTC).
    pub ts: DateTime<Utc>,
    /// Opaque event payload.
    pub payload: serde_json::Value,
}

impl DeviceEvent {
    /// Create an event stamped with the current time.
    pub fn new(device_id: impl Into<String>, kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            device_id: device_id.into(),
            kind,
            component: None,
            ts: Utc::now(),
            payload,
        }
    }

    /// Attach the component this event concerns.
    #[must_use]
    pub fn with_component(mut self, component: ComponentRef) -> Self {
        self.component = Some(component);
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
