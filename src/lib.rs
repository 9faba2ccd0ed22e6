// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shelly Connect: a client library for Shelly smart-home devices.
//!
//! One programmatic surface over four hardware generations and several
//! deployment modes: local HTTP and WebSocket, MQTT, CoAP multicast
//! ingress, and cloud-mediated control. The workspace splits into small
//! crates; this root package re-exports them under stable names.
//!
//! | Module | Crate | What it covers |
//! |---|---|---|
//! | [`error`] | `shc-error` | Unified error taxonomy |
//! | [`rpc`] | `shc-rpc` | JSON-RPC-2.0 codec for Gen2+ |
//! | [`transport`] | `shc-transport` | HTTP / WebSocket / MQTT / CoAP carriers |
//! | [`device`] | `shc-device` | Generation dispatch, device handles, façades |
//! | [`cloud`] | `shc-cloud` | JWT-scoped cloud client and event stream |
//! | [`events`] | `shc-events` | Typed event bus and filters |
//! | [`fleet`] | `shc-fleet` | Bounded-parallel fleet operations |
//! | [`backup`] | `shc-backup` | Versioned, optionally encrypted snapshots |
//! | [`migrate`] | `shc-migrate` | Device-to-device migration |

#![deny(unsafe_code)]

pub use shc_backup as backup;
pub use shc_cloud as cloud;
pub use shc_device as device;
pub use shc_error as error;
pub use shc_events as events;
pub use shc_fleet as fleet;
pub use shc_migrate as migrate;
pub use shc_rpc as rpc;
pub use shc_transport as transport;

pub use shc_core::{
    ComponentRef, DeviceEvent, DeviceInfo, Endpoint, EventKind, Generation, Scheme,
};

/// The types most programs need, in one import.
pub mod prelude {
    pub use crate::backup::{BackupEnvelope, RestoreOptions, SectionSelection};
    pub use crate::cloud::{CloudClient, CloudEventStream, StaticTokenSource, Token, TokenSource};
    pub use crate::device::{Device, probe_device};
    pub use crate::error::{Error, ErrorKind};
    pub use crate::events::{EventBus, EventFilter};
    pub use crate::fleet::{Fleet, FleetConfig};
    pub use crate::migrate::{MigrationOptions, Migrator};
    pub use crate::transport::{
        Credential, HttpConfig, HttpTransport, Transport, WsConfig, WsTransport,
    };
    pub use crate::{ComponentRef, DeviceEvent, DeviceInfo, EventKind, Generation};
    pub use tokio_util::sync::CancellationToken;
}
