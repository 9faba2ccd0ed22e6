// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod components;
mod dispatch;
mod probe;

pub use components::{
    ComponentClient, Cover, CoverStatus, Light, Switch, SwitchSetResult, SwitchStatus, Sys,
};
pub use dispatch::Dispatcher;
pub use probe::probe_device;

use serde_json::Value;
use shc_core::{ComponentRef, DeviceInfo, Generation};
use shc_transport::Transport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// Handle to one device, binding an identity snapshot to a shared
/// transport.
///
/// The handle references the transport but does not own its lifecycle;
/// the caller closes the transport explicitly. Generation is immutable for
/// the lifetime of the handle.
pub struct Device {
    info: DeviceInfo,
    dispatcher: Dispatcher,
}

impl Device {
    /// Bind a device identity to a transport.
    pub fn new(info: DeviceInfo, transport: Arc<dyn Transport>) -> Self {
        let dispatcher = Dispatcher::new(info.generation, transport);
        Self { info, dispatcher }
    }

    /// The device's stable id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// The identity snapshot this handle was built with.
    #[must_use]
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// The device's protocol generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.info.generation
    }

    /// The generation dispatcher (for consumers building on the generic
    /// operation surface).
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Generic client for any component reference.
    #[must_use]
    pub fn component(&self, component: ComponentRef) -> ComponentClient<'_> {
        ComponentClient::new(self, component)
    }

    /// Typed façade for one switch instance.
    #[must_use]
    pub fn switch(&self, index: u8) -> Switch<'_> {
        Switch::new(self, index)
    }

    /// Typed façade for one cover instance.
    #[must_use]
    pub fn cover(&self, index: u8) -> Cover<'_> {
        Cover::new(self, index)
    }

    /// Typed façade for one light instance.
    #[must_use]
    pub fn light(&self, index: u8) -> Light<'_> {
        Light::new(self, index)
    }

    /// Typed façade for the `sys` singleton.
    #[must_use]
    pub fn sys(&self) -> Sys<'_> {
        Sys::new(self)
    }

    /// The device's full status blob (Gen1 `status`, Gen2+ `Shelly.GetStatus`).
    pub async fn full_status(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.dispatcher.full_status(ctx).await
    }

    /// The device's full configuration blob (Gen1 `settings`, Gen2+
    /// `Shelly.GetConfig`).
    pub async fn full_config(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.dispatcher.full_config(ctx).await
    }

    /// Reboot the device.
    pub async fn reboot(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        self.dispatcher.reboot(ctx).await
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.info.id)
            .field("model", &self.info.model)
            .field("generation", &self.info.generation)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
