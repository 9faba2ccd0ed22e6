// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed component façades.
//!
//! Thin wrappers over the generation dispatcher. Each façade attaches
//! typed request/response structs for the handful of kinds every consumer
//! touches; the rest of the catalog goes through [`ComponentClient`].

use crate::Device;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shc_core::ComponentRef;
use shc_error::{Error, ErrorKind};
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Generic client
// ---------------------------------------------------------------------------

/// Uniform `{GetConfig, SetConfig, GetStatus, <op>}` surface over any
/// component reference.
pub struct ComponentClient<'a> {
    device: &'a Device,
    component: ComponentRef,
}

impl<'a> ComponentClient<'a> {
    pub(crate) fn new(device: &'a Device, component: ComponentRef) -> Self {
        Self { device, component }
    }

    /// The component this client addresses.
    #[must_use]
    pub fn component(&self) -> &ComponentRef {
        &self.component
    }

    /// Fetch the component's configuration.
    pub async fn get_config(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.call(ctx, "GetConfig", None).await
    }

    /// Mutate the component's configuration.
    ///
    /// `config` holds the flat component settings; the dispatcher gives it
    /// the wire shape each generation expects.
    pub async fn set_config(
        &self,
        ctx: &CancellationToken,
        config: Value,
    ) -> shc_error::Result<Value> {
        self.call(ctx, "SetConfig", Some(config)).await
    }

    /// Fetch the component's status.
    pub async fn get_status(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.call(ctx, "GetStatus", None).await
    }

    /// Invoke an arbitrary catalog operation.
    pub async fn call(
        &self,
        ctx: &CancellationToken,
        op: &str,
        payload: Option<Value>,
    ) -> shc_error::Result<Value> {
        self.device
            .dispatcher()
            .execute(ctx, &self.component, op, payload)
            .await
    }
}

// ---------------------------------------------------------------------------
// Switch
// ---------------------------------------------------------------------------

/// Outcome of a switch set/toggle.
///
/// Gen2+ answers with `was_on`; Gen1 answers with the relay status
/// (`ison`, `has_timer`). Fields the wire did not provide stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchSetResult {
    /// Previous output state (Gen2+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub was_on: Option<bool>,
    /// Current output state (Gen1).
    #[serde(default, rename = "ison", skip_serializing_if = "Option::is_none")]
    pub is_on: Option<bool>,
    /// Whether a timer is armed (Gen1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_timer: Option<bool>,
}

/// Switch status, normalized across generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStatus {
    /// Output state. Gen1 reports this as `ison`.
    #[serde(alias = "ison")]
    pub output: bool,
    /// Instantaneous active power, when metered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apower: Option<f64>,
    /// Everything else the firmware reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Typed façade over one switch instance.
pub struct Switch<'a> {
    client: ComponentClient<'a>,
}

impl<'a> Switch<'a> {
    pub(crate) fn new(device: &'a Device, index: u8) -> Self {
        Self {
            client: ComponentClient::new(device, ComponentRef::indexed("switch", index)),
        }
    }

    /// Set the output on or off.
    pub async fn set(
        &self,
        ctx: &CancellationToken,
        on: bool,
    ) -> shc_error::Result<SwitchSetResult> {
        let value = self.client.call(ctx, "Set", Some(json!({"on": on}))).await?;
        parse_typed(value)
    }

    /// Toggle the output.
    pub async fn toggle(&self, ctx: &CancellationToken) -> shc_error::Result<SwitchSetResult> {
        let value = self.client.call(ctx, "Toggle", None).await?;
        parse_typed(value)
    }

    /// Fetch the switch status.
    pub async fn get_status(&self, ctx: &CancellationToken) -> shc_error::Result<SwitchStatus> {
        let value = self.client.get_status(ctx).await?;
        parse_typed(value)
    }

    /// Fetch the switch configuration (opaque; shape differs per generation).
    pub async fn get_config(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.client.get_config(ctx).await
    }

    /// Mutate the switch configuration.
    pub async fn set_config(
        &self,
        ctx: &CancellationToken,
        config: Value,
    ) -> shc_error::Result<Value> {
        self.client.set_config(ctx, config).await
    }
}

// ---------------------------------------------------------------------------
// Cover
// ---------------------------------------------------------------------------

/// Cover status, normalized across generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverStatus {
    /// Motion state (`open`, `close`, `stop`, `opening`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Current position in percent, when the cover is calibrated.
    #[serde(default, alias = "current_pos", skip_serializing_if = "Option::is_none")]
    pub current_pos: Option<u8>,
    /// Everything else the firmware reports.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Typed façade over one cover/roller instance.
pub struct Cover<'a> {
    client: ComponentClient<'a>,
}

impl<'a> Cover<'a> {
    pub(crate) fn new(device: &'a Device, index: u8) -> Self {
        Self {
            client: ComponentClient::new(device, ComponentRef::indexed("cover", index)),
        }
    }

    /// Start opening.
    pub async fn open(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        self.client.call(ctx, "Open", None).await.map(|_| ())
    }

    /// Start closing.
    pub async fn close(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        self.client.call(ctx, "Close", None).await.map(|_| ())
    }

    /// Stop any movement.
    pub async fn stop(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        self.client.call(ctx, "Stop", None).await.map(|_| ())
    }

    /// Move to a position in percent (0 closed, 100 open).
    pub async fn go_to_position(
        &self,
        ctx: &CancellationToken,
        pos: u8,
    ) -> shc_error::Result<()> {
        if pos > 100 {
            return Err(Error::new(ErrorKind::InvalidArgument, "position must be 0..=100")
                .with_context("pos", pos));
        }
        self.client
            .call(ctx, "GoToPosition", Some(json!({"pos": pos})))
            .await
            .map(|_| ())
    }

    /// Fetch the cover status.
    pub async fn get_status(&self, ctx: &CancellationToken) -> shc_error::Result<CoverStatus> {
        let value = self.client.get_status(ctx).await?;
        parse_typed(value)
    }
}

// ---------------------------------------------------------------------------
// Light
// ---------------------------------------------------------------------------

/// Typed façade over one light instance.
pub struct Light<'a> {
    client: ComponentClient<'a>,
}

impl<'a> Light<'a> {
    pub(crate) fn new(device: &'a Device, index: u8) -> Self {
        Self {
            client: ComponentClient::new(device, ComponentRef::indexed("light", index)),
        }
    }

    /// Set output and optional brightness in one call.
    pub async fn set(
        &self,
        ctx: &CancellationToken,
        on: bool,
        brightness: Option<u8>,
    ) -> shc_error::Result<Value> {
        let mut params = json!({"on": on});
        if let Some(brightness) = brightness {
            if brightness > 100 {
                return Err(Error::new(ErrorKind::InvalidArgument, "brightness must be 0..=100")
                    .with_context("brightness", brightness));
            }
            params["brightness"] = json!(brightness);
        }
        self.client.call(ctx, "Set", Some(params)).await
    }

    /// Toggle the light.
    pub async fn toggle(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.client.call(ctx, "Toggle", None).await
    }

    /// Fetch the light status.
    pub async fn get_status(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.client.get_status(ctx).await
    }
}

// ---------------------------------------------------------------------------
// Sys
// ---------------------------------------------------------------------------

/// Typed façade over the `sys` singleton.
pub struct Sys<'a> {
    client: ComponentClient<'a>,
}

impl<'a> Sys<'a> {
    pub(crate) fn new(device: &'a Device) -> Self {
        Self {
            client: ComponentClient::new(device, ComponentRef::singleton("sys")),
        }
    }

    /// Fetch the system configuration.
    pub async fn get_config(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.client.get_config(ctx).await
    }

    /// Mutate the system configuration.
    pub async fn set_config(
        &self,
        ctx: &CancellationToken,
        config: Value,
    ) -> shc_error::Result<Value> {
        self.client.set_config(ctx, config).await
    }

    /// Fetch the system status.
    pub async fn get_status(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.client.get_status(ctx).await
    }
}

fn parse_typed<T: serde::de::DeserializeOwned>(value: Value) -> shc_error::Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::new(ErrorKind::UnexpectedStatus, "unexpected response shape").with_source(e))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
