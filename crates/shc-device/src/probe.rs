// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device identification via the unauthenticated `/shelly` endpoint.
//!
//! Every generation answers `GET /shelly` without credentials. Gen2+
//! reports its generation explicitly; a response without a `gen` field is
//! a Gen1 device, whose identity is assembled from `type` and `mac`.

use serde::Deserialize;
use shc_core::{DeviceInfo, Generation};
use shc_error::{Error, ErrorKind};
use shc_transport::HttpTransport;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ProbeResponse {
    // Gen2+ fields
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    r#gen: Option<u8>,
    #[serde(default)]
    ver: Option<String>,
    #[serde(default)]
    auth_en: Option<bool>,
    // Gen1 fields
    #[serde(default, rename = "type")]
    device_type: Option<String>,
    #[serde(default)]
    mac: Option<String>,
    #[serde(default)]
    fw: Option<String>,
    #[serde(default)]
    auth: Option<bool>,
}

/// Probe a device and build its identity snapshot.
pub async fn probe_device(
    ctx: &CancellationToken,
    transport: &HttpTransport,
) -> shc_error::Result<DeviceInfo> {
    let raw = transport.get_raw(ctx, "shelly").await?;
    let probe: ProbeResponse = serde_json::from_slice(&raw).map_err(|e| {
        Error::new(ErrorKind::UnexpectedStatus, "probe response is not JSON").with_source(e)
    })?;

    let info = match probe.r#gen {
        Some(r#gen) => {
            let generation = Generation::try_from(r#gen)
                .map_err(|e| Error::new(ErrorKind::UnexpectedStatus, e))?;
            let mut info = DeviceInfo::new(
                required(probe.id, "id")?,
                required(probe.model, "model")?,
                generation,
                probe.ver.unwrap_or_default(),
            );
            info.auth_required = probe.auth_en;
            info
        }
        None => {
            let device_type = required(probe.device_type, "type")?;
            let mac = required(probe.mac, "mac")?;
            let id = format!(
                "{}-{}",
                device_type.to_ascii_lowercase(),
                mac.to_ascii_lowercase()
            );
            let mut info = DeviceInfo::new(id, device_type, Generation::Gen1, probe.fw.unwrap_or_default());
            info.auth_required = probe.auth;
            info
        }
    };

    debug!(
        target: "shelly.device",
        id = %info.id,
        generation = %info.generation,
        "probed device"
    );
    Ok(info)
}

fn required(field: Option<String>, name: &str) -> shc_error::Result<String> {
    field.ok_or_else(|| {
        Error::new(ErrorKind::UnexpectedStatus, "probe response is missing a field")
            .with_context("field", name)
    })
}
