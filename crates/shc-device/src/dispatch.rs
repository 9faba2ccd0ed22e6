// SPDX-License-Identifier: MIT OR Apache-2.0
//! The generation dispatcher: one component/operation model, two wire arms.
//!
//! Gen2+ composes `<Kind>.<Op>` method names and submits JSON-RPC through
//! the transport. Gen1 maps `(kind, op)` onto URL path templates with the
//! payload folded into query parameters, and projects per-component status
//! out of the device's single full-status blob. Operation semantics are
//! identical across the two arms; the differences end here.

use serde_json::{Value, json};
use shc_core::{ComponentRef, Generation};
use shc_error::{Error, ErrorKind};
use shc_transport::Transport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ---------------------------------------------------------------------------
// Gen1 routing tables
// ---------------------------------------------------------------------------

/// Gen1 URL segment and full-status array key per component kind.
///
/// Kinds absent from this table have no Gen1 surface; operations on them
/// fail with `UnsupportedGeneration` before any I/O.
const GEN1_SEGMENTS: &[(&str, &str, &str)] = &[
    // (kind, path segment, status array key)
    ("cover", "roller", "rollers"),
    ("em", "emeter", "emeters"),
    ("input", "input", "inputs"),
    ("light", "light", "lights"),
    ("meter", "meter", "meters"),
    ("switch", "relay", "relays"),
];

fn gen1_segment(kind: &str) -> Option<(&'static str, &'static str)> {
    GEN1_SEGMENTS
        .binary_search_by_key(&kind, |&(k, _, _)| k)
        .ok()
        .map(|idx| (GEN1_SEGMENTS[idx].1, GEN1_SEGMENTS[idx].2))
}

/// One resolved Gen1 call.
#[derive(Debug)]
struct Gen1Route {
    path: String,
    query: Option<Value>,
    /// Project `status_blob[key][index]` out of the response.
    project: Option<(String, u8)>,
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes abstract component operations to the wire dialect of one device.
pub struct Dispatcher {
    generation: Generation,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Build a dispatcher for a device of the given generation.
    pub fn new(generation: Generation, transport: Arc<dyn Transport>) -> Self {
        Self {
            generation,
            transport,
        }
    }

    /// The device generation this dispatcher routes for.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The underlying transport (shared, lifecycle owned by the caller).
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Execute one abstract operation against one component.
    pub async fn execute(
        &self,
        ctx: &CancellationToken,
        component: &ComponentRef,
        op: &str,
        payload: Option<Value>,
    ) -> shc_error::Result<Value> {
        debug!(
            target: "shelly.dispatch",
            component = %component,
            op,
            generation = %self.generation,
            "execute"
        );
        if self.generation.is_rpc() {
            self.execute_rpc(ctx, component, op, payload).await
        } else {
            self.execute_rest(ctx, component, op, payload).await
        }
    }

    /// Fetch the device's full status blob.
    pub async fn full_status(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        if self.generation.is_rpc() {
            let raw = self.transport.call(ctx, "Shelly.GetStatus", None).await?;
            shc_rpc::decode_response(&raw)
        } else {
            let raw = self.transport.call(ctx, "status", None).await?;
            parse_body(&raw)
        }
    }

    /// Fetch the device's full configuration blob.
    pub async fn full_config(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        if self.generation.is_rpc() {
            let raw = self.transport.call(ctx, "Shelly.GetConfig", None).await?;
            shc_rpc::decode_response(&raw)
        } else {
            let raw = self.transport.call(ctx, "settings", None).await?;
            parse_body(&raw)
        }
    }

    /// Reboot the device.
    pub async fn reboot(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        if self.generation.is_rpc() {
            let raw = self.transport.call(ctx, "Shelly.Reboot", None).await?;
            shc_rpc::decode_response(&raw)?;
        } else {
            self.transport.call(ctx, "reboot", None).await?;
        }
        Ok(())
    }

    // -- Gen2+ arm -------------------------------------------------------

    async fn execute_rpc(
        &self,
        ctx: &CancellationToken,
        component: &ComponentRef,
        op: &str,
        payload: Option<Value>,
    ) -> shc_error::Result<Value> {
        let method = shc_rpc::compose_method(&component.kind, op)?;
        // SetConfig carries its settings under a `config` key on the RPC
        // wire; the Gen1 arm folds the same flat payload into the query.
        let payload = match (op, payload) {
            ("SetConfig", Some(config)) => Some(json!({"config": config})),
            (_, payload) => payload,
        };
        let params = merge_component_id(component, payload)?;
        let raw = self.transport.call(ctx, &method, params).await?;
        shc_rpc::decode_response(&raw)
    }

    // -- Gen1 arm --------------------------------------------------------

    async fn execute_rest(
        &self,
        ctx: &CancellationToken,
        component: &ComponentRef,
        op: &str,
        payload: Option<Value>,
    ) -> shc_error::Result<Value> {
        let route = gen1_route(component, op, payload)?;
        let raw = self.transport.call(ctx, &route.path, route.query).await?;
        let body = parse_body(&raw)?;
        match route.project {
            Some((key, index)) => project_status(&body, &key, index),
            None => Ok(body),
        }
    }
}

/// Merge `{id: index}` into the params of an indexed component call.
fn merge_component_id(
    component: &ComponentRef,
    payload: Option<Value>,
) -> shc_error::Result<Option<Value>> {
    let Some(index) = component.index else {
        return Ok(payload);
    };
    match payload {
        None => Ok(Some(json!({"id": index}))),
        Some(Value::Object(mut map)) => {
            map.insert("id".to_string(), json!(index));
            Ok(Some(Value::Object(map)))
        }
        Some(_) => Err(Error::new(
            ErrorKind::InvalidArgument,
            "component params must be a JSON object",
        )
        .with_context("component", component.to_string())),
    }
}

/// Resolve one Gen1 call.
fn gen1_route(component: &ComponentRef, op: &str, payload: Option<Value>) -> shc_error::Result<Gen1Route> {
    // The sys singleton maps onto the top-level status/settings endpoints.
    if component.kind == "sys" {
        let path = match op {
            "GetStatus" => "status",
            "GetConfig" => "settings",
            "SetConfig" => "settings",
            _ => return Err(unsupported(component, op)),
        };
        let query = match op {
            "SetConfig" => payload,
            _ => None,
        };
        return Ok(Gen1Route {
            path: path.to_string(),
            query,
            project: None,
        });
    }

    let Some((segment, status_key)) = gen1_segment(&component.kind) else {
        return Err(unsupported(component, op));
    };
    let index = component.index.unwrap_or(0);

    let route = match op {
        "GetStatus" => Gen1Route {
            path: "status".to_string(),
            query: None,
            project: Some((status_key.to_string(), index)),
        },
        "GetConfig" => Gen1Route {
            path: format!("settings/{segment}/{index}"),
            query: None,
            project: None,
        },
        "SetConfig" => Gen1Route {
            path: format!("settings/{segment}/{index}"),
            query: payload,
            project: None,
        },
        "Set" | "Toggle" => Gen1Route {
            path: format!("{segment}/{index}"),
            query: Some(gen1_switch_query(op, payload)?),
            project: None,
        },
        "Open" | "Close" | "Stop" | "GoToPosition" if component.kind == "cover" => Gen1Route {
            path: format!("{segment}/{index}"),
            query: Some(gen1_roller_query(op, payload)?),
            project: None,
        },
        _ => return Err(unsupported(component, op)),
    };
    Ok(route)
}

/// Translate the abstract switch/light payload to Gen1 query form:
/// `on: bool` becomes `turn=on|off`, `Toggle` becomes `turn=toggle`.
fn gen1_switch_query(op: &str, payload: Option<Value>) -> shc_error::Result<Value> {
    let mut map = match payload {
        None => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "component params must be a JSON object",
            ));
        }
    };
    if op == "Toggle" {
        map.insert("turn".to_string(), json!("toggle"));
    } else if let Some(on) = map.remove("on") {
        let turn = match on {
            Value::Bool(true) => "on",
            Value::Bool(false) => "off",
            _ => {
                return Err(Error::new(ErrorKind::InvalidArgument, "'on' must be a boolean"));
            }
        };
        map.insert("turn".to_string(), json!(turn));
    }
    Ok(Value::Object(map))
}

/// Translate the abstract cover payload to Gen1 roller query form.
fn gen1_roller_query(op: &str, payload: Option<Value>) -> shc_error::Result<Value> {
    let mut map = match payload {
        None => serde_json::Map::new(),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(Error::new(
                ErrorKind::InvalidArgument,
                "component params must be a JSON object",
            ));
        }
    };
    let go = match op {
        "Open" => "open",
        "Close" => "close",
        "Stop" => "stop",
        "GoToPosition" => {
            if let Some(pos) = map.remove("pos") {
                map.insert("roller_pos".to_string(), pos);
            }
            "to_pos"
        }
        _ => unreachable!("caller matched the op"),
    };
    map.insert("go".to_string(), json!(go));
    Ok(Value::Object(map))
}

fn unsupported(component: &ComponentRef, op: &str) -> Error {
    Error::new(
        ErrorKind::UnsupportedGeneration,
        "operation is not defined for this device generation",
    )
    .with_context("component", component.to_string())
    .with_context("op", op)
}

fn parse_body(raw: &[u8]) -> shc_error::Result<Value> {
    serde_json::from_slice(raw).map_err(|e| {
        Error::new(ErrorKind::UnexpectedStatus, "response body is not JSON").with_source(e)
    })
}

/// Pull one component's entry out of a Gen1 full-status blob.
fn project_status(status: &Value, key: &str, index: u8) -> shc_error::Result<Value> {
    match status.get(key).and_then(|arr| arr.get(index as usize)) {
        Some(entry) => Ok(entry.clone()),
        // Unknown layout: hand back the whole blob rather than invent shape.
        None if status.get(key).is_none() => Ok(status.clone()),
        None => Err(Error::new(ErrorKind::InvalidArgument, "component index out of range")
            .with_context("key", key)
            .with_context("index", index)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
