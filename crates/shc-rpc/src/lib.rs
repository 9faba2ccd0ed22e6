// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use shc_core::rpc_type_name;
use shc_error::{Error, ErrorKind};
use std::sync::atomic::{AtomicU32, Ordering};

/// The only JSON-RPC version this codec speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Correlation ids wrap back to 1 after this value.
const ID_WRAP: u32 = 1 << 31;

// ---------------------------------------------------------------------------
// Request envelope
// ---------------------------------------------------------------------------

/// An outbound JSON-RPC-2.0 request.
///
/// `params` is omitted from the wire entirely when `None`; some firmware
/// rejects an explicit `"params": null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: String,
    /// Correlation id, monotonic per client.
    pub id: u32,
    /// Method name, e.g. `Switch.Toggle`.
    pub method: String,
    /// Method parameters, omitted when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RpcRequest {
    /// Build a request envelope.
    pub fn new(id: u32, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Serialize to the wire form.
    pub fn encode(&self) -> shc_error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Error::new(ErrorKind::InvalidArgument, "request not serializable")
                .with_context("method", &self.method)
                .with_source(e)
        })
    }
}

// ---------------------------------------------------------------------------
// Response / notification frames
// ---------------------------------------------------------------------------

/// Error object embedded in a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("rpc error {code}: {message}")]
pub struct RpcErrorObject {
    /// Device-assigned error code.
    pub code: i32,
    /// Human-readable message from the device.
    pub message: String,
    /// Optional structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<RpcErrorObject> for Error {
    fn from(obj: RpcErrorObject) -> Self {
        let mut err = Error::new(ErrorKind::RpcError, obj.message.clone())
            .with_context("code", obj.code);
        if let Some(data) = obj.data {
            err = err.with_context("data", data);
        }
        err
    }
}

/// A raw inbound JSON-RPC frame.
///
/// Over WebSocket a frame is either a response to an in-flight request
/// (non-null `id`) or a server-initiated notification (`id` null or
/// absent, top-level `method`/`params`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcFrame {
    /// Version tag; anything but `"2.0"` is rejected.
    #[serde(default)]
    pub jsonrpc: Option<String>,
    /// Correlation id of the request this frame answers, if any.
    #[serde(default)]
    pub id: Option<u32>,
    /// Notification method, present on server-initiated frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Notification params.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    /// Success payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcFrame {
    /// Parse a frame from raw bytes.
    pub fn decode(bytes: &[u8]) -> shc_error::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            Error::new(ErrorKind::RpcError, "frame is not valid JSON").with_source(e)
        })
    }

    /// `true` when this frame is a server-initiated notification.
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.method.is_some()
    }

    /// Resolve this frame into its `result` payload.
    ///
    /// Disambiguation order: reject a non-`"2.0"` version tag, then
    /// surface an `error` object, then hand back `result`.
    pub fn into_result(self) -> shc_error::Result<serde_json::Value> {
        match self.jsonrpc.as_deref() {
            Some(JSONRPC_VERSION) => {}
            other => {
                return Err(
                    Error::new(ErrorKind::RpcError, "unsupported jsonrpc version")
                        .with_context("jsonrpc", other),
                );
            }
        }
        if let Some(err) = self.error {
            return Err(err.into());
        }
        Ok(self.result.unwrap_or(serde_json::Value::Null))
    }
}

/// Decode raw response bytes straight to the `result` payload.
pub fn decode_response(bytes: &[u8]) -> shc_error::Result<serde_json::Value> {
    RpcFrame::decode(bytes)?.into_result()
}

// ---------------------------------------------------------------------------
// Method composition
// ---------------------------------------------------------------------------

/// Compose a wire method name from a component kind and operation.
///
/// The kind goes through the exact capitalization table; unknown kinds
/// fail here, at encode time, rather than producing a mis-capitalized
/// method name the device would reject opaquely.
pub fn compose_method(kind: &str, op: &str) -> shc_error::Result<String> {
    let type_name = rpc_type_name(kind).ok_or_else(|| {
        Error::new(ErrorKind::InvalidArgument, "unknown component kind")
            .with_context("kind", kind)
    })?;
    Ok(format!("{type_name}.{op}"))
}

// ---------------------------------------------------------------------------
// Correlation ids
// ---------------------------------------------------------------------------

/// Monotonic correlation-id source, shared per transport.
///
/// Ids start at 1 and wrap back to 1 at 2^31 so they always fit a
/// non-negative 32-bit integer on the wire.
#[derive(Debug, Default)]
pub struct IdSequence {
    next: AtomicU32,
}

impl IdSequence {
    /// New sequence starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
        }
    }

    /// Produce the next id.
    pub fn next_id(&self) -> u32 {
        let raw = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(if n + 1 >= ID_WRAP { 1 } else { n + 1 })
            })
            .unwrap_or(1);
        if raw + 1 >= ID_WRAP { 1 } else { raw + 1 }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- Encoding -------------------------------------------------------

    #[test]
    fn request_with_params() {
        let req = RpcRequest::new(7, "Switch.Toggle", Some(json!({"id": 0})));
        let wire: serde_json::Value =
            serde_json::from_slice(&req.encode().unwrap()).unwrap();
        assert_eq!(wire["jsonrpc"], "2.0");
        assert_eq!(wire["id"], 7);
        assert_eq!(wire["method"], "Switch.Toggle");
        assert_eq!(wire["params"], json!({"id": 0}));
    }

    #[test]
    fn empty_params_field_is_absent() {
        let req = RpcRequest::new(1, "Shelly.GetDeviceInfo", None);
        let text = String::from_utf8(req.encode().unwrap()).unwrap();
        assert!(!text.contains("params"), "params must be omitted: {text}");
    }

    #[test]
    fn encode_decode_reproduces_request() {
        let req = RpcRequest::new(42, "Cover.GoToPosition", Some(json!({"id": 1, "pos": 50})));
        let back: RpcRequest = serde_json::from_slice(&req.encode().unwrap()).unwrap();
        assert_eq!(back, req);
    }

    // -- Decoding -------------------------------------------------------

    #[test]
    fn success_result_unwrapped() {
        let raw = br#"{"jsonrpc":"2.0","id":1,"result":{"was_on":false}}"#;
        let result = decode_response(raw).unwrap();
        assert_eq!(result, json!({"was_on": false}));
    }

    #[test]
    fn error_object_surfaced() {
        let raw = br#"{"jsonrpc":"2.0","id":3,"error":{"code":-103,"message":"Invalid argument"}}"#;
        let err = decode_response(raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RpcError);
        assert_eq!(err.context["code"], json!(-103));
        assert!(err.message.contains("Invalid argument"));
    }

    #[test]
    fn wrong_version_rejected() {
        let raw = br#"{"jsonrpc":"1.0","id":1,"result":{}}"#;
        let err = decode_response(raw).unwrap_err();
        assert_eq!(err.kind, ErrorKind::RpcError);
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn missing_version_rejected() {
        let raw = br#"{"id":1,"result":{}}"#;
        assert!(decode_response(raw).is_err());
    }

    #[test]
    fn garbage_is_a_typed_error() {
        let err = decode_response(b"not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::RpcError);
    }

    #[test]
    fn notification_frame_detected() {
        let raw = br#"{"jsonrpc":"2.0","id":null,"method":"NotifyStatus","params":{"ts":1}}"#;
        let frame = RpcFrame::decode(raw).unwrap();
        assert!(frame.is_notification());
        assert_eq!(frame.method.as_deref(), Some("NotifyStatus"));
    }

    #[test]
    fn response_frame_is_not_notification() {
        let raw = br#"{"jsonrpc":"2.0","id":5,"result":{}}"#;
        let frame = RpcFrame::decode(raw).unwrap();
        assert!(!frame.is_notification());
        assert_eq!(frame.id, Some(5));
    }

    #[test]
    fn null_result_yields_json_null() {
        let raw = br#"{"jsonrpc":"2.0","id":5}"#;
        let result = RpcFrame::decode(raw).unwrap().into_result().unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    // -- Method composition ---------------------------------------------

    #[test]
    fn method_names_use_exact_capitalization() {
        assert_eq!(compose_method("switch", "GetStatus").unwrap(), "Switch.GetStatus");
        assert_eq!(compose_method("emdata", "GetStatus").unwrap(), "EMData.GetStatus");
        assert_eq!(compose_method("em1data", "GetStatus").unwrap(), "EM1Data.GetStatus");
        assert_eq!(compose_method("wifi", "SetConfig").unwrap(), "WiFi.SetConfig");
        assert_eq!(compose_method("kvs", "List").unwrap(), "KVS.List");
    }

    #[test]
    fn unknown_kind_fails_at_encode_time() {
        let err = compose_method("emdata2", "GetStatus").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert_eq!(err.context["kind"], json!("emdata2"));
    }

    // -- Id sequence ----------------------------------------------------

    #[test]
    fn ids_are_monotonic_from_one() {
        let seq = IdSequence::new();
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
        assert_eq!(seq.next_id(), 3);
    }

    #[test]
    fn ids_wrap_at_two_pow_31() {
        let seq = IdSequence::new();
        seq.next.store(ID_WRAP - 2, Ordering::SeqCst);
        assert_eq!(seq.next_id(), ID_WRAP - 1);
        assert_eq!(seq.next_id(), 1);
        assert_eq!(seq.next_id(), 2);
    }

    #[test]
    fn ids_unique_across_threads() {
        use std::collections::HashSet;
        use std::sync::Arc;
        let seq = Arc::new(IdSequence::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let seq = Arc::clone(&seq);
            handles.push(std::thread::spawn(move || {
                (0..250).map(|_| seq.next_id()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    // -- Property tests -------------------------------------------------

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn encode_decode_roundtrip(id in 1u32..(1 << 31), key in "[a-z]{1,8}", val in any::<i64>()) {
                let req = RpcRequest::new(id, "Switch.Set", Some(json!({ key.clone(): val })));
                let back: RpcRequest = serde_json::from_slice(&req.encode().unwrap()).unwrap();
                prop_assert_eq!(back, req);
            }

            #[test]
            fn error_codes_always_surface(code in -32768i32..0, msg in "[ -~]{0,40}") {
                let raw = serde_json::to_vec(&json!({
                    "jsonrpc": "2.0", "id": 1,
                    "error": {"code": code, "message": msg.clone()},
                })).unwrap();
                let err = decode_response(&raw).unwrap_err();
                prop_assert_eq!(err.kind, ErrorKind::RpcError);
                prop_assert_eq!(&err.context["code"], &json!(code));
            }
        }
    }
}
