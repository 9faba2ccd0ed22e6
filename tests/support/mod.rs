// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fake transport for the end-to-end suites.
// Not every suite uses every helper.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{Value, json};
use shelly_connect::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Install a test subscriber once so `RUST_LOG=shelly=debug` works under
/// `cargo test -- --nocapture`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory transport: canned responses keyed by method/path, full call
/// recording, optional per-method failures.
#[derive(Default)]
pub struct FakeTransport {
    responses: HashMap<String, Value>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canned raw response for a REST path.
    pub fn respond_raw(mut self, path: &str, body: Value) -> Self {
        self.responses.insert(path.to_string(), body);
        self
    }

    /// Canned RPC result for a method (wrapped in a JSON-RPC envelope).
    pub fn respond_rpc(mut self, method: &str, result: Value) -> Self {
        self.responses.insert(
            method.to_string(),
            json!({"jsonrpc": "2.0", "id": 1, "result": result}),
        );
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<(String, Option<Value>)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|(m, _)| m).collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn call(
        &self,
        _ctx: &CancellationToken,
        method: &str,
        params: Option<Value>,
    ) -> Result<Vec<u8>, Error> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));
        let body = self.responses.get(method).cloned().unwrap_or_else(|| {
            json!({"jsonrpc": "2.0", "id": 1, "result": {}})
        });
        Ok(body.to_string().into_bytes())
    }

    async fn close(&self) {}

    fn is_closed(&self) -> bool {
        false
    }
}

pub fn gen1_device(id: &str, model: &str, transport: Arc<FakeTransport>) -> Device {
    Device::new(
        DeviceInfo::new(id, model, Generation::Gen1, "20230913-114008"),
        transport,
    )
}

pub fn gen2_device(id: &str, model: &str, transport: Arc<FakeTransport>) -> Device {
    Device::new(DeviceInfo::new(id, model, Generation::Gen2, "1.0.8"), transport)
}
