// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end: one component/operation model over both wire dialects.

mod support;

use serde_json::json;
use shelly_connect::prelude::*;
use support::{FakeTransport, gen1_device, gen2_device};

// ---------------------------------------------------------------------------
// 1. Gen2 switch toggle round-trip
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gen2_switch_toggle_roundtrip() {
    support::init_tracing();
    let transport = FakeTransport::new()
        .respond_rpc("Switch.Toggle", json!({"was_on": false}))
        .into_arc();
    let device = gen2_device("shellyplus1-a8032ab12345", "SNSW-001X16EU", transport.clone());

    let result = device.switch(0).toggle(&CancellationToken::new()).await.unwrap();
    assert_eq!(result.was_on, Some(false));

    let calls = transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "Switch.Toggle");
    assert_eq!(calls[0].1, Some(json!({"id": 0})));
}

// ---------------------------------------------------------------------------
// 2. Gen1 relay set
// ---------------------------------------------------------------------------

#[tokio::test]
async fn gen1_relay_set_roundtrip() {
    let transport = FakeTransport::new()
        .respond_raw("relay/0", json!({"ison": true, "has_timer": false}))
        .into_arc();
    let device = gen1_device("shelly1-a4cf12f45678", "SHSW-1", transport.clone());

    let status = device.switch(0).set(&CancellationToken::new(), true).await.unwrap();
    assert_eq!(status.is_on, Some(true));
    assert_eq!(status.has_timer, Some(false));

    let calls = transport.calls();
    assert_eq!(calls[0].0, "relay/0");
    assert_eq!(calls[0].1, Some(json!({"turn": "on"})));
}

// ---------------------------------------------------------------------------
// 3. The same abstract call works on both generations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn switch_status_is_uniform_across_generations() {
    let ctx = CancellationToken::new();

    let gen2 = FakeTransport::new()
        .respond_rpc("Switch.GetStatus", json!({"id": 0, "output": true, "apower": 12.0}))
        .into_arc();
    let status2 = gen2_device("p1", "SNSW-001X16EU", gen2.clone())
        .switch(0)
        .get_status(&ctx)
        .await
        .unwrap();

    let gen1 = FakeTransport::new()
        .respond_raw(
            "status",
            json!({"relays": [{"ison": true, "has_timer": false}]}),
        )
        .into_arc();
    let status1 = gen1_device("s1", "SHSW-1", gen1.clone())
        .switch(0)
        .get_status(&ctx)
        .await
        .unwrap();

    // Different wire shapes, identical abstract answer.
    assert!(status2.output);
    assert!(status1.output);
    assert_eq!(gen2.calls()[0].0, "Switch.GetStatus");
    assert_eq!(gen1.calls()[0].0, "status");
}

// ---------------------------------------------------------------------------
// 4. Cover semantics across generations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cover_go_to_position_translates_per_generation() {
    let ctx = CancellationToken::new();

    let gen2 = FakeTransport::new().into_arc();
    gen2_device("p2", "SNSW-102P16EU", gen2.clone())
        .cover(0)
        .go_to_position(&ctx, 50)
        .await
        .unwrap();
    assert_eq!(gen2.calls()[0].0, "Cover.GoToPosition");
    assert_eq!(gen2.calls()[0].1, Some(json!({"id": 0, "pos": 50})));

    let gen1 = FakeTransport::new().into_arc();
    gen1_device("s2", "SHSW-25", gen1.clone())
        .cover(0)
        .go_to_position(&ctx, 50)
        .await
        .unwrap();
    assert_eq!(gen1.calls()[0].0, "roller/0");
    assert_eq!(gen1.calls()[0].1, Some(json!({"go": "to_pos", "roller_pos": 50})));
}

// ---------------------------------------------------------------------------
// 5. Encode-time failures never reach the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_component_kind_fails_before_io() {
    let transport = FakeTransport::new().into_arc();
    let device = gen2_device("p3", "SNSW-001X16EU", transport.clone());

    let err = device
        .component(ComponentRef::indexed("emdata2", 0))
        .get_status(&CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidArgument);
    assert!(transport.calls().is_empty(), "nothing may reach the wire");
}

#[tokio::test]
async fn gen1_rejects_rpc_only_components_before_io() {
    let transport = FakeTransport::new().into_arc();
    let device = gen1_device("s3", "SHSW-1", transport.clone());

    let err = device
        .component(ComponentRef::singleton("kvs"))
        .call(&CancellationToken::new(), "GetMany", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnsupportedGeneration);
    assert!(transport.calls().is_empty());
}

// ---------------------------------------------------------------------------
// 6. Device-reported errors carry the typed taxonomy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rpc_error_objects_become_typed_errors() {
    let transport = FakeTransport::new()
        .respond_raw(
            "Switch.Set",
            json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -103, "message": "Invalid argument 'on'!"},
            }),
        )
        .into_arc();
    let device = gen2_device("p4", "SNSW-001X16EU", transport);

    let err = device.switch(0).set(&CancellationToken::new(), true).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RpcError);
    assert_eq!(err.context["code"], json!(-103));
    assert!(err.message.contains("Invalid argument"));
}
