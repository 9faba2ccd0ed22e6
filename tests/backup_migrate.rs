// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end: encrypted backup round-trips and migration guard rails.

mod support;

use serde_json::json;
use shelly_connect::backup::{self, EncryptedBackup, SectionSelection};
use shelly_connect::migrate::MigrationOptions;
use shelly_connect::prelude::*;
use std::sync::Arc;
use support::{FakeTransport, gen2_device};

fn exportable_transport() -> Arc<FakeTransport> {
    FakeTransport::new()
        .respond_rpc("Shelly.GetConfig", json!({"sys": {"device": {"name": "garage"}}}))
        .respond_rpc("WiFi.GetConfig", json!({"sta": {"ssid": "home", "enable": true}}))
        .respond_rpc("Cloud.GetConfig", json!({"enable": true}))
        .respond_rpc("BLE.GetConfig", json!({"enable": false}))
        .respond_rpc("MQTT.GetConfig", json!({"enable": false}))
        .respond_rpc("Webhook.List", json!({"hooks": []}))
        .respond_rpc("Schedule.List", json!({"jobs": [{"id": 1, "timespec": "@sunset"}]}))
        .respond_rpc("Script.List", json!({"scripts": []}))
        .respond_rpc("KVS.GetMany", json!({"items": {}}))
        .respond_rpc("Shelly.GetComponents", json!({"components": []}))
        .into_arc()
}

// ---------------------------------------------------------------------------
// 1. Export → encrypt(p1) → decrypt(p1) → dry-run restore succeeds
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encrypted_backup_roundtrip_and_dry_run_restore() {
    support::init_tracing();
    let ctx = CancellationToken::new();
    let source = gen2_device("shellyplus1-src", "SNSW-001X16EU", exportable_transport());

    let envelope = backup::export(&ctx, &source, &SectionSelection::default())
        .await
        .unwrap();
    let encrypted = backup::encrypt_envelope(&envelope, "p1").unwrap();
    let serialized = encrypted.to_json().unwrap();

    // Decrypt with the right password and dry-run restore on a compatible
    // fake device.
    let parsed = EncryptedBackup::parse(serialized.as_bytes()).unwrap();
    let decrypted = backup::decrypt_envelope(&parsed, "p1").unwrap();
    assert_eq!(decrypted, envelope);

    let target_transport = FakeTransport::new().into_arc();
    let target = gen2_device("shellyplus1-dst", "SNSW-001X16EU", target_transport.clone());
    let report = backup::restore(
        &ctx,
        &target,
        &decrypted,
        &RestoreOptions {
            dry_run: true,
            ..RestoreOptions::default()
        },
    )
    .await
    .unwrap();
    assert!(report.success());
    assert!(report.errors.is_empty());
    assert!(target_transport.calls().is_empty(), "dry-run must not touch the device");
}

// ---------------------------------------------------------------------------
// 2. Wrong password yields DecryptionFailed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn wrong_password_is_decryption_failed() {
    let ctx = CancellationToken::new();
    let source = gen2_device("shellyplus1-src", "SNSW-001X16EU", exportable_transport());

    let envelope = backup::export(&ctx, &source, &SectionSelection::default())
        .await
        .unwrap();
    let encrypted = backup::encrypt_envelope(&envelope, "p1").unwrap();

    let err = backup::decrypt_envelope(&encrypted, "p2").unwrap_err();
    assert_eq!(err.kind, ErrorKind::DecryptionFailed);
}

// ---------------------------------------------------------------------------
// 3. Incompatible migration never mutates the target
// ---------------------------------------------------------------------------

#[tokio::test]
async fn incompatible_migration_does_not_touch_target() {
    let target_transport = FakeTransport::new().into_arc();
    let migrator = Migrator::new(
        Arc::new(gen2_device("src", "M1", exportable_transport())),
        Arc::new(gen2_device("dst", "M2", target_transport.clone())),
    );

    let err = migrator
        .migrate(&CancellationToken::new(), &MigrationOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::IncompatibleDevices);

    for method in target_transport.methods() {
        assert!(
            !method.contains("SetConfig") && !method.contains("Create"),
            "target was mutated via {method}"
        );
    }
}

// ---------------------------------------------------------------------------
// 4. Compatible migration carries sections but not wifi or auth
// ---------------------------------------------------------------------------

#[tokio::test]
async fn migration_excludes_wifi_and_auth_by_default() {
    let source_transport = exportable_transport();
    let target_transport = FakeTransport::new()
        .respond_rpc("Script.Create", json!({"id": 1}))
        .into_arc();
    let migrator = Migrator::new(
        Arc::new(gen2_device("src", "M1", source_transport.clone())),
        Arc::new(gen2_device("dst", "M1", target_transport.clone())),
    );

    let report = migrator
        .migrate(&CancellationToken::new(), &MigrationOptions::default())
        .await
        .unwrap();
    assert!(report.restore.success(), "errors: {:?}", report.restore.errors);

    // WiFi was neither exported nor restored.
    assert!(!source_transport.methods().contains(&"WiFi.GetConfig".to_string()));
    assert!(!target_transport.methods().contains(&"WiFi.SetConfig".to_string()));
    // Schedules made it across.
    assert!(target_transport.methods().contains(&"Schedule.Create".to_string()));
}
