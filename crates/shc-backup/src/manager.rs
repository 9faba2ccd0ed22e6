// SPDX-License-Identifier: MIT OR Apache-2.0
//! Export and restore orchestration.

use crate::envelope::{BackupEnvelope, SectionSelection};
use serde_json::{Value, json};
use shc_core::ComponentRef;
use shc_device::Device;
use shc_error::{Error, ErrorKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Options & report
// ---------------------------------------------------------------------------

/// Restore options.
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Which sections to reconstruct.
    pub sections: SectionSelection,
    /// Validate and return without touching the device.
    pub dry_run: bool,
}

/// Outcome of a restore.
///
/// Restore is best-effort at the item level: failures land in `errors`
/// and the operation continues. It succeeded iff `errors` is empty.
#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    /// Item-level failures, in encounter order.
    pub errors: Vec<String>,
    /// Whether any section asked for a device restart.
    pub restart_required: bool,
}

impl RestoreReport {
    /// `true` iff no item failed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, what: &str, err: &Error) {
        self.errors.push(format!("{what}: {err}"));
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Export device state into a backup envelope.
///
/// Reads device info and base config first, then the requested sections in
/// a fixed order. Sections the device's generation cannot express are
/// skipped; any other fetch failure aborts the export.
pub async fn export(
    ctx: &CancellationToken,
    device: &Device,
    sections: &SectionSelection,
) -> shc_error::Result<BackupEnvelope> {
    info!(target: "shelly.backup", device = %device.id(), "exporting");
    let config = device.full_config(ctx).await?;
    let mut envelope = BackupEnvelope::new(device.info().clone(), config);

    if sections.wifi {
        envelope.wifi = fetch_config(ctx, device, "wifi").await?;
    }
    if sections.cloud {
        envelope.cloud = fetch_config(ctx, device, "cloud").await?;
    }
    if sections.ble {
        envelope.ble = fetch_config(ctx, device, "ble").await?;
    }
    if sections.mqtt {
        envelope.mqtt = fetch_config(ctx, device, "mqtt").await?;
    }
    if sections.webhooks {
        envelope.webhooks = fetch_op(ctx, device, "webhook", "List").await?;
    }
    if sections.schedules {
        envelope.schedules = fetch_op(ctx, device, "schedule", "List").await?;
    }
    if sections.scripts {
        envelope.scripts = export_scripts(ctx, device).await?;
    }
    if sections.kvs {
        envelope.kvs = fetch_op(ctx, device, "kvs", "GetMany").await?;
    }
    if sections.auth {
        envelope.auth = Some(json!({
            "enable": device.info().auth_required.unwrap_or(false),
        }));
    }
    if sections.components {
        envelope.components = fetch_op(ctx, device, "shelly", "GetComponents").await?;
    }

    Ok(envelope)
}

/// Fetch a component config blob; `None` when the generation lacks it.
async fn fetch_config(
    ctx: &CancellationToken,
    device: &Device,
    kind: &str,
) -> shc_error::Result<Option<Value>> {
    fetch_op(ctx, device, kind, "GetConfig").await
}

async fn fetch_op(
    ctx: &CancellationToken,
    device: &Device,
    kind: &str,
    op: &str,
) -> shc_error::Result<Option<Value>> {
    let component = ComponentRef::singleton(kind);
    match device.component(component).call(ctx, op, None).await {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind == ErrorKind::UnsupportedGeneration => {
            debug!(target: "shelly.backup", kind, "section not expressible on this generation");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Scripts need their source alongside the listing.
async fn export_scripts(
    ctx: &CancellationToken,
    device: &Device,
) -> shc_error::Result<Option<Value>> {
    let Some(mut listing) = fetch_op(ctx, device, "script", "List").await? else {
        return Ok(None);
    };
    if let Some(scripts) = listing.get_mut("scripts").and_then(Value::as_array_mut) {
        for script in scripts {
            let Some(id) = script.get("id").cloned() else {
                continue;
            };
            let code = device
                .component(ComponentRef::singleton("script"))
                .call(ctx, "GetCode", Some(json!({"id": id})))
                .await;
            match code {
                Ok(body) => {
                    if let Some(data) = body.get("data").cloned() {
                        script["code"] = data;
                    }
                }
                Err(e) => {
                    warn!(target: "shelly.backup", error = %e, "script code not exported");
                }
            }
        }
    }
    Ok(Some(listing))
}

// ---------------------------------------------------------------------------
// Restore
// ---------------------------------------------------------------------------

/// Restore a backup envelope onto a device.
///
/// Process: version check, dry-run short-circuit, then per-section
/// best-effort reconstruction. Cancellation is observed at every section
/// boundary and always wins over queued item errors.
pub async fn restore(
    ctx: &CancellationToken,
    device: &Device,
    envelope: &BackupEnvelope,
    options: &RestoreOptions,
) -> shc_error::Result<RestoreReport> {
    envelope.check_version()?;

    let mut report = RestoreReport::default();
    if options.dry_run {
        return Ok(report);
    }
    info!(target: "shelly.backup", device = %device.id(), "restoring");

    let sections = &options.sections;
    let config_sections: [(&str, bool, &Option<Value>); 4] = [
        ("wifi", sections.wifi, &envelope.wifi),
        ("cloud", sections.cloud, &envelope.cloud),
        ("ble", sections.ble, &envelope.ble),
        ("mqtt", sections.mqtt, &envelope.mqtt),
    ];
    for (kind, enabled, body) in config_sections {
        check_cancelled(ctx)?;
        if !enabled {
            continue;
        }
        let Some(body) = body else { continue };
        restore_config(ctx, device, kind, body, &mut report).await;
    }

    check_cancelled(ctx)?;
    if sections.webhooks
        && let Some(body) = &envelope.webhooks
    {
        restore_items(ctx, device, "webhook", body, "hooks", &mut report).await;
    }
    check_cancelled(ctx)?;
    if sections.schedules
        && let Some(body) = &envelope.schedules
    {
        restore_items(ctx, device, "schedule", body, "jobs", &mut report).await;
    }
    check_cancelled(ctx)?;
    if sections.scripts
        && let Some(body) = &envelope.scripts
    {
        restore_scripts(ctx, device, body, &mut report).await;
    }
    check_cancelled(ctx)?;
    if sections.kvs
        && let Some(body) = &envelope.kvs
    {
        restore_kvs(ctx, device, body, &mut report).await;
    }

    Ok(report)
}

fn check_cancelled(ctx: &CancellationToken) -> shc_error::Result<()> {
    if ctx.is_cancelled() {
        Err(Error::cancelled())
    } else {
        Ok(())
    }
}

/// Apply one config section; a `restart_required` in the response is
/// accumulated into the report.
async fn restore_config(
    ctx: &CancellationToken,
    device: &Device,
    kind: &str,
    body: &Value,
    report: &mut RestoreReport,
) {
    let client = device.component(ComponentRef::singleton(kind));
    match client.set_config(ctx, body.clone()).await {
        Ok(response) => {
            if response
                .get("restart_required")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                report.restart_required = true;
            }
        }
        Err(e) => report.record(kind, &e),
    }
}

/// The shared item-restore pattern: delete everything, then recreate each
/// item from the section body with its old `id` stripped. Every step is
/// best-effort.
async fn restore_items(
    ctx: &CancellationToken,
    device: &Device,
    kind: &str,
    body: &Value,
    array_key: &str,
    report: &mut RestoreReport,
) {
    let client = device.component(ComponentRef::singleton(kind));
    if let Err(e) = client.call(ctx, "DeleteAll", None).await {
        report.record(&format!("{kind}.DeleteAll"), &e);
    }

    let Some(items) = body.get(array_key).and_then(Value::as_array) else {
        report.record(
            kind,
            &Error::new(ErrorKind::InvalidBackup, "section body lacks its array key")
                .with_context("key", array_key),
        );
        return;
    };

    for item in items {
        let Value::Object(mut fields) = item.clone() else {
            report.record(kind, &Error::new(ErrorKind::InvalidBackup, "item is not an object"));
            continue;
        };
        fields.remove("id");
        if let Err(e) = client.call(ctx, "Create", Some(Value::Object(fields))).await {
            report.record(&format!("{kind}.Create"), &e);
        }
    }
}

/// Scripts restore in three steps per item: create, upload source, apply
/// the enable flag.
async fn restore_scripts(
    ctx: &CancellationToken,
    device: &Device,
    body: &Value,
    report: &mut RestoreReport,
) {
    let client = device.component(ComponentRef::singleton("script"));

    // Delete whatever is there (no DeleteAll for scripts; list then delete).
    match client.call(ctx, "List", None).await {
        Ok(listing) => {
            for existing in listing
                .get("scripts")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                if let Some(id) = existing.get("id").cloned()
                    && let Err(e) = client.call(ctx, "Delete", Some(json!({"id": id}))).await
                {
                    report.record("script.Delete", &e);
                }
            }
        }
        Err(e) => report.record("script.List", &e),
    }

    let Some(scripts) = body.get("scripts").and_then(Value::as_array) else {
        report.record(
            "script",
            &Error::new(ErrorKind::InvalidBackup, "section body lacks its array key")
                .with_context("key", "scripts"),
        );
        return;
    };

    for script in scripts {
        let name = script.get("name").cloned().unwrap_or_else(|| json!("script"));
        let created = match client.call(ctx, "Create", Some(json!({"name": name}))).await {
            Ok(created) => created,
            Err(e) => {
                report.record("script.Create", &e);
                continue;
            }
        };
        let Some(id) = created.get("id").cloned() else {
            report.record(
                "script.Create",
                &Error::new(ErrorKind::UnexpectedStatus, "create response has no id"),
            );
            continue;
        };

        if let Some(code) = script.get("code").and_then(Value::as_str)
            && let Err(e) = client
                .call(ctx, "PutCode", Some(json!({"id": id, "code": code})))
                .await
        {
            report.record("script.PutCode", &e);
        }

        if script.get("enable").and_then(Value::as_bool).unwrap_or(false)
            && let Err(e) = client
                .call(ctx, "SetConfig", Some(json!({"id": id, "config": {"enable": true}})))
                .await
        {
            report.record("script.SetConfig", &e);
        }
    }
}

/// KVS entries restore key by key after a best-effort wipe.
async fn restore_kvs(
    ctx: &CancellationToken,
    device: &Device,
    body: &Value,
    report: &mut RestoreReport,
) {
    let client = device.component(ComponentRef::singleton("kvs"));

    match client.call(ctx, "List", None).await {
        Ok(listing) => {
            if let Some(keys) = listing.get("keys").and_then(Value::as_object) {
                for key in keys.keys() {
                    if let Err(e) = client.call(ctx, "Delete", Some(json!({"key": key}))).await {
                        report.record("kvs.Delete", &e);
                    }
                }
            }
        }
        Err(e) => report.record("kvs.List", &e),
    }

    // The section body carries entries under `items` (GetMany) or `keys`.
    let entries = body
        .get("items")
        .or_else(|| body.get("keys"))
        .and_then(Value::as_object);
    let Some(entries) = entries else {
        report.record(
            "kvs",
            &Error::new(ErrorKind::InvalidBackup, "section body lacks its map key")
                .with_context("key", "items"),
        );
        return;
    };

    for (key, entry) in entries {
        let value = entry.get("value").cloned().unwrap_or_else(|| entry.clone());
        if let Err(e) = client
            .call(ctx, "Set", Some(json!({"key": key, "value": value})))
            .await
        {
            report.record("kvs.Set", &e);
        }
    }
}
