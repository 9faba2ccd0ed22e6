// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use shc_backup::{RestoreOptions, RestoreReport, SectionSelection};
use shc_device::Device;
use shc_error::{Error, ErrorKind};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Options, progress, reports
// ---------------------------------------------------------------------------

/// Migration options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Allow source and target models to differ.
    pub allow_different_models: bool,
    /// Allow source and target generations to differ.
    pub allow_different_generations: bool,
    /// Carry WiFi configuration across. Off by default so the target keeps
    /// its own network identity.
    pub include_wifi: bool,
}

/// Progress callback: `(fraction, step name)`. Invoked at fixed milestones.
pub type ProgressFn = dyn Fn(f64, &str) + Send + Sync;

/// Outcome of compatibility validation. Validation never mutates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `true` iff migration may proceed.
    pub valid: bool,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
    /// Fatal incompatibilities.
    pub errors: Vec<String>,
}

/// Outcome of a completed migration.
#[derive(Debug)]
pub struct MigrationReport {
    /// The restore outcome on the target.
    pub restore: RestoreReport,
    /// Whether the target was rebooted.
    pub rebooted: bool,
}

// ---------------------------------------------------------------------------
// Migrator
// ---------------------------------------------------------------------------

/// Connects a source and a target device for one-way configuration
/// transfer.
pub struct Migrator {
    source: Arc<Device>,
    target: Arc<Device>,
    in_progress: Mutex<bool>,
    progress: Option<Box<ProgressFn>>,
}

impl Migrator {
    /// Pair a source and a target.
    #[must_use]
    pub fn new(source: Arc<Device>, target: Arc<Device>) -> Self {
        Self {
            source,
            target,
            in_progress: Mutex::new(false),
            progress: None,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress<F>(mut self, progress: F) -> Self
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(progress));
        self
    }

    fn report(&self, fraction: f64, step: &str) {
        info!(target: "shelly.migrate", fraction, step, "progress");
        if let Some(progress) = &self.progress {
            progress(fraction, step);
        }
    }

    /// Check whether the pair is compatible. Never mutates either device.
    pub async fn validate(
        &self,
        ctx: &CancellationToken,
        options: &MigrationOptions,
    ) -> shc_error::Result<ValidationReport> {
        let mut report = ValidationReport::default();

        // Reachability, source first.
        if let Err(e) = self.source.full_status(ctx).await {
            if e.is_cancelled() {
                return Err(e);
            }
            report.errors.push(format!("source unreachable: {e}"));
        }
        if let Err(e) = self.target.full_status(ctx).await {
            if e.is_cancelled() {
                return Err(e);
            }
            report.errors.push(format!("target unreachable: {e}"));
        }

        let source = self.source.info();
        let target = self.target.info();
        if source.model != target.model {
            let detail = format!("model mismatch: {} vs {}", source.model, target.model);
            if options.allow_different_models {
                report.warnings.push(detail);
            } else {
                report.errors.push(detail);
            }
        }
        if source.generation != target.generation {
            let detail = format!(
                "generation mismatch: {} vs {}",
                source.generation, target.generation
            );
            if options.allow_different_generations {
                report.warnings.push(detail);
            } else {
                report.errors.push(detail);
            }
        }

        report.valid = report.errors.is_empty();
        Ok(report)
    }

    /// Run the migration: validate, export from the source, restore on the
    /// target, reboot the target when required.
    ///
    /// A second call while one is running fails with `MigrationInProgress`.
    pub async fn migrate(
        &self,
        ctx: &CancellationToken,
        options: &MigrationOptions,
    ) -> shc_error::Result<MigrationReport> {
        let _guard = self.acquire()?;

        self.report(0.05, "validating devices");
        let validation = self.validate(ctx, options).await?;
        if !validation.valid {
            return Err(Error::new(
                ErrorKind::IncompatibleDevices,
                "source and target are not compatible",
            )
            .with_context("errors", &validation.errors));
        }
        for warning in &validation.warnings {
            warn!(target: "shelly.migrate", warning, "continuing despite mismatch");
        }

        self.report(0.10, "reading source device");
        let mut sections = SectionSelection::for_migration();
        sections.wifi = options.include_wifi;

        self.report(0.15, "exporting configuration");
        let envelope = shc_backup::export(ctx, &self.source, &sections).await?;
        self.report(0.25, "export complete");

        self.report(0.50, "restoring configuration");
        let restore = shc_backup::restore(
            ctx,
            &self.target,
            &envelope,
            &RestoreOptions {
                sections,
                dry_run: false,
            },
        )
        .await?;
        self.report(0.90, "restore complete");

        let rebooted = if restore.restart_required {
            self.target.reboot(ctx).await?;
            true
        } else {
            false
        };

        self.report(1.00, "migration complete");
        info!(
            target: "shelly.migrate",
            source = %self.source.id(),
            target = %self.target.id(),
            rebooted,
            errors = restore.errors.len(),
            "migration finished"
        );
        Ok(MigrationReport { restore, rebooted })
    }

    fn acquire(&self) -> shc_error::Result<InProgressGuard<'_>> {
        let mut flag = self.in_progress.lock().expect("migration flag lock poisoned");
        if *flag {
            return Err(Error::new(
                ErrorKind::MigrationInProgress,
                "a migration is already running on this migrator",
            ));
        }
        *flag = true;
        Ok(InProgressGuard { flag: &self.in_progress })
    }
}

/// Clears the in-progress flag on scope exit, error paths included.
struct InProgressGuard<'a> {
    flag: &'a Mutex<bool>,
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        *self.flag.lock().expect("migration flag lock poisoned") = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
