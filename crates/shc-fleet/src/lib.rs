// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use shc_core::DeviceEvent;
use shc_device::Device;
use shc_error::{Error, ErrorKind};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Per-device outcome of a fleet operation.
pub type DeviceOutcome<T> = Result<T, Error>;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fleet coordinator options.
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Maximum number of concurrently executing per-device operations.
    /// Default: the machine's available parallelism.
    pub concurrency: usize,
    /// A device is unhealthy when it has not been seen for longer than
    /// this. Default 5 min.
    pub health_threshold: Duration,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            health_threshold: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Coordinates operations over a set of device handles.
pub struct Fleet {
    config: FleetConfig,
    devices: RwLock<HashMap<String, Arc<Device>>>,
    groups: RwLock<HashMap<String, HashSet<String>>>,
    last_seen: Mutex<HashMap<String, Instant>>,
}

impl Fleet {
    /// Empty fleet with the given configuration.
    #[must_use]
    pub fn new(config: FleetConfig) -> Self {
        Self {
            config,
            devices: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
            last_seen: Mutex::new(HashMap::new()),
        }
    }

    // -- Membership ------------------------------------------------------

    /// Add (or replace) a device handle, keyed by its id.
    pub fn add(&self, device: Arc<Device>) {
        self.devices
            .write()
            .expect("device map lock poisoned")
            .insert(device.id().to_string(), device);
    }

    /// Remove a device and its health record.
    pub fn remove(&self, device_id: &str) -> Option<Arc<Device>> {
        self.last_seen
            .lock()
            .expect("last-seen lock poisoned")
            .remove(device_id);
        self.devices
            .write()
            .expect("device map lock poisoned")
            .remove(device_id)
    }

    /// Look up one device by id.
    #[must_use]
    pub fn get(&self, device_id: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .expect("device map lock poisoned")
            .get(device_id)
            .cloned()
    }

    /// Ids of every registered device, unordered.
    #[must_use]
    pub fn device_ids(&self) -> Vec<String> {
        self.devices
            .read()
            .expect("device map lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Number of registered devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.read().expect("device map lock poisoned").len()
    }

    /// Whether the fleet is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- Fan-out ----------------------------------------------------------

    /// Run `op` against every registered device.
    ///
    /// Fan-out is bounded by the configured concurrency cap. Per-device
    /// failures do not abort sibling work; the result map always has one
    /// entry per device. Result ordering is not meaningful.
    pub async fn run<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        op: F,
    ) -> HashMap<String, DeviceOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<Device>, CancellationToken) -> Fut,
        Fut: Future<Output = shc_error::Result<T>> + Send + 'static,
    {
        let targets: Vec<Arc<Device>> = {
            let devices = self.devices.read().expect("device map lock poisoned");
            devices.values().cloned().collect()
        };
        self.run_on(ctx, targets, op).await
    }

    /// Run `op` against the members of a named group.
    ///
    /// Group members without a registered handle report `DeviceNotFound`
    /// in the result map.
    pub async fn run_group<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        group: &str,
        op: F,
    ) -> shc_error::Result<HashMap<String, DeviceOutcome<T>>>
    where
        T: Send + 'static,
        F: Fn(Arc<Device>, CancellationToken) -> Fut,
        Fut: Future<Output = shc_error::Result<T>> + Send + 'static,
    {
        let member_ids = self.group(group).ok_or_else(|| {
            Error::new(ErrorKind::InvalidArgument, "no such group").with_context("group", group)
        })?;

        let mut missing = Vec::new();
        let mut targets = Vec::new();
        for id in member_ids {
            match self.get(&id) {
                Some(device) => targets.push(device),
                None => missing.push(id),
            }
        }

        let mut outcomes = self.run_on(ctx, targets, op).await;
        for id in missing {
            outcomes.insert(
                id.clone(),
                Err(Error::new(ErrorKind::DeviceNotFound, "group member has no registered handle")
                    .with_context("device", id)),
            );
        }
        Ok(outcomes)
    }

    async fn run_on<T, F, Fut>(
        &self,
        ctx: &CancellationToken,
        targets: Vec<Arc<Device>>,
        op: F,
    ) -> HashMap<String, DeviceOutcome<T>>
    where
        T: Send + 'static,
        F: Fn(Arc<Device>, CancellationToken) -> Fut,
        Fut: Future<Output = shc_error::Result<T>> + Send + 'static,
    {
        debug!(
            target: "shelly.fleet",
            devices = targets.len(),
            cap = self.config.concurrency,
            "fan-out"
        );
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks: JoinSet<(String, DeviceOutcome<T>)> = JoinSet::new();

        for device in targets {
            let semaphore = Arc::clone(&semaphore);
            let device_id = device.id().to_string();
            let future = op(device, ctx.clone());
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    () = ctx.cancelled() => {
                        return (device_id, Err(Error::cancelled()));
                    }
                    permit = semaphore.acquire_owned() => permit.expect("semaphore closed"),
                };
                (device_id, future.await)
            });
        }

        let mut outcomes = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((device_id, outcome)) => {
                    if outcome.is_ok() {
                        self.mark_seen(&device_id);
                    }
                    outcomes.insert(device_id, outcome);
                }
                Err(e) => {
                    // A panicking op loses its device id; nothing to key the
                    // outcome under, so it is logged instead.
                    warn!(target: "shelly.fleet", error = %e, "fleet task failed to join");
                }
            }
        }
        outcomes
    }

    // -- Health -----------------------------------------------------------

    /// Record that a device was just seen (command completion or tagged
    /// inbound notification).
    pub fn mark_seen(&self, device_id: &str) {
        self.last_seen
            .lock()
            .expect("last-seen lock poisoned")
            .insert(device_id.to_string(), Instant::now());
    }

    /// Feed an inbound event into health tracking.
    pub fn observe_event(&self, event: &DeviceEvent) {
        if event.device_id != "unknown" {
            self.mark_seen(&event.device_id);
        }
    }

    /// `true` iff the device has been seen within the health threshold.
    #[must_use]
    pub fn is_healthy(&self, device_id: &str) -> bool {
        self.last_seen
            .lock()
            .expect("last-seen lock poisoned")
            .get(device_id)
            .is_some_and(|seen| seen.elapsed() <= self.config.health_threshold)
    }

    /// Ids of every registered device currently considered unhealthy.
    #[must_use]
    pub fn unhealthy(&self) -> Vec<String> {
        self.device_ids()
            .into_iter()
            .filter(|id| !self.is_healthy(id))
            .collect()
    }

    // -- Groups -----------------------------------------------------------

    /// Create or replace a named group. Groups are value data; they do not
    /// own device lifecycles.
    pub fn set_group<I, S>(&self, name: impl Into<String>, members: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups
            .write()
            .expect("group map lock poisoned")
            .insert(name.into(), members.into_iter().map(Into::into).collect());
    }

    /// Member ids of a group, if it exists.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<Vec<String>> {
        self.groups
            .read()
            .expect("group map lock poisoned")
            .get(name)
            .map(|members| members.iter().cloned().collect())
    }

    /// Add one member to an existing group; creates the group if missing.
    pub fn add_to_group(&self, name: &str, device_id: impl Into<String>) {
        self.groups
            .write()
            .expect("group map lock poisoned")
            .entry(name.to_string())
            .or_default()
            .insert(device_id.into());
    }

    /// Delete a group. The devices themselves are untouched.
    pub fn remove_group(&self, name: &str) -> bool {
        self.groups
            .write()
            .expect("group map lock poisoned")
            .remove(name)
            .is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use shc_core::{DeviceInfo, EventKind, Generation};
    use shc_transport::Transport;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn call(
            &self,
            _ctx: &CancellationToken,
            _method: &str,
            _params: Option<Value>,
        ) -> shc_error::Result<Vec<u8>> {
            Ok(b"{}".to_vec())
        }
        async fn close(&self) {}
        fn is_closed(&self) -> bool {
            false
        }
    }

    fn device(id: &str) -> Arc<Device> {
        Arc::new(Device::new(
            DeviceInfo::new(id, "SNSW-001X16EU", Generation::Gen2, "1.0.8"),
            Arc::new(NullTransport),
        ))
    }

    fn fleet_of(n: usize, concurrency: usize) -> Fleet {
        let fleet = Fleet::new(FleetConfig {
            concurrency,
            health_threshold: Duration::from_secs(300),
        });
        for i in 0..n {
            fleet.add(device(&format!("dev-{i}")));
        }
        fleet
    }

    #[tokio::test]
    async fn result_map_has_input_cardinality() {
        let fleet = fleet_of(5, 2);
        let outcomes = fleet
            .run(&CancellationToken::new(), |device, _ctx| async move {
                Ok(device.id().len())
            })
            .await;
        assert_eq!(outcomes.len(), 5);
        assert!(outcomes.values().all(Result::is_ok));
    }

    #[tokio::test]
    async fn per_device_errors_do_not_abort_siblings() {
        let fleet = fleet_of(4, 4);
        let outcomes = fleet
            .run(&CancellationToken::new(), |device, _ctx| async move {
                if device.id() == "dev-2" {
                    Err(Error::new(ErrorKind::DeviceOffline, "no route"))
                } else {
                    Ok(())
                }
            })
            .await;
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes["dev-2"].is_err());
        assert_eq!(outcomes.values().filter(|o| o.is_ok()).count(), 3);
    }

    #[tokio::test]
    async fn concurrency_cap_is_respected() {
        let fleet = fleet_of(12, 3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = fleet
            .run(&CancellationToken::new(), |_device, _ctx| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert_eq!(outcomes.len(), 12);
        assert!(
            peak.load(Ordering::SeqCst) <= 3,
            "peak {} exceeded cap",
            peak.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn cancellation_propagates_to_in_flight_ops() {
        let fleet = fleet_of(4, 4);
        let ctx = CancellationToken::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            canceller.cancel();
        });

        let outcomes = fleet
            .run(&ctx, |_device, ctx| async move {
                tokio::select! {
                    () = ctx.cancelled() => Err(Error::cancelled()),
                    () = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
                }
            })
            .await;

        assert_eq!(outcomes.len(), 4);
        for outcome in outcomes.values() {
            assert!(outcome.as_ref().is_err_and(Error::is_cancelled));
        }
    }

    #[tokio::test]
    async fn successful_ops_update_health() {
        let fleet = fleet_of(2, 2);
        assert!(!fleet.is_healthy("dev-0"));

        fleet
            .run(&CancellationToken::new(), |_device, _ctx| async move { Ok(()) })
            .await;
        assert!(fleet.is_healthy("dev-0"));
        assert!(fleet.is_healthy("dev-1"));
        assert!(fleet.unhealthy().is_empty());
    }

    #[tokio::test]
    async fn failed_ops_do_not_update_health() {
        let fleet = fleet_of(1, 1);
        fleet
            .run(&CancellationToken::new(), |_device, _ctx| async move {
                Err::<(), _>(Error::new(ErrorKind::Timeout, "no answer"))
            })
            .await;
        assert!(!fleet.is_healthy("dev-0"));
        assert_eq!(fleet.unhealthy(), vec!["dev-0".to_string()]);
    }

    #[test]
    fn events_update_health_except_unknown() {
        let fleet = fleet_of(1, 1);
        fleet.observe_event(&DeviceEvent::new(
            "dev-0",
            EventKind::NotifyStatus,
            Value::Null,
        ));
        assert!(fleet.is_healthy("dev-0"));

        fleet.observe_event(&DeviceEvent::new("unknown", EventKind::StatusChange, Value::Null));
        assert!(!fleet
            .last_seen
            .lock()
            .unwrap()
            .contains_key("unknown"));
    }

    #[tokio::test]
    async fn groups_target_members_and_flag_missing() {
        let fleet = fleet_of(2, 2);
        fleet.set_group("livingroom", ["dev-0", "ghost"]);

        let outcomes = fleet
            .run_group(&CancellationToken::new(), "livingroom", |device, _ctx| async move {
                Ok(device.id().to_string())
            })
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes["dev-0"].is_ok());
        assert_eq!(
            outcomes["ghost"].as_ref().unwrap_err().kind,
            ErrorKind::DeviceNotFound
        );
    }

    #[tokio::test]
    async fn unknown_group_is_invalid_argument() {
        let fleet = fleet_of(1, 1);
        let err = fleet
            .run_group(&CancellationToken::new(), "nope", |_d, _c| async move { Ok(()) })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn group_membership_is_value_data() {
        let fleet = fleet_of(2, 1);
        fleet.set_group("g", ["dev-0"]);
        fleet.add_to_group("g", "dev-1");
        let mut members = fleet.group("g").unwrap();
        members.sort();
        assert_eq!(members, vec!["dev-0".to_string(), "dev-1".to_string()]);

        assert!(fleet.remove_group("g"));
        assert!(fleet.group("g").is_none());
        // Devices survive group deletion.
        assert_eq!(fleet.len(), 2);
    }

    #[test]
    fn membership_management() {
        let fleet = fleet_of(0, 1);
        assert!(fleet.is_empty());
        fleet.add(device("a"));
        fleet.add(device("b"));
        assert_eq!(fleet.len(), 2);
        assert!(fleet.get("a").is_some());
        fleet.remove("a");
        assert!(fleet.get("a").is_none());
        assert_eq!(fleet.len(), 1);
    }
}
