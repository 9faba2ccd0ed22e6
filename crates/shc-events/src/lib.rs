// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use shc_core::{DeviceEvent, EventKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// A registered event handler.
///
/// Handlers run on the dispatching task (the ingress read loop) and must
/// not block.
pub type Handler = Arc<dyn Fn(&DeviceEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// EventFilter
// ---------------------------------------------------------------------------

/// Filters events by device id and/or event kind.
///
/// Both dimensions compose as AND: an event passes iff its device id is in
/// the id set (when one is configured) and its kind is in the kind set
/// (when one is configured). An empty filter passes everything.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    device_ids: Option<HashSet<String>>,
    kinds: Option<HashSet<EventKind>>,
}

impl EventFilter {
    /// A filter that passes every event.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Restrict to the given device ids.
    #[must_use]
    pub fn devices<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.device_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict to the given event kinds.
    #[must_use]
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = EventKind>,
    {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    /// Returns `true` if the event passes the filter.
    #[must_use]
    pub fn matches(&self, event: &DeviceEvent) -> bool {
        if let Some(ref ids) = self.device_ids
            && !ids.contains(&event.device_id)
        {
            return false;
        }
        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Registry {
    by_kind: HashMap<EventKind, Vec<Handler>>,
    catch_all: Vec<Handler>,
}

/// Append-only registry of event handlers with per-kind dispatch.
#[derive(Default)]
pub struct EventBus {
    registry: RwLock<Registry>,
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one event kind. Registration is append-only;
    /// handlers for a kind run in registration order.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.registry
            .write()
            .expect("event registry lock poisoned")
            .by_kind
            .entry(kind)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register a catch-all handler invoked for every event.
    pub fn on_any<F>(&self, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.registry
            .write()
            .expect("event registry lock poisoned")
            .catch_all
            .push(Arc::new(handler));
    }

    /// Register a catch-all handler gated by a filter.
    pub fn on_filtered<F>(&self, filter: EventFilter, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.on_any(move |event| {
            if filter.matches(event) {
                handler(event);
            }
        });
    }

    /// Dispatch one event to all matching handlers.
    ///
    /// The handler lists are snapshotted under the read lock and invoked
    /// after it is released, so a handler may register further handlers
    /// without deadlocking.
    pub fn dispatch(&self, event: &DeviceEvent) {
        let snapshot: Vec<Handler> = {
            let registry = self.registry.read().expect("event registry lock poisoned");
            let mut out = Vec::new();
            if let Some(handlers) = registry.by_kind.get(&event.kind) {
                out.extend(handlers.iter().cloned());
            }
            out.extend(registry.catch_all.iter().cloned());
            out
        };
        for handler in snapshot {
            handler(event);
        }
    }

    /// Drop every registered handler atomically.
    pub fn clear(&self) {
        let mut registry = self.registry.write().expect("event registry lock poisoned");
        *registry = Registry::default();
    }

    /// Total number of registered handlers (all kinds plus catch-alls).
    #[must_use]
    pub fn handler_count(&self) -> usize {
        let registry = self.registry.read().expect("event registry lock poisoned");
        registry.by_kind.values().map(Vec::len).sum::<usize>() + registry.catch_all.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handler_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
