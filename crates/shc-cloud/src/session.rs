// SPDX-License-Identifier: MIT OR Apache-2.0
//! The cloud WebSocket event stream.
//!
//! `listen` runs ensure-connected → read-loop → on-disconnect, resetting
//! the backoff on every successful connection and bailing out on
//! cancellation. Frames are parsed into typed events and dispatched to
//! handlers registered on the session's event bus; handlers run on the
//! read-loop task and must not block.

use crate::source::TokenSource;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use shc_core::{DeviceEvent, EventKind};
use shc_error::{Error, ErrorKind};
use shc_events::{EventBus, EventFilter};
use shc_transport::ReconnectPolicy;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Long-lived subscription to the account's cloud event stream.
pub struct CloudEventStream {
    source: Arc<dyn TokenSource>,
    bus: Arc<EventBus>,
    policy: ReconnectPolicy,
    url_override: Option<String>,
    shutdown: CancellationToken,
}

impl CloudEventStream {
    /// Build an event stream over a token source.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            bus: Arc::new(EventBus::new()),
            policy: ReconnectPolicy::default(),
            url_override: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Override the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect somewhere other than the token-derived endpoint (proxies,
    /// tests).
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url_override = Some(url.into());
        self
    }

    /// Register a handler for one event kind. Registration is append-only
    /// and thread-safe.
    pub fn on<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler);
    }

    /// Register a catch-all handler gated by a filter (device-id set AND
    /// event-kind set).
    pub fn on_filtered<F>(&self, filter: EventFilter, handler: F)
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.bus.on_filtered(filter, handler);
    }

    /// The underlying bus, for direct registration.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Stop the listen loop and release the socket. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Run the stream until `ctx` is cancelled or [`CloudEventStream::close`]
    /// is called.
    pub async fn listen(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        let mut attempt: u32 = 0;

        loop {
            if ctx.is_cancelled() || self.shutdown.is_cancelled() {
                return Ok(());
            }

            let url = match &self.url_override {
                Some(url) => url.clone(),
                None => self.source.token(ctx).await?.websocket_url()?,
            };

            match self.connect_and_read(ctx, &url).await {
                Ok(()) => {
                    // Clean disconnect; reconnect with a fresh backoff.
                    info!(target: "shelly.cloud.ws", "disconnected cleanly, reconnecting");
                    attempt = 0;
                }
                Err(e) if e.is_cancelled() => return Ok(()),
                Err(e) => {
                    warn!(target: "shelly.cloud.ws", error = %e, attempt, "stream error");
                }
            }

            let delay = self.policy.delay(attempt);
            attempt = attempt.saturating_add(1);
            debug!(
                target: "shelly.cloud.ws",
                delay_ms = delay.as_millis() as u64,
                "backing off before reconnect"
            );
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Ok(()),
                () = ctx.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_read(
        &self,
        ctx: &CancellationToken,
        url: &str,
    ) -> shc_error::Result<()> {
        debug!(target: "shelly.cloud.ws", %url, "connecting");
        let connect = tokio_tungstenite::connect_async(url);
        let (stream, _response) = tokio::select! {
            biased;
            () = self.shutdown.cancelled() => return Err(Error::cancelled()),
            () = ctx.cancelled() => return Err(Error::cancelled()),
            connected = connect => connected.map_err(|e| {
                Error::new(ErrorKind::NetworkError, "cloud websocket dial failed").with_source(e)
            })?,
        };
        info!(target: "shelly.cloud.ws", "connected");

        let (_sink, mut reader) = stream.split();
        loop {
            let frame = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Err(Error::cancelled()),
                () = ctx.cancelled() => return Err(Error::cancelled()),
                frame = reader.next() => frame,
            };
            match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(event) = parse_frame(text.as_str()) {
                        self.bus.dispatch(&event);
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(Error::new(ErrorKind::NetworkError, "cloud websocket read failed")
                        .with_source(e));
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Frame parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WsFrame {
    #[serde(default, alias = "method")]
    event: Option<String>,
    #[serde(default)]
    device: Option<WsDevice>,
    #[serde(default)]
    src: Option<String>,
    #[serde(flatten)]
    rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WsDevice {
    #[serde(default)]
    id: Option<Value>,
}

/// Parse one cloud frame into a typed event.
///
/// Frames with an unknown or missing event name are dropped (the cloud
/// also sends keep-alive and acknowledgement frames on this socket).
fn parse_frame(text: &str) -> Option<DeviceEvent> {
    let frame: WsFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(target: "shelly.cloud.ws", error = %e, "undecodable frame dropped");
            return None;
        }
    };
    let kind = EventKind::from_wire_name(frame.event.as_deref()?)?;
    let device_id = frame
        .device
        .and_then(|d| d.id)
        .map(|id| match id {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .or(frame.src)
        .unwrap_or_else(|| "unknown".to_string());

    Some(DeviceEvent::new(
        device_id,
        kind,
        Value::Object(frame.rest),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
