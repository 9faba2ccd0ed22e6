// SPDX-License-Identifier: MIT OR Apache-2.0
//! MQTT carrier: a thin wrapper over `rumqttc` fixing the topic convention
//! and message shape.
//!
//! The device listens for command envelopes on `<prefix>/rpc`, publishes
//! notifications on `<prefix>/events/rpc`, and announces presence on
//! `<prefix>/online`. The caller owns the returned `EventLoop` and must
//! drive it; inbound publishes are turned into typed events with
//! [`MqttTransport::parse_publish`].

use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::Deserialize;
use serde_json::json;
use shc_core::{DeviceEvent, EventKind};
use shc_error::{Error, ErrorKind};
use shc_rpc::IdSequence;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// MQTT broker options.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host.
    pub broker_host: String,
    /// Broker port (1883 plain).
    pub broker_port: u16,
    /// Client id announced to the broker; also used as the RPC `src`.
    pub client_id: String,
    /// Keep-alive interval. Default 30 s.
    pub keepalive: Duration,
}

impl MqttConfig {
    /// Config with defaults for the given broker.
    pub fn new(broker_host: impl Into<String>, broker_port: u16, client_id: impl Into<String>) -> Self {
        Self {
            broker_host: broker_host.into(),
            broker_port,
            client_id: client_id.into(),
            keepalive: Duration::from_secs(30),
        }
    }
}

// ---------------------------------------------------------------------------
// MqttTransport
// ---------------------------------------------------------------------------

/// Publish/subscribe carrier for one device topic prefix.
pub struct MqttTransport {
    client: AsyncClient,
    client_id: String,
    prefix: String,
    ids: IdSequence,
    closed: AtomicBool,
}

impl MqttTransport {
    /// Create the transport.
    ///
    /// Returns `(transport, event_loop)`; the caller must poll the event
    /// loop for the connection to make progress:
    ///
    /// ```ignore
    /// tokio::spawn(async move {
    ///     loop {
    ///         if let Err(e) = event_loop.poll().await {
    ///             tracing::warn!(error = %e, "mqtt event loop error");
    ///             tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    ///         }
    ///     }
    /// });
    /// ```
    #[must_use]
    pub fn new(config: &MqttConfig, prefix: impl Into<String>) -> (Self, EventLoop) {
        let mut options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        options.set_keep_alive(config.keepalive);
        let (client, event_loop) = AsyncClient::new(options, 64);
        (
            Self {
                client,
                client_id: config.client_id.clone(),
                prefix: prefix.into(),
                ids: IdSequence::new(),
                closed: AtomicBool::new(false),
            },
            event_loop,
        )
    }

    /// Topic the device accepts command envelopes on.
    #[must_use]
    pub fn command_topic(&self) -> String {
        format!("{}/rpc", self.prefix)
    }

    /// Topic the device publishes notifications on.
    #[must_use]
    pub fn events_topic(&self) -> String {
        format!("{}/events/rpc", self.prefix)
    }

    /// Retained presence topic.
    #[must_use]
    pub fn online_topic(&self) -> String {
        format!("{}/online", self.prefix)
    }

    /// Build one command envelope. The `src` names the reply topic the
    /// device will answer on.
    #[must_use]
    pub fn command_envelope(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let mut envelope = json!({
            "jsonrpc": "2.0",
            "id": self.ids.next_id(),
            "src": self.client_id,
            "method": method,
        });
        if let Some(params) = params {
            envelope["params"] = params;
        }
        envelope
    }

    /// Publish one command envelope on the device's command topic.
    pub async fn publish_command(
        &self,
        ctx: &CancellationToken,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> shc_error::Result<()> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::Closed, "transport is closed"));
        }
        let envelope = self.command_envelope(method, params);
        debug!(target: "shelly.transport.mqtt", topic = %self.command_topic(), %method, "publish");
        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(Error::cancelled()),
            published = self.client.publish(
                self.command_topic(),
                QoS::AtLeastOnce,
                false,
                envelope.to_string(),
            ) => published.map_err(|e| {
                Error::new(ErrorKind::NetworkError, "mqtt publish failed").with_source(e)
            }),
        }
    }

    /// Subscribe to the device's notification and presence topics.
    pub async fn subscribe_events(&self, ctx: &CancellationToken) -> shc_error::Result<()> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::Closed, "transport is closed"));
        }
        for topic in [self.events_topic(), self.online_topic()] {
            tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(Error::cancelled()),
                subscribed = self.client.subscribe(topic, QoS::AtLeastOnce) => {
                    subscribed.map_err(|e| {
                        Error::new(ErrorKind::NetworkError, "mqtt subscribe failed").with_source(e)
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Turn one inbound publish into a typed event, if the topic belongs to
    /// this transport's device.
    #[must_use]
    pub fn parse_publish(&self, topic: &str, payload: &[u8]) -> Option<DeviceEvent> {
        if topic == self.online_topic() {
            let online = payload == b"true";
            let kind = if online { EventKind::Online } else { EventKind::Offline };
            return Some(DeviceEvent::new(self.prefix.clone(), kind, json!({"online": online})));
        }
        if topic == self.events_topic() {
            #[derive(Deserialize)]
            struct Notification {
                method: String,
                #[serde(default)]
                params: serde_json::Value,
            }
            let notification: Notification = serde_json::from_slice(payload).ok()?;
            let kind = match notification.method.as_str() {
                "NotifyStatus" => EventKind::NotifyStatus,
                "NotifyFullStatus" => EventKind::NotifyFullStatus,
                "NotifyEvent" => EventKind::NotifyEvent,
                _ => return None,
            };
            return Some(DeviceEvent::new(self.prefix.clone(), kind, notification.params));
        }
        None
    }

    /// Disconnect from the broker. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.client.disconnect().await;
    }

    /// Whether [`MqttTransport::close`] has been observed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
