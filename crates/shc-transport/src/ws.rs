// SPDX-License-Identifier: MIT OR Apache-2.0
//! WebSocket transport: one full-duplex connection with id-correlated
//! request/response and server-initiated notifications.
//!
//! Outbound writes are serialized through an internal queue. Inbound frames
//! are JSON-decoded and dispatched: a frame whose `id` matches an in-flight
//! request completes that request; everything else is pushed to the
//! notification subscribers.

use crate::backoff::ReconnectPolicy;
use crate::Transport;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use shc_error::{Error, ErrorKind};
use shc_rpc::{IdSequence, RpcFrame, RpcRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const NOTIFICATION_CHANNEL_CAPACITY: usize = 256;
const OUTBOUND_QUEUE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Configuration & state
// ---------------------------------------------------------------------------

/// WebSocket transport options.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// WebSocket URL (`ws://host/rpc` for local Gen2+ devices).
    pub url: String,
    /// How long one `call` may take end to end. Default 30 s.
    pub call_timeout: Duration,
    /// Read deadline on the socket. Default 60 s.
    pub read_timeout: Duration,
    /// Write deadline for one outbound frame. Default 10 s.
    pub write_timeout: Duration,
    /// Reconnect backoff policy.
    pub reconnect: ReconnectPolicy,
}

impl WsConfig {
    /// Config with defaults for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            call_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and no attempt in flight.
    Disconnected,
    /// Dialing.
    Connecting,
    /// Connected and serving traffic.
    Connected,
    /// `close()` was requested; the loop is shutting down.
    Draining,
    /// The last connection or dial attempt failed; backoff pending.
    Failed,
}

// ---------------------------------------------------------------------------
// WsTransport
// ---------------------------------------------------------------------------

struct Shared {
    config: WsConfig,
    ids: IdSequence,
    pending: Mutex<HashMap<u32, oneshot::Sender<Vec<u8>>>>,
    outbound_tx: mpsc::Sender<String>,
    notify_tx: broadcast::Sender<RpcFrame>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown: CancellationToken,
}

/// Stream-oriented RPC carrier over a single WebSocket connection.
pub struct WsTransport {
    shared: Arc<Shared>,
}

impl WsTransport {
    /// Create the transport and spawn its connection loop.
    ///
    /// Returns immediately; the first dial happens in the background and
    /// calls queue up behind the outbound writer until it succeeds.
    #[must_use]
    pub fn connect(config: WsConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            config,
            ids: IdSequence::new(),
            pending: Mutex::new(HashMap::new()),
            outbound_tx,
            notify_tx,
            state_tx,
            shutdown: CancellationToken::new(),
        });

        let loop_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            run_loop(loop_shared, outbound_rx).await;
        });

        Self { shared }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.subscribe().borrow()
    }

    /// Watch connection-state transitions.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Subscribe to server-initiated notifications (`id: null` frames).
    ///
    /// Dropping the receiver cancels the subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RpcFrame> {
        self.shared.notify_tx.subscribe()
    }

    /// Enqueue one raw outbound frame, bypassing request correlation.
    pub async fn send(&self, ctx: &CancellationToken, text: String) -> shc_error::Result<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(Error::new(ErrorKind::Closed, "transport is closed"));
        }
        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(Error::cancelled()),
            sent = self.shared.outbound_tx.send(text) => sent
                .map_err(|_| Error::new(ErrorKind::Closed, "transport is closed")),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn call(
        &self,
        ctx: &CancellationToken,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> shc_error::Result<Vec<u8>> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(Error::new(ErrorKind::Closed, "transport is closed"));
        }

        let id = shared.ids.next_id();
        let request = RpcRequest::new(id, method, params);
        let text = String::from_utf8(request.encode()?)
            .map_err(|e| Error::new(ErrorKind::InvalidArgument, "request is not UTF-8").with_source(e))?;

        let (response_tx, response_rx) = oneshot::channel();
        shared
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .insert(id, response_tx);

        // Failure from here on must deregister the pending slot.
        let result = self.call_inner(ctx, id, text, response_rx).await;
        if result.is_err() {
            shared
                .pending
                .lock()
                .expect("pending map lock poisoned")
                .remove(&id);
        }
        result
    }

    async fn close(&self) {
        let _ = self.shared.state_tx.send(ConnectionState::Draining);
        self.shared.shutdown.cancel();
    }

    fn is_closed(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl WsTransport {
    async fn call_inner(
        &self,
        ctx: &CancellationToken,
        id: u32,
        text: String,
        response_rx: oneshot::Receiver<Vec<u8>>,
    ) -> shc_error::Result<Vec<u8>> {
        let shared = &self.shared;

        tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(Error::cancelled()),
            sent = shared.outbound_tx.send(text) => {
                sent.map_err(|_| Error::new(ErrorKind::Closed, "transport is closed"))?;
            }
        }

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(Error::cancelled()),
            () = tokio::time::sleep(shared.config.call_timeout) => {
                Err(Error::new(ErrorKind::Timeout, "no response within the call timeout")
                    .with_context("id", id)
                    .with_context("timeout_ms", shared.config.call_timeout.as_millis() as u64))
            }
            response = response_rx => response.map_err(|_| {
                if shared.shutdown.is_cancelled() {
                    Error::new(ErrorKind::Closed, "transport closed during call")
                } else {
                    Error::new(ErrorKind::NetworkError, "connection lost during call")
                        .with_context("id", id)
                }
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection loop
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Dial → drive → on failure back off, doubling up to the cap; the attempt
/// counter resets on every successful connection.
async fn run_loop(shared: Arc<Shared>, mut outbound_rx: mpsc::Receiver<String>) {
    let mut attempt: u32 = 0;

    loop {
        if shared.shutdown.is_cancelled() {
            break;
        }
        let _ = shared.state_tx.send(ConnectionState::Connecting);

        let dialed = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            dialed = tokio_tungstenite::connect_async(shared.config.url.as_str()) => dialed,
        };

        match dialed {
            Ok((stream, _response)) => {
                info!(target: "shelly.transport.ws", url = %shared.config.url, "connected");
                let _ = shared.state_tx.send(ConnectionState::Connected);
                attempt = 0;

                drive(&shared, stream, &mut outbound_rx).await;
                fail_pending(&shared);
                if shared.shutdown.is_cancelled() {
                    break;
                }
                let _ = shared.state_tx.send(ConnectionState::Failed);
            }
            Err(e) => {
                warn!(target: "shelly.transport.ws", error = %e, attempt, "dial failed");
                let _ = shared.state_tx.send(ConnectionState::Failed);
            }
        }

        let delay = shared.config.reconnect.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(
            target: "shelly.transport.ws",
            delay_ms = delay.as_millis() as u64,
            attempt,
            "backing off before reconnect"
        );
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    fail_pending(&shared);
    let _ = shared.state_tx.send(ConnectionState::Disconnected);
    debug!(target: "shelly.transport.ws", "connection loop exited");
}

/// Serve one live connection until it drops, the read deadline passes, or
/// shutdown is requested.
async fn drive(shared: &Shared, stream: WsStream, outbound_rx: &mut mpsc::Receiver<String>) {
    let (mut sink, mut reader) = stream.split();

    loop {
        tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => {
                let _ = sink.close().await;
                return;
            }
            outbound = outbound_rx.recv() => {
                let Some(text) = outbound else { return };
                let write = tokio::time::timeout(
                    shared.config.write_timeout,
                    sink.send(Message::text(text)),
                );
                match write.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!(target: "shelly.transport.ws", error = %e, "write failed");
                        return;
                    }
                    Err(_) => {
                        warn!(target: "shelly.transport.ws", "write deadline exceeded");
                        return;
                    }
                }
            }
            frame = tokio::time::timeout(shared.config.read_timeout, reader.next()) => {
                match frame {
                    Err(_) => {
                        warn!(target: "shelly.transport.ws", "read deadline exceeded");
                        return;
                    }
                    Ok(None) => {
                        info!(target: "shelly.transport.ws", "stream ended");
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        warn!(target: "shelly.transport.ws", error = %e, "read failed");
                        return;
                    }
                    Ok(Some(Ok(message))) => {
                        if !handle_frame(shared, message) {
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Dispatch one inbound frame. Returns `false` when the connection should
/// be torn down (server close frame).
fn handle_frame(shared: &Shared, message: Message) -> bool {
    let bytes: Vec<u8> = match message {
        Message::Text(text) => text.as_bytes().to_vec(),
        Message::Binary(bin) => bin.to_vec(),
        Message::Close(_) => {
            info!(target: "shelly.transport.ws", "close frame received");
            return false;
        }
        // tungstenite answers pings on the next write; nothing to do.
        _ => return true,
    };

    let frame = match RpcFrame::decode(&bytes) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(target: "shelly.transport.ws", error = %e, "undecodable frame dropped");
            return true;
        }
    };

    if let Some(id) = frame.id {
        let slot = shared
            .pending
            .lock()
            .expect("pending map lock poisoned")
            .remove(&id);
        match slot {
            Some(response_tx) => {
                let _ = response_tx.send(bytes);
            }
            None => {
                debug!(target: "shelly.transport.ws", id, "response for unknown request id");
            }
        }
    } else {
        // Server-initiated notification; nobody listening is fine.
        let _ = shared.notify_tx.send(frame);
    }
    true
}

/// Drop every in-flight request; their callers observe a connection loss.
fn fail_pending(shared: &Shared) {
    shared
        .pending
        .lock()
        .expect("pending map lock poisoned")
        .clear();
}

// ---------------------------------------------------------------------------
// Notification typing
// ---------------------------------------------------------------------------

/// Turn a server-initiated frame into a typed device event.
///
/// Local Gen2+ devices push `NotifyStatus` / `NotifyFullStatus` /
/// `NotifyEvent` frames on the same socket that carries RPC traffic. The
/// frame's `src` names the device when present; `device_id` is the
/// fallback (the id the transport was opened against). Non-notification
/// frames and unknown methods yield `None`.
#[must_use]
pub fn notification_to_event(device_id: &str, frame: &RpcFrame) -> Option<shc_core::DeviceEvent> {
    if !frame.is_notification() {
        return None;
    }
    let kind = shc_core::EventKind::from_wire_name(frame.method.as_deref()?)?;
    let source = frame
        .params
        .as_ref()
        .and_then(|p| p.get("src"))
        .and_then(serde_json::Value::as_str)
        .unwrap_or(device_id);
    Some(shc_core::DeviceEvent::new(
        source,
        kind,
        frame.params.clone().unwrap_or(serde_json::Value::Null),
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
