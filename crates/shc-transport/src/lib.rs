// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod coap;
mod digest;
mod http;
mod limiter;
mod mqtt;
mod query;
mod ws;

pub use backoff::ReconnectPolicy;
pub use coap::{COAP_MULTICAST_GROUP, COAP_PORT, CoapListener, CoapPacket, event_from_payload, parse_packet};
pub use http::{HttpConfig, HttpDialect, HttpTransport};
pub use limiter::RateLimiter;
pub use mqtt::{MqttConfig, MqttTransport};
pub use query::render_query;
pub use ws::{ConnectionState, WsConfig, WsTransport, notification_to_event};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Credential
// ---------------------------------------------------------------------------

/// Authentication credential attached to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// HTTP Basic, pre-attached to every request (Gen1 devices).
    Basic {
        /// User name (`admin` on Gen1 devices).
        username: String,
        /// Plain-text password.
        password: String,
    },
    /// HTTP Digest (SHA-256), answered on a 401 challenge (Gen2+ devices).
    Digest {
        /// User name (`admin` on Gen2+ devices).
        username: String,
        /// Plain-text password.
        password: String,
    },
}

impl Credential {
    /// The user name, regardless of scheme.
    #[must_use]
    pub fn username(&self) -> &str {
        match self {
            Self::Basic { username, .. } | Self::Digest { username, .. } => username,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport contract
// ---------------------------------------------------------------------------

/// The behavioral contract every request/response carrier satisfies.
///
/// `call` submits one request and resolves with the raw response bytes.
/// Implementations honor the cancellation token at every suspension point
/// and surface typed transport failures unchanged; no retry at this layer.
///
/// Streaming transports additionally expose a raw `send` and a
/// notification subscription; see [`WsTransport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit one request and await the raw response bytes.
    async fn call(
        &self,
        ctx: &CancellationToken,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> shc_error::Result<Vec<u8>>;

    /// Close the transport. Idempotent; subsequent calls to [`Transport::call`]
    /// yield [`shc_error::ErrorKind::Closed`].
    async fn close(&self);

    /// Whether [`Transport::close`] has been observed.
    fn is_closed(&self) -> bool;
}
