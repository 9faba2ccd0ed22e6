//! Resolvable network addresses with a scheme hint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scheme hint for an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
    /// Plain WebSocket.
    Ws,
    /// WebSocket over TLS.
    Wss,
    /// MQTT broker.
    Mqtt,
    /// CoAP multicast ingress.
    Coap,
    /// Cloud endpoint derived from a JWT claim.
    Cloud,
}

impl Scheme {
    /// URL scheme string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
            Self::Ws => "ws",
            Self::Wss => "wss",
            Self::Mqtt => "mqtt",
            Self::Coap => "coap",
            Self::Cloud => "cloud",
        }
    }
}

/// A resolvable network address plus scheme hint.
///
/// Cloud endpoints are derived from a JWT claim and may change when the
/// session re-authenticates; local endpoints are stable for the lifetime
/// of a transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Optional explicit port; schemes carry their own defaults.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Scheme hint.
    pub scheme: Scheme,
}

impl Endpoint {
    /// Create an endpoint from host and scheme, with the scheme's default port.
    pub fn new(host: impl Into<String>, scheme: Scheme) -> Self {
        Self {
            host: host.into(),
            port: None,
            scheme,
        }
    }

    /// Override the port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Render as `scheme://host[:port]`.
    #[must_use]
    pub fn to_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}", self.scheme.as_str(), self.host),
            None => format!("{}://{}", self.scheme.as_str(), self.host),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_url())
    }
}
