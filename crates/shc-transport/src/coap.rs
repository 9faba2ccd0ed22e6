// SPDX-License-Identifier: MIT OR Apache-2.0
//! Listen-only CoAP multicast ingress for Gen1 status notifications.
//!
//! Gen1 devices broadcast CoIoT status packets to `224.0.1.187:5683`.
//! The parser handles the minimal dialect in use: a 4-byte header, an
//! optional token (0–8 bytes), a run of options, the `0xFF` payload
//! marker, then the payload. Payloads that parse as JSON carry the device
//! id under `"id"`; anything else is surfaced raw under the `"unknown"`
//! device-id placeholder rather than guessed at.

use serde_json::json;
use shc_core::{DeviceEvent, EventKind};
use shc_error::{Error, ErrorKind};
use std::net::Ipv4Addr;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// The CoIoT multicast group.
pub const COAP_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 187);
/// The CoIoT multicast port.
pub const COAP_PORT: u16 = 5683;

const PAYLOAD_MARKER: u8 = 0xFF;
const MAX_DATAGRAM: usize = 65_536;

// ---------------------------------------------------------------------------
// Packet parsing
// ---------------------------------------------------------------------------

/// A parsed CoAP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapPacket {
    /// Message code (e.g. `0x1E` for CoIoT publish).
    pub code: u8,
    /// Message id from the header.
    pub message_id: u16,
    /// Token bytes (0–8).
    pub token: Vec<u8>,
    /// Raw payload after the `0xFF` marker; empty when absent.
    pub payload: Vec<u8>,
}

/// Parse one datagram into a [`CoapPacket`].
pub fn parse_packet(datagram: &[u8]) -> shc_error::Result<CoapPacket> {
    if datagram.len() < 4 {
        return Err(Error::new(ErrorKind::InvalidArgument, "datagram shorter than a CoAP header")
            .with_context("len", datagram.len()));
    }
    let version = datagram[0] >> 6;
    if version != 1 {
        return Err(Error::new(ErrorKind::InvalidArgument, "unsupported CoAP version")
            .with_context("version", version));
    }
    let token_length = (datagram[0] & 0x0F) as usize;
    if token_length > 8 {
        return Err(Error::new(ErrorKind::InvalidArgument, "token length out of range")
            .with_context("token_length", token_length));
    }
    let code = datagram[1];
    let message_id = u16::from_be_bytes([datagram[2], datagram[3]]);

    let mut cursor = 4;
    if datagram.len() < cursor + token_length {
        return Err(Error::new(ErrorKind::InvalidArgument, "datagram truncated in token"));
    }
    let token = datagram[cursor..cursor + token_length].to_vec();
    cursor += token_length;

    // Skip options up to the payload marker or the end of the datagram.
    while cursor < datagram.len() && datagram[cursor] != PAYLOAD_MARKER {
        let byte = datagram[cursor];
        cursor += 1;
        let delta = byte >> 4;
        let length = byte & 0x0F;
        cursor += extended_field_width(delta, cursor, datagram)?;
        let length = decode_extended(length, &mut cursor, datagram)?;
        if datagram.len() < cursor + length {
            return Err(Error::new(ErrorKind::InvalidArgument, "datagram truncated in option"));
        }
        cursor += length;
    }

    let payload = if cursor < datagram.len() {
        // Skip the marker itself.
        datagram[cursor + 1..].to_vec()
    } else {
        Vec::new()
    };

    Ok(CoapPacket {
        code,
        message_id,
        token,
        payload,
    })
}

/// Width in bytes of the extended option-delta field, which we skip
/// without decoding (option numbers are irrelevant here).
fn extended_field_width(nibble: u8, cursor: usize, datagram: &[u8]) -> shc_error::Result<usize> {
    let width = match nibble {
        0..=12 => 0,
        13 => 1,
        14 => 2,
        _ => {
            return Err(Error::new(ErrorKind::InvalidArgument, "reserved option nibble"));
        }
    };
    if datagram.len() < cursor + width {
        return Err(Error::new(ErrorKind::InvalidArgument, "datagram truncated in option header"));
    }
    Ok(width)
}

/// Decode an extended option-length nibble, advancing the cursor past any
/// extension bytes.
fn decode_extended(nibble: u8, cursor: &mut usize, datagram: &[u8]) -> shc_error::Result<usize> {
    match nibble {
        0..=12 => Ok(nibble as usize),
        13 => {
            let byte = *datagram.get(*cursor).ok_or_else(|| {
                Error::new(ErrorKind::InvalidArgument, "datagram truncated in option header")
            })?;
            *cursor += 1;
            Ok(byte as usize + 13)
        }
        14 => {
            if datagram.len() < *cursor + 2 {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "datagram truncated in option header",
                ));
            }
            let value = u16::from_be_bytes([datagram[*cursor], datagram[*cursor + 1]]) as usize;
            *cursor += 2;
            Ok(value + 269)
        }
        _ => Err(Error::new(ErrorKind::InvalidArgument, "reserved option nibble")),
    }
}

/// Interpret a packet payload as a device event.
///
/// JSON payloads yield the device id from `"id"`; non-JSON payloads (CBOR
/// is not parsed) are surfaced raw under the `"unknown"` placeholder.
#[must_use]
pub fn event_from_payload(payload: &[u8]) -> DeviceEvent {
    match serde_json::from_slice::<serde_json::Value>(payload) {
        Ok(value) => {
            let device_id = match value.get("id") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Number(n)) => n.to_string(),
                _ => "unknown".to_string(),
            };
            DeviceEvent::new(device_id, EventKind::StatusChange, value)
        }
        Err(_) => DeviceEvent::new(
            "unknown",
            EventKind::StatusChange,
            json!({"raw": hex::encode(payload)}),
        ),
    }
}

// ---------------------------------------------------------------------------
// CoapListener
// ---------------------------------------------------------------------------

/// Listen-only multicast ingress.
pub struct CoapListener {
    socket: UdpSocket,
}

impl CoapListener {
    /// Bind to the CoIoT multicast group on all interfaces.
    pub async fn bind() -> shc_error::Result<Self> {
        Self::bind_group(COAP_MULTICAST_GROUP, COAP_PORT).await
    }

    /// Bind to a specific group and port.
    pub async fn bind_group(group: Ipv4Addr, port: u16) -> shc_error::Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map_err(|e| {
                Error::new(ErrorKind::NetworkError, "failed to bind multicast socket")
                    .with_context("port", port)
                    .with_source(e)
            })?;
        socket
            .join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)
            .map_err(|e| {
                Error::new(ErrorKind::NetworkError, "failed to join multicast group")
                    .with_context("group", group.to_string())
                    .with_source(e)
            })?;
        Ok(Self { socket })
    }

    fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Receive datagrams and dispatch events in FIFO order until the token
    /// is cancelled.
    ///
    /// Malformed datagrams are logged and dropped; they never abort the
    /// loop.
    pub async fn run<F>(self, cancel: CancellationToken, mut handler: F)
    where
        F: FnMut(DeviceEvent) + Send,
    {
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.socket.recv_from(&mut buffer) => received,
            };
            let (len, peer) = match received {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(target: "shelly.transport.coap", error = %e, "receive failed");
                    continue;
                }
            };
            match parse_packet(&buffer[..len]) {
                Ok(packet) if !packet.payload.is_empty() => {
                    let event = event_from_payload(&packet.payload);
                    debug!(
                        target: "shelly.transport.coap",
                        device = %event.device_id,
                        %peer,
                        "status packet"
                    );
                    handler(event);
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(target: "shelly.transport.coap", error = %e, %peer, "undecodable datagram");
                }
            }
        }
        debug!(target: "shelly.transport.coap", "listener exited");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
