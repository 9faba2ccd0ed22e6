// SPDX-License-Identifier: MIT OR Apache-2.0
//! The cloud HTTP surface.
//!
//! Every call runs the same routine: wait on the rate limiter, fetch a
//! token, attach `Authorization: Bearer`, submit, classify. The base URL
//! is re-derived from the token on each call, so a re-authentication that
//! moves the account to another cluster is picked up transparently.

use crate::source::TokenSource;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};
use shc_error::{Error, ErrorKind};
use shc_transport::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Cloud client options.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Requests per second against the cloud API. Default 1.
    pub requests_per_second: u32,
    /// Per-request timeout. Default 30 s.
    pub timeout: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Rate-limited, bearer-authenticated client for the account's cloud API.
pub struct CloudClient {
    http: reqwest::Client,
    source: Arc<dyn TokenSource>,
    limiter: RateLimiter,
    timeout: Duration,
}

impl CloudClient {
    /// Build a client over a token source.
    #[must_use]
    pub fn new(source: Arc<dyn TokenSource>, config: CloudConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            source,
            limiter: RateLimiter::per_second(config.requests_per_second),
            timeout: config.timeout,
        }
    }

    /// The token source backing this client.
    #[must_use]
    pub fn token_source(&self) -> &Arc<dyn TokenSource> {
        &self.source
    }

    // -- Endpoints -------------------------------------------------------

    /// List every device attached to the account (`GET /device/all`).
    pub async fn devices(&self, ctx: &CancellationToken) -> shc_error::Result<Value> {
        self.request(ctx, Method::GET, "/device/all", None).await
    }

    /// Fetch one device's cloud-cached status (`GET /device/status?id=`).
    pub async fn device_status(
        &self,
        ctx: &CancellationToken,
        device_id: &str,
    ) -> shc_error::Result<Value> {
        let encoded: String = url::form_urlencoded::byte_serialize(device_id.as_bytes()).collect();
        self.request(ctx, Method::GET, &format!("/device/status?id={encoded}"), None)
            .await
    }

    /// Switch a relay channel (`POST /device/relay/control`).
    pub async fn relay_control(
        &self,
        ctx: &CancellationToken,
        device_id: &str,
        channel: u8,
        on: bool,
    ) -> shc_error::Result<Value> {
        let body = json!({
            "id": device_id,
            "channel": channel,
            "turn": if on { "on" } else { "off" },
        });
        self.request(ctx, Method::POST, "/device/relay/control", Some(body))
            .await
    }

    /// Drive a roller channel (`POST /device/roller/control`).
    ///
    /// `direction` is one of `open`, `close`, `stop`.
    pub async fn roller_control(
        &self,
        ctx: &CancellationToken,
        device_id: &str,
        direction: &str,
    ) -> shc_error::Result<Value> {
        if !matches!(direction, "open" | "close" | "stop") {
            return Err(Error::new(ErrorKind::InvalidArgument, "direction must be open/close/stop")
                .with_context("direction", direction));
        }
        let body = json!({"id": device_id, "direction": direction});
        self.request(ctx, Method::POST, "/device/roller/control", Some(body))
            .await
    }

    /// Switch a light channel (`POST /device/light/control`).
    pub async fn light_control(
        &self,
        ctx: &CancellationToken,
        device_id: &str,
        channel: u8,
        on: bool,
        brightness: Option<u8>,
    ) -> shc_error::Result<Value> {
        let mut body = json!({
            "id": device_id,
            "channel": channel,
            "turn": if on { "on" } else { "off" },
        });
        if let Some(brightness) = brightness {
            body["brightness"] = json!(brightness);
        }
        self.request(ctx, Method::POST, "/device/light/control", Some(body))
            .await
    }

    /// Bulk device query (`POST /v2/devices/api/get`).
    pub async fn devices_api_get(
        &self,
        ctx: &CancellationToken,
        body: Value,
    ) -> shc_error::Result<Value> {
        self.request(ctx, Method::POST, "/v2/devices/api/get", Some(body))
            .await
    }

    /// Group assignment (`POST /v2/devices/api/set/groups`).
    pub async fn devices_api_set_groups(
        &self,
        ctx: &CancellationToken,
        body: Value,
    ) -> shc_error::Result<Value> {
        self.request(ctx, Method::POST, "/v2/devices/api/set/groups", Some(body))
            .await
    }

    // -- Common routine ---------------------------------------------------

    async fn request(
        &self,
        ctx: &CancellationToken,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> shc_error::Result<Value> {
        self.limiter.wait(ctx).await?;

        let token = self.source.token(ctx).await?;
        let url = format!("{}{path}", token.api_base_url()?);
        debug!(target: "shelly.cloud.http", method = %method, %url, "request");

        let mut builder = self
            .http
            .request(method, &url)
            .timeout(self.timeout)
            .bearer_auth(token.access());
        if let Some(body) = body {
            builder = builder.json(&body);
        }

        let response = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(Error::cancelled()),
            response = builder.send() => response.map_err(|e| {
                if e.is_timeout() {
                    Error::new(ErrorKind::Timeout, "no response within the request timeout")
                } else {
                    Error::new(ErrorKind::NetworkError, "cloud request failed").with_source(e)
                }
            })?,
        };

        match response.status() {
            status if status.is_success() => response.json().await.map_err(|e| {
                Error::new(ErrorKind::UnexpectedStatus, "cloud response is not JSON").with_source(e)
            }),
            StatusCode::UNAUTHORIZED => {
                Err(Error::new(ErrorKind::Unauthorized, "cloud rejected the token"))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Err(Error::new(ErrorKind::RateLimited, "cloud rate limit exceeded"))
            }
            status if status.is_server_error() => {
                Err(Error::new(ErrorKind::ServerError, "cloud-side failure")
                    .with_context("status", status.as_u16()))
            }
            status => Err(Error::new(ErrorKind::UnexpectedStatus, "unclassified cloud status")
                .with_context("status", status.as_u16())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
