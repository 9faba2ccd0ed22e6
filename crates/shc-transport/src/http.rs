// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP transport for both on-wire dialects.
//!
//! A single request/response carrier used two ways: the Gen1 REST dialect
//! (method = URL path, params folded into the query string) and the Gen2+
//! RPC dialect (JSON-RPC envelope POSTed to `/rpc`). The transport is
//! internally stateless and requests may execute in parallel.

use crate::digest::DigestChallenge;
use crate::query::render_query;
use crate::{Credential, Transport};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use shc_error::{Error, ErrorKind};
use shc_rpc::{IdSequence, RpcRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which on-wire dialect this transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpDialect {
    /// Gen1: GET with query parameters, response body returned unwrapped.
    Rest,
    /// Gen2+: JSON-RPC-2.0 envelope POSTed to `/rpc`.
    Rpc,
}

/// HTTP transport options.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL of the device (e.g. `http://192.168.1.20`).
    pub base_url: String,
    /// Per-request timeout. Default 30 s.
    pub timeout: Duration,
    /// Optional credential. Basic is pre-attached; digest answers a 401
    /// challenge with a single retry.
    pub credential: Option<Credential>,
}

impl HttpConfig {
    /// Config with defaults for the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            credential: None,
        }
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Attach a credential.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// Stateless HTTP carrier.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
    dialect: HttpDialect,
    ids: IdSequence,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Gen1 REST transport.
    #[must_use]
    pub fn rest(config: HttpConfig) -> Self {
        Self::new(config, HttpDialect::Rest)
    }

    /// Gen2+ RPC-over-HTTP transport.
    #[must_use]
    pub fn rpc(config: HttpConfig) -> Self {
        Self::new(config, HttpDialect::Rpc)
    }

    fn new(mut config: HttpConfig, dialect: HttpDialect) -> Self {
        while config.base_url.ends_with('/') {
            config.base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            config,
            dialect,
            ids: IdSequence::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// The dialect this transport was built for.
    #[must_use]
    pub fn dialect(&self) -> HttpDialect {
        self.dialect
    }

    /// Perform one GET against a path (with optional query already
    /// attached). Used directly for probing and by the REST dialect.
    pub async fn get_raw(
        &self,
        ctx: &CancellationToken,
        path_and_query: &str,
    ) -> shc_error::Result<Vec<u8>> {
        self.request(ctx, Method::GET, path_and_query, None).await
    }

    async fn request(
        &self,
        ctx: &CancellationToken,
        http_method: Method,
        path_and_query: &str,
        body: Option<Vec<u8>>,
    ) -> shc_error::Result<Vec<u8>> {
        if self.is_closed() {
            return Err(Error::new(ErrorKind::Closed, "transport is closed"));
        }
        let path = path_and_query.trim_start_matches('/');
        let url = format!("{}/{}", self.config.base_url, path);
        let uri = format!("/{path}");

        debug!(target: "shelly.transport.http", method = %http_method, %url, "request");

        let response = self
            .send(ctx, http_method.clone(), &url, body.as_deref(), None)
            .await?;

        // One digest retry on a 401 challenge, then the outcome stands.
        let response = if response.status() == StatusCode::UNAUTHORIZED
            && let Some(Credential::Digest { username, password }) = &self.config.credential
        {
            let challenge = response
                .headers()
                .get(header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    Error::new(ErrorKind::AuthFailed, "401 without a www-authenticate header")
                })?;
            let authorization = DigestChallenge::parse(challenge)?.answer(
                username,
                password,
                http_method.as_str(),
                &uri,
            );
            debug!(target: "shelly.transport.http", %url, "answering digest challenge");
            self.send(ctx, http_method, &url, body.as_deref(), Some(authorization))
                .await?
        } else {
            response
        };

        self.classify(response, ctx).await
    }

    async fn send(
        &self,
        ctx: &CancellationToken,
        http_method: Method,
        url: &str,
        body: Option<&[u8]>,
        authorization: Option<String>,
    ) -> shc_error::Result<reqwest::Response> {
        let mut builder = self
            .client
            .request(http_method, url)
            .timeout(self.config.timeout);
        if let Some(Credential::Basic { username, password }) = &self.config.credential {
            builder = builder.basic_auth(username, Some(password));
        }
        if let Some(authorization) = authorization {
            builder = builder.header(header::AUTHORIZATION, authorization);
        }
        if let Some(body) = body {
            builder = builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.to_vec());
        }

        tokio::select! {
            biased;
            () = ctx.cancelled() => Err(Error::cancelled()),
            result = builder.send() => result.map_err(|e| {
                if e.is_timeout() {
                    Error::new(ErrorKind::Timeout, "no response within the request timeout")
                        .with_context("timeout_ms", self.config.timeout.as_millis() as u64)
                        .with_source(e)
                } else {
                    Error::new(ErrorKind::NetworkError, "request failed")
                        .with_context("url", url)
                        .with_source(e)
                }
            }),
        }
    }

    async fn classify(
        &self,
        response: reqwest::Response,
        ctx: &CancellationToken,
    ) -> shc_error::Result<Vec<u8>> {
        let status = response.status();
        if status.is_success() {
            let bytes = tokio::select! {
                biased;
                () = ctx.cancelled() => return Err(Error::cancelled()),
                bytes = response.bytes() => bytes.map_err(|e| {
                    Error::new(ErrorKind::NetworkError, "failed reading response body")
                        .with_source(e)
                })?,
            };
            return Ok(bytes.to_vec());
        }
        Err(match status {
            StatusCode::UNAUTHORIZED => {
                if self.config.credential.is_some() {
                    Error::new(ErrorKind::AuthFailed, "device rejected the credential")
                } else {
                    Error::new(ErrorKind::AuthRequired, "device requires authentication")
                }
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Error::new(ErrorKind::RateLimited, "device rejected the request rate")
            }
            s if s.is_server_error() => Error::new(ErrorKind::ServerError, "device-side failure")
                .with_context("status", s.as_u16()),
            s => Error::new(ErrorKind::UnexpectedStatus, "unclassified response status")
                .with_context("status", s.as_u16()),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        ctx: &CancellationToken,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> shc_error::Result<Vec<u8>> {
        match self.dialect {
            HttpDialect::Rest => {
                let mut path = method.trim_start_matches('/').to_string();
                match params {
                    None => {}
                    Some(serde_json::Value::Object(map)) => {
                        let query = render_query(&map);
                        if !query.is_empty() {
                            path = format!("{path}?{query}");
                        }
                    }
                    Some(_) => {
                        return Err(Error::new(
                            ErrorKind::InvalidArgument,
                            "rest params must be a JSON object",
                        ));
                    }
                }
                self.request(ctx, Method::GET, &path, None).await
            }
            HttpDialect::Rpc => {
                let request = RpcRequest::new(self.ids.next_id(), method, params);
                self.request(ctx, Method::POST, "rpc", Some(request.encode()?))
                    .await
            }
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
