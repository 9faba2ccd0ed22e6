// SPDX-License-Identifier: MIT OR Apache-2.0
//! Token acquisition.
//!
//! Two sources: a static wrapper around one token, and a credential source
//! that logs in with email + SHA-1 password hash and refreshes on demand.
//! Refresh is serialized behind a single mutex per source; a slow refresh
//! intentionally blocks every caller of that source.

use crate::token::Token;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha1::{Digest, Sha1};
use shc_error::{Error, ErrorKind};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default client id announced at login.
pub const DEFAULT_CLIENT_ID: &str = "shelly-diy";
/// Refresh ahead of expiry when the remaining TTL drops below this.
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// SHA-1 hex digest of a cloud account password, as the login endpoint
/// expects it.
#[must_use]
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha1::digest(password.as_bytes()))
}

// ---------------------------------------------------------------------------
// TokenSource
// ---------------------------------------------------------------------------

/// Produces valid tokens on demand, refreshing when needed.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A token that is currently valid.
    async fn token(&self, ctx: &CancellationToken) -> shc_error::Result<Token>;
}

// ---------------------------------------------------------------------------
// StaticTokenSource
// ---------------------------------------------------------------------------

/// Wraps a single token; fails with `TokenExpired` once it lapses.
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: Token,
}

impl StaticTokenSource {
    /// Wrap an already-parsed token.
    #[must_use]
    pub fn new(token: Token) -> Self {
        Self { token }
    }

    /// Parse and wrap a raw JWT string.
    pub fn parse(raw: impl Into<String>) -> shc_error::Result<Self> {
        Ok(Self::new(Token::parse(raw)?))
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _ctx: &CancellationToken) -> shc_error::Result<Token> {
        if self.token.is_expired() {
            return Err(Error::new(ErrorKind::TokenExpired, "static token is past its exp claim"));
        }
        Ok(self.token.clone())
    }
}

// ---------------------------------------------------------------------------
// CredentialTokenSource
// ---------------------------------------------------------------------------

/// Login response from `POST /oauth/login`.
#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default, alias = "token")]
    access_token: Option<String>,
}

/// Email + hashed-password source; logs in lazily and refreshes when the
/// cached token is expired or its TTL drops under the threshold.
pub struct CredentialTokenSource {
    email: String,
    password_sha1: String,
    client_id: String,
    auth_base_url: String,
    refresh_threshold: Duration,
    http: reqwest::Client,
    cached: Mutex<Option<Token>>,
}

impl CredentialTokenSource {
    /// Create a source from plain credentials. The password is hashed
    /// immediately and never stored.
    pub fn new(
        auth_base_url: impl Into<String>,
        email: impl Into<String>,
        password: &str,
    ) -> Self {
        let mut auth_base_url = auth_base_url.into();
        while auth_base_url.ends_with('/') {
            auth_base_url.pop();
        }
        Self {
            email: email.into(),
            password_sha1: hash_password(password),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            auth_base_url,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            http: reqwest::Client::new(),
            cached: Mutex::new(None),
        }
    }

    /// Override the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Override the refresh threshold.
    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    fn needs_refresh(&self, token: &Token) -> bool {
        let now = Utc::now();
        if token.is_expired_at(now) {
            return true;
        }
        match token.ttl_at(now) {
            Some(ttl) => ttl < self.refresh_threshold.as_secs() as i64,
            None => false,
        }
    }

    async fn login(&self, ctx: &CancellationToken) -> shc_error::Result<Token> {
        let url = format!("{}/oauth/login", self.auth_base_url);
        debug!(target: "shelly.cloud.auth", %url, email = %self.email, "logging in");

        let request = self.http.post(&url).json(&json!({
            "email": self.email,
            "password": self.password_sha1,
            "client_id": self.client_id,
        }));
        let response = tokio::select! {
            biased;
            () = ctx.cancelled() => return Err(Error::cancelled()),
            response = request.send() => response.map_err(|e| {
                Error::new(ErrorKind::NetworkError, "login request failed").with_source(e)
            })?,
        };

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::new(ErrorKind::AuthFailed, "cloud rejected the credentials"));
        }
        if !status.is_success() {
            return Err(Error::new(ErrorKind::UnexpectedStatus, "unexpected login status")
                .with_context("status", status.as_u16()));
        }

        let body: LoginResponse = response.json().await.map_err(|e| {
            Error::new(ErrorKind::UnexpectedStatus, "login response is not JSON").with_source(e)
        })?;
        let raw = body.access_token.ok_or_else(|| {
            Error::new(ErrorKind::AuthFailed, "login response carries no token")
        })?;
        let token = Token::parse(raw)?;
        info!(target: "shelly.cloud.auth", "obtained cloud token");
        Ok(token)
    }
}

#[async_trait]
impl TokenSource for CredentialTokenSource {
    async fn token(&self, ctx: &CancellationToken) -> shc_error::Result<Token> {
        // One mutex serializes refresh: concurrent callers queue here and
        // reuse the token the winner fetched.
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && !self.needs_refresh(token)
        {
            return Ok(token.clone());
        }
        let fresh = self.login(ctx).await?;
        *cached = Some(fresh.clone());
        Ok(fresh)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fake_jwt(exp_offset_secs: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256"}"#);
        let claims = json!({
            "user_api_url": "shelly-1-eu.shelly.cloud",
            "exp": Utc::now().timestamp() + exp_offset_secs,
        });
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.sig")
    }

    #[test]
    fn password_hash_is_sha1_hex() {
        // Well-known SHA-1 test vector.
        assert_eq!(hash_password("abc"), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[tokio::test]
    async fn static_source_returns_live_token() {
        let source = StaticTokenSource::parse(fake_jwt(3600)).unwrap();
        let token = source.token(&CancellationToken::new()).await.unwrap();
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn static_source_reports_expiry() {
        let source = StaticTokenSource::parse(fake_jwt(-60)).unwrap();
        let err = source.token(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);
    }

    #[tokio::test]
    async fn credential_source_logs_in_with_hashed_password() {
        let server = MockServer::start().await;
        let jwt = fake_jwt(3600);
        Mock::given(method("POST"))
            .and(path("/oauth/login"))
            .and(body_partial_json(json!({
                "email": "user@example.com",
                "password": hash_password("hunter2"),
                "client_id": DEFAULT_CLIENT_ID,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": jwt,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let source = CredentialTokenSource::new(server.uri(), "user@example.com", "hunter2");
        let token = source.token(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            token.claims().user_api_url.as_deref(),
            Some("shelly-1-eu.shelly.cloud")
        );
    }

    #[tokio::test]
    async fn credential_source_caches_until_threshold() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": fake_jwt(3600)})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let source = CredentialTokenSource::new(server.uri(), "user@example.com", "pw");
        let ctx = CancellationToken::new();
        source.token(&ctx).await.unwrap();
        // Second call reuses the cache; the mock's expect(1) enforces it.
        source.token(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn near_expiry_token_triggers_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/login"))
            .respond_with(
                // TTL of 60 s is under the default 5 min threshold, so every
                // call refreshes.
                ResponseTemplate::new(200).set_body_json(json!({"access_token": fake_jwt(60)})),
            )
            .expect(2)
            .mount(&server)
            .await;

        let source = CredentialTokenSource::new(server.uri(), "user@example.com", "pw");
        let ctx = CancellationToken::new();
        source.token(&ctx).await.unwrap();
        source.token(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let source = CredentialTokenSource::new(server.uri(), "user@example.com", "bad");
        let err = source.token(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::AuthFailed);
    }
}
