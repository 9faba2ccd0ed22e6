// SPDX-License-Identifier: MIT OR Apache-2.0
//! JWT parsing and endpoint derivation.
//!
//! The client only reads the claims segment; the signature is deliberately
//! not verified; the cloud server is the enforcement point, and the wire
//! contract presumes unverified client-side parsing.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shc_error::{Error, ErrorKind};

/// Port the cloud WebSocket endpoint listens on.
pub const CLOUD_WEBSOCKET_PORT: u16 = 6113;

// ---------------------------------------------------------------------------
// base64url
// ---------------------------------------------------------------------------

/// Decode a base64url segment, tolerating missing padding.
///
/// JWT segments drop their `=` padding; length mod 4 of 2 or 3 means one
/// or two pad characters were removed, 1 is never valid. URL-safe `-`/`_`
/// are remapped to the standard alphabet before decoding.
pub fn base64url_decode(input: &str) -> shc_error::Result<Vec<u8>> {
    let mut buf: String = input
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    match buf.len() % 4 {
        0 => {}
        2 => buf.push_str("=="),
        3 => buf.push('='),
        _ => {
            return Err(Error::new(ErrorKind::InvalidToken, "segment length is not valid base64url")
                .with_context("len", input.len()));
        }
    }
    STANDARD.decode(buf.as_bytes()).map_err(|e| {
        Error::new(ErrorKind::InvalidToken, "segment is not valid base64").with_source(e)
    })
}

// ---------------------------------------------------------------------------
// Claims & Token
// ---------------------------------------------------------------------------

/// Decoded JWT claims. Only the fields the client routes on are typed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Host (optionally with scheme) of the account's API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_api_url: Option<String>,
    /// Expiry as Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued-at as Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Account user id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// Account email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// An opaque JWT plus its decoded claims.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    raw: String,
    claims: TokenClaims,
}

impl Token {
    /// Parse a JWT string.
    ///
    /// The token must be non-empty and have three `.`-separated segments;
    /// only the middle (claims) segment is decoded.
    pub fn parse(raw: impl Into<String>) -> shc_error::Result<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(Error::new(ErrorKind::InvalidToken, "token is empty"));
        }
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() != 3 {
            return Err(Error::new(ErrorKind::InvalidToken, "token does not have three segments")
                .with_context("segments", segments.len()));
        }
        let claims_bytes = base64url_decode(segments[1])?;
        let claims: TokenClaims = serde_json::from_slice(&claims_bytes).map_err(|e| {
            Error::new(ErrorKind::InvalidToken, "claims segment is not valid JSON").with_source(e)
        })?;
        Ok(Self { raw, claims })
    }

    /// The raw access string.
    #[must_use]
    pub fn access(&self) -> &str {
        &self.raw
    }

    /// The decoded claims.
    #[must_use]
    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// `true` iff the `exp` claim is present and in the past.
    ///
    /// A token without `exp` never expires.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.claims.exp {
            Some(exp) => exp < now.timestamp(),
            None => false,
        }
    }

    /// [`Token::is_expired_at`] against the current clock.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Remaining lifetime in seconds; `None` when the token has no `exp`.
    #[must_use]
    pub fn ttl_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.claims.exp.map(|exp| exp - now.timestamp())
    }

    /// The effective API base URL derived from the `user_api_url` claim:
    /// trailing slashes stripped, `https://` prefixed when schemeless.
    pub fn api_base_url(&self) -> shc_error::Result<String> {
        let claim = self
            .claims
            .user_api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| {
                Error::new(ErrorKind::NoUserEndpoint, "token has no user_api_url claim")
            })?;
        let trimmed = claim.trim_end_matches('/');
        if trimmed.contains("://") {
            Ok(trimmed.to_string())
        } else {
            Ok(format!("https://{trimmed}"))
        }
    }

    /// The WebSocket event-stream URL for this token's endpoint.
    pub fn websocket_url(&self) -> shc_error::Result<String> {
        let base = self.api_base_url()?;
        let host = base
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&base)
            .split(['/', ':'])
            .next()
            .unwrap_or_default()
            .to_string();
        let encoded: String =
            url::form_urlencoded::byte_serialize(self.raw.as_bytes()).collect();
        Ok(format!(
            "wss://{host}:{CLOUD_WEBSOCKET_PORT}/shelly/wss/hk_sock?t={encoded}"
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    /// Build an unsigned JWT with the given claims JSON.
    pub(crate) fn fake_jwt(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
        format!("{header}.{payload}.signature")
    }

    #[test]
    fn parse_roundtrips_user_api_url() {
        let jwt = fake_jwt(&serde_json::json!({
            "user_api_url": "shelly-49-eu.shelly.cloud",
            "exp": 4102444800i64,
        }));
        let token = Token::parse(&jwt).unwrap();
        assert_eq!(
            token.claims().user_api_url.as_deref(),
            Some("shelly-49-eu.shelly.cloud")
        );
    }

    #[test]
    fn empty_token_rejected() {
        let err = Token::parse("").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
        let err = Token::parse("   ").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn two_segment_token_rejected() {
        let err = Token::parse("abc.def").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn garbage_claims_rejected() {
        let err = Token::parse("aGVhZGVy.bm90anNvbg.sig").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    #[test]
    fn expiry_semantics() {
        let now = Utc::now();
        let expired = Token::parse(fake_jwt(&serde_json::json!({"exp": now.timestamp() - 10})))
            .unwrap();
        assert!(expired.is_expired_at(now));

        let live = Token::parse(fake_jwt(&serde_json::json!({"exp": now.timestamp() + 600})))
            .unwrap();
        assert!(!live.is_expired_at(now));
        assert_eq!(live.ttl_at(now), Some(600));

        // No exp claim: never expires.
        let eternal = Token::parse(fake_jwt(&serde_json::json!({"user_id": 1}))).unwrap();
        assert!(!eternal.is_expired_at(now));
        assert_eq!(eternal.ttl_at(now), None);
    }

    #[test]
    fn api_base_url_prefixes_scheme() {
        let token = Token::parse(fake_jwt(
            &serde_json::json!({"user_api_url": "shelly-49-eu.shelly.cloud"}),
        ))
        .unwrap();
        assert_eq!(token.api_base_url().unwrap(), "https://shelly-49-eu.shelly.cloud");
    }

    #[test]
    fn api_base_url_keeps_explicit_scheme_and_strips_slash() {
        let token = Token::parse(fake_jwt(
            &serde_json::json!({"user_api_url": "http://127.0.0.1:8080/"}),
        ))
        .unwrap();
        assert_eq!(token.api_base_url().unwrap(), "http://127.0.0.1:8080");
    }

    #[test]
    fn missing_endpoint_claim_is_hard_failure() {
        let token = Token::parse(fake_jwt(&serde_json::json!({"user_id": 7}))).unwrap();
        let err = token.api_base_url().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoUserEndpoint);
        let err = Token::parse(fake_jwt(&serde_json::json!({"user_api_url": ""})))
            .unwrap()
            .api_base_url()
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoUserEndpoint);
    }

    #[test]
    fn websocket_url_shape() {
        let jwt = fake_jwt(&serde_json::json!({"user_api_url": "shelly-49-eu.shelly.cloud"}));
        let token = Token::parse(&jwt).unwrap();
        let ws = token.websocket_url().unwrap();
        assert!(ws.starts_with("wss://shelly-49-eu.shelly.cloud:6113/shelly/wss/hk_sock?t="));
        // The token itself is URL-encoded into the query.
        let encoded: String = url::form_urlencoded::byte_serialize(jwt.as_bytes()).collect();
        assert!(ws.ends_with(&encoded));
    }

    // -- base64url ------------------------------------------------------

    #[test]
    fn base64url_all_padding_cases() {
        // len % 4 == 0, 2, 3 after encoding.
        for input in [&b""[..], b"f", b"fo", b"foo", b"foob", b"fooba", b"foobar"] {
            let encoded = URL_SAFE_NO_PAD.encode(input);
            let decoded = base64url_decode(&encoded).unwrap();
            assert_eq!(decoded, input, "roundtrip failed for {input:?}");
        }
    }

    #[test]
    fn base64url_remaps_url_safe_alphabet() {
        // 0xfb 0xff encodes to "-_8" in the URL-safe alphabet.
        let encoded = URL_SAFE_NO_PAD.encode([0xfb, 0xff]);
        assert!(encoded.contains('-') || encoded.contains('_'));
        assert_eq!(base64url_decode(&encoded).unwrap(), vec![0xfb, 0xff]);
    }

    #[test]
    fn base64url_rejects_impossible_length() {
        let err = base64url_decode("abcde").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidToken);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn base64url_roundtrip(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let encoded = URL_SAFE_NO_PAD.encode(&bytes);
                let decoded = base64url_decode(&encoded).unwrap();
                prop_assert_eq!(decoded, bytes);
            }

            #[test]
            fn jwt_user_api_url_roundtrip(host in "[a-z0-9-]{1,20}(\\.[a-z0-9-]{1,10}){1,3}") {
                let jwt = fake_jwt(&serde_json::json!({"user_api_url": host.clone()}));
                let token = Token::parse(&jwt).unwrap();
                prop_assert_eq!(token.claims().user_api_url.as_deref(), Some(host.as_str()));
            }
        }
    }
}
