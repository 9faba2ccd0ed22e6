// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod session;
mod source;
mod token;

pub use client::{CloudClient, CloudConfig};
pub use session::CloudEventStream;
pub use source::{
    CredentialTokenSource, DEFAULT_CLIENT_ID, DEFAULT_REFRESH_THRESHOLD, StaticTokenSource,
    TokenSource, hash_password,
};
pub use token::{CLOUD_WEBSOCKET_PORT, Token, TokenClaims, base64url_decode};
