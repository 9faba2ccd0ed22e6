#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorKind`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller-supplied data was rejected before any I/O happened.
    Input,
    /// Authentication / authorization failures.
    Auth,
    /// Failures of the byte carrier itself.
    Transport,
    /// The carrier worked but the peer answered outside the contract.
    Protocol,
    /// Device-level failures (unreachable, incompatible, unknown).
    Device,
    /// Encryption / decryption failures on backup envelopes.
    Crypto,
    /// Operation-lifecycle failures (cancellation, re-entrancy guards).
    Lifecycle,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Auth => "auth",
            Self::Transport => "transport",
            Self::Protocol => "protocol",
            Self::Device => "device",
            Self::Crypto => "crypto",
            Self::Lifecycle => "lifecycle",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorKind
// ---------------------------------------------------------------------------

/// Machine-readable, stable error kind.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    // -- Input --
    /// An argument value is invalid (bad index, unknown component kind, ...).
    InvalidArgument,
    /// The JWT could not be parsed or is structurally invalid.
    InvalidToken,
    /// The backup envelope could not be parsed or is structurally invalid.
    InvalidBackup,
    /// The backup envelope version is newer than this library supports.
    VersionMismatch,

    // -- Auth --
    /// Credentials were rejected by the peer (HTTP 401 after auth).
    Unauthorized,
    /// The authentication exchange itself failed (bad digest, bad login).
    AuthFailed,
    /// The device requires authentication but none was configured.
    AuthRequired,
    /// The token's `exp` claim is in the past.
    TokenExpired,
    /// The token has no `user_api_url` claim to route cloud calls with.
    NoUserEndpoint,

    // -- Transport --
    /// The request did not complete within the configured timeout.
    Timeout,
    /// The transport has been closed; no further calls are possible.
    Closed,
    /// A network-level failure (DNS, connect, reset, TLS).
    NetworkError,
    /// The peer rejected the request because of rate limiting (HTTP 429).
    RateLimited,
    /// The peer reported a server-side failure (HTTP 5xx).
    ServerError,

    // -- Protocol --
    /// The device returned a JSON-RPC error object.
    RpcError,
    /// An HTTP status outside the classified set was received.
    UnexpectedStatus,

    // -- Device --
    /// No device with the given id is known.
    DeviceNotFound,
    /// The device is known but currently unreachable.
    DeviceOffline,
    /// Source and target devices are not compatible for migration.
    IncompatibleDevices,
    /// The operation is not defined for the device's generation.
    UnsupportedGeneration,

    // -- Crypto --
    /// Encrypting a backup envelope failed.
    EncryptionFailed,
    /// Decrypting a backup envelope failed (wrong password, truncated data).
    DecryptionFailed,

    // -- Lifecycle --
    /// A migration is already in progress on this migrator.
    MigrationInProgress,
    /// The operation was cancelled via its cancellation token.
    Cancelled,
}

impl ErrorKind {
    /// Returns the broad [`ErrorCategory`] this kind belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument
            | Self::InvalidToken
            | Self::InvalidBackup
            | Self::VersionMismatch => ErrorCategory::Input,

            Self::Unauthorized
            | Self::AuthFailed
            | Self::AuthRequired
            | Self::TokenExpired
            | Self::NoUserEndpoint => ErrorCategory::Auth,

            Self::Timeout
            | Self::Closed
            | Self::NetworkError
            | Self::RateLimited
            | Self::ServerError => ErrorCategory::Transport,

            Self::RpcError | Self::UnexpectedStatus => ErrorCategory::Protocol,

            Self::DeviceNotFound
            | Self::DeviceOffline
            | Self::IncompatibleDevices
            | Self::UnsupportedGeneration => ErrorCategory::Device,

            Self::EncryptionFailed | Self::DecryptionFailed => ErrorCategory::Crypto,

            Self::MigrationInProgress | Self::Cancelled => ErrorCategory::Lifecycle,
        }
    }

    /// Stable `&'static str` representation of the kind (e.g.
    /// `"RATE_LIMITED"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidBackup => "INVALID_BACKUP",
            Self::VersionMismatch => "VERSION_MISMATCH",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AuthFailed => "AUTH_FAILED",
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::NoUserEndpoint => "NO_USER_ENDPOINT",
            Self::Timeout => "TIMEOUT",
            Self::Closed => "CLOSED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::RpcError => "RPC_ERROR",
            Self::UnexpectedStatus => "UNEXPECTED_STATUS",
            Self::DeviceNotFound => "DEVICE_NOT_FOUND",
            Self::DeviceOffline => "DEVICE_OFFLINE",
            Self::IncompatibleDevices => "INCOMPATIBLE_DEVICES",
            Self::UnsupportedGeneration => "UNSUPPORTED_GENERATION",
            Self::EncryptionFailed => "ENCRYPTION_FAILED",
            Self::DecryptionFailed => "DECRYPTION_FAILED",
            Self::MigrationInProgress => "MIGRATION_IN_PROGRESS",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Unified Shelly Connect error.
///
/// Carries a stable [`ErrorKind`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use shc_error::{Error, ErrorKind};
///
/// let err = Error::new(ErrorKind::Timeout, "no response within 30 s")
///     .with_context("device", "shellyplus1-a8032ab12345")
///     .with_context("timeout_ms", 30_000);
/// ```
pub struct Error {
    /// Machine-readable error kind.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Shorthand for a [`ErrorKind::Cancelled`] error.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.kind.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns `true` if this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Error");
        d.field("kind", &self.kind);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Convenience result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of an [`Error`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorDto {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&Error> for ErrorDto {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<ErrorDto> for Error {
    fn from(dto: ErrorDto) -> Self {
        Self {
            kind: dto.kind,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
