//! Unified error types for the Switchboard core.
//!
//! Each concern owns one enum and a `Result` alias. The dispatch boundary
//! folds every one of them into a [`DispatchError`], which carries the
//! [`FailureCause`] reported in logs and in the terminal flush.

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that can occur in transport operations.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Binding a listener failed.
    #[error("failed to bind {addr}: {reason}")]
    BindFailed {
        /// The address that could not be bound.
        addr: String,
        /// Reason for failure.
        reason: String,
    },

    /// An outbound request could not be completed.
    #[error("request to {url} failed: {reason}")]
    RequestFailed {
        /// Target URL.
        url: String,
        /// Reason for failure.
        reason: String,
    },

    /// The remote end answered with a non-success status.
    #[error("request to {url} answered HTTP {status}: {body}")]
    Status {
        /// Target URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Transport not available.
    #[error("transport '{transport}' not available")]
    NotAvailable {
        /// The transport type that's not available.
        transport: &'static str,
    },

    /// Invalid configuration.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns true when retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed { .. } | Self::Io(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// Adapter Errors
// =============================================================================

/// Errors that can occur in adapter operations.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// Inbound payload could not be parsed.
    #[error("failed to parse inbound payload: {reason}")]
    ParseError {
        /// Reason for failure.
        reason: String,
    },

    /// Outbound delivery of a single message failed.
    #[error("delivery failed: {reason}")]
    Delivery {
        /// Reason for failure.
        reason: String,
    },

    /// Invalid adapter configuration.
    #[error("invalid adapter configuration: {0}")]
    InvalidConfig(String),

    /// Internal adapter error.
    #[error("adapter error: {0}")]
    Internal(String),

    /// Transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AdapterError {
    /// Creates an internal adapter error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Creates a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError { reason: msg.into() }
    }

    /// Creates a delivery error.
    pub fn delivery(msg: impl Into<String>) -> Self {
        Self::Delivery { reason: msg.into() }
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        Self::parse(err.to_string())
    }
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors raised by a conversation store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The storage backend is unavailable or rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored record could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A target record is missing.
    #[error("timeline '{key}' not found")]
    NotFound {
        /// The timeline key.
        key: String,
    },
}

impl StoreError {
    /// Creates a backend error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

// =============================================================================
// Authentication Errors
// =============================================================================

/// Reasons a signed inbound request is rejected.
///
/// Variants are ordered like the checks that produce them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No authorization header.
    #[error("missing authorization token")]
    MissingToken,

    /// Authorization header does not use the bearer scheme.
    #[error("unsupported authorization scheme")]
    InvalidScheme,

    /// Token is not a well-formed compact JWS.
    #[error("malformed token: {reason}")]
    MalformedToken {
        /// Reason for failure.
        reason: String,
    },

    /// Issuer claim differs from the expected issuer.
    #[error("unexpected issuer '{found}'")]
    InvalidIssuer {
        /// Issuer found in the token.
        found: String,
    },

    /// Audience claim does not contain the application identifier.
    #[error("audience does not contain the application id")]
    InvalidAudience,

    /// Token is used before its `nbf` instant.
    #[error("token not yet valid")]
    NotYetValid,

    /// Token is used after its `exp` instant.
    #[error("token expired")]
    Expired,

    /// No currently valid key matches the token key id.
    #[error("unknown signing key '{kid}'")]
    UnknownKey {
        /// Key id from the token header.
        kid: String,
    },

    /// Algorithm is not supported.
    #[error("unsupported algorithm '{alg}'")]
    UnsupportedAlgorithm {
        /// Algorithm from the token header.
        alg: String,
    },

    /// Signature does not verify against the key.
    #[error("invalid signature")]
    InvalidSignature,

    /// A binding claim does not match the request body.
    #[error("claim '{claim}' does not match the request")]
    BindingMismatch {
        /// Claim name.
        claim: String,
    },

    /// A shared-secret header does not match the configured secret.
    #[error("shared secret does not match")]
    SecretMismatch,

    /// The key set could not be fetched or parsed.
    #[error("key set unavailable: {reason}")]
    KeySet {
        /// Reason for failure.
        reason: String,
    },
}

impl AuthError {
    /// Creates a malformed token error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedToken {
            reason: reason.into(),
        }
    }

    /// Creates a key set error.
    pub fn key_set(reason: impl Into<String>) -> Self {
        Self::KeySet {
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Dispatch Errors
// =============================================================================

/// Coarse failure category reported when a dispatch ends in `FAILED_RESPONDED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    /// Bot logic returned an error or panicked.
    Business,
    /// The timeline could not be loaded.
    Load,
    /// The timeline could not be saved; the answer was still delivered.
    Persistence,
    /// The user lock could not be acquired in time.
    LockTimeout,
    /// The whole dispatch exceeded its deadline.
    DispatchTimeout,
    /// The engine itself failed (lost worker, unknown application).
    Internal,
}

impl FailureCause {
    /// Returns a stable label for logs and response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Business => "business",
            Self::Load => "load",
            Self::Persistence => "persistence",
            Self::LockTimeout => "lock_timeout",
            Self::DispatchTimeout => "dispatch_timeout",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced at the dispatch boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Bot logic failed.
    #[error("bot logic failed: {0:#}")]
    Business(anyhow::Error),

    /// Loading the timeline failed.
    #[error("failed to load timeline: {0}")]
    Load(StoreError),

    /// Saving the timeline failed.
    #[error("failed to persist timeline: {0}")]
    Persistence(StoreError),

    /// The user lock was not acquired within the configured timeout.
    #[error("user '{user_id}' still locked after {waited_ms} ms")]
    LockTimeout {
        /// Locked user.
        user_id: String,
        /// Time waited.
        waited_ms: u64,
    },

    /// The dispatch exceeded its configured deadline.
    #[error("dispatch exceeded {limit_ms} ms")]
    DispatchTimeout {
        /// Configured deadline.
        limit_ms: u64,
    },

    /// No adapter is registered for the application id.
    #[error("no adapter registered for application '{0}'")]
    UnknownApplication(String),

    /// The worker running the dispatch was lost.
    #[error("dispatch worker lost: {0}")]
    WorkerLost(String),
}

impl DispatchError {
    /// Returns the failure category.
    pub fn cause(&self) -> FailureCause {
        match self {
            Self::Business(_) => FailureCause::Business,
            Self::Load(_) => FailureCause::Load,
            Self::Persistence(_) => FailureCause::Persistence,
            Self::LockTimeout { .. } => FailureCause::LockTimeout,
            Self::DispatchTimeout { .. } => FailureCause::DispatchTimeout,
            Self::UnknownApplication(_) | Self::WorkerLost(_) => FailureCause::Internal,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for authentication.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_transport_errors() {
        let server = TransportError::Status {
            url: "http://x".into(),
            status: 503,
            body: String::new(),
        };
        let client = TransportError::Status {
            url: "http://x".into(),
            status: 400,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(TransportError::Io("reset".into()).is_transient());
    }

    #[test]
    fn dispatch_error_causes() {
        let err = DispatchError::LockTimeout {
            user_id: "u1".into(),
            waited_ms: 10,
        };
        assert_eq!(err.cause(), FailureCause::LockTimeout);
        assert_eq!(
            DispatchError::Business(anyhow::anyhow!("boom")).cause(),
            FailureCause::Business
        );
        assert_eq!(FailureCause::Persistence.to_string(), "persistence");
    }
}
