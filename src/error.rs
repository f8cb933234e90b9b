use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Canonical error surface for the client.
///
/// Classification is final: nothing in this crate retries a failed call, and
/// the external tool's message text is carried through untouched so callers
/// can diagnose it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The session is expired at the gate, or the external tool reported an
    /// authentication failure. Recoverable by signing in again.
    #[error("session error: {message}")]
    Session { message: String },

    /// Any other classified failure: not-found, malformed arguments,
    /// transport-level failure, unparseable payload.
    #[error("query error: {message}")]
    Query { message: String },

    /// No distribution artifact exists for this platform. Fatal.
    #[error("platform '{platform}' is not yet supported")]
    PlatformNotSupported { platform: String },

    /// Downloading or unpacking the executable failed.
    #[error("install failed: {reason}")]
    Install { reason: String },
}

impl ClientError {
    pub(crate) fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    pub(crate) fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    pub(crate) fn install(reason: impl Into<String>) -> Self {
        Self::Install {
            reason: reason.into(),
        }
    }

    /// True for failures a caller can recover from by re-authenticating.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session { .. })
    }
}
