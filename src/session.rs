use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

/// Sessions expire 29 minutes after creation, a conservative margin under
/// the external tool's own 30-minute session lifetime. Never renewed;
/// re-authentication is the caller's responsibility.
pub const SESSION_TTL_MINUTES: i64 = 29;

/// Sign-in material. Transient: used once to produce a `Session` and never
/// persisted by this crate.
#[derive(Clone)]
pub struct Credentials {
    pub domain: String,
    pub email: String,
    pub secret_key: String,
    pub master_password: String,
}

// Secrets stay out of Debug output.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("email", &self.email)
            .field("secret_key", &"[REDACTED]")
            .field("master_password", &"[REDACTED]")
            .finish()
    }
}

/// A time-bounded authentication credential. Immutable after creation and
/// safely shared by reference; discard it when done, there is no server-side
/// revoke in scope.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    pub email: String,
    pub expires_at: DateTime<Utc>,
    /// Installation directory the session's executable was resolved from.
    pub install_dir: PathBuf,
}

impl Session {
    /// A session is valid iff the current time is before its expiry.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"[REDACTED]")
            .field("email", &self.email)
            .field("expires_at", &self.expires_at)
            .field("install_dir", &self.install_dir)
            .finish()
    }
}

pub(crate) fn token_expiration(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::minutes(SESSION_TTL_MINUTES)
}
