//! Authentication: the credential check and the signed session cookie.
//!
//! Sessions are not stored on the server. The whole [`Session`] record is
//! serialized into the cookie value and signed with the application key, so
//! a tampered cookie simply fails verification and reads as anonymous.

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, SameSite, SignedCookieJar};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Cookie name for the signed session
pub const SESSION_COOKIE: &str = "watchpost_session";

/// Role granted to every signed-in user
pub const ADMIN_ROLE: &str = "Admin";

/// Upper bound on the inactivity window (ten years)
const MAX_TIMEOUT_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Validates a submitted username/password pair.
pub trait CredentialChecker: Send + Sync {
    fn check(&self, username: &str, password: &str) -> bool;
}

/// The single hardcoded account. Not a security boundary.
#[derive(Debug, Clone, Copy)]
pub struct FixedCredentials {
    username: &'static str,
    password: &'static str,
}

impl FixedCredentials {
    pub const fn new(username: &'static str, password: &'static str) -> Self {
        Self { username, password }
    }
}

impl Default for FixedCredentials {
    fn default() -> Self {
        Self::new("admin", "password")
    }
}

impl CredentialChecker for FixedCredentials {
    fn check(&self, username: &str, password: &str) -> bool {
        username == self.username && password == self.password
    }
}

/// Session record carried inside the signed cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub identity: String,
    pub role: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(identity: &str, role: &str, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            identity: identity.to_string(),
            role: role.to_string(),
            issued_at: now,
            expires_at: now + timeout,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Same session with the inactivity window restarted at `now`.
    pub fn slide(&self, now: DateTime<Utc>, timeout: Duration) -> Self {
        Self {
            expires_at: now + timeout,
            ..self.clone()
        }
    }

    fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self).context("Failed to serialize session")?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    fn decode(value: &str) -> Option<Self> {
        let json = URL_SAFE_NO_PAD.decode(value).ok()?;
        serde_json::from_slice(&json).ok()
    }
}

/// Result of looking at the session cookie on a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No cookie, or one that failed verification or decoding
    Missing,
    /// A valid cookie whose inactivity window has passed
    Expired(Session),
    Active(Session),
}

/// Issues, reads and clears the signed session cookie.
#[derive(Debug, Clone)]
pub struct SessionStore {
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::seconds(
                i64::try_from(timeout_secs)
                    .unwrap_or(MAX_TIMEOUT_SECS)
                    .min(MAX_TIMEOUT_SECS),
            ),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start a session for `identity` and add its cookie to the jar.
    pub fn issue(
        &self,
        jar: SignedCookieJar,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<(SignedCookieJar, Session)> {
        let session = Session::new(identity, ADMIN_ROLE, now, self.timeout);
        let jar = self.write(jar, &session)?;
        Ok((jar, session))
    }

    /// Re-issue an active session with its expiry moved to `now + timeout`.
    pub fn refresh(
        &self,
        jar: SignedCookieJar,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<(SignedCookieJar, Session)> {
        let session = session.slide(now, self.timeout);
        let jar = self.write(jar, &session)?;
        Ok((jar, session))
    }

    /// Add the cookie for an existing session record.
    pub fn write(&self, jar: SignedCookieJar, session: &Session) -> Result<SignedCookieJar> {
        let cookie = Cookie::build((SESSION_COOKIE, session.encode()?))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax);
        Ok(jar.add(cookie))
    }

    /// Verified session record, regardless of expiry.
    pub fn read(&self, jar: &SignedCookieJar) -> Option<Session> {
        let cookie = jar.get(SESSION_COOKIE)?;
        Session::decode(cookie.value())
    }

    pub fn validate(&self, jar: &SignedCookieJar, now: DateTime<Utc>) -> SessionState {
        match self.read(jar) {
            None => SessionState::Missing,
            Some(session) if session.is_expired(now) => SessionState::Expired(session),
            Some(session) => SessionState::Active(session),
        }
    }

    /// Remove the session cookie (logout or expiry).
    pub fn clear(&self, jar: SignedCookieJar) -> SignedCookieJar {
        jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
    }
}
