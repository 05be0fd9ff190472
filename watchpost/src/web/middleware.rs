//! Application state, the auth gate, and the top-level error handler.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Key, SignedCookieJar};
use chrono::Utc;
use uuid::Uuid;

use crate::config::{Settings, UNKNOWN};
use crate::diagnostics::DiagnosticsCollector;
use crate::error::UnhandledError;
use crate::health::HealthRegistry;
use crate::telemetry::{EventLog, LogEvent};
use crate::web::auth::{CredentialChecker, SESSION_COOKIE, Session, SessionState, SessionStore};
use crate::web::templates::{ErrorTemplate, render_with_status};

/// Login page; unauthenticated requests for protected paths are sent here.
pub const LOGIN_PATH: &str = "/Account/Login";

/// Query parameter carrying the path to return to after login.
pub const RETURN_URL_PARAM: &str = "ReturnUrl";

/// Paths that require an authenticated session.
pub const PROTECTED_PATHS: &[&str] = &["/Home/Dashboard"];

/// State shared by all routes
#[derive(Clone)]
pub struct AppState {
    /// Read-only settings loaded at startup
    pub settings: Arc<Settings>,
    /// Username/password check for the login form
    pub credentials: Arc<dyn CredentialChecker>,
    /// Signed session cookie handling
    pub sessions: Arc<SessionStore>,
    /// Process and host statistics
    pub diagnostics: Arc<DiagnosticsCollector>,
    /// Checks aggregated behind `/health`
    pub health: Arc<HealthRegistry>,
    /// Application event sink
    pub events: Arc<dyn EventLog>,
    /// Key signing the session cookie
    pub cookie_key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.cookie_key.clone()
    }
}

/// Who is making the request, as resolved by [`auth_gate`].
#[derive(Debug, Clone, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(Session),
}

impl Identity {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }

    /// Display name, `Anonymous` when signed out.
    pub fn name(&self) -> &str {
        match self {
            Identity::Anonymous => "Anonymous",
            Identity::Authenticated(session) => &session.identity,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(session) => Some(session),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Identity>().cloned().unwrap_or_default())
    }
}

/// Client address: first `X-Forwarded-For` hop, else the socket peer.
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        let ip = match forwarded {
            Some(ip) => ip.to_string(),
            None => parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        };

        Ok(ClientIp(ip))
    }
}

/// Whether `path` is in [`PROTECTED_PATHS`] (case-insensitive, trailing slash ignored).
pub fn is_protected(path: &str) -> bool {
    let path = path.trim_end_matches('/');
    PROTECTED_PATHS
        .iter()
        .any(|protected| protected.eq_ignore_ascii_case(path))
}

/// Login URL that returns to `return_url` afterwards.
pub fn login_redirect(return_url: &str) -> String {
    format!(
        "{LOGIN_PATH}?{RETURN_URL_PARAM}={}",
        urlencoding::encode(return_url)
    )
}

/// Whether a response already carries a `Set-Cookie` for the session.
fn sets_session_cookie(response: &Response) -> bool {
    let prefix = format!("{SESSION_COOKIE}=");
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.starts_with(&prefix))
}

/// Resolve the session cookie into an [`Identity`], slide its expiry, and
/// send anonymous requests for protected paths to the login page.
pub async fn auth_gate(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let now = Utc::now();

    let (identity, jar) = match state.sessions.validate(&jar, now) {
        SessionState::Active(session) => match state.sessions.refresh(jar.clone(), &session, now) {
            Ok((jar, session)) => (Identity::Authenticated(session), jar),
            Err(e) => {
                state.events.emit(
                    LogEvent::error("Failed to refresh session")
                        .field("user", &session.identity)
                        .field("error", e),
                );
                (Identity::Authenticated(session), jar)
            }
        },
        SessionState::Expired(session) => {
            state.events.emit(
                LogEvent::info("Session expired")
                    .field("user", &session.identity)
                    .field("expired_at", session.expires_at.to_rfc3339()),
            );
            (Identity::Anonymous, state.sessions.clear(jar))
        }
        SessionState::Missing => (Identity::Anonymous, jar),
    };

    if !identity.is_authenticated() && is_protected(request.uri().path()) {
        let return_url = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        state.events.emit(
            LogEvent::debug("Redirecting anonymous request to login").field("path", return_url),
        );
        return (jar, Redirect::to(&login_redirect(return_url))).into_response();
    }

    request.extensions_mut().insert(identity);
    let response = next.run(request).await;

    if sets_session_cookie(&response) {
        response
    } else {
        (jar, response).into_response()
    }
}

/// Render any response tagged with an [`UnhandledError`] as the error page.
///
/// The report is logged after the failure has propagated; the client sees a
/// generic page with a request id and, in `Development`, the message.
pub async fn exception_handler(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let Some(report) = response.extensions().get::<UnhandledError>().cloned() else {
        return response;
    };

    let request_id = Uuid::new_v4().to_string();
    state.events.emit(
        LogEvent::error("Unhandled error reached the top-level handler")
            .field("request_id", &request_id)
            .field("method", &method)
            .field("path", &path)
            .field("kind", &report.kind)
            .field("error", &report.message),
    );

    let template = ErrorTemplate {
        request_id: Some(request_id.clone()),
        detail: state
            .settings
            .is_development()
            .then(|| format!("{}: {}", report.kind, report.message)),
    };
    let mut page = render_with_status(response.status(), &template);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        page.headers_mut().insert("x-request-id", value);
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_protected() {
        assert!(is_protected("/Home/Dashboard"));
        assert!(is_protected("/home/dashboard/"));
        assert!(!is_protected("/Home/Index"));
        assert!(!is_protected("/Home/Dashboards"));
        assert!(!is_protected("/"));
    }

    #[test]
    fn test_login_redirect_encodes_return_url() {
        assert_eq!(
            login_redirect("/Home/Dashboard?tab=a&b=c"),
            "/Account/Login?ReturnUrl=%2FHome%2FDashboard%3Ftab%3Da%26b%3Dc"
        );
    }

    #[test]
    fn test_anonymous_identity_name() {
        assert_eq!(Identity::Anonymous.name(), "Anonymous");
        assert!(!Identity::default().is_authenticated());
    }
}
