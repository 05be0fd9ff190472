//! Router and page handlers.

use axum::{
    Form, Router,
    extract::{Query, Request, State},
    http::{StatusCode, Uri, uri::PathAndQuery},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::SignedCookieJar;
use chrono::{DateTime, Utc};
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::diagnostics::HostFacts;
use crate::error::PanicResponder;
use crate::faults::FaultKind;
use crate::telemetry::LogEvent;
use crate::web::api::{self, Params, first_param};
use crate::web::middleware::{
    AppState, Identity, RETURN_URL_PARAM, auth_gate, exception_handler, login_redirect,
};
use crate::web::templates::{
    AboutTemplate, AccessDeniedTemplate, BaseContext, DashboardTemplate, ErrorTemplate,
    ErrorTestingTemplate, FaultOption, IndexTemplate, LoginTemplate, NotFoundTemplate, render,
    render_with_status,
};

/// Where a successful login lands when no usable return path was given.
const DEFAULT_LANDING: &str = "/Home/Dashboard";

const INVALID_CREDENTIALS: &str = "Invalid username or password. Try admin/password";

/// Every routed path in its canonical spelling.
const ROUTES: &[&str] = &[
    "/",
    "/Home",
    "/Home/Index",
    "/Home/Dashboard",
    "/Home/About",
    "/Home/ErrorTesting",
    "/Home/Error",
    "/Account/Login",
    "/Account/Logout",
    "/Account/AccessDenied",
    "/api/healthcheck",
    "/api/metrics",
    "/api/git-info",
    "/api/trigger-error",
    "/health",
];

/// Canonical spelling of `path`: matched case-insensitively, trailing slashes ignored.
pub fn canonical_route(path: &str) -> Option<&'static str> {
    let trimmed = path.trim_end_matches('/');
    let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
    ROUTES
        .iter()
        .find(|route| route.eq_ignore_ascii_case(trimmed))
        .copied()
}

/// Rewrite a known path to its canonical spelling, keeping the query string.
fn canonicalize_path(mut request: Request) -> Request {
    let Some(route) = canonical_route(request.uri().path()) else {
        return request;
    };
    if route == request.uri().path() {
        return request;
    }

    let path_and_query = match request.uri().query() {
        Some(query) => format!("{route}?{query}"),
        None => route.to_string(),
    };
    let mut parts = request.uri().clone().into_parts();
    parts.path_and_query = PathAndQuery::try_from(path_and_query).ok();
    if let Ok(uri) = Uri::from_parts(parts) {
        *request.uri_mut() = uri;
    }
    request
}

/// Build the application router with its middleware stack.
///
/// Paths are put into their canonical spelling before routing, so the auth
/// gate and the routes agree on `/home/dashboard` and `/Home/Dashboard/`.
pub fn app_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(index))
        .route("/Home", get(index))
        .route("/Home/Index", get(index))
        .route("/Home/Dashboard", get(dashboard))
        .route("/Home/About", get(about))
        .route("/Home/ErrorTesting", get(error_testing))
        .route("/Home/Error", get(error_page))
        .route("/Account/Login", get(login_page).post(login_submit))
        .route("/Account/Logout", post(logout))
        .route("/Account/AccessDenied", get(access_denied))
        .route("/api/healthcheck", get(api::healthcheck))
        .route("/api/metrics", get(api::metrics))
        .route("/api/git-info", get(api::git_info))
        .route("/api/trigger-error", post(api::trigger_error))
        .route("/health", get(api::health))
        .fallback(not_found)
        .layer(CatchPanicLayer::custom(PanicResponder))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            exception_handler,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
        .with_state(state);

    Router::new()
        .fallback_service(routes.map_request(canonicalize_path as fn(Request) -> Request))
        .layer(TraceLayer::new_for_http())
}

fn base(identity: &Identity) -> BaseContext {
    BaseContext {
        username: identity.session().map(|s| s.identity.clone()),
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Whether `url` stays on this site: a single leading `/`, not `//` or `/\`.
pub fn is_local_url(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.starts_with("/\\")
}

async fn index(identity: Identity) -> Response {
    render(&IndexTemplate {
        base: base(&identity),
        facts: HostFacts::gather(),
        is_authenticated: identity.is_authenticated(),
    })
}

async fn dashboard(State(state): State<AppState>, identity: Identity) -> Response {
    let Some(session) = identity.session() else {
        return Redirect::to(&login_redirect(DEFAULT_LANDING)).into_response();
    };

    state.events.emit(
        LogEvent::info("Dashboard accessed")
            .field("user", &session.identity)
            .field("git_sha", &state.settings.deployment.git_commit_sha),
    );

    render(&DashboardTemplate {
        base: base(&identity),
        facts: HostFacts::gather(),
        current_user: session.identity.clone(),
        role: session.role.clone(),
        login_time: timestamp(session.issued_at),
        session_expires: timestamp(session.expires_at),
    })
}

async fn about(State(state): State<AppState>, identity: Identity) -> Response {
    render(&AboutTemplate {
        base: base(&identity),
        version: state.settings.version,
    })
}

async fn error_testing(identity: Identity) -> Response {
    let faults = FaultKind::ALL
        .into_iter()
        .map(|kind| FaultOption {
            selector: kind.selector(),
            description: kind.description(),
            panics: kind.panics(),
        })
        .collect();

    render(&ErrorTestingTemplate {
        base: base(&identity),
        faults,
    })
}

async fn error_page() -> Response {
    render(&ErrorTemplate {
        request_id: Some(Uuid::new_v4().to_string()),
        detail: None,
    })
}

async fn access_denied(identity: Identity) -> Response {
    render(&AccessDeniedTemplate {
        base: base(&identity),
    })
}

async fn not_found(uri: Uri) -> Response {
    render_with_status(
        StatusCode::NOT_FOUND,
        &NotFoundTemplate {
            path: uri.path().to_string(),
        },
    )
}

/// Login page handler.
async fn login_page(Query(query): Query<Params>) -> Response {
    render(&LoginTemplate {
        error: None,
        return_url: first_param(&query, &[RETURN_URL_PARAM, "returnUrl"]),
    })
}

/// Login form data. Missing fields read as empty; repeated fields keep the first value.
#[derive(Debug)]
pub struct LoginForm {
    username: String,
    password: String,
    return_url: Option<String>,
}

impl LoginForm {
    fn from_params(params: &[(String, String)]) -> Self {
        Self {
            username: first_param(params, &["username"]).unwrap_or_default(),
            password: first_param(params, &["password"]).unwrap_or_default(),
            return_url: first_param(params, &["returnUrl", RETURN_URL_PARAM]),
        }
    }
}

/// Login form submission handler.
async fn login_submit(
    State(state): State<AppState>,
    jar: SignedCookieJar,
    Form(params): Form<Params>,
) -> Response {
    let form = LoginForm::from_params(&params);
    let return_url = form.return_url.filter(|url| !url.is_empty());

    if !state.credentials.check(&form.username, &form.password) {
        state.events.emit(
            LogEvent::warn("Failed login attempt").field("username", &form.username),
        );
        return render(&LoginTemplate {
            error: Some(INVALID_CREDENTIALS.to_string()),
            return_url,
        });
    }

    let (jar, session) = match state.sessions.issue(jar, &form.username, Utc::now()) {
        Ok(issued) => issued,
        Err(e) => {
            state.events.emit(
                LogEvent::error("Failed to issue session")
                    .field("username", &form.username)
                    .field("error", format!("{e:#}")),
            );
            return render(&LoginTemplate {
                error: Some("An error occurred. Please try again.".to_string()),
                return_url,
            });
        }
    };

    state.events.emit(
        LogEvent::info("User logged in")
            .field("user", &session.identity)
            .field("expires_at", session.expires_at.to_rfc3339()),
    );

    let target = return_url
        .filter(|url| is_local_url(url))
        .unwrap_or_else(|| DEFAULT_LANDING.to_string());
    (jar, Redirect::to(&target)).into_response()
}

/// Logout handler.
async fn logout(
    State(state): State<AppState>,
    identity: Identity,
    jar: SignedCookieJar,
) -> Response {
    state
        .events
        .emit(LogEvent::info("User logged out").field("user", identity.name()));

    (state.sessions.clear(jar), Redirect::to("/")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_route() {
        assert_eq!(canonical_route("/home/dashboard"), Some("/Home/Dashboard"));
        assert_eq!(canonical_route("/Home/Dashboard/"), Some("/Home/Dashboard"));
        assert_eq!(canonical_route("/ACCOUNT/LOGIN"), Some("/Account/Login"));
        assert_eq!(canonical_route("/API/Git-Info"), Some("/api/git-info"));
        assert_eq!(canonical_route("//"), Some("/"));
        assert_eq!(canonical_route("/Home/Dashboards"), None);
    }

    #[test]
    fn test_canonicalize_keeps_query() {
        let request = axum::http::Request::builder()
            .uri("/account/login/?ReturnUrl=%2FHome%2FAbout")
            .body(axum::body::Body::empty())
            .unwrap();
        let request = canonicalize_path(request);
        assert_eq!(request.uri().path(), "/Account/Login");
        assert_eq!(request.uri().query(), Some("ReturnUrl=%2FHome%2FAbout"));
    }

    #[test]
    fn test_login_form_keeps_first_value() {
        let params = vec![
            ("username".to_string(), "admin".to_string()),
            ("returnUrl".to_string(), "/Home/About".to_string()),
            ("returnUrl".to_string(), "/Home/Dashboard".to_string()),
        ];
        let form = LoginForm::from_params(&params);
        assert_eq!(form.username, "admin");
        assert_eq!(form.password, "");
        assert_eq!(form.return_url.as_deref(), Some("/Home/About"));
    }

    #[test]
    fn test_is_local_url() {
        assert!(is_local_url("/Home/Dashboard"));
        assert!(is_local_url("/"));
        assert!(!is_local_url("//evil.example"));
        assert!(!is_local_url("/\\evil.example"));
        assert!(!is_local_url("https://evil.example/"));
        assert!(!is_local_url(""));
    }
}
