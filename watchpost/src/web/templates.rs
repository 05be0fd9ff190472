//! Askama templates for the pages.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

use crate::diagnostics::HostFacts;

/// Base data available to all templates
pub struct BaseContext {
    /// Signed-in user, if any
    pub username: Option<String>,
}

/// Landing page template
#[derive(Template)]
#[template(path = "home/index.html")]
pub struct IndexTemplate {
    pub base: BaseContext,
    pub facts: HostFacts,
    pub is_authenticated: bool,
}

/// Dashboard page template
#[derive(Template)]
#[template(path = "home/dashboard.html")]
pub struct DashboardTemplate {
    pub base: BaseContext,
    pub facts: HostFacts,
    pub current_user: String,
    pub role: String,
    pub login_time: String,
    pub session_expires: String,
}

#[derive(Template)]
#[template(path = "home/about.html")]
pub struct AboutTemplate {
    pub base: BaseContext,
    pub version: &'static str,
}

/// One row of the fault catalogue
pub struct FaultOption {
    pub selector: &'static str,
    pub description: &'static str,
    pub panics: bool,
}

/// Error testing page template
#[derive(Template)]
#[template(path = "home/error_testing.html")]
pub struct ErrorTestingTemplate {
    pub base: BaseContext,
    pub faults: Vec<FaultOption>,
}

/// Generic error page template
#[derive(Template)]
#[template(path = "home/error.html")]
pub struct ErrorTemplate {
    pub request_id: Option<String>,
    /// Shown only in the Development environment
    pub detail: Option<String>,
}

#[derive(Template)]
#[template(path = "home/not_found.html")]
pub struct NotFoundTemplate {
    pub path: String,
}

/// Login page template
#[derive(Template)]
#[template(path = "account/login.html")]
pub struct LoginTemplate {
    pub error: Option<String>,
    pub return_url: Option<String>,
}

#[derive(Template)]
#[template(path = "account/access_denied.html")]
pub struct AccessDeniedTemplate {
    pub base: BaseContext,
}

/// Render a template as a 200 HTML response.
pub fn render<T: Template>(template: &T) -> Response {
    render_with_status(StatusCode::OK, template)
}

/// Render a template as an HTML response with the given status.
pub fn render_with_status<T: Template>(status: StatusCode, template: &T) -> Response {
    (
        status,
        Html(
            template
                .render()
                .unwrap_or_else(|e| format!("Template error: {e}")),
        ),
    )
        .into_response()
}
