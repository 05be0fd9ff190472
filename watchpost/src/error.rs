//! Request-path errors and the report the top-level handler renders.
//!
//! Handlers return [`AppError`]; panics are caught by [`PanicResponder`].
//! Both produce a 500 response tagged with an [`UnhandledError`] extension,
//! which `web::middleware::exception_handler` turns into the error page.

use std::any::Any;

use axum::{
    body::Body,
    http::{Response, StatusCode},
    response::IntoResponse,
};
use thiserror::Error;
use tower_http::catch_panic::ResponseForPanic;

use crate::faults::FaultError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Fault(#[from] FaultError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Fault(fault) => fault.kind(),
            AppError::Internal(_) => "internal",
        }
    }
}

/// What reached the top of the stack: a category and the rendered message.
#[derive(Debug, Clone)]
pub struct UnhandledError {
    pub kind: String,
    pub message: String,
}

impl UnhandledError {
    fn into_tagged_response(self) -> axum::response::Response {
        let mut response = (
            StatusCode::INTERNAL_SERVER_ERROR,
            "An error occurred while processing your request.",
        )
            .into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        UnhandledError {
            kind: self.kind().to_string(),
            message: format!("{self:#}"),
        }
        .into_tagged_response()
    }
}

/// Turns a caught panic into a tagged 500 response.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanicResponder;

impl ResponseForPanic for PanicResponder {
    type ResponseBody = Body;

    fn response_for_panic(&mut self, err: Box<dyn Any + Send + 'static>) -> Response<Body> {
        UnhandledError {
            kind: "panic".to_string(),
            message: panic_message(err.as_ref()),
        }
        .into_tagged_response()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "panic with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_tags_response() {
        let err = AppError::from(FaultError::Timeout("too slow".to_string()));
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<UnhandledError>().unwrap();
        assert_eq!(report.kind, "timeout");
        assert_eq!(report.message, "The operation has timed out: too slow");
    }

    #[test]
    fn test_internal_error_keeps_context_chain() {
        let err = anyhow::anyhow!("root cause").context("Failed to read process statistics");
        let response = AppError::from(err).into_response();
        let report = response.extensions().get::<UnhandledError>().unwrap();
        assert_eq!(report.kind, "internal");
        assert_eq!(report.message, "Failed to read process statistics: root cause");
    }

    #[test]
    fn test_panic_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(owned.as_ref()), "owned message");

        let borrowed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(borrowed.as_ref()), "static message");

        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "panic with a non-string payload");
    }

    #[test]
    fn test_panic_responder_tags_response() {
        let response = PanicResponder.response_for_panic(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let report = response.extensions().get::<UnhandledError>().unwrap();
        assert_eq!(report.kind, "panic");
        assert_eq!(report.message, "boom");
    }
}
