//! Deliberate fault injection.
//!
//! Each [`FaultKind`] produces one category of failure so an external
//! monitoring pipeline can be checked for what it captures. Some kinds
//! return a [`FaultError`]; the others panic the way the equivalent
//! programming mistake would.

use std::fmt;
use std::hint::black_box;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use thiserror::Error;

/// The catalogue of faults, keyed by the `errorType` selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    NullReference,
    ArgumentNull,
    InvalidOperation,
    DivideByZero,
    OutOfRange,
    Custom,
    Timeout,
    Aggregate,
    Generic,
}

impl FaultKind {
    pub const ALL: [FaultKind; 9] = [
        FaultKind::NullReference,
        FaultKind::ArgumentNull,
        FaultKind::InvalidOperation,
        FaultKind::DivideByZero,
        FaultKind::OutOfRange,
        FaultKind::Custom,
        FaultKind::Timeout,
        FaultKind::Aggregate,
        FaultKind::Generic,
    ];

    /// Selector used when the request names none.
    pub const DEFAULT_SELECTOR: &'static str = "exception";

    /// Resolve a selector, case-insensitively. Unknown selectors are `Generic`.
    pub fn parse(selector: &str) -> Self {
        let selector = selector.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.selector().eq_ignore_ascii_case(selector))
            .unwrap_or(FaultKind::Generic)
    }

    pub fn selector(self) -> &'static str {
        match self {
            FaultKind::NullReference => "nullreference",
            FaultKind::ArgumentNull => "argumentnull",
            FaultKind::InvalidOperation => "invalidoperation",
            FaultKind::DivideByZero => "dividebyzero",
            FaultKind::OutOfRange => "outofrange",
            FaultKind::Custom => "custom",
            FaultKind::Timeout => "timeout",
            FaultKind::Aggregate => "aggregate",
            FaultKind::Generic => Self::DEFAULT_SELECTOR,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            FaultKind::NullReference => "Read through a value that is not there",
            FaultKind::ArgumentNull => "A required argument is missing",
            FaultKind::InvalidOperation => "Take the first element of an empty collection",
            FaultKind::DivideByZero => "Integer division by zero",
            FaultKind::OutOfRange => "Index past the end of an array",
            FaultKind::Custom => "Application error naming the user and commit",
            FaultKind::Timeout => "Simulated timeout",
            FaultKind::Aggregate => "Several errors wrapped into one",
            FaultKind::Generic => "Generic error",
        }
    }

    /// Whether this fault unwinds as a panic instead of returning an error.
    pub fn panics(self) -> bool {
        matches!(
            self,
            FaultKind::NullReference
                | FaultKind::InvalidOperation
                | FaultKind::DivideByZero
                | FaultKind::OutOfRange
        )
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.selector())
    }
}

/// Faults that propagate as error values.
#[derive(Debug, Error)]
pub enum FaultError {
    #[error("Value cannot be null. (Parameter '{parameter}') {message}")]
    ArgumentNull { parameter: String, message: String },

    #[error("{0}")]
    Application(String),

    #[error("The operation has timed out: {0}")]
    Timeout(String),

    #[error("One or more errors occurred. {}", summarize(.0))]
    Aggregate(Vec<FaultError>),

    #[error("{0}")]
    Generic(String),
}

fn summarize(errors: &[FaultError]) -> String {
    errors
        .iter()
        .map(|e| format!("({e})"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl FaultError {
    /// Short category name used in logs and on the error page.
    pub fn kind(&self) -> &'static str {
        match self {
            FaultError::ArgumentNull { .. } => "argument_null",
            FaultError::Application(_) => "application",
            FaultError::Timeout(_) => "timeout",
            FaultError::Aggregate(_) => "aggregate",
            FaultError::Generic(_) => "generic",
        }
    }
}

/// Who triggered the fault and against which build.
#[derive(Debug, Clone)]
pub struct FaultContext {
    pub user: String,
    pub git_sha: String,
    pub at: DateTime<Utc>,
}

/// Produce the requested fault.
///
/// Never returns `Ok` for any kind in the catalogue; the `Ok` type exists so
/// the panicking kinds read like the handler code they imitate.
pub fn trigger(kind: FaultKind, ctx: &FaultContext) -> Result<Value, FaultError> {
    match kind {
        FaultKind::NullReference => {
            let missing: Option<String> = black_box(None);
            let length = missing
                .expect("null reference: attempted to read the length of a missing value")
                .len();
            Ok(json!({ "length": length }))
        }
        FaultKind::ArgumentNull => Err(FaultError::ArgumentNull {
            parameter: "testParameter".to_string(),
            message: "This is a test missing-argument error for monitoring".to_string(),
        }),
        FaultKind::InvalidOperation => {
            let empty: Vec<String> = black_box(Vec::new());
            let first = empty
                .first()
                .expect("invalid operation: sequence contains no elements");
            Ok(json!({ "first": first }))
        }
        FaultKind::DivideByZero => {
            let zero: i32 = black_box(0);
            Ok(json!({ "result": 10 / zero }))
        }
        FaultKind::OutOfRange => {
            let values = [1, 2, 3];
            let index: usize = black_box(10);
            Ok(json!({ "value": values[index] }))
        }
        FaultKind::Custom => Err(FaultError::Application(format!(
            "Custom test error triggered by {} at {} (Git SHA: {})",
            ctx.user,
            ctx.at.to_rfc3339(),
            ctx.git_sha
        ))),
        FaultKind::Timeout => Err(FaultError::Timeout(
            "Simulated timeout error for monitoring".to_string(),
        )),
        FaultKind::Aggregate => Err(FaultError::Aggregate(vec![
            FaultError::Timeout("Simulated upstream timeout".to_string()),
            FaultError::Application(format!("Simulated failure for {}", ctx.user)),
            FaultError::ArgumentNull {
                parameter: "payload".to_string(),
                message: "Simulated missing payload".to_string(),
            },
        ])),
        FaultKind::Generic => Err(FaultError::Generic(format!(
            "Generic test exception triggered by {} at {} (Git SHA: {}) - This is for error monitoring testing",
            ctx.user,
            ctx.at.to_rfc3339(),
            ctx.git_sha
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    fn ctx() -> FaultContext {
        FaultContext {
            user: "admin".to_string(),
            git_sha: "abc123".to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(FaultKind::parse("NullReference"), FaultKind::NullReference);
        assert_eq!(FaultKind::parse("DIVIDEBYZERO"), FaultKind::DivideByZero);
        assert_eq!(FaultKind::parse(" timeout "), FaultKind::Timeout);
    }

    #[test]
    fn test_unknown_selector_is_generic() {
        assert_eq!(FaultKind::parse("exception"), FaultKind::Generic);
        assert_eq!(FaultKind::parse("no-such-fault"), FaultKind::Generic);
        assert_eq!(FaultKind::parse(""), FaultKind::Generic);
    }

    #[test]
    fn test_selectors_round_trip() {
        for kind in FaultKind::ALL {
            assert_eq!(FaultKind::parse(kind.selector()), kind);
        }
    }

    #[test]
    fn test_panicking_kinds_panic() {
        let ctx = ctx();
        for kind in FaultKind::ALL.into_iter().filter(|k| k.panics()) {
            let result = panic::catch_unwind(|| trigger(kind, &ctx));
            assert!(result.is_err(), "{kind} should panic");
        }
    }

    #[test]
    fn test_error_kinds_return_errors() {
        let ctx = ctx();
        for kind in FaultKind::ALL.into_iter().filter(|k| !k.panics()) {
            assert!(trigger(kind, &ctx).is_err(), "{kind} should return an error");
        }
    }

    #[test]
    fn test_custom_error_names_user_and_sha() {
        let err = trigger(FaultKind::Custom, &ctx()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("admin"));
        assert!(message.contains("abc123"));
        assert_eq!(err.kind(), "application");
    }

    #[test]
    fn test_aggregate_lists_inner_errors() {
        let err = trigger(FaultKind::Aggregate, &ctx()).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("One or more errors occurred."));
        assert!(message.contains("(The operation has timed out: Simulated upstream timeout)"));
        assert!(message.contains("Parameter 'payload'"));
    }
}
