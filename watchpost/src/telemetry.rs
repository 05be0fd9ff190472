//! Application event logging.
//!
//! Handlers never reach for a global logger. They receive an [`EventLog`]
//! through the application state and emit [`LogEvent`]s into it; the
//! production sink forwards every event to `tracing` with its fields attached.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Severity of an application event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// A structured application event: a message plus named fields.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub fields: Vec<(&'static str, String)>,
    pub at: DateTime<Utc>,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn debug(message: impl Into<String>) -> Self {
        Self::new(Severity::Debug, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Severity::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Attach a named field.
    pub fn field(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Look up a field value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Renders the fields as `key=value` pairs, quoting values with spaces.
struct Fields<'a>(&'a [(&'static str, String)]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if value.is_empty() || value.contains(char::is_whitespace) {
                write!(f, "{key}={value:?}")?;
            } else {
                write!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}

/// Destination for application events.
pub trait EventLog: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Keys recorded as their own `tracing` fields; everything else goes into `fields`.
const RECORDED_KEYS: [&str; 4] = ["user", "error_type", "git_sha", "client_ip"];

/// Forwards events to the `tracing` subscriber installed at startup.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn emit(&self, event: LogEvent) {
        let user = event.get("user");
        let error_type = event.get("error_type");
        let git_sha = event.get("git_sha");
        let client_ip = event.get("client_ip");

        let rest: Vec<(&'static str, String)> = event
            .fields
            .iter()
            .filter(|(key, _)| !RECORDED_KEYS.contains(key))
            .cloned()
            .collect();
        let fields = Fields(&rest);

        macro_rules! forward {
            ($level:ident) => {
                tracing::$level!(
                    target: "watchpost::events",
                    user,
                    error_type,
                    git_sha,
                    client_ip,
                    %fields,
                    "{}",
                    event.message
                )
            };
        }

        match event.severity {
            Severity::Debug => forward!(debug),
            Severity::Info => forward!(info),
            Severity::Warn => forward!(warn),
            Severity::Error => forward!(error),
        }
    }
}

/// Keeps events in memory so callers can inspect what was logged.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: Mutex<Vec<LogEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded so far, oldest first.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Events whose message contains `needle`.
    pub fn matching(&self, needle: &str) -> Vec<LogEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.message.contains(needle))
            .collect()
    }
}

impl EventLog for MemoryEventLog {
    fn emit(&self, event: LogEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing::field::{Field, Visit};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

    /// Records every `(field, value)` pair of each event it sees.
    #[derive(Clone, Default)]
    struct CaptureLayer(Arc<Mutex<Vec<(String, String)>>>);

    impl<S: tracing::Subscriber> Layer<S> for CaptureLayer {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            struct Collect<'a>(&'a mut Vec<(String, String)>);

            impl Visit for Collect<'_> {
                fn record_str(&mut self, field: &Field, value: &str) {
                    self.0.push((field.name().to_string(), value.to_string()));
                }

                fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
                    self.0.push((field.name().to_string(), format!("{value:?}")));
                }
            }

            let mut recorded = self.0.lock().unwrap();
            event.record(&mut Collect(&mut recorded));
        }
    }

    #[test]
    fn test_tracing_sink_records_known_keys_as_fields() {
        let capture = CaptureLayer::default();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            TracingEventLog.emit(
                LogEvent::warn("Error trigger requested")
                    .field("user", "admin")
                    .field("error_type", "timeout")
                    .field("client_ip", "203.0.113.7")
                    .field("timestamp", "2026-01-15T10:00:00Z"),
            );
        });

        let recorded = capture.0.lock().unwrap().clone();
        let value = |name: &str| {
            recorded
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };

        assert_eq!(value("user").as_deref(), Some("admin"));
        assert_eq!(value("error_type").as_deref(), Some("timeout"));
        assert_eq!(value("client_ip").as_deref(), Some("203.0.113.7"));
        assert_eq!(value("git_sha"), None);
        assert_eq!(
            value("fields").as_deref(),
            Some("timestamp=2026-01-15T10:00:00Z")
        );
        assert_eq!(value("message").as_deref(), Some("Error trigger requested"));
    }

    #[test]
    fn test_fields_render_as_key_value_pairs() {
        let event = LogEvent::info("Health check performed")
            .field("status", "Healthy")
            .field("server", "web 01")
            .field("empty", "");

        assert_eq!(
            Fields(&event.fields).to_string(),
            r#"status=Healthy server="web 01" empty="""#
        );
    }

    #[test]
    fn test_get_returns_first_matching_field() {
        let event = LogEvent::warn("x").field("user", "admin").field("user", "other");
        assert_eq!(event.get("user"), Some("admin"));
        assert_eq!(event.get("missing"), None);
    }

    #[test]
    fn test_memory_log_keeps_order() {
        let log = MemoryEventLog::new();
        log.emit(LogEvent::info("first"));
        log.emit(LogEvent::error("second"));

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "first");
        assert_eq!(events[1].severity, Severity::Error);
        assert_eq!(log.matching("sec").len(), 1);
    }
}
