//! Health checks aggregated behind `/health`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::diagnostics::DiagnosticsCollector;

/// Health status, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub description: String,
    pub duration_ms: u64,
}

/// Overall health report
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
}

impl HealthReport {
    /// Whether the service should receive traffic.
    pub fn is_ready(&self) -> bool {
        self.status != HealthStatus::Unhealthy
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    /// Name reported alongside the result
    fn name(&self) -> &str;

    /// Status and a short description
    async fn check(&self) -> (HealthStatus, String);
}

/// Registered checks. The aggregate status is the worst individual status.
#[derive(Default)]
pub struct HealthRegistry {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, check: Arc<dyn HealthCheck>) {
        self.checks.push(check);
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Run every check in registration order.
    pub async fn run(&self) -> HealthReport {
        let mut checks = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let start = Instant::now();
            let (status, description) = check.check().await;
            checks.push(HealthCheckResult {
                name: check.name().to_string(),
                status,
                description,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        HealthReport { status, checks }
    }
}

/// Liveness: answering at all means the process is up.
pub struct SelfCheck;

#[async_trait]
impl HealthCheck for SelfCheck {
    fn name(&self) -> &str {
        "self"
    }

    async fn check(&self) -> (HealthStatus, String) {
        (HealthStatus::Healthy, "Process is responding".to_string())
    }
}

/// Process statistics can be read, optionally bounded by resident memory.
pub struct ProcessCheck {
    diagnostics: Arc<DiagnosticsCollector>,
    memory_degraded_mb: Option<u64>,
}

impl ProcessCheck {
    pub fn new(diagnostics: Arc<DiagnosticsCollector>, memory_degraded_mb: Option<u64>) -> Self {
        Self {
            diagnostics,
            memory_degraded_mb,
        }
    }
}

#[async_trait]
impl HealthCheck for ProcessCheck {
    fn name(&self) -> &str {
        "process"
    }

    async fn check(&self) -> (HealthStatus, String) {
        match self.diagnostics.snapshot() {
            Ok(snapshot) => {
                let memory_mb = snapshot.memory_mb();
                match self.memory_degraded_mb {
                    Some(limit) if memory_mb > limit => (
                        HealthStatus::Degraded,
                        format!("Resident memory {memory_mb}MB exceeds {limit}MB"),
                    ),
                    _ => (
                        HealthStatus::Healthy,
                        format!("Resident memory {memory_mb}MB"),
                    ),
                }
            }
            Err(e) => (
                HealthStatus::Unhealthy,
                format!("Failed to read process statistics: {e}"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, HealthStatus);

    #[async_trait]
    impl HealthCheck for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn check(&self) -> (HealthStatus, String) {
            (self.1, String::new())
        }
    }

    #[tokio::test]
    async fn test_empty_registry_is_healthy() {
        let report = HealthRegistry::new().run().await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.checks.is_empty());
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let mut registry = HealthRegistry::new();
        registry.register(Arc::new(Fixed("a", HealthStatus::Healthy)));
        registry.register(Arc::new(Fixed("b", HealthStatus::Degraded)));
        let report = registry.run().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert!(report.is_ready());

        registry.register(Arc::new(Fixed("c", HealthStatus::Unhealthy)));
        let report = registry.run().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(!report.is_ready());
        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.checks[2].name, "c");
    }

    #[tokio::test]
    async fn test_process_check_degrades_over_threshold() {
        let diagnostics = Arc::new(DiagnosticsCollector::new().unwrap());

        let (status, _) = ProcessCheck::new(diagnostics.clone(), None).check().await;
        assert_eq!(status, HealthStatus::Healthy);

        let (status, description) = ProcessCheck::new(diagnostics, Some(0)).check().await;
        // A running test binary always has more than 1MB resident.
        assert_eq!(status, HealthStatus::Degraded);
        assert!(description.contains("exceeds 0MB"));
    }
}
