//! JSON diagnostic endpoints, fault injection, and the health aggregate.

use axum::{
    Form, Json,
    extract::{Query, State, rejection::FormRejection},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::faults::{self, FaultContext, FaultKind};
use crate::telemetry::LogEvent;
use crate::web::middleware::{AppState, ClientIp, Identity};

/// `GET /api/healthcheck`
pub async fn healthcheck(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let snapshot = state.diagnostics.snapshot()?;

    state.events.emit(
        LogEvent::info("Health check performed")
            .field("status", "Healthy")
            .field("server", &snapshot.host_name)
            .field("memory_mb", snapshot.memory_mb())
            .field("uptime_secs", snapshot.host_uptime_secs)
            .field("process_id", snapshot.process_id),
    );

    Ok(Json(json!({
        "Status": "Healthy",
        "Timestamp": snapshot.collected_at,
        "Server": snapshot.host_name,
        "Version": state.settings.version,
        "Uptime": snapshot.host_uptime_secs,
        "MemoryUsage": snapshot.memory_mb(),
        "ProcessId": snapshot.process_id,
    })))
}

/// `GET /api/metrics`
pub async fn metrics(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Value>, AppError> {
    let snapshot = state.diagnostics.snapshot()?;
    let deployment = &state.settings.deployment;

    state.events.emit(
        LogEvent::info("Metrics requested")
            .field("server", &snapshot.host_name)
            .field("memory_mb", snapshot.memory_mb())
            .field("threads", snapshot.thread_count)
            .field("user", identity.name())
            .field("git_sha", &deployment.git_commit_sha)
            .field("deployment_version", &deployment.deployment_version),
    );

    Ok(Json(json!({
        "Timestamp": snapshot.collected_at,
        "Server": {
            "Name": snapshot.host_name,
            "OS": snapshot.os_version,
            "ProcessorCount": snapshot.processor_count,
            "WorkingSet": snapshot.memory_mb(),
            "UpTime": snapshot.host_uptime_secs,
        },
        "Application": {
            "Version": state.settings.version,
            "ProcessId": snapshot.process_id,
            "MemoryUsage": snapshot.memory_mb(),
            "ThreadCount": snapshot.thread_count,
        },
        "Authentication": {
            "IsAuthenticated": identity.is_authenticated(),
            "UserName": identity.name(),
        },
        "Git": {
            "CommitSha": deployment.git_commit_sha,
            "RepositoryUrl": deployment.git_repository_url,
            "Branch": deployment.git_branch,
        },
        "Deployment": {
            "Version": deployment.deployment_version,
            "Time": deployment.deployment_time,
            "Environment": state.settings.environment,
            "DatadogEnv": deployment.datadog_env,
            "DatadogSite": deployment.datadog_site,
            "ApiKeyConfigured": deployment.api_key_configured,
        },
    })))
}

/// `GET /api/git-info`
pub async fn git_info(State(state): State<AppState>) -> Json<Value> {
    let deployment = &state.settings.deployment;

    state.events.emit(
        LogEvent::info("Git info requested")
            .field("git_sha", &deployment.git_commit_sha)
            .field("branch", &deployment.git_branch)
            .field("repository", &deployment.git_repository_url),
    );

    Json(json!({
        "CommitSha": deployment.git_commit_sha,
        "RepositoryUrl": deployment.git_repository_url,
        "Branch": deployment.git_branch,
        "CommitMessage": deployment.git_commit_message,
        "DeploymentVersion": deployment.deployment_version,
        "DeploymentTime": deployment.deployment_time,
        "Environment": state.settings.environment,
        "Version": state.settings.version,
        "Timestamp": Utc::now(),
    }))
}

/// Query or form parameters as ordered pairs; repeated names are allowed.
pub type Params = Vec<(String, String)>;

/// First value among `names`, in request order.
pub fn first_param(params: &[(String, String)], names: &[&str]) -> Option<String> {
    params
        .iter()
        .find(|(key, _)| names.contains(&key.as_str()))
        .map(|(_, value)| value.clone())
}

const ERROR_TYPE_PARAM: &str = "errorType";

/// `POST /api/trigger-error`
///
/// Logs who asked for which fault, then lets the fault propagate to the
/// top-level handler.
pub async fn trigger_error(
    State(state): State<AppState>,
    identity: Identity,
    ClientIp(client_ip): ClientIp,
    Query(query): Query<Params>,
    form: Result<Form<Params>, FormRejection>,
) -> Result<Json<Value>, AppError> {
    let selector = first_param(&query, &[ERROR_TYPE_PARAM])
        .or_else(|| {
            form.ok()
                .and_then(|Form(body)| first_param(&body, &[ERROR_TYPE_PARAM]))
        })
        .unwrap_or_else(|| FaultKind::DEFAULT_SELECTOR.to_string());
    let kind = FaultKind::parse(&selector);

    let ctx = FaultContext {
        user: identity.name().to_string(),
        git_sha: state.settings.deployment.git_commit_sha.clone(),
        at: Utc::now(),
    };

    state.events.emit(
        LogEvent::warn("Error trigger requested")
            .field("user", &ctx.user)
            .field("error_type", &selector)
            .field("git_sha", &ctx.git_sha)
            .field("client_ip", &client_ip)
            .field("timestamp", ctx.at.to_rfc3339()),
    );
    state.events.emit(
        LogEvent::error(format!("Triggering {kind} fault"))
            .field("user", &ctx.user)
            .field("description", kind.description()),
    );

    Ok(Json(faults::trigger(kind, &ctx)?))
}

/// `GET /health`: worst status of every registered check, as plain text.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.health.run().await;

    for check in &report.checks {
        state.events.emit(
            LogEvent::debug("Health check result")
                .field("check", &check.name)
                .field("status", check.status)
                .field("duration_ms", check.duration_ms)
                .field("description", &check.description),
        );
    }

    let status = if report.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, report.status.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Params {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_first_param_keeps_first_occurrence() {
        let params = pairs(&[("other", "x"), ("errorType", "timeout"), ("errorType", "custom")]);
        assert_eq!(first_param(&params, &["errorType"]).as_deref(), Some("timeout"));
        assert_eq!(first_param(&params, &["missing"]), None);
    }

    #[test]
    fn test_first_param_accepts_aliases_in_request_order() {
        let params = pairs(&[("returnUrl", "/Home/About"), ("ReturnUrl", "/Home/Dashboard")]);
        assert_eq!(
            first_param(&params, &["ReturnUrl", "returnUrl"]).as_deref(),
            Some("/Home/About")
        );
    }
}
