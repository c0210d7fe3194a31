//! HTTP API: recommendations, health checks and Prometheus metrics

use assistant_lib::{
    engine::{ModelAdapter, Resolution},
    health::{components, ComponentHealth, ComponentStatus, HealthRegistry},
    observability::AssistantMetrics,
    upstream::ServiceProbe,
    ActionKind, AssistantError, FeatureVector, RecommendationPipeline, UrgencyBackend,
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

const SERVICE_NAME: &str = "assistant";

/// How empty user tokens are treated
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub disabled: bool,
    pub dev_user_token: String,
}

impl AuthSettings {
    pub fn enforced() -> Self {
        Self {
            disabled: false,
            dev_user_token: String::new(),
        }
    }

    fn resolve_token(&self, token: &str) -> Result<String, AssistantError> {
        let token = token.trim();
        if !token.is_empty() {
            return Ok(token.to_string());
        }
        if self.disabled {
            return Ok(self.dev_user_token.clone());
        }
        Err(AssistantError::InvalidRequest(
            "user_token is required".to_string(),
        ))
    }
}

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<RecommendationPipeline>,
    pub health_registry: HealthRegistry,
    pub metrics: AssistantMetrics,
    pub probes: Vec<Arc<dyn ServiceProbe>>,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(
        pipeline: Arc<RecommendationPipeline>,
        health_registry: HealthRegistry,
        metrics: AssistantMetrics,
        probes: Vec<Arc<dyn ServiceProbe>>,
        auth: AuthSettings,
    ) -> Self {
        Self {
            pipeline,
            health_registry,
            metrics,
            probes,
            auth,
        }
    }

    /// Record engine and urgency classifier health from the pipeline
    pub async fn refresh_local_components(&self) {
        self.health_registry
            .update(components::ENGINE, engine_health(self.pipeline.adapter()))
            .await;
        self.health_registry
            .update(components::URGENCY_CLASSIFIER, urgency_health(&self.pipeline))
            .await;
    }
}

fn engine_health(adapter: Option<&ModelAdapter>) -> ComponentHealth {
    match adapter {
        None => ComponentHealth::unhealthy("ML model not loaded"),
        Some(adapter) => match adapter.resolution() {
            Resolution::Resolved(_) => ComponentHealth::healthy_with(match adapter.source() {
                Some(path) => format!(
                    "{} engine loaded from {} (version {})",
                    adapter.kind_name(),
                    path.display(),
                    adapter.version()
                ),
                None => format!(
                    "{} engine loaded (version {})",
                    adapter.kind_name(),
                    adapter.version()
                ),
            }),
            Resolution::Unusable { reason } => ComponentHealth::unhealthy(reason.clone()),
        },
    }
}

fn urgency_health(pipeline: &RecommendationPipeline) -> ComponentHealth {
    let urgency = pipeline.extractor().urgency();
    match urgency.backend() {
        UrgencyBackend::Neural => ComponentHealth::healthy_with("neural urgency classifier loaded"),
        UrgencyBackend::Keyword => ComponentHealth::degraded(format!(
            "using keyword fallback: {}",
            urgency.unavailable_reason().unwrap_or("neural model unavailable")
        )),
    }
}

/// Error body: `{detail, error_code, timestamp}`
pub struct ApiError(pub AssistantError);

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "detail": self.0.to_string(),
            "error_code": self.0.error_code(),
            "timestamp": Utc::now().to_rfc3339(),
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct RecommendRequest {
    #[serde(default)]
    pub user_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Accepted but not consulted by the pipeline
    #[serde(default)]
    pub context: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub status: &'static str,
    pub recommendation: String,
    pub stress_level: i64,
    pub action_taken: ActionKind,
    pub action_details: Map<String, Value>,
    pub features_used: FeatureVector,
    pub action_service_response: Value,
    pub timestamp: String,
}

async fn recommend(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let token = state.auth.resolve_token(&request.user_token).map_err(|e| {
        state.metrics.inc_errors(e.class());
        e
    })?;
    info!(user_id = ?request.user_id, "Recommendation requested");

    let rec = state.pipeline.recommend(&token).await?;
    Ok(Json(RecommendResponse {
        status: "success",
        recommendation: format!("Action dispatched: {}", rec.directive.action),
        stress_level: rec.stress_level,
        action_taken: rec.directive.action,
        action_details: rec.directive.details,
        features_used: rec.features,
        action_service_response: rec.outcome,
        timestamp: Utc::now().to_rfc3339(),
    }))
}

#[derive(Debug, Serialize)]
pub struct ComprehensiveHealth {
    pub status: ComponentStatus,
    pub service: &'static str,
    pub timestamp: String,
    pub checks: BTreeMap<String, ComponentHealth>,
}

/// Comprehensive health: re-checks local components and probes both
/// collaborators before reporting
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_local_components().await;
    state
        .health_registry
        .refresh_dependencies(&state.probes)
        .await;
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        status_code,
        Json(ComprehensiveHealth {
            status: health.status,
            service: SERVICE_NAME,
            timestamp: Utc::now().to_rfc3339(),
            checks: health.components,
        }),
    )
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/recommend", post(recommend))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_token_rejects_empty_when_enforced() {
        let err = AuthSettings::enforced().resolve_token("  ").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REQUEST");
    }

    #[test]
    fn test_resolve_token_substitutes_dev_token() {
        let auth = AuthSettings {
            disabled: true,
            dev_user_token: "dev-token".to_string(),
        };
        assert_eq!(auth.resolve_token("").unwrap(), "dev-token");
        assert_eq!(auth.resolve_token("real").unwrap(), "real");
    }

    #[test]
    fn test_engine_health_names_manifest_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decision_engine.json");
        std::fs::write(
            &path,
            r#"{"format_version": 2, "version": "2026.03",
                "predict": {"type": "linear", "intercept": 4.0, "coefficients": [0.0, 0.0, 0.0, 0.0, 0.0]}}"#,
        )
        .unwrap();
        let adapter = ModelAdapter::load(&path, Default::default()).unwrap();

        let health = engine_health(Some(&adapter));
        assert_eq!(health.status, ComponentStatus::Healthy);
        let message = health.message.unwrap();
        assert!(message.contains(&path.display().to_string()), "{}", message);
        assert!(message.contains("version 2026.03"));

        let missing = engine_health(None);
        assert_eq!(missing.status, ComponentStatus::Unhealthy);
        assert_eq!(missing.message.as_deref(), Some("ML model not loaded"));
    }
}
