//! Harmonia assistant - stress-aware wellness recommendation service
//!
//! Loads the decision engine and urgency classifier once, then serves
//! recommendations that are dispatched to the actions service.

use anyhow::Result;
use assistant_lib::{
    health::{components, HealthRegistry},
    observability::{AssistantMetrics, StructuredLogger},
    upstream::{ActionsClient, IntegrationsClient, ServiceProbe},
    ActionMapper, ActionTable, FeatureExtractor, ModelAdapter, RecommendationPipeline,
    UrgencyClassifier,
};
use harmonia_assistant::{
    api::{self, AuthSettings},
    config::AssistantConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting harmonia-assistant");

    let config = AssistantConfig::load()?;
    info!(
        integrations_url = %config.integrations_url,
        actions_url = %config.actions_url,
        model_path = %config.model_path.display(),
        "Assistant configured"
    );

    let health_registry = HealthRegistry::new();
    let metrics = AssistantMetrics::new();
    let logger = StructuredLogger::new("assistant");

    let urgency = Arc::new(UrgencyClassifier::from_config(&config.urgency()));

    let adapter = match ModelAdapter::load(&config.model_path, config.model_defaults()) {
        Ok(adapter) => {
            logger.log_engine_loaded(
                &config.model_path.display().to_string(),
                adapter.kind_name(),
                adapter.version(),
            );
            Some(Arc::new(adapter))
        }
        Err(e) => {
            logger.log_engine_load_failed(
                &config.model_path.display().to_string(),
                &format!("{:#}", e),
            );
            None
        }
    };

    let table = match &config.action_table_path {
        Some(path) => ActionTable::load_from_path(path)?,
        None => ActionTable::builtin(),
    };
    info!(version = table.version(), "Action table ready");

    let integrations = Arc::new(IntegrationsClient::new(
        &config.integrations_url,
        config.telemetry_timeout(),
        config.probe_timeout(),
    )?);
    let actions = Arc::new(ActionsClient::new(
        &config.actions_url,
        config.dispatch_timeout(),
        config.probe_timeout(),
    )?);

    let urgency_backend = urgency.backend();
    let pipeline = Arc::new(RecommendationPipeline::new(
        FeatureExtractor::new(urgency),
        adapter,
        ActionMapper::new(table),
        integrations.clone(),
        actions.clone(),
    ));

    if config.auth_disabled {
        warn!("Authentication disabled, empty tokens use the development token");
    }

    let probes: Vec<Arc<dyn ServiceProbe>> = vec![integrations, actions];
    let app_state = Arc::new(api::AppState::new(
        pipeline,
        health_registry.clone(),
        metrics,
        probes,
        AuthSettings {
            disabled: config.auth_disabled,
            dev_user_token: config.dev_user_token.clone(),
        },
    ));

    app_state.refresh_local_components().await;
    health_registry.register(components::INTEGRATIONS).await;
    health_registry.register(components::ACTIONS).await;

    logger.log_startup(SERVICE_VERSION, urgency_backend.as_str());

    // Mark assistant as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => logger.log_shutdown("API server exited"),
                Ok(Err(e)) => {
                    logger.log_shutdown("API server failed");
                    return Err(e);
                }
                Err(e) => {
                    logger.log_shutdown("API server task panicked");
                    return Err(e.into());
                }
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
