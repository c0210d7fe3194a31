//! Recommendation pipeline
//!
//! telemetry -> features -> stress level -> directive -> dispatch, strictly
//! in that order. Any stage failure aborts the request with a typed error.

use crate::actions::ActionMapper;
use crate::engine::ModelAdapter;
use crate::error::AssistantError;
use crate::features::FeatureExtractor;
use crate::models::{RawTelemetry, Recommendation};
use crate::observability::{AssistantMetrics, StructuredLogger};
use crate::upstream::{ActionDispatcher, TelemetrySource};
use std::sync::Arc;
use std::time::Instant;

pub struct RecommendationPipeline {
    extractor: FeatureExtractor,
    adapter: Option<Arc<ModelAdapter>>,
    mapper: ActionMapper,
    telemetry: Arc<dyn TelemetrySource>,
    dispatcher: Arc<dyn ActionDispatcher>,
    metrics: AssistantMetrics,
    logger: StructuredLogger,
}

impl RecommendationPipeline {
    /// `adapter` is `None` when the engine failed to load; every request is
    /// then refused with [`AssistantError::ModelNotLoaded`]
    pub fn new(
        extractor: FeatureExtractor,
        adapter: Option<Arc<ModelAdapter>>,
        mapper: ActionMapper,
        telemetry: Arc<dyn TelemetrySource>,
        dispatcher: Arc<dyn ActionDispatcher>,
    ) -> Self {
        Self {
            extractor,
            adapter,
            mapper,
            telemetry,
            dispatcher,
            metrics: AssistantMetrics::new(),
            logger: StructuredLogger::new("assistant"),
        }
    }

    pub fn adapter(&self) -> Option<&ModelAdapter> {
        self.adapter.as_deref()
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn mapper(&self) -> &ActionMapper {
        &self.mapper
    }

    /// Fetch the user's telemetry, then [`run`](Self::run) it
    pub async fn recommend(&self, user_token: &str) -> Result<Recommendation, AssistantError> {
        let start = Instant::now();
        let result = self.fetch_and_run(user_token).await;

        let elapsed = start.elapsed();
        self.metrics.observe_recommendation_latency(elapsed.as_secs_f64());
        match &result {
            Ok(rec) => self.logger.log_recommendation(
                rec.stress_level,
                rec.directive.action.as_str(),
                rec.features.urgent_emails_flag,
                elapsed.as_millis(),
            ),
            Err(e) => {
                self.metrics.inc_errors(e.class());
                self.logger
                    .log_recommendation_failed(e.class(), &e.to_string());
            }
        }
        result
    }

    async fn fetch_and_run(&self, user_token: &str) -> Result<Recommendation, AssistantError> {
        if self.adapter.is_none() {
            return Err(AssistantError::ModelNotLoaded);
        }

        let raw = self
            .telemetry
            .fetch_telemetry(user_token)
            .await
            .map_err(AssistantError::UpstreamUnavailable)?;
        let texts = self.extractor.urgency_texts(&raw);

        self.run(&raw, &texts, user_token).await
    }

    /// Extract, predict, map and dispatch for already-fetched telemetry
    pub async fn run(
        &self,
        raw: &RawTelemetry,
        email_texts: &[String],
        user_token: &str,
    ) -> Result<Recommendation, AssistantError> {
        let adapter = self
            .adapter
            .clone()
            .ok_or(AssistantError::ModelNotLoaded)?;

        // Urgency and stress inference are CPU-bound
        let extractor = self.extractor.clone();
        let raw = raw.clone();
        let texts = email_texts.to_vec();
        let (features, stress_level) = tokio::task::spawn_blocking(move || {
            let features = extractor.extract(&raw);
            let level = adapter.predict(&features, &texts)?;
            Ok::<_, AssistantError>((features, level))
        })
        .await
        .map_err(|e| {
            AssistantError::prediction_failed(anyhow::anyhow!("inference task failed: {}", e))
        })??;
        self.metrics.observe_stress_level(stress_level);

        let directive = self.mapper.map(stress_level);
        let request = directive.clone().into_request(user_token);
        let outcome = match self.dispatcher.dispatch(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.logger
                    .log_dispatch_failed(request.action.as_str(), &e.to_string());
                return Err(AssistantError::DownstreamDispatchFailed(e));
            }
        };

        self.metrics.inc_recommendations(directive.action.as_str());
        Ok(Recommendation {
            directive,
            stress_level,
            features,
            outcome,
        })
    }
}
