//! Core library for the Harmonia wellness assistant
//!
//! This crate provides:
//! - Feature extraction from calendar and heart-rate telemetry
//! - Urgency classification with a keyword fallback
//! - Decision engine loading and stress prediction
//! - Stress level to action mapping and dispatch
//! - Health checks and observability

pub mod actions;
pub mod engine;
pub mod error;
pub mod features;
pub mod health;
pub mod models;
#[cfg(feature = "nlp")]
pub mod nlp;
pub mod observability;
pub mod pipeline;
pub mod upstream;
pub mod urgency;

pub use actions::{ActionMapper, ActionTable};
pub use engine::{ModelAdapter, ModelDefaults, ModelKind};
pub use error::{AssistantError, UpstreamError};
pub use features::FeatureExtractor;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AssistantMetrics, StructuredLogger};
pub use pipeline::RecommendationPipeline;
pub use urgency::{UrgencyBackend, UrgencyClassifier, UrgencyConfig};
