//! Decision engine loading and stress prediction
//!
//! The engine's capability shape is resolved once, at load time, by running
//! a fixed-priority list of shape detectors over the manifest. Prediction
//! then dispatches on the resolved [`ModelKind`] and never re-probes.

pub mod callable;
pub mod estimator;
pub mod schema;

use crate::error::AssistantError;
use crate::models::{FeatureVector, CANONICAL_FEATURE_ORDER};
use crate::observability::AssistantMetrics;
use anyhow::{Context, Result};
use callable::{CallableEngine, DecisionEngineRuntime, IntentClassifier};
use estimator::{Estimator, LinearEstimator, NonNumericOutput, OnnxEstimator};
use schema::{EngineManifest, EstimatorSpec, LEGACY_FEATURE_ORDER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Text handed to callable engines when no email-like text exists
pub const PLACEHOLDER_TEXT: &str = "SUBJECT: (none) BODY: (none)";

/// Inference latency above which a warning is logged
const SLOW_INFERENCE_MS: u128 = 50;

/// Padding values for model inputs the pipeline does not compute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelDefaults(BTreeMap<String, f64>);

impl Default for ModelDefaults {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("BMI_Category".to_string(), 2.0),
            ("Systolic_BP".to_string(), 120.0),
            ("Age".to_string(), 35.0),
            ("Gender".to_string(), 0.0),
            ("Occupation".to_string(), 0.0),
        ]))
    }
}

impl ModelDefaults {
    /// Built-in defaults with `overrides` applied on top
    pub fn with_overrides(overrides: &BTreeMap<String, f64>) -> Self {
        let mut defaults = Self::default();
        defaults
            .0
            .extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        defaults
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    fn value(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }
}

/// Capability shape of a loaded engine
pub enum ModelKind {
    /// Takes the five canonical features in order
    DirectPredictor(Arc<dyn Estimator>),
    /// Declares the names of the features it was trained on
    NamedFeatureModel {
        estimator: Arc<dyn Estimator>,
        feature_names: Vec<String>,
    },
    /// Only a positional order over the legacy schema is known
    LegacyOrderedModel {
        estimator: Arc<dyn Estimator>,
        feature_order: Vec<String>,
    },
    /// Invoked with an email text and the legacy feature mapping
    CallableEngine(Arc<dyn CallableEngine>),
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::DirectPredictor(_) => "direct_predictor",
            ModelKind::NamedFeatureModel { .. } => "named_feature_model",
            ModelKind::LegacyOrderedModel { .. } => "legacy_ordered_model",
            ModelKind::CallableEngine(_) => "callable_engine",
        }
    }
}

impl fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::DirectPredictor(e) => write!(f, "DirectPredictor({})", e.describe()),
            ModelKind::NamedFeatureModel { feature_names, .. } => {
                write!(f, "NamedFeatureModel({:?})", feature_names)
            }
            ModelKind::LegacyOrderedModel { feature_order, .. } => {
                write!(f, "LegacyOrderedModel({:?})", feature_order)
            }
            ModelKind::CallableEngine(e) => write!(f, "CallableEngine({})", e.describe()),
        }
    }
}

#[derive(Debug)]
pub enum Resolution {
    Resolved(ModelKind),
    /// The engine loaded but exposes no shape that can predict
    Unusable { reason: String },
}

enum Detection {
    Match(ModelKind),
    /// This detector owns the shape but the shape is broken
    Reject(String),
    Skip,
}

struct ShapeDetector {
    name: &'static str,
    detect: fn(&EngineManifest, &Path) -> Result<Detection>,
}

/// Detectors in priority order; the first non-`Skip` answer wins
const SHAPE_DETECTORS: &[ShapeDetector] = &[
    ShapeDetector {
        name: "direct_predictor",
        detect: detect_direct_predictor,
    },
    ShapeDetector {
        name: "named_feature_model",
        detect: detect_named_feature_model,
    },
    ShapeDetector {
        name: "legacy_ordered_model",
        detect: detect_legacy_ordered_model,
    },
    ShapeDetector {
        name: "callable_engine",
        detect: detect_callable_engine,
    },
];

fn detect_direct_predictor(manifest: &EngineManifest, base_dir: &Path) -> Result<Detection> {
    let Some(spec) = &manifest.predict else {
        return Ok(Detection::Skip);
    };
    let estimator = build_estimator(spec, base_dir, CANONICAL_FEATURE_ORDER.len())?;
    Ok(Detection::Match(ModelKind::DirectPredictor(estimator)))
}

fn detect_named_feature_model(manifest: &EngineManifest, base_dir: &Path) -> Result<Detection> {
    let Some(stress) = &manifest.stress_model else {
        return Ok(Detection::Skip);
    };
    match &stress.feature_names_in {
        Some(names) if !names.is_empty() => {
            let estimator = build_estimator(&stress.estimator, base_dir, names.len())?;
            Ok(Detection::Match(ModelKind::NamedFeatureModel {
                estimator,
                feature_names: names.clone(),
            }))
        }
        _ => Ok(Detection::Skip),
    }
}

fn detect_legacy_ordered_model(manifest: &EngineManifest, base_dir: &Path) -> Result<Detection> {
    let Some(stress) = &manifest.stress_model else {
        return Ok(Detection::Skip);
    };
    match &manifest.feature_order {
        Some(order) if !order.is_empty() => {
            let estimator = build_estimator(&stress.estimator, base_dir, order.len())?;
            Ok(Detection::Match(ModelKind::LegacyOrderedModel {
                estimator,
                feature_order: order.clone(),
            }))
        }
        _ => Ok(Detection::Reject(
            "stress model lacks feature metadata".to_string(),
        )),
    }
}

fn detect_callable_engine(manifest: &EngineManifest, base_dir: &Path) -> Result<Detection> {
    let Some(spec) = &manifest.callable else {
        return Ok(Detection::Skip);
    };
    let feature_order = spec
        .feature_order
        .clone()
        .unwrap_or_else(|| LEGACY_FEATURE_ORDER.iter().map(|s| s.to_string()).collect());

    let stress_model = spec
        .estimator
        .as_ref()
        .map(|e| build_estimator(e, base_dir, feature_order.len()))
        .transpose()?;
    let intent_model = spec
        .nlp_model_path
        .as_ref()
        .and_then(|p| load_intent_model(&resolve_path(base_dir, p)));

    let runtime = DecisionEngineRuntime::new(intent_model, stress_model, feature_order);
    Ok(Detection::Match(ModelKind::CallableEngine(Arc::new(runtime))))
}

fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn build_estimator(spec: &EstimatorSpec, base_dir: &Path, width: usize) -> Result<Arc<dyn Estimator>> {
    let estimator: Arc<dyn Estimator> = match spec {
        EstimatorSpec::Onnx { path, sha256 } => {
            let path = resolve_path(base_dir, path);
            Arc::new(OnnxEstimator::load(&path, width, sha256.as_deref())?)
        }
        EstimatorSpec::Linear {
            intercept,
            coefficients,
        } => Arc::new(LinearEstimator::new(*intercept, coefficients.clone())),
    };

    if estimator.input_width() != width {
        anyhow::bail!(
            "Estimator {} takes {} inputs but {} features are declared",
            estimator.describe(),
            estimator.input_width(),
            width
        );
    }
    Ok(estimator)
}

#[cfg(feature = "nlp")]
fn load_intent_model(dir: &Path) -> Option<Arc<dyn IntentClassifier>> {
    match crate::nlp::SequenceClassifier::load(dir) {
        Ok(model) => Some(Arc::new(model)),
        Err(e) => {
            warn!(
                path = %dir.display(),
                error = %format!("{:#}", e),
                "Failed to load intent model, callable engine cannot run"
            );
            None
        }
    }
}

#[cfg(not(feature = "nlp"))]
fn load_intent_model(dir: &Path) -> Option<Arc<dyn IntentClassifier>> {
    debug!(
        path = %dir.display(),
        "NLP runtime not compiled in, callable engine has no intent model"
    );
    None
}

/// Resolve a manifest into its capability shape
pub fn resolve(manifest: &EngineManifest, base_dir: &Path) -> Result<Resolution> {
    for detector in SHAPE_DETECTORS {
        match (detector.detect)(manifest, base_dir)
            .with_context(|| format!("Shape detector '{}' failed", detector.name))?
        {
            Detection::Match(kind) => return Ok(Resolution::Resolved(kind)),
            Detection::Reject(reason) => {
                warn!(detector = detector.name, reason = %reason, "Engine shape is not usable");
                return Ok(Resolution::Unusable { reason });
            }
            Detection::Skip => debug!(detector = detector.name, "Shape not present"),
        }
    }
    Ok(Resolution::Unusable {
        reason: "loaded engine has no usable predict interface".to_string(),
    })
}

/// Process-wide handle to the loaded decision engine
#[derive(Debug)]
pub struct ModelAdapter {
    resolution: Resolution,
    defaults: ModelDefaults,
    version: String,
    source: Option<PathBuf>,
    metrics: AssistantMetrics,
}

impl ModelAdapter {
    /// Load a manifest from disk; model files resolve relative to it
    pub fn load(path: &Path, defaults: ModelDefaults) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine manifest {}", path.display()))?;
        let document: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse engine manifest {}", path.display()))?;
        let manifest = schema::parse_manifest(document)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut adapter = Self::from_manifest(&manifest, base_dir, defaults)?;
        adapter.source = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            kind = adapter.kind_name(),
            version = %adapter.version,
            "Decision engine resolved"
        );
        Ok(adapter)
    }

    pub fn from_manifest(
        manifest: &EngineManifest,
        base_dir: &Path,
        defaults: ModelDefaults,
    ) -> Result<Self> {
        let resolution = resolve(manifest, base_dir)?;
        let version = manifest.version.clone().unwrap_or_else(|| {
            format!("format-v{}", manifest.format_version.unwrap_or(2))
        });
        Ok(Self::new(resolution, defaults, version))
    }

    /// Wrap an already-built engine
    pub fn from_kind(kind: ModelKind, defaults: ModelDefaults) -> Self {
        Self::new(Resolution::Resolved(kind), defaults, "embedded".to_string())
    }

    fn new(resolution: Resolution, defaults: ModelDefaults, version: String) -> Self {
        let metrics = AssistantMetrics::new();
        let kind = match &resolution {
            Resolution::Resolved(kind) => kind.name(),
            Resolution::Unusable { .. } => "unusable",
        };
        metrics.set_engine_info(kind, &version);
        Self {
            resolution,
            defaults,
            version,
            source: None,
            metrics,
        }
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.resolution {
            Resolution::Resolved(kind) => kind.name(),
            Resolution::Unusable { .. } => "unusable",
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Predict a stress level. The result is not clamped.
    pub fn predict<S: AsRef<str>>(
        &self,
        features: &FeatureVector,
        texts: &[S],
    ) -> Result<i64, AssistantError> {
        let kind = match &self.resolution {
            Resolution::Resolved(kind) => kind,
            Resolution::Unusable { reason } => {
                return Err(AssistantError::prediction_unavailable(reason.clone()))
            }
        };

        let start = Instant::now();
        let level = match kind {
            ModelKind::DirectPredictor(estimator) => {
                let output = estimator
                    .predict_row(&features.to_array())
                    .map_err(stage_error)?;
                first_scalar(&output)?
            }
            ModelKind::NamedFeatureModel {
                estimator,
                feature_names,
            } => {
                let row: Vec<f64> = feature_names
                    .iter()
                    .map(|name| {
                        features
                            .get(name)
                            .or_else(|| self.defaults.get(name))
                            .unwrap_or(0.0)
                    })
                    .collect();
                first_scalar(&estimator.predict_row(&row).map_err(stage_error)?)?
            }
            ModelKind::LegacyOrderedModel {
                estimator,
                feature_order,
            } => {
                let mapping = self.legacy_mapping(features);
                let row: Vec<f64> = feature_order
                    .iter()
                    .map(|name| mapping.get(name).copied().unwrap_or(0.0))
                    .collect();
                first_scalar(&estimator.predict_row(&row).map_err(stage_error)?)?
            }
            ModelKind::CallableEngine(engine) => {
                let text = texts.first().map(|t| t.as_ref()).unwrap_or(PLACEHOLDER_TEXT);
                let result = engine
                    .call(text, &self.legacy_mapping(features))
                    .map_err(stage_error)?;
                stress_level_field(&result)?
            }
        };

        let elapsed = start.elapsed();
        self.metrics.observe_inference_latency(elapsed.as_secs_f64());
        if elapsed.as_millis() > SLOW_INFERENCE_MS {
            warn!(
                kind = kind.name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Slow stress inference"
            );
        }
        Ok(level)
    }

    /// Features keyed by the legacy training schema
    pub fn legacy_mapping(&self, features: &FeatureVector) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("Sleep_Duration".to_string(), features.sleep_duration),
            ("BMI_Category".to_string(), self.defaults.value("BMI_Category")),
            ("Heart_Rate".to_string(), features.heart_rate_avg),
            ("Daily_Steps".to_string(), features.steps_last_24h),
            ("Systolic_BP".to_string(), self.defaults.value("Systolic_BP")),
        ])
    }
}

fn stage_error(err: anyhow::Error) -> AssistantError {
    if let Some(non_numeric) = err.downcast_ref::<NonNumericOutput>() {
        return AssistantError::InvalidModelOutput(non_numeric.to_string());
    }
    AssistantError::prediction_failed(err)
}

fn first_scalar(output: &[f64]) -> Result<i64, AssistantError> {
    let value = output.first().copied().ok_or_else(|| {
        AssistantError::InvalidModelOutput("model returned an empty prediction".to_string())
    })?;
    coerce_level(value)
}

/// Truncate toward zero; non-finite values are rejected
fn coerce_level(value: f64) -> Result<i64, AssistantError> {
    if !value.is_finite() {
        return Err(AssistantError::InvalidModelOutput(format!(
            "non-finite prediction {}",
            value
        )));
    }
    Ok(value.trunc() as i64)
}

fn stress_level_field(result: &Value) -> Result<i64, AssistantError> {
    let field = result
        .as_object()
        .and_then(|obj| obj.get("stress_level"))
        .ok_or_else(|| {
            AssistantError::InvalidModelOutput(
                "engine result has no stress_level field".to_string(),
            )
        })?;

    match field {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| AssistantError::InvalidModelOutput(format!("stress_level {}", n)))
            .and_then(coerce_level),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| {
            AssistantError::InvalidModelOutput(format!("non-numeric stress_level {:?}", s))
        }),
        other => Err(AssistantError::InvalidModelOutput(format!(
            "non-numeric stress_level {}",
            other
        ))),
    }
}
