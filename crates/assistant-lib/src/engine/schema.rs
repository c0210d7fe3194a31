//! Engine manifest formats
//!
//! Manifests are JSON. Older layouts are translated into the current
//! [`EngineManifest`] by the schema registry before shape detection runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

/// Positional schema used by notebook-era engines
pub const LEGACY_FEATURE_ORDER: [&str; 5] = [
    "Sleep_Duration",
    "BMI_Category",
    "Heart_Rate",
    "Daily_Steps",
    "Systolic_BP",
];

/// Class names a notebook-era manifest may declare for its engine
pub const LEGACY_ENGINE_CLASSES: [&str; 3] = [
    "__main__.DecisionEngine",
    "app.engine_runtime.DecisionEngine",
    "DecisionEngine",
];

/// Current manifest layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u32>,
    /// Free-form label reported in metrics and health output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Estimator fed the five canonical features directly
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predict: Option<EstimatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_model: Option<StressModelSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_order: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<CallableSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EstimatorSpec {
    Onnx {
        /// Relative paths resolve against the manifest directory
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
    Linear {
        #[serde(default)]
        intercept: f64,
        coefficients: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressModelSpec {
    pub estimator: EstimatorSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names_in: Option<Vec<String>>,
}

/// Engine invoked with an email text and the legacy feature mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallableSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nlp_model_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimator: Option<EstimatorSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_order: Option<Vec<String>>,
}

/// A manifest layout the registry knows how to translate
pub struct SchemaVersion {
    pub version: u32,
    pub description: &'static str,
    translate: fn(Value) -> Result<EngineManifest>,
}

pub const SCHEMA_REGISTRY: &[SchemaVersion] = &[
    SchemaVersion {
        version: 1,
        description: "notebook layout: class, nlp_model_path, stress_model_path, feature_order",
        translate: translate_v1,
    },
    SchemaVersion {
        version: 2,
        description: "native layout: predict, stress_model, feature_order, callable",
        translate: translate_v2,
    },
];

/// Parse a manifest document of any registered format version
pub fn parse_manifest(document: Value) -> Result<EngineManifest> {
    let version = detect_format_version(&document)?;
    let schema = SCHEMA_REGISTRY
        .iter()
        .find(|s| s.version == version)
        .with_context(|| format!("Unsupported engine manifest format_version {}", version))?;

    let mut manifest = (schema.translate)(document)
        .with_context(|| format!("Invalid engine manifest ({})", schema.description))?;
    manifest.format_version = Some(schema.version);
    Ok(manifest)
}

fn detect_format_version(document: &Value) -> Result<u32> {
    let obj = document
        .as_object()
        .context("Engine manifest must be a JSON object")?;

    match obj.get("format_version") {
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .with_context(|| format!("format_version must be a positive integer, got {}", v)),
        None if obj.contains_key("class") => Ok(1),
        None => Ok(2),
    }
}

#[derive(Debug, Deserialize)]
struct NotebookManifest {
    class: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    nlp_model_path: Option<PathBuf>,
    #[serde(default)]
    stress_model_path: Option<PathBuf>,
    #[serde(default)]
    stress_model_sha256: Option<String>,
    #[serde(default)]
    feature_order: Option<Vec<String>>,
}

fn translate_v1(document: Value) -> Result<EngineManifest> {
    let legacy: NotebookManifest = serde_json::from_value(document)?;

    if !LEGACY_ENGINE_CLASSES.contains(&legacy.class.as_str()) {
        anyhow::bail!(
            "Unknown engine class '{}', expected one of {:?}",
            legacy.class,
            LEGACY_ENGINE_CLASSES
        );
    }

    let feature_order = legacy
        .feature_order
        .unwrap_or_else(|| LEGACY_FEATURE_ORDER.iter().map(|s| s.to_string()).collect());
    let estimator = legacy.stress_model_path.map(|path| EstimatorSpec::Onnx {
        path,
        sha256: legacy.stress_model_sha256,
    });

    Ok(EngineManifest {
        format_version: None,
        version: legacy.version,
        predict: None,
        stress_model: estimator.clone().map(|estimator| StressModelSpec {
            estimator,
            feature_names_in: None,
        }),
        feature_order: Some(feature_order.clone()),
        callable: Some(CallableSpec {
            nlp_model_path: legacy.nlp_model_path,
            estimator,
            feature_order: Some(feature_order),
        }),
    })
}

fn translate_v2(document: Value) -> Result<EngineManifest> {
    Ok(serde_json::from_value(document)?)
}
