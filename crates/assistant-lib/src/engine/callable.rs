//! Callable decision engines
//!
//! A callable engine takes one email text plus the legacy stress-feature
//! mapping and returns `{intent, stress_level, recommendation}`.

use super::estimator::{Estimator, NonNumericOutput};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub trait CallableEngine: Send + Sync {
    fn call(&self, email_text: &str, stress_features: &BTreeMap<String, f64>) -> Result<Value>;

    fn describe(&self) -> String {
        "callable".to_string()
    }
}

/// Labels a text with an intent such as `high_priority` or `reminder`
pub trait IntentClassifier: Send + Sync {
    fn intent(&self, text: &str) -> Result<String>;
}

/// Runtime counterpart of the notebook decision engine: intent model, stress
/// estimator and break suggestions
pub struct DecisionEngineRuntime {
    intent_model: Option<Arc<dyn IntentClassifier>>,
    stress_model: Option<Arc<dyn Estimator>>,
    feature_order: Vec<String>,
}

impl DecisionEngineRuntime {
    pub fn new(
        intent_model: Option<Arc<dyn IntentClassifier>>,
        stress_model: Option<Arc<dyn Estimator>>,
        feature_order: Vec<String>,
    ) -> Self {
        Self {
            intent_model,
            stress_model,
            feature_order,
        }
    }
}

impl CallableEngine for DecisionEngineRuntime {
    fn call(&self, email_text: &str, stress_features: &BTreeMap<String, f64>) -> Result<Value> {
        let intent_model = self
            .intent_model
            .as_ref()
            .context("No intent model available to run NLP inference inside the decision engine")?;
        let intent = intent_model
            .intent(email_text)
            .context("Intent classification failed")?;

        let stress_model = self
            .stress_model
            .as_ref()
            .context("Decision engine has no stress model")?;
        let row = self
            .feature_order
            .iter()
            .map(|name| {
                stress_features
                    .get(name)
                    .copied()
                    .with_context(|| format!("Missing stress feature '{}'", name))
            })
            .collect::<Result<Vec<f64>>>()?;

        let raw = stress_model
            .predict_row(&row)?
            .first()
            .copied()
            .context("Stress model returned no output")?;
        if !raw.is_finite() {
            return Err(NonNumericOutput(format!("stress level {}", raw)).into());
        }
        let stress_level = raw.trunc() as i64;

        let suggestion = recommend_break(stress_features);
        Ok(json!({
            "intent": intent,
            "stress_level": stress_level,
            "recommendation": compose_recommendation(&intent, stress_level, suggestion),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "decision_engine(intent={}, stress={})",
            self.intent_model.is_some(),
            self.stress_model
                .as_ref()
                .map(|m| m.describe())
                .unwrap_or_else(|| "none".to_string())
        )
    }
}

/// Break suggestion from the legacy feature mapping
pub fn recommend_break(features: &BTreeMap<String, f64>) -> &'static str {
    let get = |name: &str| features.get(name).copied().unwrap_or(0.0);

    if get("Daily_Steps") < 4000.0 {
        "Take a 10-minute walk to refresh your mind."
    } else if get("Sleep_Duration") < 6.0 {
        "Power down with a short rest or breathing exercise."
    } else if get("Heart_Rate") > 90.0 {
        "Try 5 minutes of mindfulness or meditation to calm down."
    } else {
        "Take a short coffee/tea break."
    }
}

fn compose_recommendation(intent: &str, stress_level: i64, suggestion: &str) -> String {
    let label = intent.to_lowercase();
    if label.contains("high") && stress_level >= 7 {
        format!(
            "You seem stressed. {} Then tackle the high-priority task.",
            suggestion
        )
    } else if label.contains("high") {
        "You're in a good state. Start working on this high-priority task.".to_string()
    } else if label.contains("reminder") && stress_level >= 7 {
        format!("Handle the reminder later. {}", suggestion)
    } else {
        format!(
            "Intent: {}, Stress Level: {}. {}",
            intent, stress_level, suggestion
        )
    }
}
