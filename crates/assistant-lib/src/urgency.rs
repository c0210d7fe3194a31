//! Urgency classification for email-like texts
//!
//! A neural sequence classifier is used when one is available; any
//! component-level failure drops the whole batch to the keyword heuristic.
//! Callers always get `1.0` or `0.0`, never an error.

use crate::observability::AssistantMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Substrings that mark a text as urgent on the keyword path
pub const URGENCY_KEYWORDS: [&str; 10] = [
    "urgent",
    "asap",
    "immediately",
    "important",
    "priority",
    "deadline",
    "critical",
    "emergency",
    "attention",
    "action required",
];

/// Probability of the "urgent" class above which a text counts as urgent
pub const URGENT_PROBABILITY_THRESHOLD: f32 = 0.7;

#[derive(Debug, Error)]
pub enum ClassifierError {
    /// The text itself could not be scored; only this text is skipped
    #[error("text rejected: {0}")]
    Text(String),

    /// The model is unusable; the batch falls back to keywords
    #[error(transparent)]
    Component(#[from] anyhow::Error),
}

/// Scores a single text with a binary urgency model
pub trait TextClassifier: Send + Sync {
    /// Probability that `text` belongs to the urgent class (index 1)
    fn urgent_probability(&self, text: &str) -> Result<f32, ClassifierError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyBackend {
    Neural,
    Keyword,
}

impl UrgencyBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyBackend::Neural => "neural",
            UrgencyBackend::Keyword => "keyword",
        }
    }
}

impl fmt::Display for UrgencyBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UrgencyConfig {
    #[serde(default)]
    pub nlp_enabled: bool,
    /// Directory holding `tokenizer.json` and `model.onnx`
    #[serde(default)]
    pub model_dir: Option<PathBuf>,
}

pub struct UrgencyClassifier {
    model: Option<Arc<dyn TextClassifier>>,
    unavailable_reason: Option<String>,
    metrics: AssistantMetrics,
}

impl UrgencyClassifier {
    pub fn keyword_only() -> Self {
        Self::unavailable("neural urgency classification disabled")
    }

    pub fn with_model(model: Arc<dyn TextClassifier>) -> Self {
        Self {
            model: Some(model),
            unavailable_reason: None,
            metrics: AssistantMetrics::new(),
        }
    }

    /// Build the classifier once at startup.
    ///
    /// The neural path needs the `nlp` feature, `nlp_enabled`, and an
    /// existing model directory that loads cleanly. Anything short of that
    /// yields a keyword-only classifier with the reason recorded.
    pub fn from_config(config: &UrgencyConfig) -> Self {
        if !config.nlp_enabled {
            return Self::unavailable("neural urgency classification disabled by configuration");
        }
        if !cfg!(feature = "nlp") {
            return Self::unavailable("NLP runtime not compiled in (build with --features nlp)");
        }
        let Some(dir) = config.model_dir.as_ref() else {
            return Self::unavailable("no NLP model directory configured");
        };
        if !dir.is_dir() {
            return Self::unavailable(format!("NLP model not found at {}", dir.display()));
        }

        match load_sequence_classifier(dir) {
            Ok(model) => {
                info!(model_dir = %dir.display(), "Loaded neural urgency classifier");
                Self::with_model(model)
            }
            Err(e) => Self::unavailable(format!(
                "failed to load NLP model from {}: {:#}",
                dir.display(),
                e
            )),
        }
    }

    fn unavailable(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!(reason = %reason, "Using keyword-based urgency detection");
        Self {
            model: None,
            unavailable_reason: Some(reason),
            metrics: AssistantMetrics::new(),
        }
    }

    pub fn backend(&self) -> UrgencyBackend {
        if self.model.is_some() {
            UrgencyBackend::Neural
        } else {
            UrgencyBackend::Keyword
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        self.unavailable_reason.as_deref()
    }

    /// `1.0` if any text is urgent, else `0.0`
    pub fn classify<S: AsRef<str>>(&self, texts: &[S]) -> f64 {
        if texts.is_empty() {
            return 0.0;
        }

        if let Some(model) = &self.model {
            match neural_urgency(model.as_ref(), texts) {
                Ok(score) => return score,
                Err(e) => {
                    warn!(
                        error = %format!("{:#}", e),
                        texts = texts.len(),
                        "Neural urgency classification failed, falling back to keywords"
                    );
                    self.metrics.inc_urgency_fallbacks();
                }
            }
        }

        keyword_urgency(texts)
    }
}

fn neural_urgency<S: AsRef<str>>(
    model: &dyn TextClassifier,
    texts: &[S],
) -> anyhow::Result<f64> {
    let mut urgent = false;
    for text in texts {
        match model.urgent_probability(text.as_ref()) {
            Ok(p) => urgent |= p > URGENT_PROBABILITY_THRESHOLD,
            Err(ClassifierError::Text(reason)) => {
                debug!(reason = %reason, "Skipping text the urgency model cannot score");
            }
            Err(ClassifierError::Component(e)) => return Err(e),
        }
    }
    Ok(if urgent { 1.0 } else { 0.0 })
}

/// Keyword heuristic: `1.0` if any text contains an urgency keyword
pub fn keyword_urgency<S: AsRef<str>>(texts: &[S]) -> f64 {
    let urgent = texts.iter().any(|text| {
        let lower = text.as_ref().to_lowercase();
        URGENCY_KEYWORDS.iter().any(|kw| lower.contains(kw))
    });
    if urgent {
        1.0
    } else {
        0.0
    }
}

#[cfg(feature = "nlp")]
fn load_sequence_classifier(dir: &std::path::Path) -> anyhow::Result<Arc<dyn TextClassifier>> {
    Ok(Arc::new(crate::nlp::SequenceClassifier::load(dir)?))
}

#[cfg(not(feature = "nlp"))]
fn load_sequence_classifier(_dir: &std::path::Path) -> anyhow::Result<Arc<dyn TextClassifier>> {
    anyhow::bail!("NLP runtime not compiled in")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scores texts from a fixed script; `Err` entries are rejected texts
    struct ScriptedModel {
        calls: AtomicUsize,
        script: Vec<Result<f32, &'static str>>,
        component_failure_at: Option<usize>,
    }

    impl TextClassifier for ScriptedModel {
        fn urgent_probability(&self, _text: &str) -> Result<f32, ClassifierError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.component_failure_at == Some(i) {
                return Err(ClassifierError::Component(anyhow::anyhow!("session crashed")));
            }
            self.script[i].map_err(|r| ClassifierError::Text(r.to_string()))
        }
    }

    fn scripted(script: Vec<Result<f32, &'static str>>, failure: Option<usize>) -> Arc<ScriptedModel> {
        Arc::new(ScriptedModel {
            calls: AtomicUsize::new(0),
            script,
            component_failure_at: failure,
        })
    }

    #[test]
    fn test_empty_input_is_not_urgent() {
        let empty: [&str; 0] = [];
        assert_eq!(UrgencyClassifier::keyword_only().classify(&empty), 0.0);

        let neural = UrgencyClassifier::with_model(scripted(vec![], None));
        assert_eq!(neural.classify(&empty), 0.0);
    }

    #[test]
    fn test_keyword_path() {
        let classifier = UrgencyClassifier::keyword_only();
        assert_eq!(classifier.backend(), UrgencyBackend::Keyword);
        assert_eq!(classifier.classify(&["URGENT: deadline today"]), 1.0);
        assert_eq!(classifier.classify(&["Please take ACTION REQUIRED"]), 1.0);
        assert_eq!(classifier.classify(&["lunch plans", "team photo"]), 0.0);
    }

    #[test]
    fn test_neural_path_uses_threshold() {
        let classifier = UrgencyClassifier::with_model(scripted(vec![Ok(0.69), Ok(0.7)], None));
        assert_eq!(classifier.backend(), UrgencyBackend::Neural);
        // Keywords would say urgent; the model decides
        assert_eq!(classifier.classify(&["URGENT", "asap"]), 0.0);

        let classifier = UrgencyClassifier::with_model(scripted(vec![Ok(0.1), Ok(0.91)], None));
        assert_eq!(classifier.classify(&["a", "b"]), 1.0);
    }

    #[test]
    fn test_rejected_text_is_skipped() {
        let model = scripted(vec![Err("too weird"), Ok(0.95)], None);
        let classifier = UrgencyClassifier::with_model(model.clone());
        assert_eq!(classifier.classify(&["\u{0}", "plain"]), 1.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_component_failure_falls_back_for_whole_batch() {
        // First text scores urgent, then the session dies: keyword result wins
        let classifier =
            UrgencyClassifier::with_model(scripted(vec![Ok(0.99), Ok(0.99)], Some(1)));
        assert_eq!(classifier.classify(&["hello", "world"]), 0.0);

        let classifier = UrgencyClassifier::with_model(scripted(vec![Ok(0.0)], Some(0)));
        assert_eq!(classifier.classify(&["critical outage"]), 1.0);
    }

    #[test]
    fn test_from_config_disabled() {
        let classifier = UrgencyClassifier::from_config(&UrgencyConfig::default());
        assert_eq!(classifier.backend(), UrgencyBackend::Keyword);
        assert!(classifier
            .unavailable_reason()
            .unwrap()
            .contains("disabled by configuration"));
    }

    #[test]
    fn test_from_config_missing_model_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = UrgencyConfig {
            nlp_enabled: true,
            model_dir: Some(dir.path().join("nlp_email_model")),
        };
        let classifier = UrgencyClassifier::from_config(&config);
        assert_eq!(classifier.backend(), UrgencyBackend::Keyword);
        assert!(classifier.unavailable_reason().is_some());
        assert_eq!(classifier.classify(&["emergency"]), 1.0);
    }
}
