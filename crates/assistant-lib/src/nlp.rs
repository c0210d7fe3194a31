//! Transformer sequence classifier (tokenizer.json + model.onnx)
//!
//! Used as the neural urgency model and as the intent model of callable
//! engines. Inputs are `input_ids` and `attention_mask`, both `i64[1, 512]`;
//! the first output holds the class logits.

use crate::engine::callable::IntentClassifier;
use crate::urgency::{ClassifierError, TextClassifier};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::Path;
use tokenizers::Tokenizer;
use tract_onnx::prelude::*;

pub const MAX_SEQUENCE_LENGTH: usize = 512;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

pub struct SequenceClassifier {
    tokenizer: Tokenizer,
    model: TractModel,
    labels: Vec<String>,
}

impl SequenceClassifier {
    /// Load from a model directory
    pub fn load(dir: &Path) -> Result<Self> {
        let tokenizer_path = dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            anyhow!(
                "Failed to load tokenizer {}: {}",
                tokenizer_path.display(),
                e
            )
        })?;

        let model_path = dir.join("model.onnx");
        let model = tract_onnx::onnx()
            .model_for_path(&model_path)
            .with_context(|| format!("Failed to parse {}", model_path.display()))?
            .with_input_fact(0, i64::fact([1, MAX_SEQUENCE_LENGTH]).into())
            .context("Failed to set input_ids shape")?
            .with_input_fact(1, i64::fact([1, MAX_SEQUENCE_LENGTH]).into())
            .context("Failed to set attention_mask shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        let labels = read_labels(&dir.join("config.json"))?;

        Ok(Self {
            tokenizer,
            model,
            labels,
        })
    }

    fn logits(&self, text: &str) -> std::result::Result<Vec<f32>, ClassifierError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ClassifierError::Text(e.to_string()))?;
        let (ids, mask) = pad_to_length(encoding.get_ids(), MAX_SEQUENCE_LENGTH);

        let ids: Tensor = tract_ndarray::Array2::from_shape_vec((1, MAX_SEQUENCE_LENGTH), ids)
            .context("Failed to build input_ids tensor")?
            .into();
        let mask: Tensor = tract_ndarray::Array2::from_shape_vec((1, MAX_SEQUENCE_LENGTH), mask)
            .context("Failed to build attention_mask tensor")?
            .into();

        let result = self
            .model
            .run(tvec!(ids.into(), mask.into()))
            .context("NLP inference failed")?;
        let logits = result
            .first()
            .context("NLP model returned no outputs")?
            .to_array_view::<f32>()
            .context("NLP logits are not f32")?
            .iter()
            .copied()
            .collect();
        Ok(logits)
    }
}

impl TextClassifier for SequenceClassifier {
    fn urgent_probability(&self, text: &str) -> std::result::Result<f32, ClassifierError> {
        let probs = softmax(&self.logits(text)?);
        probs.get(1).copied().ok_or_else(|| {
            ClassifierError::Component(anyhow!(
                "urgency model produced {} classes, expected 2",
                probs.len()
            ))
        })
    }
}

impl IntentClassifier for SequenceClassifier {
    fn intent(&self, text: &str) -> Result<String> {
        let logits = self.logits(text).map_err(|e| anyhow!(e))?;
        let best = argmax(&logits).context("intent model produced no logits")?;
        Ok(self
            .labels
            .get(best)
            .cloned()
            .unwrap_or_else(|| format!("LABEL_{}", best)))
    }
}

/// Class labels from a HuggingFace `config.json` (`id2label`)
fn read_labels(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut labels: Vec<(usize, String)> = json
        .get("id2label")
        .and_then(|v| v.as_object())
        .map(|map| {
            map.iter()
                .filter_map(|(id, label)| Some((id.parse().ok()?, label.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();
    labels.sort_by_key(|(id, _)| *id);

    Ok(labels.into_iter().map(|(_, label)| label).collect())
}

/// Truncate or pad token ids to `len`, keeping the final special token
/// when truncating
pub fn pad_to_length(ids: &[u32], len: usize) -> (Vec<i64>, Vec<i64>) {
    let mut kept: Vec<i64> = ids.iter().map(|id| *id as i64).collect();
    if kept.len() > len {
        let last = kept[kept.len() - 1];
        kept.truncate(len);
        if let Some(tail) = kept.last_mut() {
            *tail = last;
        }
    }

    let mut mask = vec![1i64; kept.len()];
    kept.resize(len, 0);
    mask.resize(len, 0);
    (kept, mask)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_softmax() {
        let probs = softmax(&[0.0, 0.0]);
        assert!((probs[0] - 0.5).abs() < 1e-6);

        let probs = softmax(&[-2.0, 3.0]);
        assert!(probs[1] > 0.99);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_pad_to_length() {
        let (ids, mask) = pad_to_length(&[101, 7, 102], 5);
        assert_eq!(ids, vec![101, 7, 102, 0, 0]);
        assert_eq!(mask, vec![1, 1, 1, 0, 0]);

        let (ids, mask) = pad_to_length(&[101, 1, 2, 3, 102], 4);
        assert_eq!(ids, vec![101, 1, 2, 102]);
        assert_eq!(mask, vec![1, 1, 1, 1]);
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[0.1, 2.0, -1.0]), Some(1));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_read_labels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"id2label": {"1": "high_priority", "0": "reminder", "x": "bogus"}}"#,
        )
        .unwrap();
        assert_eq!(read_labels(&path).unwrap(), vec!["reminder", "high_priority"]);
        assert!(read_labels(&dir.path().join("missing.json")).unwrap().is_empty());
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        assert!(SequenceClassifier::load(dir.path()).is_err());
    }
}
