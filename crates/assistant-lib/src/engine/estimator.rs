//! Stress estimators backing the decision engine
//!
//! An estimator maps one feature row to one or more numeric outputs. ONNX
//! models run through tract; linear models are evaluated directly.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tract_onnx::prelude::*;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A model returned something that is not a number
#[derive(Debug, Error)]
#[error("model produced non-numeric output ({0})")]
pub struct NonNumericOutput(pub String);

pub trait Estimator: Send + Sync {
    /// Run the model on a single row
    fn predict_row(&self, row: &[f64]) -> Result<Vec<f64>>;

    /// Number of inputs the model expects
    fn input_width(&self) -> usize;

    fn describe(&self) -> String;
}

/// ONNX estimator with a fixed `f32[1, n]` input
pub struct OnnxEstimator {
    model: TractModel,
    n_inputs: usize,
    source: PathBuf,
}

impl OnnxEstimator {
    /// Load from disk, verifying the SHA-256 checksum when one is given
    pub fn load(path: &Path, n_inputs: usize, expected_sha256: Option<&str>) -> Result<Self> {
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read ONNX model {}", path.display()))?;

        if let Some(expected) = expected_sha256 {
            let computed = compute_checksum(&bytes);
            if !computed.eq_ignore_ascii_case(expected.trim()) {
                anyhow::bail!(
                    "Checksum mismatch for {}: expected {}, got {}",
                    path.display(),
                    expected,
                    computed
                );
            }
        }

        let model = Self::load_model(&bytes, n_inputs)
            .with_context(|| format!("Failed to load ONNX model {}", path.display()))?;
        Ok(Self {
            model,
            n_inputs,
            source: path.to_path_buf(),
        })
    }

    fn load_model(bytes: &[u8], n_inputs: usize) -> Result<TractModel> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, n_inputs]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }
}

impl Estimator for OnnxEstimator {
    fn predict_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.n_inputs {
            anyhow::bail!(
                "Feature row has {} values, model expects {}",
                row.len(),
                self.n_inputs
            );
        }

        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let input: Tensor = tract_ndarray::Array2::from_shape_vec((1, self.n_inputs), data)
            .context("Failed to build input tensor")?
            .into();

        let result = self
            .model
            .run(tvec!(input.into()))
            .context("Inference failed")?;
        let output = result.first().context("Model returned no outputs")?;

        tensor_values(output)
    }

    fn input_width(&self) -> usize {
        self.n_inputs
    }

    fn describe(&self) -> String {
        format!("onnx:{}", self.source.display())
    }
}

fn tensor_values(output: &Tensor) -> Result<Vec<f64>> {
    let values = match output.datum_type() {
        DatumType::F32 => output
            .to_array_view::<f32>()?
            .iter()
            .map(|v| *v as f64)
            .collect(),
        DatumType::F64 => output.to_array_view::<f64>()?.iter().copied().collect(),
        DatumType::I64 => output
            .to_array_view::<i64>()?
            .iter()
            .map(|v| *v as f64)
            .collect(),
        DatumType::I32 => output
            .to_array_view::<i32>()?
            .iter()
            .map(|v| *v as f64)
            .collect(),
        other => return Err(NonNumericOutput(format!("{:?}", other)).into()),
    };
    Ok(values)
}

/// `intercept + Σ coefficient·x`
#[derive(Debug, Clone, PartialEq)]
pub struct LinearEstimator {
    intercept: f64,
    coefficients: Vec<f64>,
}

impl LinearEstimator {
    pub fn new(intercept: f64, coefficients: Vec<f64>) -> Self {
        Self {
            intercept,
            coefficients,
        }
    }
}

impl Estimator for LinearEstimator {
    fn predict_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        if row.len() != self.coefficients.len() {
            anyhow::bail!(
                "Feature row has {} values, model has {} coefficients",
                row.len(),
                self.coefficients.len()
            );
        }
        let dot: f64 = row
            .iter()
            .zip(&self.coefficients)
            .map(|(x, w)| x * w)
            .sum();
        Ok(vec![self.intercept + dot])
    }

    fn input_width(&self) -> usize {
        self.coefficients.len()
    }

    fn describe(&self) -> String {
        format!("linear[{}]", self.coefficients.len())
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_linear_estimator() {
        let model = LinearEstimator::new(1.0, vec![0.5, 2.0]);
        assert_eq!(model.predict_row(&[4.0, 1.5]).unwrap(), vec![6.0]);
        assert_eq!(model.input_width(), 2);
        assert!(model.predict_row(&[1.0]).is_err());
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"stress model");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"stress model"));
    }

    #[test]
    fn test_onnx_checksum_mismatch_rejected_before_parsing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stress.onnx");
        fs::write(&path, b"not really onnx").unwrap();

        let err = OnnxEstimator::load(&path, 5, Some("00ff")).err().unwrap();
        assert!(err.to_string().contains("Checksum mismatch"));
    }

    #[test]
    fn test_onnx_invalid_bytes_fail_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stress.onnx");
        fs::write(&path, b"not really onnx").unwrap();

        let checksum = compute_checksum(b"not really onnx").to_uppercase();
        let err = OnnxEstimator::load(&path, 5, Some(&checksum)).err().unwrap();
        assert!(format!("{:#}", err).contains("Failed to load ONNX model"));
    }

    #[test]
    fn test_onnx_missing_file() {
        let err = OnnxEstimator::load(Path::new("/nonexistent/stress.onnx"), 5, None)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to read ONNX model"));
    }
}
