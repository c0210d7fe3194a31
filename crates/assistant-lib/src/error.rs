//! Error taxonomy surfaced by the recommendation pipeline
//!
//! Every variant maps to a stable HTTP status and error code. Internal
//! plumbing (model loading, tensor conversion) uses `anyhow` with context and
//! is folded into these variants at the stage boundary.

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure talking to an upstream or downstream HTTP collaborator
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("timeout while communicating with {service}")]
    Timeout { service: &'static str },

    #[error("cannot connect to {service}: {message}")]
    Connect {
        service: &'static str,
        message: String,
    },

    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid response from {service}: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },

    #[error("request to {service} failed: {message}")]
    Request {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn from_reqwest(service: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout { service }
        } else if err.is_connect() {
            UpstreamError::Connect {
                service,
                message: err.to_string(),
            }
        } else if err.is_decode() {
            UpstreamError::Decode {
                service,
                message: err.to_string(),
            }
        } else {
            UpstreamError::Request {
                service,
                message: err.to_string(),
            }
        }
    }

    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Timeout { service }
            | UpstreamError::Connect { service, .. }
            | UpstreamError::Status { service, .. }
            | UpstreamError::Decode { service, .. }
            | UpstreamError::Request { service, .. } => service,
        }
    }
}

/// Externally visible pipeline failures
#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("ML model not loaded")]
    ModelNotLoaded,

    #[error("error communicating with upstream service: {0}")]
    UpstreamUnavailable(#[source] UpstreamError),

    #[error("ML prediction failed: {reason}")]
    PredictionFailed {
        reason: String,
        #[source]
        cause: Option<BoxError>,
    },

    #[error("invalid model output: {0}")]
    InvalidModelOutput(String),

    #[error("action dispatch failed: {0}")]
    DownstreamDispatchFailed(#[source] UpstreamError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl AssistantError {
    /// Prediction failure with the underlying cause kept for diagnostics
    pub fn prediction_failed(cause: anyhow::Error) -> Self {
        AssistantError::PredictionFailed {
            reason: format!("{:#}", cause),
            cause: Some(cause.into()),
        }
    }

    pub fn prediction_unavailable(reason: impl Into<String>) -> Self {
        AssistantError::PredictionFailed {
            reason: reason.into(),
            cause: None,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            AssistantError::ModelNotLoaded => 503,
            AssistantError::UpstreamUnavailable(_) => 502,
            AssistantError::PredictionFailed { .. } => 503,
            AssistantError::InvalidModelOutput(_) => 500,
            AssistantError::DownstreamDispatchFailed(_) => 502,
            AssistantError::InvalidRequest(_) => 400,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AssistantError::ModelNotLoaded => "MODEL_NOT_LOADED",
            AssistantError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AssistantError::PredictionFailed { .. } => "PREDICTION_FAILED",
            AssistantError::InvalidModelOutput(_) => "INVALID_MODEL_OUTPUT",
            AssistantError::DownstreamDispatchFailed(_) => "DISPATCH_FAILED",
            AssistantError::InvalidRequest(_) => "INVALID_REQUEST",
        }
    }

    /// Short label used for the error metric
    pub fn class(&self) -> &'static str {
        match self {
            AssistantError::ModelNotLoaded => "model_not_loaded",
            AssistantError::UpstreamUnavailable(_) => "upstream_unavailable",
            AssistantError::PredictionFailed { .. } => "prediction_failed",
            AssistantError::InvalidModelOutput(_) => "invalid_model_output",
            AssistantError::DownstreamDispatchFailed(_) => "dispatch_failed",
            AssistantError::InvalidRequest(_) => "invalid_request",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_prediction_failed_keeps_cause() {
        let cause = anyhow::anyhow!("tensor shape mismatch").context("running stress model");
        let err = AssistantError::prediction_failed(cause);

        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("running stress model"));
        assert!(err.to_string().contains("tensor shape mismatch"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_status_codes_are_distinct_per_class() {
        let upstream = AssistantError::UpstreamUnavailable(UpstreamError::Timeout {
            service: "integrations",
        });
        let dispatch = AssistantError::DownstreamDispatchFailed(UpstreamError::Status {
            service: "actions",
            status: 500,
            body: "boom".to_string(),
        });

        assert_eq!(AssistantError::ModelNotLoaded.status_code(), 503);
        assert_eq!(upstream.status_code(), 502);
        assert_eq!(dispatch.status_code(), 502);
        assert_ne!(upstream.error_code(), dispatch.error_code());
        assert_eq!(
            AssistantError::InvalidModelOutput("NaN".into()).error_code(),
            "INVALID_MODEL_OUTPUT"
        );
    }

    #[test]
    fn test_upstream_error_names_service() {
        let err = UpstreamError::Status {
            service: "integrations",
            status: 401,
            body: "Not authenticated.".to_string(),
        };
        assert_eq!(err.service(), "integrations");
        assert!(err.to_string().contains("401"));
    }
}
