//! API client for the assistant service

use anyhow::{Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

/// API client for the assistant service
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        // Recommendations wait on both collaborators
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Request a recommendation for a user
    pub async fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse> {
        let url = self.base_url.join("api/v1/recommend").context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .context("Failed to send request")?;

        parse_success(response).await
    }

    /// Comprehensive health; a 503 still carries the report
    pub async fn health(&self) -> Result<HealthReport> {
        let url = self.base_url.join("health").context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return response.json().await.context("Failed to parse response");
        }
        parse_success(response).await
    }
}

async fn parse_success<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => anyhow::bail!("API error ({}, {}): {}", status, err.error_code, err.detail),
            Err(_) => anyhow::bail!("API error ({}): {}", status, body),
        }
    }

    response.json().await.context("Failed to parse response")
}

// API request and response types

#[derive(Debug, Clone, Serialize)]
pub struct RecommendRequest {
    pub user_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendResponse {
    pub status: String,
    pub recommendation: String,
    pub stress_level: i64,
    pub action_taken: String,
    #[serde(default)]
    pub action_details: Map<String, Value>,
    #[serde(default)]
    pub features_used: BTreeMap<String, f64>,
    #[serde(default)]
    pub action_service_response: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub service: String,
    pub timestamp: String,
    #[serde(default)]
    pub checks: BTreeMap<String, ComponentCheck>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
    pub error_code: String,
}
