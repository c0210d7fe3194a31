//! HTTP collaborators: the telemetry source and the action dispatcher
//!
//! Every call is a single attempt with a fixed timeout. Failures surface as
//! [`UpstreamError`] immediately; nothing here retries.

pub mod dispatch;
pub mod integrations;

use crate::error::UpstreamError;
use crate::models::{ActionOutcome, ActionRequest, RawTelemetry};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use url::Url;

pub use dispatch::ActionsClient;
pub use integrations::IntegrationsClient;

/// Timeout for action dispatch
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for health probes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of per-user telemetry
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_telemetry(&self, user_token: &str) -> Result<RawTelemetry, UpstreamError>;
}

/// Executes action directives on the user's behalf
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    async fn dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, UpstreamError>;
}

/// Reachability check for a collaborator
#[async_trait]
pub trait ServiceProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn probe(&self) -> ProbeResult;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: f64,
    pub message: String,
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        self.reachable && self.status == Some(200)
    }
}

/// reqwest client bound to one service's base URL
#[derive(Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: Url,
    service: &'static str,
    probe_timeout: Duration,
}

impl ServiceClient {
    pub fn new(service: &'static str, base_url: &str, probe_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        // A trailing slash keeps any path prefix when joining
        let mut base_url =
            Url::parse(base_url).with_context(|| format!("Invalid {} URL: {}", service, base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            service,
            probe_timeout,
        })
    }

    pub fn service(&self) -> &'static str {
        self.service
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, UpstreamError> {
        self.base_url.join(path).map_err(|e| UpstreamError::Request {
            service: self.service,
            message: format!("invalid path {}: {}", path, e),
        })
    }

    fn get(&self, path: &str) -> Result<RequestBuilder, UpstreamError> {
        Ok(self.client.get(self.url(path)?))
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<RequestBuilder, UpstreamError> {
        Ok(self.client.post(self.url(path)?).json(body))
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, UpstreamError> {
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::from_reqwest(self.service, e))?;
        let response = self.check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode {
                service: self.service,
                message: e.to_string(),
            })
    }

    async fn check_status(&self, response: Response) -> Result<Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            service: self.service,
            status: status.as_u16(),
            body,
        })
    }

    /// `GET {base}/health`
    pub async fn probe_health(&self) -> ProbeResult {
        let start = Instant::now();
        let request = match self.get("health") {
            Ok(request) => request.timeout(self.probe_timeout),
            Err(e) => {
                return ProbeResult {
                    reachable: false,
                    status: None,
                    latency_ms: 0.0,
                    message: e.to_string(),
                }
            }
        };

        match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let latency_ms = round_ms(start.elapsed());
                let message = if status == 200 {
                    format!("{} service is reachable", self.service)
                } else {
                    format!("{} service returned status {}", self.service, status)
                };
                ProbeResult {
                    reachable: true,
                    status: Some(status),
                    latency_ms,
                    message,
                }
            }
            Err(e) => ProbeResult {
                reachable: false,
                status: None,
                latency_ms: round_ms(start.elapsed()),
                message: format!("Cannot reach {} service: {}", self.service, e),
            },
        }
    }
}

fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}
