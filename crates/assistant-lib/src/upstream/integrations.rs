//! Integrations service client (calendar + fitness aggregate)

use super::{ProbeResult, ServiceClient, ServiceProbe, TelemetrySource};
use crate::error::UpstreamError;
use crate::models::RawTelemetry;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const SERVICE: &str = "integrations";

const AGGREGATE_PATH: &str = "api/v1/data/aggregate";

pub struct IntegrationsClient {
    inner: ServiceClient,
    timeout: Option<Duration>,
}

impl IntegrationsClient {
    /// `timeout` of `None` leaves telemetry fetches unbounded
    pub fn new(base_url: &str, timeout: Option<Duration>, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner: ServiceClient::new(SERVICE, base_url, probe_timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl TelemetrySource for IntegrationsClient {
    async fn fetch_telemetry(&self, user_token: &str) -> Result<RawTelemetry, UpstreamError> {
        let mut request = self.inner.get(AGGREGATE_PATH)?.bearer_auth(user_token);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let document: Value = self.inner.send_json(request).await?;
        let telemetry = RawTelemetry::from_value(&document);
        debug!(
            calendar_events = telemetry.calendar_events.len(),
            heart_rate_samples = telemetry.heart_rate_samples.len(),
            "Fetched telemetry"
        );
        Ok(telemetry)
    }
}

#[async_trait]
impl ServiceProbe for IntegrationsClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn probe(&self) -> ProbeResult {
        self.inner.probe_health().await
    }
}
