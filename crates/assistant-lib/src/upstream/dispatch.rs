//! Actions service client

use super::{ActionDispatcher, ProbeResult, ServiceClient, ServiceProbe};
use crate::error::UpstreamError;
use crate::models::{ActionOutcome, ActionRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const SERVICE: &str = "actions";

const EXECUTE_PATH: &str = "api/v1/execute_action";

pub struct ActionsClient {
    inner: ServiceClient,
    timeout: Duration,
}

impl ActionsClient {
    pub fn new(base_url: &str, timeout: Duration, probe_timeout: Duration) -> Result<Self> {
        Ok(Self {
            inner: ServiceClient::new(SERVICE, base_url, probe_timeout)?,
            timeout,
        })
    }
}

#[async_trait]
impl ActionDispatcher for ActionsClient {
    async fn dispatch(&self, request: &ActionRequest) -> Result<ActionOutcome, UpstreamError> {
        let builder = self
            .inner
            .post(EXECUTE_PATH, request)?
            .bearer_auth(&request.user_token)
            .timeout(self.timeout);
        self.inner.send_json(builder).await
    }
}

#[async_trait]
impl ServiceProbe for ActionsClient {
    fn name(&self) -> &'static str {
        SERVICE
    }

    async fn probe(&self) -> ProbeResult {
        self.inner.probe_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActionKind;
    use crate::upstream::DEFAULT_PROBE_TIMEOUT;
    use mockito::Matcher;
    use serde_json::{json, Map};

    fn request() -> ActionRequest {
        let mut details = Map::new();
        details.insert("title".to_string(), json!("Stretch Break"));
        details.insert("duration".to_string(), json!(15));
        ActionRequest {
            action: ActionKind::CreateBreakEvent,
            details,
            user_token: "user-token".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_posts_request_and_returns_outcome() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v1/execute_action")
            .match_header("authorization", "Bearer user-token")
            .match_body(Matcher::Json(json!({
                "action": "create_break_event",
                "details": {"title": "Stretch Break", "duration": 15},
                "user_token": "user-token"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status": "success", "event_id": "evt_1"}"#)
            .create_async()
            .await;

        let client = ActionsClient::new(&server.url(), Duration::from_secs(30), DEFAULT_PROBE_TIMEOUT)
            .unwrap();
        let outcome = client.dispatch(&request()).await.unwrap();

        mock.assert_async().await;
        assert_eq!(outcome["event_id"], "evt_1");
    }

    #[tokio::test]
    async fn test_dispatch_failure_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/v1/execute_action")
            .with_status(500)
            .with_body(r#"{"detail": "Error executing action"}"#)
            .create_async()
            .await;

        let client = ActionsClient::new(&server.url(), Duration::from_secs(30), DEFAULT_PROBE_TIMEOUT)
            .unwrap();
        let err = client.dispatch(&request()).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Status { status: 500, .. }));
        assert_eq!(err.service(), SERVICE);
    }
}
