//! Delivery to the remote scoring service
//!
//! Two paths exist and are kept apart in the interface: request/response calls
//! that the caller awaits, and [`Transport::send_beacon`], a best-effort send
//! with no return value and no retry, used while the page is torn down.

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::protocol::{
    Endpoint, LeadCaptureRequest, ScoringResponse, TrackBehaviorBatch, VisitorPayload,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

/// Outbound channel to the scoring service
#[async_trait]
pub trait Transport: Send + Sync {
    /// Score the visitor on the current page
    async fn process_visitor(
        &self,
        payload: &VisitorPayload,
    ) -> Result<ScoringResponse, TrackerError>;

    /// Deliver a batch of tracking events
    async fn track_behavior(&self, batch: &TrackBehaviorBatch) -> Result<(), TrackerError>;

    /// Submit a gated content lead
    async fn capture_lead(&self, request: &LeadCaptureRequest) -> Result<Value, TrackerError>;

    /// Attempt delivery without waiting for, or caring about, the outcome
    fn send_beacon(&self, endpoint: Endpoint, body: Value);
}

/// [`Transport`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &TrackerConfig) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("intent-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}{}", self.base_url, endpoint.path())
    }

    async fn post_json<B, R>(&self, endpoint: Endpoint, body: &B) -> Result<R, TrackerError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let response = self
            .client
            .post(self.url(endpoint))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::StatusError {
                endpoint: endpoint.path().to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(R::default());
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn process_visitor(
        &self,
        payload: &VisitorPayload,
    ) -> Result<ScoringResponse, TrackerError> {
        self.post_json(Endpoint::ProcessVisitor, payload).await
    }

    async fn track_behavior(&self, batch: &TrackBehaviorBatch) -> Result<(), TrackerError> {
        let _: Value = self.post_json(Endpoint::TrackBehavior, batch).await?;
        Ok(())
    }

    async fn capture_lead(&self, request: &LeadCaptureRequest) -> Result<Value, TrackerError> {
        self.post_json(Endpoint::CaptureLead, request).await
    }

    fn send_beacon(&self, endpoint: Endpoint, body: Value) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!(endpoint = endpoint.path(), "no runtime, beacon dropped");
            return;
        };

        let request = self.client.post(self.url(endpoint)).json(&body);
        runtime.spawn(async move {
            match request.send().await {
                Ok(resp) => trace!(
                    endpoint = endpoint.path(),
                    status = resp.status().as_u16(),
                    "beacon delivered"
                ),
                Err(e) => debug!(endpoint = endpoint.path(), error = %e, "beacon failed"),
            }
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// How the fake answers scoring requests
    #[derive(Debug, Clone)]
    pub(crate) enum Reply {
        Respond(ScoringResponse),
        RespondAfter(Duration, ScoringResponse),
        Fail,
        Hang,
    }

    /// In-memory transport recording every call
    pub(crate) struct FakeTransport {
        pub(crate) reply: Mutex<Reply>,
        pub(crate) scoring_calls: Mutex<Vec<VisitorPayload>>,
        pub(crate) batches: Mutex<Vec<TrackBehaviorBatch>>,
        pub(crate) leads: Mutex<Vec<LeadCaptureRequest>>,
        pub(crate) beacons: Mutex<Vec<(Endpoint, Value)>>,
        pub(crate) fail_batches: bool,
    }

    impl FakeTransport {
        pub(crate) fn new(reply: Reply) -> Self {
            Self {
                reply: Mutex::new(reply),
                scoring_calls: Mutex::new(Vec::new()),
                batches: Mutex::new(Vec::new()),
                leads: Mutex::new(Vec::new()),
                beacons: Mutex::new(Vec::new()),
                fail_batches: false,
            }
        }

        pub(crate) fn failing_batches() -> Self {
            Self {
                fail_batches: true,
                ..Self::new(Reply::Fail)
            }
        }

        pub(crate) fn set_reply(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }

        pub(crate) fn scoring_count(&self) -> usize {
            self.scoring_calls.lock().unwrap().len()
        }

        pub(crate) fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    fn unavailable(endpoint: Endpoint) -> TrackerError {
        TrackerError::StatusError {
            endpoint: endpoint.path().to_string(),
            status: 503,
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn process_visitor(
            &self,
            payload: &VisitorPayload,
        ) -> Result<ScoringResponse, TrackerError> {
            self.scoring_calls.lock().unwrap().push(payload.clone());
            let reply = self.reply.lock().unwrap().clone();
            match reply {
                Reply::Respond(response) => Ok(response),
                Reply::RespondAfter(delay, response) => {
                    tokio::time::sleep(delay).await;
                    Ok(response)
                }
                Reply::Fail => Err(unavailable(Endpoint::ProcessVisitor)),
                Reply::Hang => std::future::pending().await,
            }
        }

        async fn track_behavior(&self, batch: &TrackBehaviorBatch) -> Result<(), TrackerError> {
            self.batches.lock().unwrap().push(batch.clone());
            if self.fail_batches {
                return Err(unavailable(Endpoint::TrackBehavior));
            }
            Ok(())
        }

        async fn capture_lead(
            &self,
            request: &LeadCaptureRequest,
        ) -> Result<Value, TrackerError> {
            self.leads.lock().unwrap().push(request.clone());
            Ok(serde_json::json!({ "success": true }))
        }

        fn send_beacon(&self, endpoint: Endpoint, body: Value) {
            self.beacons.lock().unwrap().push((endpoint, body));
        }
    }

    #[test]
    fn test_endpoint_urls() {
        let config = TrackerConfig {
            api_base_url: "https://api.example.test/".to_string(),
            ..TrackerConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();

        assert_eq!(
            transport.url(Endpoint::ProcessVisitor),
            "https://api.example.test/api/process-visitor"
        );
        assert_eq!(
            transport.url(Endpoint::TrackBehavior),
            "https://api.example.test/api/track-behavior"
        );
        assert_eq!(
            transport.url(Endpoint::CaptureLead),
            "https://api.example.test/api/capture-lead"
        );
    }

    #[test]
    fn test_beacon_without_runtime_is_dropped() {
        let transport = HttpTransport::new(&TrackerConfig::default()).unwrap();
        // Must return without panicking or blocking
        transport.send_beacon(Endpoint::ProcessVisitor, serde_json::json!({}));
    }

    #[tokio::test]
    async fn test_connection_failure_is_an_error() {
        let config = TrackerConfig {
            api_base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 500,
            ..TrackerConfig::default()
        };
        let transport = HttpTransport::new(&config).unwrap();
        let batch = TrackBehaviorBatch::new(
            crate::types::VisitorIdentity {
                visitor_id: "v_1".to_string(),
                session_id: "s_1".to_string(),
            },
            None,
            Vec::new(),
            Default::default(),
        );

        let result = transport.track_behavior(&batch).await;
        assert!(matches!(result, Err(TrackerError::HttpError(_))));
    }
}
