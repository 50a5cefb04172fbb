//! HTTP boundary over the search and recommendation endpoints.
//!
//! Both endpoints are opaque upstream services reached over plain
//! request/response. Failures here are recoverable from the user's point of
//! view: each user-initiated search is a fresh attempt, with no retry or
//! backoff. The recommendation call carries an explicit cancel path.

use std::time::Duration;

use async_trait::async_trait;
use odx_core::{CompanyProfile, Opportunity, Recommendation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "odx-client";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("ODX_API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ODX_HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),
            user_agent: std::env::var("ODX_USER_AGENT").ok(),
        }
    }
}

/// One bounded search request: all further narrowing happens locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub candidate_count: usize,
    pub active_only: bool,
    pub user_id: String,
}

/// Raw candidate list as returned by the endpoint; elements stay untyped
/// until normalization.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<Value>,
    #[serde(default)]
    pub refined_query: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub company_profile: CompanyProfile,
    /// Master-list subset, at most [`odx_core::RECOMMENDATION_SUBSET_MAX`].
    pub opportunities: Vec<Opportunity>,
    pub search_query: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationResponse {
    recommendations: Vec<RecommendationDto>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationDto {
    opportunity_index: i64,
    match_score: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    key_insights: Vec<String>,
    #[serde(default)]
    match_criteria: Vec<String>,
}

impl From<RecommendationDto> for Recommendation {
    fn from(dto: RecommendationDto) -> Self {
        Self {
            source_index: usize::try_from(dto.opportunity_index.max(0)).unwrap_or(usize::MAX),
            match_score: dto.match_score.clamp(0, 100) as u8,
            title: dto.title,
            description: dto.description,
            key_insights: dto.key_insights,
            match_criteria: dto.match_criteria,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("recommendation request cancelled")]
    Cancelled,
}

impl ClientError {
    /// Recoverable failures are surfaced as a transient notification and the
    /// user may simply resubmit. Cancellation is not an error at all.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Hands out paired cancel ends. The holder of the handle cancels; the token
/// side is checked at the request's suspension point.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled. A dropped handle without a cancel call never
    /// resolves, so an abandoned token cannot abort a request by accident.
    pub async fn cancelled(mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Seam between the store and the network; tests drive the store with a
/// scripted stub implementation.
#[async_trait]
pub trait OpportunityBackend: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError>;

    async fn recommend(
        &self,
        request: &RecommendationRequest,
        cancel: CancelToken,
    ) -> Result<Vec<Recommendation>, ClientError>;
}

#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        Ok(Self {
            client: builder.build()?,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp, ClientError> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl OpportunityBackend for HttpBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("search_fetch", %run_id, query = %request.query);
        self.post_json("/api/search", request).instrument(span).await
    }

    async fn recommend(
        &self,
        request: &RecommendationRequest,
        cancel: CancelToken,
    ) -> Result<Vec<Recommendation>, ClientError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("recommendation_fetch", %run_id, query = %request.search_query);
        let fetch = self.post_json::<_, RecommendationResponse>("/api/recommendations", request);
        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            response = fetch.instrument(span) => {
                Ok(response?.recommendations.into_iter().map(Into::into).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_without_env() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout, Duration::from_secs(20));
    }

    #[test]
    fn cancellation_is_not_recoverable_and_not_an_error_to_report() {
        assert!(!ClientError::Cancelled.is_recoverable());
        assert!(ClientError::Cancelled.is_cancelled());
        let status = ClientError::HttpStatus {
            status: 503,
            url: "http://localhost/api/search".to_string(),
        };
        assert!(status.is_recoverable());
        assert!(!status.is_cancelled());
    }

    #[test]
    fn recommendation_dto_clamps_score_and_index() {
        let dto = RecommendationDto {
            opportunity_index: -2,
            match_score: 140,
            title: "t".to_string(),
            description: String::new(),
            key_insights: vec![],
            match_criteria: vec![],
        };
        let rec: Recommendation = dto.into();
        assert_eq!(rec.source_index, 0);
        assert_eq!(rec.match_score, 100);
    }

    #[test]
    fn recommendation_response_wire_shape() {
        let body = r#"{
            "recommendations": [{
                "opportunityIndex": 3,
                "matchScore": 87,
                "title": "Strong fit",
                "description": "Aligned with profile",
                "keyInsights": ["past performance"],
                "matchCriteria": ["NAICS 541512"]
            }]
        }"#;
        let parsed: RecommendationResponse = serde_json::from_str(body).unwrap();
        let rec: Recommendation = parsed.recommendations[0].clone().into();
        assert_eq!(rec.source_index, 3);
        assert_eq!(rec.match_score, 87);
        assert_eq!(rec.key_insights, vec!["past performance"]);
    }

    #[test]
    fn search_request_wire_shape_is_camel_case() {
        let request = SearchRequest {
            query: "cybersecurity training".to_string(),
            candidate_count: 25,
            active_only: true,
            user_id: "user-1".to_string(),
        };
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["candidateCount"], 25);
        assert_eq!(wire["activeOnly"], true);
        assert_eq!(wire["userId"], "user-1");
    }

    #[tokio::test]
    async fn cancel_token_observes_handle() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await; // resolves immediately once cancelled
    }

    #[tokio::test]
    async fn dropped_handle_without_cancel_never_aborts() {
        let (handle, token) = cancel_pair();
        drop(handle);
        let outcome = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(outcome.is_err(), "token must stay pending after handle drop");
    }
}
