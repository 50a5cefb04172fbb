//! Search-result store: one bounded fetch per query, local derivation after.
//!
//! The store owns an `idle -> searching -> ready` state machine over a
//! [`SearchSession`]. The master list is fetched once per user-initiated
//! query and treated as immutable; filter/sort changes recompute the working
//! list from the master list without touching the network, and pagination is
//! a pure view over the working list.
//!
//! Asynchronous operations are two-phase: `begin_*` hands back a pending
//! ticket tagged with the store's generation, and `apply_*` installs the
//! outcome only when that generation is still current. A newer search or a
//! clear bumps the generation, so a slow response resolving afterwards is
//! discarded instead of resurrecting stale data. The `run_*` wrappers drive
//! both phases against the configured backend.

use std::sync::Arc;

use chrono::{Duration, Utc};
use odx_adapters::normalize_slice;
use odx_client::{
    cancel_pair, CancelHandle, CancelToken, ClientError, OpportunityBackend,
    RecommendationRequest, SearchRequest, SearchResponse,
};
use odx_core::{
    pipeline, CompanyProfile, FilterConfig, Opportunity, Recommendation,
    RecommendationCacheEntry, SearchSession, SortKey, DEFAULT_CANDIDATE_COUNT, DEFAULT_PAGE_SIZE,
    RECOMMENDATION_SUBSET_MAX, RECOMMENDATION_TTL_SECS,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "odx-store";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub user_id: String,
    pub candidate_count: usize,
    pub page_size: usize,
    pub recommendation_subset: usize,
    pub recommendation_ttl: Duration,
    pub active_only: bool,
    pub company_profile: CompanyProfile,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            user_id: "local-user".to_string(),
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
            recommendation_subset: RECOMMENDATION_SUBSET_MAX,
            recommendation_ttl: Duration::seconds(RECOMMENDATION_TTL_SECS),
            active_only: false,
            company_profile: CompanyProfile::default(),
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_id: std::env::var("ODX_USER_ID").unwrap_or(defaults.user_id),
            candidate_count: env_parse("ODX_CANDIDATE_COUNT", defaults.candidate_count),
            page_size: env_parse("ODX_PAGE_SIZE", defaults.page_size),
            recommendation_subset: defaults.recommendation_subset,
            recommendation_ttl: Duration::seconds(env_parse(
                "ODX_RECOMMENDATION_TTL_SECS",
                RECOMMENDATION_TTL_SECS,
            )),
            active_only: std::env::var("ODX_ACTIVE_ONLY")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.active_only),
            company_profile: CompanyProfile {
                url: std::env::var("ODX_COMPANY_URL").unwrap_or_default(),
                description: std::env::var("ODX_COMPANY_DESCRIPTION").unwrap_or_default(),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Idle,
    Searching,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Completed { count: usize },
    /// Empty or whitespace-only query: silently ignored, not an error.
    Ignored,
    /// The response belonged to a superseded generation and was discarded.
    Superseded,
    /// Recoverable network failure; the result set is cleared, not stale.
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecommendationStatus {
    Computed { count: usize },
    CacheHit { count: usize },
    Ignored,
    Cancelled,
    Superseded,
    Failed { message: String },
}

/// In-flight search ticket. Applying it is a no-op once a newer search or a
/// clear has bumped the generation.
#[derive(Debug)]
pub struct PendingSearch {
    generation: u64,
    run_id: Uuid,
    pub request: SearchRequest,
}

#[derive(Debug)]
pub struct PendingRecommendations {
    generation: u64,
    seq: u64,
    run_id: Uuid,
    pub request: RecommendationRequest,
    pub token: CancelToken,
}

pub enum RecommendationPlan {
    Pending(PendingRecommendations),
    CacheHit { count: usize },
    Ignored,
}

pub struct SearchResultStore {
    config: StoreConfig,
    backend: Arc<dyn OpportunityBackend>,
    state: StoreState,
    session: SearchSession,
    generation: u64,
    recommendation_seq: u64,
    notice: Option<String>,
    recommendation_cancel: Option<CancelHandle>,
    recommendations: Option<RecommendationCacheEntry>,
}

impl SearchResultStore {
    pub fn new(config: StoreConfig, backend: Arc<dyn OpportunityBackend>) -> Self {
        let session = SearchSession {
            page_size: config.page_size,
            ..SearchSession::default()
        };
        Self {
            config,
            backend,
            state: StoreState::Idle,
            session,
            generation: 0,
            recommendation_seq: 0,
            notice: None,
            recommendation_cancel: None,
            recommendations: None,
        }
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn session(&self) -> &SearchSession {
        &self.session
    }

    pub fn recommendations(&self) -> Option<&RecommendationCacheEntry> {
        self.recommendations.as_ref()
    }

    /// Transient user-visible notification, consumed on read.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Start a search. Empty/whitespace-only queries are a no-op. Issuing a
    /// new search supersedes any in-flight one and aborts an in-flight
    /// recommendation request.
    pub fn begin_search(&mut self, query: &str) -> Option<PendingSearch> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.cancel_recommendations();
        self.generation += 1;
        self.state = StoreState::Searching;
        let request = SearchRequest {
            query: query.to_string(),
            candidate_count: self.config.candidate_count,
            active_only: self.config.active_only,
            user_id: self.config.user_id.clone(),
        };
        Some(PendingSearch {
            generation: self.generation,
            run_id: Uuid::new_v4(),
            request,
        })
    }

    /// Install a search outcome. Filter and sort state persist across a new
    /// search; the master list is replaced wholesale and the page resets.
    pub fn apply_search(
        &mut self,
        pending: PendingSearch,
        outcome: Result<SearchResponse, ClientError>,
    ) -> SearchStatus {
        if pending.generation != self.generation {
            warn!(run_id = %pending.run_id, "discarding superseded search response");
            return SearchStatus::Superseded;
        }
        match outcome {
            Ok(response) => {
                let mut master = normalize_slice(&response.results);
                master.truncate(self.config.candidate_count);
                let count = master.len();
                self.session.query = pending.request.query;
                self.session.refined_query = response.refined_query;
                self.session.working_list = master.clone();
                self.session.master_list = master;
                self.session.page = 1;
                self.state = StoreState::Ready;
                info!(run_id = %pending.run_id, count, "search completed");
                SearchStatus::Completed { count }
            }
            Err(err) => {
                let message = err.to_string();
                warn!(run_id = %pending.run_id, %message, "search failed");
                // No stale display: the previous master list is discarded.
                self.session.master_list = Vec::new();
                self.session.working_list = Vec::new();
                self.session.page = 1;
                self.state = StoreState::Idle;
                self.notice = Some(message.clone());
                SearchStatus::Failed { message }
            }
        }
    }

    pub async fn run_search(&mut self, query: &str) -> SearchStatus {
        let Some(pending) = self.begin_search(query) else {
            return SearchStatus::Ignored;
        };
        let backend = Arc::clone(&self.backend);
        let outcome = backend.search(&pending.request).await;
        self.apply_search(pending, outcome)
    }

    /// Store the filter config; recompute only when a session is ready with
    /// a non-empty master list, otherwise the config is inert until then.
    pub fn set_filter_config(&mut self, filter: FilterConfig) -> bool {
        self.session.filter = filter;
        self.maybe_recompute()
    }

    pub fn set_sort_key(&mut self, sort: SortKey) -> bool {
        self.session.sort = sort;
        self.maybe_recompute()
    }

    fn maybe_recompute(&mut self) -> bool {
        if self.state != StoreState::Ready || self.session.master_list.is_empty() {
            return false;
        }
        // Always from the master list so filters never compound across calls.
        let today = Utc::now().date_naive();
        let filtered = pipeline::apply_filters(&self.session.master_list, &self.session.filter, today);
        self.session.working_list = pipeline::apply_sort(&filtered, self.session.sort);
        self.session.page = 1;
        debug!(
            working = self.session.working_list.len(),
            master = self.session.master_list.len(),
            "recomputed working list"
        );
        true
    }

    /// Clamp and move the page cursor; a pure view over the working list.
    pub fn paginate(&mut self, page: usize) -> &[Opportunity] {
        self.session.page = pipeline::clamp_page(page, self.session.working_list.len(), self.session.page_size);
        self.current_page()
    }

    pub fn current_page(&self) -> &[Opportunity] {
        pipeline::page_slice(&self.session.working_list, self.session.page, self.session.page_size)
    }

    pub fn total_pages(&self) -> usize {
        pipeline::total_pages(self.session.working_list.len(), self.session.page_size)
    }

    /// Reset to initial defaults and invalidate anything still in flight.
    pub fn clear(&mut self) {
        self.cancel_recommendations();
        self.generation += 1;
        self.session = SearchSession {
            page_size: self.config.page_size,
            ..SearchSession::default()
        };
        self.state = StoreState::Idle;
        self.recommendations = None;
        self.notice = None;
    }

    /// Plan a recommendation fetch for the current master list. A fresh cache
    /// entry short-circuits; an in-flight request is aborted before a new one
    /// is issued.
    pub fn begin_recommendations(&mut self) -> RecommendationPlan {
        if self.session.master_list.is_empty() {
            return RecommendationPlan::Ignored;
        }
        if let Some(entry) = &self.recommendations {
            if entry.is_fresh(&self.session.query, Utc::now(), self.config.recommendation_ttl) {
                return RecommendationPlan::CacheHit {
                    count: entry.recommendations.len(),
                };
            }
        }
        self.cancel_recommendations();
        self.recommendation_seq += 1;
        let (handle, token) = cancel_pair();
        self.recommendation_cancel = Some(handle);
        let request = RecommendationRequest {
            company_profile: self.config.company_profile.clone(),
            opportunities: self
                .session
                .master_list
                .iter()
                .take(self.config.recommendation_subset)
                .cloned()
                .collect(),
            search_query: self.session.query.clone(),
            user_id: self.config.user_id.clone(),
        };
        RecommendationPlan::Pending(PendingRecommendations {
            generation: self.generation,
            seq: self.recommendation_seq,
            run_id: Uuid::new_v4(),
            request,
            token,
        })
    }

    pub fn apply_recommendations(
        &mut self,
        pending: PendingRecommendations,
        outcome: Result<Vec<Recommendation>, ClientError>,
    ) -> RecommendationStatus {
        if pending.generation != self.generation || pending.seq != self.recommendation_seq {
            // A stale ticket must not touch the cancel handle either: it may
            // belong to a newer request that is still in flight.
            warn!(run_id = %pending.run_id, "discarding recommendations for a superseded request");
            return RecommendationStatus::Superseded;
        }
        self.recommendation_cancel = None;
        match outcome {
            Ok(recommendations) => {
                let count = recommendations.len();
                self.recommendations = Some(RecommendationCacheEntry {
                    recommendations,
                    query: self.session.query.clone(),
                    written_at: Utc::now(),
                    master_len: self.session.master_list.len(),
                });
                info!(run_id = %pending.run_id, count, "recommendations computed");
                RecommendationStatus::Computed { count }
            }
            Err(err) if err.is_cancelled() => {
                debug!(run_id = %pending.run_id, "recommendation fetch cancelled");
                RecommendationStatus::Cancelled
            }
            Err(err) => {
                let message = err.to_string();
                warn!(run_id = %pending.run_id, %message, "recommendation fetch failed");
                self.notice = Some(message.clone());
                RecommendationStatus::Failed { message }
            }
        }
    }

    pub async fn run_recommendations(&mut self) -> RecommendationStatus {
        match self.begin_recommendations() {
            RecommendationPlan::Ignored => RecommendationStatus::Ignored,
            RecommendationPlan::CacheHit { count } => RecommendationStatus::CacheHit { count },
            RecommendationPlan::Pending(pending) => {
                let backend = Arc::clone(&self.backend);
                let outcome = backend
                    .recommend(&pending.request, pending.token.clone())
                    .await;
                self.apply_recommendations(pending, outcome)
            }
        }
    }

    /// User-triggered "cancel generation": aborts the in-flight request and
    /// leaves all session state as it was. Advances the request sequence so a
    /// response that raced the abort cannot install afterwards.
    pub fn cancel_recommendations(&mut self) {
        if let Some(handle) = self.recommendation_cancel.take() {
            handle.cancel();
            self.recommendation_seq += 1;
        }
    }

    /// Recommendations paired with the opportunity they scored; positional
    /// references are re-resolved against the current master list, and
    /// out-of-range positions come back unlinked.
    pub fn linked_recommendations(&self) -> Vec<(&Recommendation, Option<&Opportunity>)> {
        let master = &self.session.master_list;
        self.recommendations
            .iter()
            .flat_map(|entry| entry.recommendations.iter())
            .map(|rec| (rec, rec.linked_opportunity(master)))
            .collect()
    }

    /// Install a restored session without any fetch. Filter and sort land
    /// before the query string so restoration can never look like a new
    /// search to observers of the session state.
    pub fn restore_session(
        &mut self,
        restored: SearchSession,
        recommendations: Option<RecommendationCacheEntry>,
    ) {
        self.session.filter = restored.filter;
        self.session.sort = restored.sort;
        self.session.query = restored.query;
        self.session.refined_query = restored.refined_query;
        self.session.master_list = restored.master_list;
        self.session.working_list = restored.working_list;
        self.session.page_size = restored.page_size;
        self.session.page = pipeline::clamp_page(
            restored.page,
            self.session.working_list.len(),
            self.session.page_size,
        );
        self.state = if self.session.master_list.is_empty() {
            StoreState::Idle
        } else {
            StoreState::Ready
        };
        self.recommendations = recommendations;
    }
}
