//! End-to-end discovery flow over a scripted backend: one bounded fetch,
//! then filter, sort, and paginate locally without further network calls.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use odx_client::{
    CancelToken, ClientError, OpportunityBackend, RecommendationRequest, SearchRequest,
    SearchResponse,
};
use odx_core::{DueDateBucket, FilterConfig, Recommendation, SortKey};
use odx_store::{SearchResultStore, SearchStatus, StoreConfig};
use serde_json::{json, Value};

struct FixtureBackend {
    results: Vec<Value>,
    search_calls: AtomicUsize,
}

#[async_trait]
impl OpportunityBackend for FixtureBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, ClientError> {
        assert_eq!(request.candidate_count, 25);
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(SearchResponse {
            results: self.results.clone(),
            refined_query: Some("cybersecurity workforce training".to_string()),
        })
    }

    async fn recommend(
        &self,
        request: &RecommendationRequest,
        _cancel: CancelToken,
    ) -> Result<Vec<Recommendation>, ClientError> {
        assert!(request.opportunities.len() <= 10);
        Ok(vec![])
    }
}

fn due_in(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

/// 18 candidates: three due within 7 days (varied budgets), the rest due
/// later or with no deadline. A mix of structured and flat shapes.
fn fixture_results() -> Vec<Value> {
    let mut results = vec![
        json!({
            "id": "soon-low",
            "title": "Phishing awareness course",
            "budget": "$250,000",
            "response_deadline": due_in(3)
        }),
        json!({
            "id": "soon-high",
            "details": {
                "title": "Cyber range buildout",
                "agency": "DoD",
                "platform": "federal",
                "budget": "$1,200,000"
            },
            "timelines": { "due_date": due_in(6), "published_date": due_in(-2) },
            "description": { "text": "Range services." }
        }),
        json!({
            "id": "soon-mid",
            "title": "Tabletop exercises",
            "budget": "$500,000",
            "response_deadline": due_in(1)
        }),
    ];
    for i in 0..10 {
        results.push(json!({
            "id": format!("later-{i}"),
            "title": format!("Later opportunity {i}"),
            "response_deadline": due_in(60 + i)
        }));
    }
    for i in 0..5 {
        results.push(json!({
            "id": format!("open-{i}"),
            "title": format!("No deadline {i}")
        }));
    }
    results
}

#[tokio::test]
async fn scenario_filter_sort_paginate_without_refetch() {
    let backend = Arc::new(FixtureBackend {
        results: fixture_results(),
        search_calls: AtomicUsize::new(0),
    });
    let mut store = SearchResultStore::new(StoreConfig::default(), backend.clone());

    let status = store.run_search("cybersecurity training").await;
    assert_eq!(status, SearchStatus::Completed { count: 18 });
    assert_eq!(
        store.session().refined_query.as_deref(),
        Some("cybersecurity workforce training")
    );

    store.set_filter_config(FilterConfig {
        due_date_bucket: DueDateBucket::Within7Days,
        ..FilterConfig::default()
    });
    assert_eq!(store.session().working_list.len(), 3);

    store.set_sort_key(SortKey::BudgetDescending);
    let ids: Vec<_> = store
        .session()
        .working_list
        .iter()
        .map(|o| o.id.as_str())
        .collect();
    assert_eq!(ids, vec!["soon-high", "soon-mid", "soon-low"]);

    let page_len = store.paginate(1).len();
    assert_eq!(page_len, 3, "pageSize 5 > 3 matching records");
    assert_eq!(store.total_pages(), 1);

    // Filter/sort/pagination never re-queried the endpoint.
    assert_eq!(backend.search_calls.load(Ordering::SeqCst), 1);

    // Re-running the full filter set from the master list equals the stored
    // working list: filters never compound.
    let today = Utc::now().date_naive();
    let refiltered = odx_core::pipeline::apply_sort(
        &odx_core::pipeline::apply_filters(
            &store.session().master_list,
            &store.session().filter,
            today,
        ),
        store.session().sort,
    );
    assert_eq!(refiltered, store.session().working_list);
}

#[tokio::test]
async fn widening_the_filter_restores_the_master_list() {
    let backend = Arc::new(FixtureBackend {
        results: fixture_results(),
        search_calls: AtomicUsize::new(0),
    });
    let mut store = SearchResultStore::new(StoreConfig::default(), backend);
    store.run_search("cybersecurity training").await;

    store.set_filter_config(FilterConfig {
        due_date_bucket: DueDateBucket::Within7Days,
        ..FilterConfig::default()
    });
    store.set_filter_config(FilterConfig::default());
    assert_eq!(store.session().working_list.len(), 18);
    assert_eq!(store.total_pages(), 4);
}
