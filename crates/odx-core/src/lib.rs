//! Canonical opportunity domain model and session state for ODX.

use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod pipeline;

pub const CRATE_NAME: &str = "odx-core";

/// Fixed page size for every derived result view.
pub const DEFAULT_PAGE_SIZE: usize = 5;
/// Candidate cap requested from the search endpoint; never re-requested.
pub const DEFAULT_CANDIDATE_COUNT: usize = 25;
/// At most this many master-list records are sent for scoring.
pub const RECOMMENDATION_SUBSET_MAX: usize = 10;
/// Recommendation cache entries older than this are discarded.
pub const RECOMMENDATION_TTL_SECS: i64 = 3600;

/// Canonical opportunity record produced by normalization.
///
/// Every field is always present; missing upstream data defaults to an empty
/// string or `None` so downstream filter code can dereference unconditionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub title: String,
    pub agency: String,
    pub description: String,
    pub platform: String,
    pub external_url: String,
    pub classification_code: String,
    pub published_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub budget_text: String,
    pub solicitation_number: String,
    pub active: bool,
    pub objective: String,
    pub expected_outcome: String,
    pub eligibility: String,
    pub key_facts: String,
    pub ai_summary: Option<String>,
}

impl Default for Opportunity {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            agency: String::new(),
            description: String::new(),
            platform: String::new(),
            external_url: String::new(),
            classification_code: String::new(),
            published_at: None,
            due_at: None,
            budget_text: String::new(),
            solicitation_number: String::new(),
            active: true,
            objective: String::new(),
            expected_outcome: String::new(),
            eligibility: String::new(),
            key_facts: String::new(),
            ai_summary: None,
        }
    }
}

/// Named due-date range. Records with no deadline match `None` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDateBucket {
    #[default]
    None,
    ActiveOnly,
    Within7Days,
    Within30Days,
    Within90Days,
    Within365Days,
}

/// Named posted-date range against `published_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostedDateBucket {
    #[default]
    All,
    Within1Day,
    Within7Days,
    Within30Days,
    Within365Days,
    Custom,
}

/// Inclusive date interval; only consulted when the posted bucket is `Custom`.
/// With either endpoint missing the interval test passes everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CustomRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    #[default]
    All,
    FederalOnly,
}

/// Filter configuration. Fields compose by logical AND; an empty / `None` /
/// `All` value is a no-op for that field.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub due_date_bucket: DueDateBucket,
    pub posted_date_bucket: PostedDateBucket,
    pub custom_range: CustomRange,
    pub classification_code: String,
    pub opportunity_kind: OpportunityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Preserves upstream ranking; applying it is a no-op.
    #[default]
    Relevance,
    /// Missing due dates sort last.
    DueDateAscending,
    /// Missing posted dates sort last.
    PostedDateDescending,
    /// Non-numeric budget text parses to zero.
    BudgetDescending,
}

impl FromStr for DueDateBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "active" => Ok(Self::ActiveOnly),
            "7d" => Ok(Self::Within7Days),
            "30d" => Ok(Self::Within30Days),
            "90d" => Ok(Self::Within90Days),
            "365d" => Ok(Self::Within365Days),
            other => Err(format!("unknown due-date bucket: {other}")),
        }
    }
}

impl FromStr for PostedDateBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "1d" => Ok(Self::Within1Day),
            "7d" => Ok(Self::Within7Days),
            "30d" => Ok(Self::Within30Days),
            "365d" => Ok(Self::Within365Days),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown posted-date bucket: {other}")),
        }
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevance" => Ok(Self::Relevance),
            "due-date" => Ok(Self::DueDateAscending),
            "posted-date" => Ok(Self::PostedDateDescending),
            "budget" => Ok(Self::BudgetDescending),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

/// One search's externally visible state: the immutable master list plus the
/// derived working list and page cursor.
///
/// The master list is replaced wholesale by a new search or a clear, never
/// mutated in place. The working list and page are recomputed on filter/sort
/// changes without touching the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSession {
    pub query: String,
    pub refined_query: Option<String>,
    pub master_list: Vec<Opportunity>,
    pub working_list: Vec<Opportunity>,
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
    pub filter: FilterConfig,
    pub sort: SortKey,
}

impl Default for SearchSession {
    fn default() -> Self {
        Self {
            query: String::new(),
            refined_query: None,
            master_list: Vec::new(),
            working_list: Vec::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filter: FilterConfig::default(),
            sort: SortKey::default(),
        }
    }
}

/// Caller-supplied company profile scored against opportunity subsets.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub url: String,
    pub description: String,
}

/// One scored recommendation. `source_index` is a position into the master
/// list at cache-write time, not a stable opportunity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub source_index: usize,
    pub match_score: u8,
    pub title: String,
    pub description: String,
    pub key_insights: Vec<String>,
    pub match_criteria: Vec<String>,
}

impl Recommendation {
    /// Position clamped into the current master list, `None` when the list is
    /// empty. Display code must use this, never the raw index.
    pub fn clamped_index(&self, master_len: usize) -> Option<usize> {
        if master_len == 0 {
            return None;
        }
        Some(self.source_index.min(master_len - 1))
    }

    /// The opportunity this recommendation scored, or `None` when the index
    /// no longer resolves; out-of-range positions are unlinkable rather than
    /// silently mapped to an adjacent record.
    pub fn linked_opportunity<'a>(&self, master: &'a [Opportunity]) -> Option<&'a Opportunity> {
        master.get(self.source_index)
    }
}

/// Time-boxed recommendation cache entry keyed by query and wall-clock age.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationCacheEntry {
    pub recommendations: Vec<Recommendation>,
    pub query: String,
    pub written_at: DateTime<Utc>,
    /// Master-list length at write time, kept for index clamping only.
    pub master_len: usize,
}

impl RecommendationCacheEntry {
    /// Usable only when the query matches and the entry is younger than the
    /// staleness window.
    pub fn is_fresh(&self, query: &str, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.query == query && now.signed_duration_since(self.written_at) < ttl
    }
}
