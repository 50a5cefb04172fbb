//! Pure filter/sort/pagination pipeline over canonical opportunity lists.
//!
//! Every function is total over any well-formed list, including empty ones,
//! and never mutates its input. Filters compose by logical AND and are always
//! re-run from the master list, so applying the same config twice yields the
//! same result as applying it once.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, Utc};

use crate::{
    DueDateBucket, FilterConfig, Opportunity, OpportunityKind, PostedDateBucket, SortKey,
};

/// Narrow `list` to the records matching every field of `cfg`.
///
/// `today` is the midnight-normalized reference date for bucket math; passing
/// it in keeps the function pure and the bucket tests deterministic.
pub fn apply_filters(list: &[Opportunity], cfg: &FilterConfig, today: NaiveDate) -> Vec<Opportunity> {
    list.iter()
        .filter(|o| {
            matches_due_bucket(o, cfg.due_date_bucket, today)
                && matches_posted_bucket(o, cfg, today)
                && matches_classification(o, &cfg.classification_code)
                && matches_kind(o, cfg.opportunity_kind)
        })
        .cloned()
        .collect()
}

/// Reorder `list` by `key`. Relevance is a no-op: upstream ranking stability
/// is itself the contract. Date sorts place missing dates last regardless of
/// direction; budget sort coerces unparseable text to zero.
pub fn apply_sort(list: &[Opportunity], key: SortKey) -> Vec<Opportunity> {
    let mut sorted = list.to_vec();
    match key {
        SortKey::Relevance => {}
        SortKey::DueDateAscending => {
            sorted.sort_by(|a, b| cmp_missing_last(a.due_at, b.due_at, |x, y| x.cmp(&y)));
        }
        SortKey::PostedDateDescending => {
            sorted.sort_by(|a, b| cmp_missing_last(a.published_at, b.published_at, |x, y| y.cmp(&x)));
        }
        SortKey::BudgetDescending => {
            sorted.sort_by(|a, b| parse_budget(&b.budget_text).total_cmp(&parse_budget(&a.budget_text)));
        }
    }
    sorted
}

/// `max(1, ceil(len / page_size))`; an empty list still has one (empty) page.
pub fn total_pages(len: usize, page_size: usize) -> usize {
    len.div_ceil(page_size.max(1)).max(1)
}

/// Clamp a requested 1-based page number into the valid range for `len`.
pub fn clamp_page(page: usize, len: usize, page_size: usize) -> usize {
    page.clamp(1, total_pages(len, page_size))
}

/// The `page_size`-length slice for a (clamped) 1-based page number. A pure
/// view: no recomputation of filters or sort.
pub fn page_slice(list: &[Opportunity], page: usize, page_size: usize) -> &[Opportunity] {
    let page = clamp_page(page, list.len(), page_size);
    let start = (page - 1) * page_size;
    let end = (start + page_size).min(list.len());
    &list[start.min(list.len())..end]
}

/// Strip everything non-numeric from free-form budget text and coerce;
/// unparseable text is 0.
pub fn parse_budget(text: &str) -> f64 {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    cleaned.parse().unwrap_or(0.0)
}

fn cmp_missing_last<T: Copy>(
    a: Option<T>,
    b: Option<T>,
    cmp: impl Fn(T, T) -> Ordering,
) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(x, y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn days_until(date: DateTime<Utc>, today: NaiveDate) -> i64 {
    (date.date_naive() - today).num_days()
}

fn matches_due_bucket(o: &Opportunity, bucket: DueDateBucket, today: NaiveDate) -> bool {
    if bucket == DueDateBucket::None {
        return true;
    }
    // No known deadline never matches a bounded bucket.
    let Some(due) = o.due_at else {
        return false;
    };
    let days = days_until(due, today);
    match bucket {
        DueDateBucket::None => true,
        DueDateBucket::ActiveOnly => o.active && days >= 0,
        DueDateBucket::Within7Days => (0..=7).contains(&days),
        DueDateBucket::Within30Days => (0..=30).contains(&days),
        DueDateBucket::Within90Days => (0..=90).contains(&days),
        DueDateBucket::Within365Days => (0..=365).contains(&days),
    }
}

fn matches_posted_bucket(o: &Opportunity, cfg: &FilterConfig, today: NaiveDate) -> bool {
    match cfg.posted_date_bucket {
        PostedDateBucket::All => true,
        PostedDateBucket::Custom => {
            // Permissive by intent: an incomplete range passes everything.
            let (Some(from), Some(to)) = (cfg.custom_range.from, cfg.custom_range.to) else {
                return true;
            };
            let Some(posted) = o.published_at else {
                return false;
            };
            let date = posted.date_naive();
            from <= date && date <= to
        }
        bucket => {
            let Some(posted) = o.published_at else {
                return false;
            };
            let age = -days_until(posted, today);
            let limit = match bucket {
                PostedDateBucket::Within1Day => 1,
                PostedDateBucket::Within7Days => 7,
                PostedDateBucket::Within30Days => 30,
                PostedDateBucket::Within365Days => 365,
                PostedDateBucket::All | PostedDateBucket::Custom => unreachable!(),
            };
            (0..=limit).contains(&age)
        }
    }
}

fn matches_classification(o: &Opportunity, filter: &str) -> bool {
    if filter.is_empty() {
        return true;
    }
    // A record with no code never matches a non-empty filter value.
    if o.classification_code.is_empty() {
        return false;
    }
    o.classification_code == filter || o.classification_code.starts_with(filter)
}

fn matches_kind(o: &Opportunity, kind: OpportunityKind) -> bool {
    match kind {
        OpportunityKind::All => true,
        OpportunityKind::FederalOnly => o.platform.eq_ignore_ascii_case("federal"),
    }
}
