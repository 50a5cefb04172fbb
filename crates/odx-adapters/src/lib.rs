//! Upstream result-shape detection and normalization into canonical records.
//!
//! The search endpoint returns two shapes: a structured one grouping fields
//! under `description` / `timelines` / `details`, and a flat legacy one.
//! Normalization maps both into the full canonical field set, defaulting
//! missing fields to empty string / `None` rather than omitting them, and
//! never drops an element.

use chrono::{DateTime, NaiveDate, Utc};
use odx_core::Opportunity;
use serde_json::Value;
use thiserror::Error;

pub const CRATE_NAME: &str = "odx-adapters";

#[derive(Debug, Error)]
pub enum NormalizeError {
    /// Structurally impossible input, a programming-contract violation.
    #[error("expected a JSON array of raw results, got {0}")]
    NotAnArray(&'static str),
}

/// Normalize a raw endpoint payload. Errs only when `raw` is not an array;
/// malformed-but-present elements normalize to best-effort defaults.
pub fn normalize_results(raw: &Value) -> Result<Vec<Opportunity>, NormalizeError> {
    let Some(items) = raw.as_array() else {
        return Err(NormalizeError::NotAnArray(json_kind(raw)));
    };
    Ok(normalize_slice(items))
}

/// Normalize an already-extracted element slice. Infallible: every element
/// yields exactly one record.
pub fn normalize_slice(items: &[Value]) -> Vec<Opportunity> {
    items
        .iter()
        .enumerate()
        .map(|(n, item)| {
            if is_structured_shape(item) {
                normalize_structured(item, n)
            } else {
                normalize_flat(item, n)
            }
        })
        .collect()
}

/// The structured shape carries nested `description`, `timelines`, and
/// `details` groups; anything else is treated as the flat legacy shape.
fn is_structured_shape(item: &Value) -> bool {
    item.get("details").is_some_and(Value::is_object)
        && item.get("timelines").is_some_and(Value::is_object)
        && item.get("description").is_some_and(Value::is_object)
}

fn normalize_structured(item: &Value, n: usize) -> Opportunity {
    Opportunity {
        id: id_or_synthetic(item, n),
        title: string_at(item, &["details", "title"]),
        agency: string_at(item, &["details", "agency"]),
        description: string_at(item, &["description", "text"]),
        platform: string_at(item, &["details", "platform"]),
        external_url: string_at(item, &["details", "external_url"]),
        classification_code: string_at(item, &["details", "naics_code"]),
        published_at: timestamp_at(item, &["timelines", "published_date"]),
        due_at: timestamp_at(item, &["timelines", "due_date"]),
        budget_text: string_at(item, &["details", "budget"]),
        solicitation_number: string_at(item, &["details", "solicitation_number"]),
        active: bool_at(item, &["details", "active"]).unwrap_or(true),
        objective: string_at(item, &["description", "objective"]),
        expected_outcome: string_at(item, &["description", "expected_outcome"]),
        eligibility: string_at(item, &["description", "eligibility"]),
        key_facts: string_at(item, &["description", "key_facts"]),
        ai_summary: opt_string_at(item, &["description", "summary"]),
    }
}

fn normalize_flat(item: &Value, n: usize) -> Opportunity {
    Opportunity {
        id: id_or_synthetic(item, n),
        title: string_at(item, &["title"]),
        agency: string_at(item, &["agency"]),
        description: string_at(item, &["description"]),
        platform: string_at(item, &["platform"]),
        external_url: first_string_at(item, &[&["external_url"], &["url"]]),
        classification_code: first_string_at(item, &[&["naics_code"], &["naics"]]),
        published_at: timestamp_at(item, &["posted_date"]),
        due_at: timestamp_at(item, &["response_deadline"]),
        budget_text: string_at(item, &["budget"]),
        solicitation_number: string_at(item, &["solicitation_number"]),
        active: bool_at(item, &["active"]).unwrap_or(true),
        objective: string_at(item, &["objective"]),
        expected_outcome: string_at(item, &["expected_outcome"]),
        eligibility: string_at(item, &["eligibility"]),
        key_facts: string_at(item, &["key_facts"]),
        ai_summary: opt_string_at(item, &["summary"]),
    }
}

fn id_or_synthetic(item: &Value, n: usize) -> String {
    match json_str(item, &["id"]) {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => format!("auto-{n}"),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn json_str<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn string_at(value: &Value, path: &[&str]) -> String {
    json_str(value, path).map(str::trim).unwrap_or_default().to_string()
}

fn opt_string_at(value: &Value, path: &[&str]) -> Option<String> {
    json_str(value, path)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn first_string_at(value: &Value, paths: &[&[&str]]) -> String {
    paths
        .iter()
        .find_map(|path| opt_string_at(value, path))
        .unwrap_or_default()
}

fn bool_at(value: &Value, path: &[&str]) -> Option<bool> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_bool()
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates; anything else is
/// `None`.
fn timestamp_at(value: &Value, path: &[&str]) -> Option<DateTime<Utc>> {
    let text = json_str(value, path)?.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn structured_shape_maps_nested_groups() {
        let raw = json!([{
            "id": "opp-91",
            "details": {
                "title": "Cyber range services",
                "agency": "Department of Defense",
                "platform": "federal",
                "external_url": "https://sam.gov/opp/91",
                "naics_code": "541512",
                "budget": "$2,500,000",
                "solicitation_number": "W91-2026-0042",
                "active": true
            },
            "timelines": {
                "published_date": "2026-02-20",
                "due_date": "2026-03-15T17:00:00Z"
            },
            "description": {
                "text": "Operate a cyber training range.",
                "objective": "Realistic adversary emulation",
                "expected_outcome": "Trained staff",
                "eligibility": "Small business set-aside",
                "key_facts": "Base plus two option years",
                "summary": "AI summary here"
            }
        }]);
        let out = normalize_results(&raw).unwrap();
        assert_eq!(out.len(), 1);
        let o = &out[0];
        assert_eq!(o.id, "opp-91");
        assert_eq!(o.title, "Cyber range services");
        assert_eq!(o.agency, "Department of Defense");
        assert_eq!(o.classification_code, "541512");
        assert_eq!(o.budget_text, "$2,500,000");
        assert_eq!(o.ai_summary.as_deref(), Some("AI summary here"));
        assert!(o.published_at.is_some());
        assert!(o.due_at.is_some());
        assert!(o.active);
    }

    #[test]
    fn flat_legacy_shape_maps_top_level_fields() {
        let raw = json!([{
            "id": "L-7",
            "title": "Training content development",
            "agency": "GSA",
            "description": "Develop course material.",
            "platform": "federal",
            "url": "https://example.gov/l7",
            "naics": "611430",
            "posted_date": "2026-02-25",
            "response_deadline": "2026-04-01",
            "budget": "$150,000",
            "solicitation_number": "GSA-26-011",
            "active": false
        }]);
        let out = normalize_results(&raw).unwrap();
        let o = &out[0];
        assert_eq!(o.external_url, "https://example.gov/l7");
        assert_eq!(o.classification_code, "611430");
        assert!(!o.active);
        assert!(o.ai_summary.is_none());
    }

    #[test]
    fn missing_fields_default_instead_of_dropping() {
        let raw = json!([{}, {"title": "bare"}]);
        let out = normalize_results(&raw).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, "auto-0");
        assert_eq!(out[0].title, "");
        assert!(out[0].active);
        assert!(out[0].due_at.is_none());
        assert_eq!(out[1].id, "auto-1");
        assert_eq!(out[1].title, "bare");
    }

    #[test]
    fn synthetic_ids_follow_element_position() {
        let raw = json!([{"id": "real"}, {"id": "  "}, {"title": "x"}]);
        let out = normalize_results(&raw).unwrap();
        assert_eq!(out[0].id, "real");
        assert_eq!(out[1].id, "auto-1");
        assert_eq!(out[2].id, "auto-2");
    }

    #[test]
    fn unparseable_timestamps_become_none() {
        let raw = json!([{
            "title": "bad dates",
            "posted_date": "soon",
            "response_deadline": "03/15/2026"
        }]);
        let out = normalize_results(&raw).unwrap();
        assert!(out[0].published_at.is_none());
        assert!(out[0].due_at.is_none());
    }

    #[test]
    fn non_array_payload_is_a_contract_violation() {
        let err = normalize_results(&json!({"results": []})).unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnArray("object")));
    }

    #[test]
    fn partial_structured_group_falls_back_to_flat_mapping() {
        // `details` present but `timelines` missing: not the structured shape.
        let raw = json!([{
            "details": {"title": "nested"},
            "title": "flat title"
        }]);
        let out = normalize_results(&raw).unwrap();
        assert_eq!(out[0].title, "flat title");
    }
}
