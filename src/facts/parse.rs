//! Value parsers, confidence scoring and canonical hashing for facts.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::coverage::catalog::FactParser;

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\$?\s*([\d,]+(?:\.\d+)?)(?:\s*(million|billion|thousand|k|m|bn|mm))?")
        .expect("money pattern is valid")
});

const NAIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%B %d, %Y", "%b %d, %Y", "%m/%d/%Y"];
const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Default confidence when the extractor gives none.
const DEFAULT_CONFIDENCE: f64 = 0.65;
/// Evidence pivot: uncited facts are capped here, cited ones floored here.
const EVIDENCE_PIVOT: f64 = 0.72;
const PARSED_DATE_FLOOR: f64 = 0.82;
const PARSED_MONEY_FLOOR: f64 = 0.78;
const MIN_CONFIDENCE: f64 = 0.5;
const MAX_CONFIDENCE: f64 = 0.95;

/// First dollar amount in the text, with unit multipliers applied.
///
/// Returns `{"usd": <rounded whole dollars>, "raw": <trimmed input>}`.
pub fn parse_money(value_text: &str) -> Option<Value> {
    let captures = MONEY_RE.captures(value_text)?;
    let mut amount: f64 = captures[1].replace(',', "").parse().ok()?;

    if let Some(unit) = captures.get(2) {
        amount *= match unit.as_str().to_lowercase().as_str() {
            "million" | "m" | "mm" => 1_000_000.0,
            "billion" | "bn" => 1_000_000_000.0,
            "thousand" | "k" => 1_000.0,
            _ => 1.0,
        };
    }

    Some(json!({
        "usd": amount.round() as i64,
        "raw": value_text.trim(),
    }))
}

fn to_utc(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc());
        }
    }
    for format in NAIVE_DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Parse a date or timestamp into `{"iso": <RFC 3339 with millis>, "raw": ...}`.
pub fn parse_datetime(value_text: &str) -> Option<Value> {
    let trimmed = value_text.trim();
    let parsed = to_utc(trimmed)?;
    Some(json!({
        "iso": parsed.to_rfc3339_opts(SecondsFormat::Millis, true),
        "raw": trimmed,
    }))
}

/// Apply a slot's parser to its value text.
pub fn parse_value(parser: FactParser, value_text: &str) -> Option<Value> {
    match parser {
        FactParser::DateTime => parse_datetime(value_text),
        FactParser::Money => parse_money(value_text),
        FactParser::Text => None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Combine the extractor's confidence with what we can check ourselves.
pub fn score_confidence(
    raw: Option<f64>,
    evidence_provided: bool,
    parser: FactParser,
    value_json: Option<&Value>,
) -> f64 {
    let mut score = raw.unwrap_or(DEFAULT_CONFIDENCE);
    score = if evidence_provided {
        score.max(EVIDENCE_PIVOT)
    } else {
        score.min(EVIDENCE_PIVOT)
    };

    let has_iso = value_json
        .and_then(|v| v.get("iso"))
        .and_then(Value::as_str)
        .is_some_and(|iso| !iso.is_empty());
    if parser == FactParser::DateTime && has_iso {
        score = score.max(PARSED_DATE_FLOOR);
    }

    let has_usd = value_json
        .and_then(|v| v.get("usd"))
        .is_some_and(Value::is_number);
    if parser == FactParser::Money && has_usd {
        score = score.max(PARSED_MONEY_FLOOR);
    }

    round2(score.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE))
}

/// JSON text with object keys sorted at every level.
pub fn stable_stringify(value: &Value) -> String {
    match value {
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(stable_stringify).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let parts: Vec<String> = entries
                .into_iter()
                .map(|(key, val)| format!("{}:{}", Value::String(key.clone()), stable_stringify(val)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Hex SHA-256 of the canonical form of a fact. Equal facts hash equal.
pub fn hash_canonical(
    slot_id: &str,
    value_text: &str,
    value_json: Option<&Value>,
    evidence_key: Option<&Value>,
) -> String {
    let canonical = json!({
        "slotId": slot_id,
        "valueText": value_text.trim(),
        "valueJson": value_json,
        "evidence": evidence_key,
    });
    hex::encode(Sha256::digest(stable_stringify(&canonical).as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dollar_amounts() {
        assert_eq!(
            parse_money("$1,250,000"),
            Some(json!({ "usd": 1250000, "raw": "$1,250,000" }))
        );
    }

    #[test]
    fn handles_shorthand_multipliers() {
        assert_eq!(
            parse_money("up to $2 million"),
            Some(json!({ "usd": 2000000, "raw": "up to $2 million" }))
        );
        assert_eq!(parse_money("$750k").unwrap()["usd"], json!(750000));
    }

    #[test]
    fn money_without_digits_is_none() {
        assert_eq!(parse_money("see budget section"), None);
    }

    #[test]
    fn parses_iso_timestamps_with_millis() {
        assert_eq!(
            parse_datetime("2025-01-31T17:00:00Z"),
            Some(json!({ "iso": "2025-01-31T17:00:00.000Z", "raw": "2025-01-31T17:00:00Z" }))
        );
    }

    #[test]
    fn parses_offsets_and_long_dates() {
        assert_eq!(
            parse_datetime("2025-03-01T17:00:00-05:00").unwrap()["iso"],
            "2025-03-01T22:00:00.000Z"
        );
        assert_eq!(
            parse_datetime("March 1, 2025").unwrap()["iso"],
            "2025-03-01T00:00:00.000Z"
        );
        assert_eq!(
            parse_datetime("2025-03-01").unwrap()["iso"],
            "2025-03-01T00:00:00.000Z"
        );
    }

    #[test]
    fn unparseable_dates_are_none() {
        assert_eq!(parse_datetime("Submission window TBD"), None);
    }

    #[test]
    fn boosts_confidence_when_evidence_and_canonical_values_exist() {
        let iso = json!({ "iso": "2025-01-31T17:00:00.000Z" });
        assert_eq!(score_confidence(Some(0.6), true, FactParser::DateTime, Some(&iso)), 0.82);
    }

    #[test]
    fn floors_low_confidence_values() {
        assert_eq!(score_confidence(Some(0.3), false, FactParser::Text, None), 0.5);
    }

    #[test]
    fn uncited_facts_are_capped_and_cited_ones_are_clamped_high() {
        assert_eq!(score_confidence(Some(0.9), false, FactParser::Text, None), 0.72);
        assert_eq!(score_confidence(Some(0.99), true, FactParser::Text, None), 0.95);
        assert_eq!(score_confidence(None, false, FactParser::Text, None), 0.65);
        let usd = json!({ "usd": 10 });
        assert_eq!(score_confidence(None, false, FactParser::Money, Some(&usd)), 0.78);
    }

    #[test]
    fn stable_stringify_sorts_keys_recursively() {
        let value = json!({ "b": 1, "a": { "d": [true, null], "c": "x" } });
        assert_eq!(stable_stringify(&value), r#"{"a":{"c":"x","d":[true,null]},"b":1}"#);
    }

    #[test]
    fn produces_stable_hashes_for_matching_facts() {
        let json = json!({ "foo": "bar" });
        let evidence = json!({ "source_id": "file-1" });
        let a = hash_canonical("rfp.title", "Amazing Program", Some(&json), Some(&evidence));
        let b = hash_canonical("rfp.title", "  Amazing Program ", Some(&json), Some(&evidence));
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_changes_when_evidence_differs() {
        let a = hash_canonical("rfp.title", "Amazing Program", None, Some(&json!({ "source_id": "file-1" })));
        let b = hash_canonical("rfp.title", "Amazing Program", None, Some(&json!({ "source_id": "file-2" })));
        assert_ne!(a, b);
    }
}
