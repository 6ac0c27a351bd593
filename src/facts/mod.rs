//! RFP facts: normalising extractor output, user answers, and lookups.
//!
//! Extraction produces loosely typed [`RawFact`]s. [`normalize_raw_fact`]
//! binds each to a catalog slot, parses its value, scores it and computes the
//! canonical hash used to dedupe against what the session already holds.

mod parse;

use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use serde_json::{json, Value};

pub use parse::{
    hash_canonical, parse_datetime, parse_money, parse_value, score_confidence, stable_stringify,
};

use crate::coverage::catalog;
use crate::models::{AnswerKind, Evidence, FactOrigin, NewFact, RfpFact};

/// Facts grouped by slot id, strongest first within each slot.
pub type FactsBySlot = HashMap<String, Vec<RfpFact>>;

/// Confidence assigned to answers typed in by the user.
pub const USER_FACT_CONFIDENCE: f64 = 0.95;
/// Evidence snippets are truncated to this many characters before hashing.
const EVIDENCE_KEY_SNIPPET_CHARS: usize = 240;

/// One fact as returned by the extraction model.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFact {
    pub slot_id: String,
    #[serde(default)]
    pub value_text: String,
    #[serde(default)]
    pub value_json: Option<Value>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Option<RawEvidence>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvidence {
    #[serde(default, alias = "file_id")]
    pub source_id: Option<String>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
}

impl RawEvidence {
    fn is_provided(&self) -> bool {
        self.snippet
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
            || self.source_id.is_some()
            || self.href.is_some()
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawFactList {
    #[serde(default)]
    facts: Vec<RawFact>,
}

pub fn group_by_slot(facts: Vec<RfpFact>) -> FactsBySlot {
    let mut grouped = FactsBySlot::new();
    for fact in facts {
        grouped.entry(fact.slot_id.clone()).or_default().push(fact);
    }
    for facts in grouped.values_mut() {
        facts.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    }
    grouped
}

fn flag(value: Option<&Value>, key: &str) -> Option<bool> {
    value?.get(key)?.as_bool()
}

/// A fact records "not applicable" through its parsed value, its
/// annotations, or literally in its text.
pub fn is_marked_na(fact: &RfpFact) -> bool {
    if let Some(na) = fact.value_json.as_ref().and_then(|v| v.get("na")) {
        return na.as_bool().unwrap_or(false);
    }
    if let Some(na) = flag(fact.annotations.as_ref(), "na") {
        return na;
    }
    fact.value_text.to_lowercase().contains("n/a")
}

/// Explicit `verified` flags win; otherwise any checkable citation counts.
/// A source id alone is not checkable: the evidence needs a snippet, a
/// link or a page number.
pub fn is_verified(fact: &RfpFact) -> bool {
    if let Some(verified) = flag(fact.annotations.as_ref(), "verified") {
        return verified;
    }
    if let Some(verified) = flag(fact.value_json.as_ref(), "verified") {
        return verified;
    }
    fact.evidence.as_ref().is_some_and(|e| {
        e.snippet.as_deref().is_some_and(|s| !s.trim().is_empty())
            || e.href.is_some()
            || e.page.is_some()
    })
}

/// Pull the fact list out of a model reply. Code fences and leading prose
/// are tolerated; anything unparseable yields an empty list.
pub fn parse_raw_facts(text: &str) -> Vec<RawFact> {
    match extract_json_object(text) {
        Some(body) => match serde_json::from_str::<RawFactList>(body) {
            Ok(list) => list.facts,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse fact payload");
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}

/// The outermost `{ ... }` span of a reply.
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Bind an extracted fact to its catalog slot and score it.
///
/// Unknown slots and blank values are dropped.
pub fn normalize_raw_fact(raw: &RawFact) -> Option<NewFact> {
    let definition = catalog::fact_slot(&raw.slot_id)?;
    let value_text = raw.value_text.trim();
    if value_text.is_empty() {
        return None;
    }

    let value_json = parse_value(definition.parser, value_text).or_else(|| raw.value_json.clone());
    let evidence = raw.evidence.as_ref().filter(|e| e.is_provided());
    let confidence = score_confidence(
        raw.confidence,
        evidence.is_some(),
        definition.parser,
        value_json.as_ref(),
    );

    let evidence_key = evidence.map(|e| {
        json!({
            "source_id": e.source_id,
            "page": e.page,
            "snippet": e.snippet.as_ref().map(|s| s.chars().take(EVIDENCE_KEY_SNIPPET_CHARS).collect::<String>()),
            "href": e.href,
        })
    });
    let hash = hash_canonical(
        definition.slot_id,
        value_text,
        value_json.as_ref(),
        evidence_key.as_ref(),
    );

    Some(NewFact {
        slot_id: definition.slot_id.to_string(),
        value_text: value_text.to_string(),
        value_json,
        confidence,
        evidence: evidence.map(|e| Evidence {
            source_id: e.source_id.clone(),
            page: e.page,
            snippet: e.snippet.clone(),
            href: e.href.clone(),
        }),
        hash,
        origin: FactOrigin::Ingested,
        annotations: None,
    })
}

/// Drop facts whose hash is already known or repeats earlier in the batch.
/// Returns the survivors and how many were skipped.
pub fn dedupe(facts: Vec<NewFact>, existing: &HashSet<String>) -> (Vec<NewFact>, usize) {
    let mut seen = existing.clone();
    let mut kept = Vec::with_capacity(facts.len());
    let mut skipped = 0;
    for fact in facts {
        if seen.insert(fact.hash.clone()) {
            kept.push(fact);
        } else {
            skipped += 1;
        }
    }
    (kept, skipped)
}

fn user_value_json(answer_kind: AnswerKind, value_text: &str) -> Option<Value> {
    match answer_kind {
        AnswerKind::Date => parse_datetime(value_text),
        AnswerKind::Url => Some(match reqwest::Url::parse(value_text) {
            Ok(url) => json!({ "href": url.to_string(), "raw": value_text }),
            Err(_) => json!({ "raw": value_text }),
        }),
        AnswerKind::Text => None,
    }
}

/// A fact typed in by the user. `None` when the value is blank.
pub fn user_fact(
    slot_id: &str,
    value_text: &str,
    answer_kind: AnswerKind,
    annotations: Option<Value>,
) -> Option<NewFact> {
    let trimmed = value_text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value_json = user_value_json(answer_kind, trimmed);
    let hash = hash_canonical(slot_id, trimmed, value_json.as_ref(), annotations.as_ref());
    Some(NewFact {
        slot_id: slot_id.to_string(),
        value_text: trimmed.to_string(),
        value_json,
        confidence: USER_FACT_CONFIDENCE,
        evidence: None,
        hash,
        origin: FactOrigin::User,
        annotations,
    })
}

/// The user fact recording that a slot does not apply.
pub fn not_applicable_fact(slot_id: &str, reason: Option<&str>) -> NewFact {
    let annotations = json!({ "na": true, "reason": reason });
    let hash = hash_canonical(slot_id, "N/A", None, Some(&annotations));
    NewFact {
        slot_id: slot_id.to_string(),
        value_text: "N/A".to_string(),
        value_json: None,
        confidence: USER_FACT_CONFIDENCE,
        evidence: None,
        hash,
        origin: FactOrigin::User,
        annotations: Some(annotations),
    }
}
