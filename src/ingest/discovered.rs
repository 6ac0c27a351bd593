//! Answering the slots of a discovered checklist from the sources.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{render_sources, Extraction};
use crate::coverage::catalog::FactParser;
use crate::facts::{dedupe, extract_json_object, hash_canonical, parse_value, score_confidence};
use crate::llm::{CompletionRequest, LanguageModel, LlmError};
use crate::models::{
    DiscoveredDod, DiscoveredSlot, Evidence, EvidenceAnchor, FactOrigin, NewFact,
    SatisfactionPolicy, SlotType, Source,
};

const EVIDENCE_SNIPPET_CHARS: usize = 240;
const DOD_EXTRACTION_MAX_OUTPUT_TOKENS: u32 = 1500;

const SYSTEM_PROMPT: &str = "Answer using only the provided RFP context. Cite sources with page numbers. \
Return JSON of the form {\"answers\": [{\"slot_id\", \"value\", \"enumValue\", \"confidence\", \"notes\", \
\"verified\", \"evidence\": [{\"quote\", \"sourceId\", \"page\", \"href\"}]}]}. Omit slots you cannot answer.";

/// The model's answer for one discovered slot.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAnswer {
    #[serde(default, alias = "slot_id")]
    pub slot_id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub enum_value: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Vec<EvidenceAnchor>,
    #[serde(default)]
    pub verified: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct SlotAnswerList {
    #[serde(default)]
    answers: Vec<SlotAnswer>,
}

fn parser_for(slot_type: SlotType) -> FactParser {
    match slot_type {
        SlotType::Date => FactParser::DateTime,
        SlotType::Money => FactParser::Money,
        _ => FactParser::Text,
    }
}

/// Turn a slot answer into a fact.
///
/// Answers to evidence-only slots are dropped unless they cite something.
/// The parsed value is merged with the slot's type, condition and
/// verification state so coverage can judge it later.
pub fn normalize_slot_answer(slot: &DiscoveredSlot, answer: &SlotAnswer) -> Option<NewFact> {
    let value_text = answer
        .value
        .as_deref()
        .or(answer.enum_value.as_deref())
        .unwrap_or("")
        .trim()
        .to_string();
    if value_text.is_empty() {
        return None;
    }

    let primary = answer.evidence.first();
    let evidence_provided = primary.is_some_and(|e| e.quote.is_some() || e.source_id.is_some() || e.href.is_some());
    let requires_evidence = slot.satisfaction_policy == SatisfactionPolicy::RequiresEvidence;
    if requires_evidence && !evidence_provided {
        return None;
    }

    let verified = answer.verified.unwrap_or(requires_evidence && evidence_provided);
    let parser = parser_for(slot.slot_type);

    let mut value_json = match parse_value(parser, &value_text) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    value_json.insert("type".to_string(), json!(slot.slot_type.as_str()));
    value_json.insert("verified".to_string(), json!(verified));
    if slot.slot_type == SlotType::Enum {
        if let Some(enum_value) = &answer.enum_value {
            value_json.insert("enumValue".to_string(), json!(enum_value));
        }
    }
    if let Some(condition) = &slot.condition {
        value_json.insert("condition".to_string(), json!(condition));
    }
    if let Some(notes) = &answer.notes {
        value_json.insert("notes".to_string(), json!(notes));
    }
    value_json.insert("value".to_string(), json!(value_text));
    let value_json = Value::Object(value_json);

    let confidence = score_confidence(answer.confidence, evidence_provided, parser, Some(&value_json));

    let evidence = primary.filter(|_| evidence_provided).map(|anchor| Evidence {
        source_id: anchor.source_id.clone(),
        page: anchor.page,
        snippet: anchor
            .quote
            .as_ref()
            .map(|q| q.chars().take(EVIDENCE_SNIPPET_CHARS).collect()),
        href: anchor.href.clone(),
    });
    let evidence_key = evidence.as_ref().map(|e| json!(e));
    let hash = hash_canonical(&slot.slot_id, &value_text, Some(&value_json), evidence_key.as_ref());

    Some(NewFact {
        slot_id: slot.slot_id.clone(),
        value_text,
        value_json: Some(value_json),
        confidence,
        evidence,
        hash,
        origin: FactOrigin::Ingested,
        annotations: Some(json!({
            "satisfactionPolicy": slot.satisfaction_policy,
            "verified": verified,
            "rawEvidence": answer.evidence,
        })),
    })
}

fn build_prompt(dod: &DiscoveredDod, sources: &[Source]) -> String {
    let mut lines = vec![
        "RFP context:".to_string(),
        String::new(),
        render_sources(sources.iter()),
        "Answer each checklist slot below when the context supports it.".to_string(),
        String::new(),
    ];
    for section in &dod.sections {
        lines.push(format!("## {}", section.label));
        for slot in &section.slots {
            let mut line = format!(
                "- slot_id=\"{}\" {} (type: {}, requiredness: {:?})",
                slot.slot_id,
                slot.label,
                slot.slot_type.as_str(),
                slot.requiredness
            );
            if let Some(condition) = &slot.condition {
                line.push_str(&format!(" condition: {}", condition));
            }
            lines.push(line);
        }
    }
    lines.join("\n")
}

/// Extract facts for every slot of a discovered checklist in one pass.
pub async fn extract_dod_facts(
    model: &dyn LanguageModel,
    model_id: &str,
    dod: &DiscoveredDod,
    sources: &[Source],
    existing: &HashSet<String>,
) -> Result<Extraction, LlmError> {
    if sources.is_empty() || dod.sections.iter().all(|s| s.slots.is_empty()) {
        return Ok(Extraction::default());
    }

    let request = CompletionRequest::new(SYSTEM_PROMPT, build_prompt(dod, sources))
        .model(model_id)
        .max_output_tokens(DOD_EXTRACTION_MAX_OUTPUT_TOKENS);
    let reply = model.complete(request).await?;

    let answers = extract_json_object(&reply)
        .and_then(|body| serde_json::from_str::<SlotAnswerList>(body).ok())
        .map(|list| list.answers)
        .unwrap_or_default();

    let normalized: Vec<NewFact> = answers
        .iter()
        .filter_map(|answer| {
            let slot = dod
                .sections
                .iter()
                .flat_map(|s| s.slots.iter())
                .find(|slot| slot.slot_id == answer.slot_id || slot.aliases.contains(&answer.slot_id))?;
            normalize_slot_answer(slot, answer)
        })
        .collect();

    let (facts, skipped) = dedupe(normalized, existing);
    Ok(Extraction { facts, skipped })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Requiredness;

    fn slot(policy: SatisfactionPolicy, slot_type: SlotType) -> DiscoveredSlot {
        DiscoveredSlot {
            slot_id: "submission.deadline-abc123".to_string(),
            label: "Deadline".to_string(),
            requiredness: Requiredness::Must,
            slot_type,
            condition: None,
            evidence: vec![],
            satisfaction_policy: policy,
            aliases: vec![],
        }
    }

    fn cited(value: &str) -> SlotAnswer {
        SlotAnswer {
            slot_id: "submission.deadline-abc123".to_string(),
            value: Some(value.to_string()),
            evidence: vec![EvidenceAnchor {
                quote: Some("Applications are due March 1, 2025".to_string()),
                page: Some(2),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn evidence_slots_need_a_citation() {
        let s = slot(SatisfactionPolicy::RequiresEvidence, SlotType::Date);
        let uncited = SlotAnswer {
            value: Some("March 1, 2025".to_string()),
            ..Default::default()
        };
        assert!(normalize_slot_answer(&s, &uncited).is_none());

        let fact = normalize_slot_answer(&s, &cited("March 1, 2025")).unwrap();
        let json = fact.value_json.unwrap();
        assert_eq!(json["iso"], "2025-03-01T00:00:00.000Z");
        assert_eq!(json["verified"], true);
        assert_eq!(json["type"], "date");
        assert_eq!(fact.confidence, 0.82);
        assert_eq!(fact.evidence.unwrap().page, Some(2));
    }

    #[test]
    fn affirmation_slots_accept_bare_answers_unverified() {
        let s = slot(SatisfactionPolicy::UserAffirmationOk, SlotType::Text);
        let answer = SlotAnswer {
            value: Some("Serve rural clinics".to_string()),
            ..Default::default()
        };
        let fact = normalize_slot_answer(&s, &answer).unwrap();
        assert_eq!(fact.value_json.unwrap()["verified"], false);
        assert!(fact.evidence.is_none());
    }

    #[test]
    fn blank_answers_are_dropped() {
        let s = slot(SatisfactionPolicy::Either, SlotType::Text);
        assert!(normalize_slot_answer(&s, &SlotAnswer::default()).is_none());
    }
}
