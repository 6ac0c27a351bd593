//! Deriving a checklist ("definition of done") from the RFP itself.
//!
//! The model is asked for sections and required slots. Its reply is parsed
//! leniently, then every slot gets a stable id derived from its section,
//! label and evidence anchors so re-discovery over the same RFP lines up
//! with facts already collected.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::facts::extract_json_object;
use crate::ingest::render_sources;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{
    DiscoveredDod, DiscoveredSection, DiscoveredSlot, EvidenceAnchor, Requiredness,
    SatisfactionPolicy, SlotType, Source, SourceFingerprint,
};

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

const MAX_SLUG_CHARS: usize = 64;
const MAX_SLOT_ID_CHARS: usize = 120;
const ANCHOR_QUOTE_CHARS: usize = 80;
const DISCOVERY_MAX_OUTPUT_TOKENS: u32 = 1500;

const REQUIRES_EVIDENCE_KEYWORDS: &[&str] = &[
    "deadline", "submission", "format", "eligibility", "registration", "sam", "uei", "portal",
    "email", "rubric", "evaluation", "score", "budget", "cost share", "match", "attachment",
    "appendix", "compliance", "limit",
];

const USER_AFFIRMATION_KEYWORDS: &[&str] = &[
    "narrative", "project", "outcome", "goal", "impact", "team", "personnel", "capacity",
    "experience", "history", "organization", "budget narrative", "prior work", "track record",
];

const SYSTEM_PROMPT: &str = "You are a precise requirements analyst. \
Extract only the application structure and checklist that the provided RFP requires. \
Return JSON with a top-level \"sections\" array; each section has \"label\", optional \"id\", \"order\", \"evidence\" \
and a \"slots\" array. Each slot has \"label\", \"requiredness\" (must|should|conditional), optional \"type\" \
(text|date|money|enum|file|email|url), \"satisfactionPolicy\" (requires_evidence|user_affirmation_ok|either), \
\"condition\" and \"evidence\" anchors ({sourceId, page, heading, quote, href}). \
Prefer exact wording from the RFP for labels. Do not invent requirements that are not explicitly in the materials.";

#[derive(Debug, Deserialize)]
struct RawDod {
    #[serde(default)]
    version: Option<Value>,
    #[serde(default)]
    sections: Vec<RawSection>,
}

#[derive(Debug, Deserialize)]
struct RawSection {
    #[serde(default)]
    id: Option<String>,
    label: String,
    #[serde(default)]
    order: Option<i64>,
    #[serde(default)]
    evidence: Vec<EvidenceAnchor>,
    #[serde(default)]
    slots: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSlot {
    #[serde(default)]
    slot_id: Option<String>,
    label: String,
    requiredness: Requiredness,
    #[serde(rename = "type", default)]
    slot_type: Option<SlotType>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    evidence: Vec<EvidenceAnchor>,
    #[serde(default)]
    satisfaction_policy: Option<SatisfactionPolicy>,
    #[serde(default)]
    aliases: Vec<String>,
}

pub fn slug(value: &str) -> String {
    let lowered = value.to_lowercase();
    let dashed = NON_ALNUM.replace_all(&lowered, "-");
    dashed.trim_matches('-').chars().take(MAX_SLUG_CHARS).collect()
}

fn short_hash(input: &str) -> String {
    let digest = hex::encode(Sha256::digest(input.as_bytes()));
    digest[..6].to_string()
}

/// `section.label-abc123`, where the suffix fingerprints the evidence anchors.
pub fn make_slot_id(section_id: &str, label: &str, anchors: &[EvidenceAnchor]) -> String {
    let signature = anchors
        .iter()
        .map(|anchor| {
            format!(
                "{}|{}|{}",
                anchor.page.map(|p| p.to_string()).unwrap_or_default(),
                anchor.heading.as_deref().unwrap_or(""),
                anchor
                    .quote
                    .as_deref()
                    .unwrap_or("")
                    .chars()
                    .take(ANCHOR_QUOTE_CHARS)
                    .collect::<String>()
            )
        })
        .collect::<Vec<_>>()
        .join("||");
    format!("{}.{}-{}", slug(section_id), slug(label), short_hash(&signature))
        .chars()
        .take(MAX_SLOT_ID_CHARS)
        .collect()
}

/// Guess how strictly a slot must be backed, from its wording and type.
pub fn infer_policy(section_label: &str, slot_label: &str, slot_type: SlotType) -> SatisfactionPolicy {
    let text = format!("{} {}", section_label, slot_label).to_lowercase();
    if REQUIRES_EVIDENCE_KEYWORDS.iter().any(|k| text.contains(k)) {
        return SatisfactionPolicy::RequiresEvidence;
    }
    if USER_AFFIRMATION_KEYWORDS.iter().any(|k| text.contains(k)) {
        return SatisfactionPolicy::UserAffirmationOk;
    }
    match slot_type {
        SlotType::Text => SatisfactionPolicy::Either,
        _ => SatisfactionPolicy::RequiresEvidence,
    }
}

fn parse_version(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(1),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(1),
        _ => 1,
    }
}

fn normalize(raw: RawDod) -> DiscoveredDod {
    let sections = raw
        .sections
        .into_iter()
        .enumerate()
        .map(|(index, section)| {
            let id = section
                .id
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| {
                    if section.label.trim().is_empty() {
                        format!("section-{}", index + 1)
                    } else {
                        slug(&section.label)
                    }
                });

            let slots = section
                .slots
                .into_iter()
                .map(|slot| {
                    let slot_type = slot.slot_type.unwrap_or_default();
                    let slot_id = make_slot_id(&id, &slot.label, &slot.evidence);
                    let satisfaction_policy = slot
                        .satisfaction_policy
                        .unwrap_or_else(|| infer_policy(&section.label, &slot.label, slot_type));

                    let mut seen = HashSet::new();
                    let aliases = slot
                        .slot_id
                        .into_iter()
                        .chain(slot.aliases)
                        .filter(|alias| *alias != slot_id && seen.insert(alias.clone()))
                        .collect();

                    DiscoveredSlot {
                        slot_id,
                        label: slot.label,
                        requiredness: slot.requiredness,
                        slot_type,
                        condition: slot.condition,
                        evidence: slot.evidence,
                        satisfaction_policy,
                        aliases,
                    }
                })
                .collect();

            DiscoveredSection {
                id,
                label: section.label,
                order: section.order,
                evidence: section.evidence,
                slots,
            }
        })
        .collect();

    DiscoveredDod {
        version: parse_version(raw.version.as_ref()),
        sections,
    }
}

/// Parse and normalise a model reply. `None` when no usable JSON is present.
pub fn parse_dod(text: &str) -> Option<DiscoveredDod> {
    let body = extract_json_object(text)?;
    match serde_json::from_str::<RawDod>(body) {
        Ok(raw) => Some(normalize(raw)),
        Err(e) => {
            tracing::warn!(error = %e, "Discovered checklist did not match the expected shape");
            None
        }
    }
}

pub fn fingerprints(sources: &[Source]) -> Vec<SourceFingerprint> {
    let mut files: Vec<SourceFingerprint> = sources
        .iter()
        .map(|source| SourceFingerprint {
            id: source.id.to_string(),
            name: source.label.clone(),
            bytes: source.bytes,
        })
        .collect();
    files.sort_by(|a, b| a.id.cmp(&b.id));
    files
}

/// Hex SHA-256 over the sorted source fingerprints. Changes whenever a
/// source is added, removed or replaced.
pub fn sources_signature(sources: &[Source]) -> String {
    let files = fingerprints(sources);
    let encoded = serde_json::to_string(&files).unwrap_or_default();
    hex::encode(Sha256::digest(encoded.as_bytes()))
}

fn build_prompt(sources: &[Source]) -> String {
    [
        "Using the RFP materials below, extract the required sections and checklist of deliverables.",
        "Return the Definition of Done JSON. Prefer concise labels taken directly from headings.",
        "",
        &render_sources(sources.iter()),
    ]
    .join("\n")
}

/// Ask the model for a checklist. Failures are logged and yield `None`.
pub async fn discover_dod(
    model: &dyn LanguageModel,
    model_id: &str,
    sources: &[Source],
) -> Option<DiscoveredDod> {
    let request = CompletionRequest::new(SYSTEM_PROMPT, build_prompt(sources))
        .model(model_id)
        .max_output_tokens(DISCOVERY_MAX_OUTPUT_TOKENS);

    match model.complete(request).await {
        Ok(text) => parse_dod(&text),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to discover definition of done");
            None
        }
    }
}
