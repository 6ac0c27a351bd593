//! Turning session sources into facts.
//!
//! Extraction asks the model for every catalog slot it can support with a
//! citation. The solicitation is read first; when it yields nothing new the
//! whole source set is tried.

mod discovered;
mod url;

use std::collections::HashSet;

use crate::coverage::catalog;
use crate::facts::{dedupe, normalize_raw_fact, parse_raw_facts};
use crate::llm::{CompletionRequest, LanguageModel, LlmError};
use crate::models::{NewFact, Source, SourceKind, SourceRole};

pub use discovered::{extract_dod_facts, normalize_slot_answer, SlotAnswer};
pub use url::{fetch_url_source, html_to_text, label_for_url};

/// Characters of each source's text included in a prompt.
const SOURCE_EXCERPT_CHARS: usize = 12_000;
const EXTRACTION_MAX_OUTPUT_TOKENS: u32 = 800;

const SYSTEM_PROMPT: &str = "You are a precise extractor of grant solicitation facts. \
Quote verbatim instructions from the provided sources. Only emit information you can cite. \
Return JSON of the form {\"facts\": [{\"slot_id\", \"value_text\", \"value_json\", \"confidence\", \
\"evidence\": {\"source_id\", \"page\", \"snippet\", \"href\"}}]}. Omit facts you cannot support.";

/// Facts produced by one extraction pass, ready to insert.
#[derive(Debug, Default)]
pub struct Extraction {
    pub facts: Vec<NewFact>,
    pub skipped: usize,
}

/// Render sources as prompt context: a header per source followed by an
/// excerpt of its text.
pub fn render_sources<'a>(sources: impl IntoIterator<Item = &'a Source>) -> String {
    let mut out = String::new();
    for source in sources {
        let kind = match source.kind {
            SourceKind::File => "File",
            SourceKind::Url => "URL",
        };
        out.push_str(&format!("### [{}] {} (source_id: {})", kind, source.label, source.id));
        if let Some(href) = &source.href {
            out.push_str(&format!(" {}", href));
        }
        out.push('\n');
        if let Some(content) = &source.content {
            let excerpt: String = content.chars().take(SOURCE_EXCERPT_CHARS).collect();
            out.push_str(&excerpt);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn build_prompt(sources: &[&Source]) -> String {
    let mut lines = vec![
        "Sources you can inspect:".to_string(),
        String::new(),
        render_sources(sources.iter().copied()),
        "For each requested slot below, search the sources and return any verifiable facts.".to_string(),
        "If a fact is absent, omit it.".to_string(),
        String::new(),
    ];
    lines.extend(
        catalog::FACT_SLOTS
            .iter()
            .enumerate()
            .map(|(i, slot)| format!("{}. slot_id=\"{}\" - {}", i + 1, slot.slot_id, slot.instruction)),
    );
    lines.join("\n")
}

async fn extract_pass(
    model: &dyn LanguageModel,
    model_id: &str,
    sources: &[&Source],
    existing: &HashSet<String>,
) -> Result<Extraction, LlmError> {
    let request = CompletionRequest::new(SYSTEM_PROMPT, build_prompt(sources))
        .model(model_id)
        .max_output_tokens(EXTRACTION_MAX_OUTPUT_TOKENS);
    let reply = model.complete(request).await?;

    let normalized: Vec<NewFact> = parse_raw_facts(&reply)
        .iter()
        .filter_map(normalize_raw_fact)
        .collect();
    let (facts, skipped) = dedupe(normalized, existing);
    Ok(Extraction { facts, skipped })
}

/// Extract catalog facts, reading RFP sources first.
///
/// `existing` holds the hashes already stored for the session; duplicates
/// are counted in `skipped`.
pub async fn extract_facts(
    model: &dyn LanguageModel,
    model_id: &str,
    sources: &[Source],
    existing: &HashSet<String>,
) -> Result<Extraction, LlmError> {
    if sources.is_empty() {
        return Ok(Extraction::default());
    }

    let rfp: Vec<&Source> = sources.iter().filter(|s| s.role == SourceRole::Rfp).collect();
    let mut skipped = 0;
    if !rfp.is_empty() {
        let primary = extract_pass(model, model_id, &rfp, existing).await?;
        if !primary.facts.is_empty() {
            return Ok(primary);
        }
        skipped += primary.skipped;
    }

    let all: Vec<&Source> = sources.iter().collect();
    let fallback = extract_pass(model, model_id, &all, existing).await?;
    Ok(Extraction {
        facts: fallback.facts,
        skipped: skipped + fallback.skipped,
    })
}
