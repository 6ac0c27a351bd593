//! Section drafting, length checks and provenance counting.

use std::sync::LazyLock;

use regex::Regex;

use crate::coverage::catalog;
use crate::llm::{CompletionRequest, LanguageModel};
use crate::models::{CoverageSlotFact, ProvenanceSnapshot, TightenSnapshot};

static PROVENANCE_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]+\]").expect("tag pattern is valid"));
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("paragraph pattern is valid"));

const SNIPPET_CHARS: usize = 200;
const DRAFT_MAX_OUTPUT_TOKENS: u32 = 1600;

/// Page layout used to turn word counts into page estimates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TightenPreset {
    pub font: &'static str,
    pub font_size_pt: u32,
    pub double_spaced: bool,
    pub words_per_page: usize,
}

/// Times New Roman 12pt, single spaced.
pub const DEFAULT_PRESET: TightenPreset = TightenPreset {
    font: "Times New Roman",
    font_size_pt: 12,
    double_spaced: false,
    words_per_page: 550,
};

#[derive(Debug, Clone, Default)]
pub struct DraftRequest {
    pub section_id: String,
    pub prompt: String,
    pub word_target: Option<u32>,
    pub facts: Vec<CoverageSlotFact>,
}

fn truncate_snippet(snippet: &str) -> Option<String> {
    let collapsed = snippet.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    if collapsed.chars().count() <= SNIPPET_CHARS {
        return Some(collapsed);
    }
    let head: String = collapsed.chars().take(SNIPPET_CHARS - 3).collect();
    Some(format!("{}…", head))
}

/// Grounded facts rendered for the drafting prompt, with citations.
pub fn summarize_facts(facts: &[CoverageSlotFact]) -> Option<String> {
    if facts.is_empty() {
        return None;
    }
    let mut lines = vec!["Grounded facts extracted from the RFP:".to_string()];
    for fact in facts {
        let label = catalog::fact_slot(&fact.slot_id)
            .map(|slot| slot.summary)
            .unwrap_or(&fact.slot_id);

        let mut citation = Vec::new();
        if let Some(evidence) = &fact.evidence {
            if let Some(page) = evidence.page {
                citation.push(format!("page {}", page));
            }
            if let Some(href) = &evidence.href {
                citation.push(href.clone());
            }
        }

        let mut line = format!("- {}: {}", label, fact.value_text);
        if !citation.is_empty() {
            line.push_str(&format!(" (source: {})", citation.join(", ")));
        }
        if let Some(snippet) = fact
            .evidence
            .as_ref()
            .and_then(|e| e.snippet.as_deref())
            .and_then(truncate_snippet)
        {
            line.push_str(&format!("\n  Evidence: \"{}\"", snippet));
        }
        lines.push(line);
    }
    Some(lines.join("\n"))
}

/// Placeholder markdown used when the model is unavailable.
pub fn stub_draft(section_id: &str, prompt: &str, word_target: Option<u32>) -> String {
    let target = word_target
        .map(|n| n.to_string())
        .unwrap_or_else(|| "flex".to_string());
    format!("## {}\n{}\n\n(Word target: {})", section_id, prompt, target)
}

/// Draft a section. Model errors and empty replies fall back to
/// [`stub_draft`], so this never fails.
pub async fn draft_section(model: &dyn LanguageModel, model_id: &str, request: &DraftRequest) -> String {
    let mut instructions = format!(
        "You are drafting the \"{}\" section of a grant proposal. \
Write in markdown with headings, concise paragraphs, and persuasive but factual language. \
Cite supporting materials inline with tags like [RFP], [ORG], [BIO:Name], [PDF:filename]. \
If information is missing, state clearly what is still needed instead of fabricating.",
        request.section_id
    );
    if let Some(summary) = summarize_facts(&request.facts) {
        instructions.push_str("\n\n");
        instructions.push_str(&summary);
    }

    let mut input = request.prompt.clone();
    if let Some(target) = request.word_target {
        input.push_str(&format!("\n\nTarget length: about {} words.", target));
    }

    let completion = CompletionRequest::new(instructions, input)
        .model(model_id)
        .max_output_tokens(DRAFT_MAX_OUTPUT_TOKENS);
    match model.complete(completion).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!(section = %request.section_id, "Draft response was empty, using stub");
            stub_draft(&request.section_id, &request.prompt, request.word_target)
        }
        Err(e) => {
            tracing::warn!(section = %request.section_id, error = %e, "Draft failed, using stub");
            stub_draft(&request.section_id, &request.prompt, request.word_target)
        }
    }
}

/// Word count and page estimate against a limit (default: one page).
pub fn analyze_length(markdown: &str, limit_words: Option<usize>, preset: &TightenPreset) -> TightenSnapshot {
    let word_count = markdown.split_whitespace().count();
    let pages = (word_count as f64 / preset.words_per_page as f64).round() as usize;
    let limit = limit_words.unwrap_or(preset.words_per_page);
    TightenSnapshot {
        within_limit: word_count <= limit,
        word_count,
        page_estimate: pages.max(1),
        limit_words,
    }
}

/// Count paragraphs carrying an inline `[tag]` citation.
pub fn compute_provenance(markdown: &str) -> ProvenanceSnapshot {
    let paragraphs: Vec<&str> = PARAGRAPH_BREAK
        .split(markdown)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    ProvenanceSnapshot {
        paragraphs_with_provenance: paragraphs.iter().filter(|p| PROVENANCE_TAG.is_match(p)).count(),
        total_paragraphs: paragraphs.len(),
    }
}
