use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::engine::{Engine, EngineError};
use crate::models::{
    AssistantTurn, CoverageSlot, CoverageSnapshot, CoverageStatus, FixNextSuggestion, Job, JobKind,
    JobStatus, LogLevel,
};

/// Word target for sections drafted by the autodraft loop.
pub const AUTODRAFT_WORD_TARGET: u32 = 450;

static CHECKLIST_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\n•]+").expect("checklist pattern is valid"));
static CHECKLIST_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;]+").expect("separator pattern is valid"));
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[•\-–—]+\s*").expect("bullet pattern is valid"));

/// Split section notes into checklist entries.
pub fn extract_checklist(notes: Option<&str>) -> Vec<String> {
    let Some(notes) = notes else {
        return Vec::new();
    };
    CHECKLIST_BREAK
        .split(notes)
        .flat_map(|segment| CHECKLIST_SEPARATOR.split(segment))
        .map(|item| BULLET.replace(item.trim_start(), "").trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn percent(coverage: &CoverageSnapshot) -> i64 {
    (coverage.score * 100.0).round() as i64
}

fn fix_next_message(coverage: &CoverageSnapshot, slot: &CoverageSlot) -> String {
    let percent = percent(coverage);
    match extract_checklist(slot.notes.as_deref()).first() {
        Some(first) => format!(
            "Coverage {}% → Next focus: {}. Please share {}.",
            percent,
            slot.label,
            first.to_lowercase()
        ),
        None => format!(
            "Coverage {}% → Next focus: {}. Please provide the remaining detail so I can draft it.",
            percent, slot.label
        ),
    }
}

fn autodraft_prompt(slot: &CoverageSlot) -> String {
    let mut parts = vec![format!("Create a first-pass draft for \"{}\".", slot.label)];
    if let Some(notes) = slot.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        parts.push(format!("Focus on: {}.", notes.trim_end_matches('.')));
    }
    parts.push(
        "Write in markdown with clear headings and concise paragraphs. \
Cite sources inline like [RFP] or [ORG] when relevant."
            .to_string(),
    );
    parts.join(" ")
}

fn turn(content: String, coverage: &CoverageSnapshot, fix_next: &FixNextSuggestion) -> AssistantTurn {
    AssistantTurn {
        content,
        coverage: Some(coverage.clone()),
        fix_next: Some(fix_next.clone()),
        ..Default::default()
    }
}

async fn run_normalize(engine: &Engine, job: &Job) -> Result<Value, EngineError> {
    let session_id = job.session_id;
    let outcome = engine.normalize(session_id).await?;
    let response = engine.coverage_and_next(session_id)?;

    engine.post_assistant_turn(
        session_id,
        turn(
            format!(
                "Coverage updated. {}% of sections mapped.",
                percent(&response.coverage)
            ),
            &response.coverage,
            &response.fix_next,
        ),
    )?;
    if !response.fix_next.is_export() {
        engine
            .db()
            .enqueue_follow_up(session_id, JobKind::Autodraft, None, Some(job.id))?;
    }

    Ok(json!({
        "coverage": response.coverage,
        "inserted": outcome.inserted,
        "skipped": outcome.skipped,
    }))
}

/// One step of the autodraft loop: draft the next section the coverage
/// points at, or tell the user what is still needed.
async fn run_autodraft(engine: &Engine, job: &Job) -> Result<Value, EngineError> {
    let session_id = job.session_id;
    engine.normalize(session_id).await?;
    let response = engine.coverage_and_next(session_id)?;
    let coverage = &response.coverage;
    let fix_next = &response.fix_next;

    if coverage.slots.is_empty() {
        engine.post_assistant_turn(
            session_id,
            turn(
                "I finished normalizing the RFP, but no coverage slots were detected. \
Share a solicitation or project context so I can start drafting."
                    .to_string(),
                coverage,
                fix_next,
            ),
        )?;
        return Ok(json!({ "action": "no_slots" }));
    }

    if fix_next.is_export() {
        engine.post_assistant_turn(
            session_id,
            turn(
                format!(
                    "Coverage {}% - Everything is mapped. Export when you're ready or tighten specific sections.",
                    percent(coverage)
                ),
                coverage,
                fix_next,
            ),
        )?;
        return Ok(json!({ "action": "export" }));
    }

    let Some(slot) = coverage.slots.iter().find(|slot| slot.id == fix_next.id) else {
        return Ok(json!({ "action": "none" }));
    };

    if slot.status == CoverageStatus::Missing {
        engine.post_assistant_turn(session_id, turn(fix_next_message(coverage, slot), coverage, fix_next))?;
        return Ok(json!({ "action": "ask", "section_id": slot.id }));
    }

    let markdown = engine
        .generate_draft(
            session_id,
            &slot.id,
            &autodraft_prompt(slot),
            Some(AUTODRAFT_WORD_TARGET),
        )
        .await?;
    engine
        .db()
        .save_draft(session_id, &slot.id, &markdown, CoverageStatus::Complete)?;

    let follow_up = engine.coverage_and_next(session_id)?;
    engine.post_assistant_turn(
        session_id,
        turn(
            format!(
                "Drafted **{}**. Open the section workspace to review and make edits.",
                slot.label
            ),
            &follow_up.coverage,
            &follow_up.fix_next,
        ),
    )?;

    if !follow_up.fix_next.is_export() {
        engine
            .db()
            .enqueue_follow_up(session_id, JobKind::Autodraft, None, Some(job.id))?;
    }
    Ok(json!({ "action": "drafted", "section_id": slot.id }))
}

async fn run_discover(engine: &Engine, job: &Job) -> Result<Value, EngineError> {
    let outcome = engine.discover(job.session_id, Some(job.id)).await?;
    let version = outcome.record.as_ref().map(|r| r.version);
    if outcome.changed {
        engine.coverage_and_next(job.session_id)?;
    }
    Ok(json!({ "changed": outcome.changed, "version": version }))
}

/// Job logs are advisory; a failed write must not keep a job from finishing.
fn log_job(engine: &Engine, job: &Job, level: LogLevel, message: &str, details: Option<&Value>) {
    if let Err(e) = engine.db().add_job_log(job.id, level, message, details) {
        tracing::warn!(job_id = %job.id, error = %e, "Failed to write job log");
    }
}

/// Run a claimed job and record how it ended. Failures are stored on the
/// job rather than returned.
pub async fn process_job(engine: &Engine, job: &Job) -> anyhow::Result<JobStatus> {
    let db = engine.db();
    log_job(engine, job, LogLevel::Info, &format!("Started {} job", job.kind.as_str()), None);

    let result = match job.kind {
        JobKind::Normalize => run_normalize(engine, job).await.map(Some),
        JobKind::Autodraft => run_autodraft(engine, job).await.map(Some),
        JobKind::Discover => run_discover(engine, job).await.map(Some),
        JobKind::Tighten | JobKind::IngestUrl | JobKind::IngestFile => {
            let message = format!("Unsupported job kind: {}", job.kind.as_str());
            db.complete_job(job.id, JobStatus::Canceled, None, Some(&message))?;
            log_job(engine, job, LogLevel::Warn, &message, None);
            return Ok(JobStatus::Canceled);
        }
    };

    match result {
        Ok(result) => {
            db.complete_job(job.id, JobStatus::Done, result.as_ref(), None)?;
            log_job(engine, job, LogLevel::Info, "Job finished", result.as_ref());
            tracing::info!(job_id = %job.id, kind = job.kind.as_str(), "Job finished");
            Ok(JobStatus::Done)
        }
        Err(e) => {
            let message = e.to_string();
            tracing::error!(job_id = %job.id, kind = job.kind.as_str(), error = %message, "Job failed");
            db.complete_job(job.id, JobStatus::Error, None, Some(&message))?;
            log_job(engine, job, LogLevel::Error, &message, None);
            Ok(JobStatus::Error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checklist_splits_on_lines_bullets_and_commas() {
        assert_eq!(
            extract_checklist(Some("Lock in title, deadline; portal\n• Funder basics\n- Contacts")),
            vec!["Lock in title", "deadline", "portal", "Funder basics", "Contacts"]
        );
        assert!(extract_checklist(None).is_empty());
        assert!(extract_checklist(Some(" \n ")).is_empty());
    }

    #[test]
    fn fix_next_message_names_the_first_checklist_entry() {
        let mut slot = CoverageSlot::new("budget", "Budget", CoverageStatus::Missing);
        slot.notes = Some("Cost caps, match requirements".to_string());
        let coverage = crate::coverage::create_snapshot(vec![slot.clone()], None);
        assert_eq!(
            fix_next_message(&coverage, &slot),
            "Coverage 0% → Next focus: Budget. Please share cost caps."
        );

        slot.notes = None;
        assert!(fix_next_message(&coverage, &slot).ends_with("Please provide the remaining detail so I can draft it."));
    }

    #[test]
    fn autodraft_prompt_includes_focus() {
        let mut slot = CoverageSlot::new("budget", "Budget", CoverageStatus::Partial);
        slot.notes = Some("Confirm allowable costs.".to_string());
        let prompt = autodraft_prompt(&slot);
        assert!(prompt.starts_with("Create a first-pass draft for \"Budget\"."));
        assert!(prompt.contains("Focus on: Confirm allowable costs."));
    }
}
