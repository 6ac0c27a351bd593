//! Session-level orchestration.
//!
//! The engine is what the HTTP handlers, the MCP tools and the job worker
//! all call into: it loads a session's sources and facts from the
//! [`Database`], runs extraction and coverage, and writes the results back.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::coverage::{self, catalog, create_coverage_from_dod, rank_fix_suggestions, select_fix_next};
use crate::db::Database;
use crate::discovery;
use crate::drafting::{self, DraftRequest, DEFAULT_PRESET};
use crate::export::{self, ExportResult};
use crate::facts::{self, group_by_slot};
use crate::ingest::{self, Extraction};
use crate::llm::{LanguageModel, LlmError, SharedModel};
use crate::models::*;

pub const INITIAL_ASSISTANT_MESSAGE: &str = "Hi! I'm your grant assistant. Paste the RFP URL (or upload the document), \
then share your org URL and a 3-5 sentence project idea so I can map coverage and suggest what to tackle next.";

const DEFAULT_PROJECT_NAME: &str = "Untitled grant";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Session not found")]
    SessionNotFound(Uuid),

    #[error("Project not found")]
    ProjectNotFound(Uuid),

    #[error("{0}")]
    Invalid(String),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("DOCX export failed: {0}")]
    Export(#[from] zip::result::ZipError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Counts from one normalisation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOutcome {
    pub inserted: usize,
    pub skipped: usize,
}

/// Result of a discovery run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverOutcome {
    pub changed: bool,
    pub record: Option<DodRecord>,
}

#[derive(Clone)]
pub struct Engine {
    db: Database,
    model: SharedModel,
    config: Arc<AppConfig>,
}

impl Engine {
    pub fn new(db: Database, model: SharedModel, config: AppConfig) -> Self {
        Self {
            db,
            model,
            config: Arc::new(config),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn model(&self) -> &dyn LanguageModel {
        self.model.as_ref()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn require_session(&self, session_id: Uuid) -> Result<Session, EngineError> {
        self.db
            .get_session(session_id)?
            .ok_or(EngineError::SessionNotFound(session_id))
    }

    // ============================================================
    // Session state
    // ============================================================

    /// Resolve the client's session, creating a project and session (with
    /// the greeting turn) when none is usable.
    pub fn bootstrap(&self, session_id: Option<Uuid>, project_id: Option<Uuid>) -> Result<SessionState, EngineError> {
        if let Some(session) = session_id.map(|id| self.db.get_session(id)).transpose()?.flatten() {
            return self.session_state(session.id);
        }

        let project = match project_id.map(|id| self.db.get_project(id)).transpose()?.flatten() {
            Some(project) => project,
            None => self.db.create_project(CreateProjectInput {
                name: DEFAULT_PROJECT_NAME.to_string(),
                description: None,
            })?,
        };
        let session = self.db.create_session(project.id)?;
        self.db
            .create_message(session.id, Role::Assistant, INITIAL_ASSISTANT_MESSAGE, None)?;
        tracing::info!(session_id = %session.id, project_id = %project.id, "Created session");

        self.session_state(session.id)
    }

    pub fn session_state(&self, session_id: Uuid) -> Result<SessionState, EngineError> {
        let session = self.require_session(session_id)?;
        let messages = self.db.get_messages(session_id)?;
        let coverage = self.db.latest_coverage_snapshot(session_id)?;

        let fix_next = messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::Assistant)
            .find_map(|m| m.envelope.as_ref().and_then(|e| e.fix_next.clone()))
            .or_else(|| coverage.as_ref().map(select_fix_next));

        Ok(SessionState {
            session_id,
            project_id: session.project_id,
            sources: self.db.get_sources(session_id, false)?,
            tighten: self.db.latest_tighten_snapshot(session_id)?,
            provenance: self.db.latest_provenance_snapshot(session_id)?,
            messages,
            coverage,
            fix_next,
        })
    }

    /// Store an assistant turn with its envelope, plus any snapshots it carries.
    pub fn post_assistant_turn(&self, session_id: Uuid, turn: AssistantTurn) -> Result<Message, EngineError> {
        let envelope = Envelope {
            coverage: turn.coverage.clone(),
            fix_next: turn.fix_next.clone(),
            sources: Vec::new(),
            tighten: turn.tighten.clone(),
            provenance: turn.provenance.clone(),
        };
        let message = self
            .db
            .create_message(session_id, Role::Assistant, &turn.content, Some(&envelope))?;

        if let Some(coverage) = &turn.coverage {
            self.db.save_coverage_snapshot(session_id, coverage)?;
        }
        if let Some(tighten) = &turn.tighten {
            self.db.save_tighten_snapshot(session_id, tighten)?;
        }
        if let Some(provenance) = &turn.provenance {
            self.db.save_provenance_snapshot(session_id, provenance)?;
        }
        Ok(message)
    }

    // ============================================================
    // Facts and coverage
    // ============================================================

    /// Extract facts from the session's sources and store the new ones.
    ///
    /// With a discovered checklist the model answers its slots; otherwise
    /// the catalog slots are extracted. Without a configured model this is a
    /// no-op.
    pub async fn normalize(&self, session_id: Uuid) -> Result<NormalizeOutcome, EngineError> {
        self.require_session(session_id)?;
        let sources = self.db.get_sources(session_id, true)?;
        if sources.is_empty() {
            return Ok(NormalizeOutcome::default());
        }

        let existing = self.db.get_fact_hashes(session_id)?;
        let model_id = &self.config.ingest_model;
        let extraction = match self.db.get_discovered_dod(session_id)? {
            Some(record) => {
                ingest::extract_dod_facts(self.model(), model_id, &record.dod, &sources, &existing).await
            }
            None => ingest::extract_facts(self.model(), model_id, &sources, &existing).await,
        };

        let Extraction { facts, skipped } = match extraction {
            Ok(extraction) => extraction,
            Err(LlmError::NotConfigured) => {
                tracing::debug!(%session_id, "No language model configured, skipping extraction");
                return Ok(NormalizeOutcome::default());
            }
            Err(e) => return Err(e.into()),
        };

        let inserted = self.db.insert_facts(session_id, &facts)?;
        tracing::info!(
            %session_id,
            inserted = inserted.len(),
            skipped,
            "Normalized session facts"
        );
        Ok(NormalizeOutcome {
            inserted: inserted.len(),
            skipped: skipped + facts.len() - inserted.len(),
        })
    }

    /// Compute coverage from stored facts and drafts, save the snapshot and
    /// pick what to do next.
    pub fn coverage_and_next(&self, session_id: Uuid) -> Result<CoverageResponse, EngineError> {
        self.require_session(session_id)?;
        let facts_by_slot = group_by_slot(self.db.get_facts(session_id)?);
        let drafts = self.db.get_draft_statuses(session_id)?;

        let snapshot = match self.db.get_discovered_dod(session_id)? {
            Some(record) => create_coverage_from_dod(&record.dod, &facts_by_slot, &drafts).into_snapshot(),
            None => {
                let slots = coverage::build_catalog_coverage(&facts_by_slot, &drafts);
                let summary = coverage::summarize(&slots);
                coverage::create_snapshot(slots, Some(summary))
            }
        };
        self.db.save_coverage_snapshot(session_id, &snapshot)?;

        Ok(CoverageResponse {
            fix_next: select_fix_next(&snapshot),
            suggestions: rank_fix_suggestions(&snapshot),
            coverage: snapshot,
        })
    }

    /// Record the user's answer against every listed fact slot.
    pub fn answer(&self, session_id: Uuid, input: AnswerInput) -> Result<CoverageResponse, EngineError> {
        self.require_session(session_id)?;
        if input.fact_ids.is_empty() {
            return Err(EngineError::Invalid(
                "fact_ids must contain at least one id".to_string(),
            ));
        }
        if input.value_text.trim().is_empty() {
            return Err(EngineError::Invalid("value_text must not be empty".to_string()));
        }

        for slot_id in &input.fact_ids {
            let Some(fact) = facts::user_fact(
                slot_id,
                &input.value_text,
                input.answer_kind,
                input.annotations.clone(),
            ) else {
                continue;
            };
            self.db.clear_not_applicable(session_id, slot_id)?;
            self.db.upsert_fact(session_id, fact)?;
        }
        tracing::info!(%session_id, slots = input.fact_ids.len(), "Recorded answer");

        self.coverage_and_next(session_id)
    }

    /// Mark a slot as not applicable, or clear an earlier marker.
    pub fn mark_not_applicable(
        &self,
        session_id: Uuid,
        input: MarkNotApplicableInput,
    ) -> Result<CoverageResponse, EngineError> {
        self.require_session(session_id)?;
        if input.slot_id.trim().is_empty() {
            return Err(EngineError::Invalid("slot_id is required".to_string()));
        }

        if input.na {
            let fact = facts::not_applicable_fact(&input.slot_id, input.reason.as_deref());
            self.db.upsert_fact(session_id, fact)?;
        } else {
            let removed = self.db.clear_not_applicable(session_id, &input.slot_id)?;
            tracing::debug!(%session_id, slot_id = %input.slot_id, removed, "Cleared N/A marker");
        }

        self.coverage_and_next(session_id)
    }

    // ============================================================
    // Discovery
    // ============================================================

    /// Discover a checklist from the sources, unless the stored one was
    /// built from the same source set.
    pub async fn discover(&self, session_id: Uuid, job_id: Option<Uuid>) -> Result<DiscoverOutcome, EngineError> {
        self.require_session(session_id)?;
        let sources = self.db.get_sources(session_id, true)?;
        let existing = self.db.get_discovered_dod(session_id)?;
        if sources.is_empty() {
            return Ok(DiscoverOutcome { changed: false, record: existing });
        }

        let signature = discovery::sources_signature(&sources);
        if existing.as_ref().is_some_and(|r| r.sources_signature == signature) {
            tracing::debug!(%session_id, "Sources unchanged, keeping discovered checklist");
            return Ok(DiscoverOutcome { changed: false, record: existing });
        }

        let model_id = &self.config.model;
        let Some(dod) = discovery::discover_dod(self.model(), model_id, &sources).await else {
            return Ok(DiscoverOutcome { changed: false, record: existing });
        };
        if dod.sections.is_empty() {
            tracing::warn!(%session_id, "Discovery returned no sections");
            return Ok(DiscoverOutcome { changed: false, record: existing });
        }

        let record = self
            .db
            .save_discovered_dod(session_id, &dod, &signature, model_id, job_id)?;
        tracing::info!(%session_id, version = record.version, sections = record.dod.sections.len(), "Saved discovered checklist");
        Ok(DiscoverOutcome {
            changed: true,
            record: Some(record),
        })
    }

    // ============================================================
    // Drafting
    // ============================================================

    /// Best facts backing a section, for grounding its draft.
    fn section_facts(&self, session_id: Uuid, section_id: &str) -> Result<Vec<CoverageSlotFact>, EngineError> {
        Ok(self
            .db
            .latest_coverage_snapshot(session_id)?
            .and_then(|snapshot| snapshot.slots.into_iter().find(|slot| slot.id == section_id))
            .map(|slot| slot.facts)
            .unwrap_or_default())
    }

    /// Generate a section draft with the model (or the stub fallback).
    pub async fn generate_draft(
        &self,
        session_id: Uuid,
        section_id: &str,
        prompt: &str,
        word_target: Option<u32>,
    ) -> Result<String, EngineError> {
        let request = DraftRequest {
            section_id: section_id.to_string(),
            prompt: prompt.to_string(),
            word_target,
            facts: self.section_facts(session_id, section_id)?,
        };
        Ok(drafting::draft_section(self.model(), &self.config.draft_model, &request).await)
    }

    /// Save or generate a section draft.
    pub async fn draft(&self, session_id: Uuid, section_id: &str, input: DraftInput) -> Result<Draft, EngineError> {
        self.require_session(session_id)?;
        let section_id = section_id.trim();
        if section_id.is_empty() {
            return Err(EngineError::Invalid("section_id is required".to_string()));
        }

        let markdown = match input.mode {
            DraftMode::Save => input
                .markdown
                .ok_or_else(|| EngineError::Invalid("markdown is required to save a draft".to_string()))?,
            DraftMode::Generate => {
                let prompt = input
                    .prompt
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| default_draft_prompt(section_id));
                self.generate_draft(session_id, section_id, &prompt, input.word_target)
                    .await?
            }
        };

        let status = input.status.unwrap_or(CoverageStatus::Partial);
        Ok(self.db.save_draft(session_id, section_id, &markdown, status)?)
    }

    /// Length and provenance check of a draft, stored as the latest snapshots.
    pub fn tighten(&self, session_id: Uuid, input: &TightenInput) -> Result<(TightenSnapshot, ProvenanceSnapshot), EngineError> {
        self.require_session(session_id)?;
        let tighten = drafting::analyze_length(&input.markdown, input.limit_words, &DEFAULT_PRESET);
        let provenance = drafting::compute_provenance(&input.markdown);
        self.db.save_tighten_snapshot(session_id, &tighten)?;
        self.db.save_provenance_snapshot(session_id, &provenance)?;
        Ok((tighten, provenance))
    }

    /// All section drafts joined in catalog order, other sections after.
    pub fn session_markdown(&self, session_id: Uuid) -> Result<String, EngineError> {
        self.require_session(session_id)?;
        let mut drafts = self.db.get_drafts(session_id)?;
        drafts.sort_by_key(|d| (catalog::priority(&d.section_id).unwrap_or(usize::MAX), d.section_id.clone()));
        Ok(drafts
            .iter()
            .map(|d| d.markdown.trim())
            .filter(|m| !m.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }

    pub fn export_session(&self, session_id: Uuid, filename: Option<&str>) -> Result<ExportResult, EngineError> {
        let markdown = self.session_markdown(session_id)?;
        if markdown.is_empty() {
            return Err(EngineError::Invalid("No drafted sections to export".to_string()));
        }
        Ok(export::export_docx(&markdown, filename)?)
    }
}

fn default_draft_prompt(section_id: &str) -> String {
    let label = catalog::section(section_id)
        .map(|s| s.label)
        .unwrap_or(section_id);
    format!("Draft the \"{}\" section of the proposal.", label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{OfflineModel, ScriptedModel};
    use serde_json::json;

    fn engine_with(model: SharedModel) -> Engine {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        Engine::new(db, model, AppConfig::offline())
    }

    fn offline() -> Engine {
        engine_with(Arc::new(OfflineModel))
    }

    fn add_rfp(engine: &Engine, session_id: Uuid, content: &str) {
        engine
            .db()
            .create_source(
                session_id,
                CreateSourceInput {
                    label: "rfp.txt".to_string(),
                    kind: SourceKind::File,
                    role: SourceRole::Rfp,
                    href: None,
                    content: content.to_string(),
                },
            )
            .unwrap();
    }

    #[test]
    fn bootstrap_creates_a_session_with_a_greeting() {
        let engine = offline();
        let state = engine.bootstrap(None, None).unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::Assistant);
        assert!(state.coverage.is_none());

        let again = engine.bootstrap(Some(state.session_id), None).unwrap();
        assert_eq!(again.session_id, state.session_id);

        let sibling = engine.bootstrap(Some(Uuid::new_v4()), Some(state.project_id)).unwrap();
        assert_ne!(sibling.session_id, state.session_id);
        assert_eq!(sibling.project_id, state.project_id);
    }

    #[test]
    fn coverage_starts_missing_and_asks_about_the_rfp() {
        let engine = offline();
        let state = engine.bootstrap(None, None).unwrap();
        let response = engine.coverage_and_next(state.session_id).unwrap();

        assert_eq!(response.coverage.slots.len(), catalog::SECTIONS.len());
        assert_eq!(response.coverage.score, 0.0);
        assert_eq!(response.fix_next.id, "rfp-overview");
        assert_eq!(response.fix_next.kind, FixNextKind::Question);
        assert!(engine.db().latest_coverage_snapshot(state.session_id).unwrap().is_some());
    }

    #[test]
    fn answers_raise_coverage_and_na_can_be_cleared() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;

        let response = engine
            .answer(
                session_id,
                AnswerInput {
                    fact_ids: vec!["rfp.title".to_string(), "rfp.deadline".to_string()],
                    value_text: "2025-03-01".to_string(),
                    answer_kind: AnswerKind::Date,
                    annotations: None,
                },
            )
            .unwrap();
        assert!(response.coverage.score > 0.0);
        let facts = engine.db().get_facts(session_id).unwrap();
        assert_eq!(facts.len(), 2);
        assert!(facts.iter().all(|f| f.origin == FactOrigin::User));

        engine
            .mark_not_applicable(
                session_id,
                MarkNotApplicableInput {
                    slot_id: "budget.match".to_string(),
                    na: true,
                    reason: Some("No match required".to_string()),
                },
            )
            .unwrap();
        assert_eq!(engine.db().get_facts(session_id).unwrap().len(), 3);

        engine
            .mark_not_applicable(
                session_id,
                MarkNotApplicableInput {
                    slot_id: "budget.match".to_string(),
                    na: false,
                    reason: None,
                },
            )
            .unwrap();
        assert_eq!(engine.db().get_facts(session_id).unwrap().len(), 2);
    }

    #[test]
    fn empty_answers_are_rejected() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        let result = engine.answer(
            session_id,
            AnswerInput {
                fact_ids: vec![],
                value_text: "x".to_string(),
                answer_kind: AnswerKind::Text,
                annotations: None,
            },
        );
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn unknown_sessions_are_not_found() {
        let engine = offline();
        let result = engine.coverage_and_next(Uuid::new_v4());
        assert!(matches!(result, Err(EngineError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn normalize_stores_extracted_facts_once() {
        let model = ScriptedModel::new().otherwise(
            json!({"facts": [{"slot_id": "rfp.title", "value_text": "Clean Energy Pilots", "confidence": 0.9,
                "evidence": {"snippet": "Clean Energy Pilots FY25", "page": 1}}]})
            .to_string(),
        );
        let engine = engine_with(Arc::new(model));
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        add_rfp(&engine, session_id, "Clean Energy Pilots FY25");

        let first = engine.normalize(session_id).await.unwrap();
        assert_eq!(first.inserted, 1);
        let second = engine.normalize(session_id).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert!(second.skipped >= 1);
        assert_eq!(engine.db().get_facts(session_id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn normalize_is_a_no_op_offline() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        add_rfp(&engine, session_id, "Anything");
        assert_eq!(engine.normalize(session_id).await.unwrap(), NormalizeOutcome::default());
    }

    #[tokio::test]
    async fn discovery_only_reruns_when_sources_change() {
        let model = ScriptedModel::new().otherwise(
            json!({"version": 1, "sections": [{"id": "narrative", "label": "Project Narrative",
                "slots": [{"label": "Statement of need", "requiredness": "must", "type": "text"}]}]})
            .to_string(),
        );
        let engine = engine_with(Arc::new(model.clone()));
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        add_rfp(&engine, session_id, "Narrative: statement of need");

        let first = engine.discover(session_id, None).await.unwrap();
        assert!(first.changed);
        assert_eq!(first.record.unwrap().version, 1);

        let second = engine.discover(session_id, None).await.unwrap();
        assert!(!second.changed);
        assert_eq!(model.calls().len(), 1);

        let coverage = engine.coverage_and_next(session_id).unwrap();
        assert_eq!(coverage.coverage.slots.len(), 1);
        assert_eq!(coverage.coverage.slots[0].id, "narrative");
        assert_eq!(coverage.coverage.score, 0.0);
        assert_eq!(
            coverage.coverage.requirements,
            Some(RequirementTally {
                must_active: 1,
                must_satisfied: 0,
                should_total: 0,
                should_satisfied: 0,
            })
        );
    }

    #[tokio::test]
    async fn discovered_coverage_reports_the_weighted_score() {
        let model = ScriptedModel::new().otherwise(
            json!({"version": 1, "sections": [{"id": "narrative", "label": "Project Narrative",
                "slots": [
                    {"label": "Statement of need", "requiredness": "must", "type": "text",
                     "satisfaction_policy": "user_affirmation_ok"},
                    {"label": "Letters of support", "requiredness": "should", "type": "text",
                     "satisfaction_policy": "user_affirmation_ok"}
                ]}]})
            .to_string(),
        );
        let engine = engine_with(Arc::new(model));
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        add_rfp(&engine, session_id, "Narrative: statement of need, letters of support");
        let record = engine.discover(session_id, None).await.unwrap().record.unwrap();
        let should_slot = record.dod.sections[0]
            .slots
            .iter()
            .find(|s| s.label == "Letters of support")
            .unwrap()
            .slot_id
            .clone();

        let response = engine
            .answer(
                session_id,
                AnswerInput {
                    fact_ids: vec![should_slot],
                    value_text: "Three letters from county partners".to_string(),
                    answer_kind: AnswerKind::Text,
                    annotations: None,
                },
            )
            .unwrap();

        let tally = response.coverage.requirements.unwrap();
        assert_eq!(tally.must_active, 1);
        assert_eq!(tally.should_satisfied, 1);
        assert!((response.coverage.score - 0.5 / 1.5).abs() < 1e-9);

        let stored = engine.db().latest_coverage_snapshot(session_id).unwrap().unwrap();
        assert_eq!(stored.requirements, Some(tally));
    }

    #[tokio::test]
    async fn drafts_save_generate_and_export_in_catalog_order() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;

        engine
            .draft(
                session_id,
                "budget",
                DraftInput {
                    markdown: Some("## Budget\n\nWe request $1M.".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let generated = engine
            .draft(
                session_id,
                "eligibility",
                DraftInput {
                    mode: DraftMode::Generate,
                    prompt: Some("Explain eligibility".to_string()),
                    word_target: Some(200),
                    status: Some(CoverageStatus::Complete),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(generated.markdown, "## eligibility\nExplain eligibility\n\n(Word target: 200)");
        assert_eq!(generated.status, CoverageStatus::Complete);

        let markdown = engine.session_markdown(session_id).unwrap();
        assert!(markdown.find("## eligibility").unwrap() < markdown.find("## Budget").unwrap());
        let exported = engine.export_session(session_id, None).unwrap();
        assert_eq!(exported.filename, "grant-draft.docx");
    }

    #[tokio::test]
    async fn saving_without_markdown_is_invalid() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        let result = engine.draft(session_id, "budget", DraftInput::default()).await;
        assert!(matches!(result, Err(EngineError::Invalid(_))));
    }

    #[test]
    fn tighten_stores_snapshots() {
        let engine = offline();
        let session_id = engine.bootstrap(None, None).unwrap().session_id;
        let (tighten, provenance) = engine
            .tighten(
                session_id,
                &TightenInput {
                    markdown: "One [RFP].\n\nTwo.".to_string(),
                    limit_words: Some(1),
                },
            )
            .unwrap();
        assert!(!tighten.within_limit);
        assert_eq!(provenance.paragraphs_with_provenance, 1);

        let state = engine.session_state(session_id).unwrap();
        assert_eq!(state.tighten, Some(tighten));
        assert_eq!(state.provenance, Some(provenance));
    }
}
