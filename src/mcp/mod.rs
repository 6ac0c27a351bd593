//! MCP server exposing the drafting tools to coding and writing agents.

mod types;

pub use types::*;

use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use uuid::Uuid;

use crate::engine::{Engine, EngineError};
use crate::export;
use crate::models::*;

#[derive(Clone)]
pub struct McpServer {
    engine: Engine,
    tool_router: ToolRouter<Self>,
}

fn engine_error(e: EngineError) -> McpError {
    match e {
        EngineError::SessionNotFound(_) | EngineError::ProjectNotFound(_) => {
            McpError::invalid_params(e.to_string(), None)
        }
        EngineError::Invalid(msg) => McpError::invalid_params(msg, None),
        other => McpError::internal_error(other.to_string(), None),
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

fn coverage_report(session_id: Uuid, response: CoverageResponse) -> CoverageReport {
    let CoverageResponse {
        coverage, fix_next, ..
    } = response;
    CoverageReport {
        session_id: session_id.to_string(),
        percent: (coverage.score * 100.0).round() as i64,
        summary: coverage.summary,
        sections: coverage
            .slots
            .into_iter()
            .map(|slot| SectionStatus {
                id: slot.id,
                label: slot.label,
                status: slot.status.as_str().to_string(),
                questions: slot
                    .questions
                    .into_iter()
                    .map(|q| QuestionInfo {
                        prompt: q.prompt,
                        fact_ids: q.fact_ids,
                    })
                    .collect(),
            })
            .collect(),
        fix_next: FixNextInfo {
            id: fix_next.id,
            label: fix_next.label,
            kind: fix_next.kind.as_str().to_string(),
        },
    }
}

impl McpServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    fn parse_uuid(s: &str) -> Result<Uuid, McpError> {
        Uuid::parse_str(s)
            .map_err(|e| McpError::invalid_params(format!("Invalid UUID: {}", e), None))
    }

    // ============================================================
    // Test helpers - expose tool logic for testing
    // ============================================================

    pub fn test_get_coverage(&self, session_id: &str) -> Result<CoverageReport, McpError> {
        let session_id = Self::parse_uuid(session_id)?;
        let response = self
            .engine
            .coverage_and_next(session_id)
            .map_err(engine_error)?;
        Ok(coverage_report(session_id, response))
    }

    pub fn test_persist_fact(&self, req: PersistFactRequest) -> Result<CoverageReport, McpError> {
        let session_id = Self::parse_uuid(&req.session_id)?;
        let answer_kind = match req.kind.as_deref() {
            None => AnswerKind::Text,
            Some(kind) => AnswerKind::from_str(kind).ok_or_else(|| {
                McpError::invalid_params(format!("Unknown answer kind: {}", kind), None)
            })?,
        };

        let response = self
            .engine
            .answer(
                session_id,
                AnswerInput {
                    fact_ids: req.fact_ids,
                    value_text: req.value,
                    answer_kind,
                    annotations: None,
                },
            )
            .map_err(engine_error)?;
        Ok(coverage_report(session_id, response))
    }

    pub async fn test_draft_section(&self, req: DraftSectionRequest) -> Result<DraftInfo, McpError> {
        let session_id = Self::parse_uuid(&req.session_id)?;
        let mode = if req.markdown.is_some() {
            DraftMode::Save
        } else {
            DraftMode::Generate
        };

        let draft = self
            .engine
            .draft(
                session_id,
                &req.section_id,
                DraftInput {
                    mode,
                    markdown: req.markdown,
                    prompt: req.prompt,
                    word_target: req.word_target,
                    status: None,
                },
            )
            .await
            .map_err(engine_error)?;

        Ok(DraftInfo {
            section_id: draft.section_id,
            status: draft.status.as_str().to_string(),
            word_count: draft.markdown.split_whitespace().count(),
            markdown: draft.markdown,
        })
    }

    pub fn test_tighten_section(&self, req: TightenSectionRequest) -> Result<TightenReport, McpError> {
        let session_id = Self::parse_uuid(&req.session_id)?;
        let (tighten, provenance) = self
            .engine
            .tighten(
                session_id,
                &TightenInput {
                    markdown: req.markdown,
                    limit_words: req.limit_words,
                },
            )
            .map_err(engine_error)?;

        Ok(TightenReport {
            within_limit: tighten.within_limit,
            word_count: tighten.word_count,
            page_estimate: tighten.page_estimate,
            limit_words: tighten.limit_words,
            paragraphs_with_provenance: provenance.paragraphs_with_provenance,
            total_paragraphs: provenance.total_paragraphs,
        })
    }

    pub fn test_enqueue_job(&self, session_id: &str, kind: &str) -> Result<JobInfo, McpError> {
        let session_id = Self::parse_uuid(session_id)?;
        let kind = match JobKind::from_str(kind) {
            Some(kind @ (JobKind::Normalize | JobKind::Autodraft | JobKind::Discover)) => kind,
            _ => {
                return Err(McpError::invalid_params(
                    format!(
                        "Invalid job kind '{}'. Valid kinds: normalize, autodraft, discover",
                        kind
                    ),
                    None,
                ))
            }
        };
        self.engine
            .require_session(session_id)
            .map_err(engine_error)?;

        let outcome = self
            .engine
            .db()
            .enqueue_job(session_id, kind, None)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(JobInfo {
            id: outcome.job.id.to_string(),
            kind: outcome.job.kind.as_str().to_string(),
            status: outcome.job.status.as_str().to_string(),
            created: outcome.created,
        })
    }

    pub fn test_export_docx(&self, req: ExportDocxRequest) -> Result<ExportInfo, McpError> {
        let result = match (req.markdown.as_deref(), req.session_id.as_deref()) {
            (Some(markdown), _) if !markdown.trim().is_empty() => {
                export::export_docx(markdown, req.filename.as_deref())
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?
            }
            (_, Some(session_id)) => {
                let session_id = Self::parse_uuid(session_id)?;
                self.engine
                    .export_session(session_id, req.filename.as_deref())
                    .map_err(engine_error)?
            }
            _ => {
                return Err(McpError::invalid_params(
                    "Provide markdown or a session_id to export",
                    None,
                ))
            }
        };

        Ok(ExportInfo {
            base64: result.base64(),
            filename: result.filename,
        })
    }
}

#[tool_router]
impl McpServer {
    #[tool(
        description = "Get section-by-section coverage for a drafting session. Call this FIRST. Returns: overall percent, each section's status (missing/partial/complete) with its open questions and the fact ids they fill, and fix_next, the single most valuable thing to do next."
    )]
    async fn get_coverage(
        &self,
        params: Parameters<GetCoverageRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.test_get_coverage(&params.0.session_id)?)
    }

    #[tool(
        description = "Record an answer for one or more fact slots (ids come from get_coverage questions). Replaces any earlier answer and clears N/A markers on those slots. Returns the refreshed coverage."
    )]
    async fn persist_fact(
        &self,
        params: Parameters<PersistFactRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.test_persist_fact(params.0)?)
    }

    #[tool(
        description = "Save or generate the markdown for one proposal section. Pass markdown to store it verbatim; omit it to generate a draft from the recorded facts. Returns the stored draft."
    )]
    async fn draft_section(
        &self,
        params: Parameters<DraftSectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.test_draft_section(params.0).await?)
    }

    #[tool(
        description = "Check a section against a word limit and count paragraphs that cite a source like [RFP] or [ORG]. Does not rewrite the text."
    )]
    async fn tighten_section(
        &self,
        params: Parameters<TightenSectionRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.test_tighten_section(params.0)?)
    }

    #[tool(
        description = "Queue background work for a session: 'normalize' extracts facts from sources, 'autodraft' drafts the next ready section, 'discover' derives a checklist from the RFP. Duplicate requests return the job already queued."
    )]
    async fn enqueue_job(
        &self,
        params: Parameters<EnqueueJobRequest>,
    ) -> Result<CallToolResult, McpError> {
        let req = params.0;
        json_result(&self.test_enqueue_job(&req.session_id, &req.kind)?)
    }

    #[tool(
        description = "Export markdown, or every drafted section of a session, as a DOCX document. Returns the file name and base64 content."
    )]
    async fn export_docx(
        &self,
        params: Parameters<ExportDocxRequest>,
    ) -> Result<CallToolResult, McpError> {
        json_result(&self.test_export_docx(params.0)?)
    }
}

#[tool_handler]
impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: rmcp::model::Implementation {
                name: "granted".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            instructions: Some(
                r#"Granted tracks how much of a grant proposal is ready and what to do next.

WORKFLOW:
1. Call get_coverage to see section status and the fix_next suggestion
2. Answer open questions with persist_fact, using the fact ids listed on each question
3. When a section is partial, call draft_section to generate or store its markdown
4. Use tighten_section to check word limits and source citations
5. When fix_next says export, call export_docx

IMPORTANT:
- Only record facts the user or the RFP actually states
- Cite sources inline as [RFP] or [ORG] in drafted markdown
- enqueue_job runs work in the background; poll get_coverage to see the effect"#
                    .into(),
            ),
            ..Default::default()
        }
    }
}

pub async fn run_stdio_server(engine: Engine) -> anyhow::Result<()> {
    use tokio::io::{stdin, stdout};

    tracing::info!("Starting MCP server via stdio");

    let service = McpServer::new(engine);
    let server = service.serve((stdin(), stdout())).await?;

    let quit_reason = server.waiting().await?;
    tracing::info!("MCP server stopped: {:?}", quit_reason);

    Ok(())
}
