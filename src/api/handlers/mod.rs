use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{AppendHeaders, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use crate::engine::EngineError;
use crate::export;
use crate::ingest::fetch_url_source;
use crate::jobs;
use crate::models::*;

pub const SESSION_COOKIE: &str = "granted_session_id";
pub const PROJECT_COOKIE: &str = "granted_project_id";
const COOKIE_MAX_AGE: u32 = 60 * 60 * 24 * 30;
const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

// ============================================================
// Error Handling
// ============================================================

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, ApiError>;

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

/// Log an internal error and return a sanitized response to the client.
/// Lookups that failed on a missing row keep their message.
fn internal_error(e: impl std::fmt::Display) -> ApiError {
    let msg = e.to_string();

    if msg.contains("not found") {
        tracing::warn!("Lookup failed: {}", msg);
        return error(StatusCode::NOT_FOUND, msg);
    }

    tracing::error!("Internal error: {}", msg);
    error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn engine_error(e: EngineError) -> ApiError {
    match e {
        EngineError::SessionNotFound(_) | EngineError::ProjectNotFound(_) => {
            error(StatusCode::NOT_FOUND, e.to_string())
        }
        EngineError::Invalid(msg) => {
            tracing::warn!("Validation error: {}", msg);
            error(StatusCode::BAD_REQUEST, msg)
        }
        EngineError::Llm(ref inner) => {
            tracing::error!("Language model error: {}", inner);
            error(StatusCode::BAD_GATEWAY, "Language model request failed")
        }
        other => internal_error(other),
    }
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Json<Vec<Project>>> {
    state.engine.db().get_all_projects().map(Json).map_err(internal_error)
}

pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ProjectWithSessions>> {
    state
        .engine
        .db()
        .get_project_with_sessions(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Project not found"))
}

pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    if input.name.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "name is required"));
    }
    state
        .engine
        .db()
        .create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(internal_error)
}

pub async fn update_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> ApiResult<Json<Project>> {
    state
        .engine
        .db()
        .update_project(id, input)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Project not found"))
}

pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.engine.db().delete_project(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, "Project not found"))
    }
}

// ============================================================
// Sessions
// ============================================================

#[derive(Debug, Deserialize)]
pub struct BootstrapQuery {
    pub session_id: Option<String>,
    pub project_id: Option<String>,
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn session_cookie(name: &str, value: Uuid) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; SameSite=Lax",
        name, value, COOKIE_MAX_AGE
    )
}

/// Resolve (or create) the caller's session. Query parameters win over
/// cookies; unknown ids fall through to a fresh session.
pub async fn bootstrap(
    State(state): State<AppState>,
    Query(query): Query<BootstrapQuery>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let resolve = |param: Option<String>, cookie: &str| {
        param
            .or_else(|| cookie_value(&headers, cookie))
            .and_then(|id| id.parse::<Uuid>().ok())
    };
    let session_id = resolve(query.session_id, SESSION_COOKIE);
    let project_id = resolve(query.project_id, PROJECT_COOKIE);

    let session_state = state
        .engine
        .bootstrap(session_id, project_id)
        .map_err(engine_error)?;

    let headers: [(HeaderName, String); 3] = [
        (
            header::SET_COOKIE,
            session_cookie(SESSION_COOKIE, session_state.session_id),
        ),
        (
            header::SET_COOKIE,
            session_cookie(PROJECT_COOKIE, session_state.project_id),
        ),
        (header::CACHE_CONTROL, "no-store".to_string()),
    ];
    Ok((AppendHeaders(headers), Json(session_state)).into_response())
}

pub async fn get_session_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SessionState>> {
    state.engine.session_state(id).map(Json).map_err(engine_error)
}

pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Message>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state.engine.db().get_messages(id).map(Json).map_err(internal_error)
}

pub async fn post_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateMessageInput>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    state.engine.require_session(id).map_err(engine_error)?;
    if input.content.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "content is required"));
    }
    state
        .engine
        .db()
        .create_message(id, Role::User, input.content.trim(), None)
        .map(|m| (StatusCode::CREATED, Json(m)))
        .map_err(internal_error)
}

// ============================================================
// Sources
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListSourcesQuery {
    #[serde(default)]
    pub with_content: bool,
}

/// Response of a URL import: what was stored, what failed, and the
/// normalize job queued for it.
#[derive(Debug, Serialize, Deserialize)]
pub struct ImportUrlsResponse {
    pub sources: Vec<Source>,
    pub failed: Vec<ImportFailure>,
    pub job: Option<Job>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportFailure {
    pub url: String,
    pub error: String,
}

pub async fn list_sources(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListSourcesQuery>,
) -> ApiResult<Json<Vec<Source>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state
        .engine
        .db()
        .get_sources(id, query.with_content)
        .map(Json)
        .map_err(internal_error)
}

/// Attach a source and queue a normalize pass over it.
pub async fn create_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateSourceInput>,
) -> ApiResult<(StatusCode, Json<Source>)> {
    if input.label.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "label is required"));
    }
    let db = state.engine.db();
    let source = db.create_source(id, input).map_err(internal_error)?;
    db.enqueue_job(id, JobKind::Normalize, None)
        .map_err(internal_error)?;
    Ok((StatusCode::CREATED, Json(source)))
}

pub async fn import_urls(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ImportUrlsInput>,
) -> ApiResult<Json<ImportUrlsResponse>> {
    state.engine.require_session(id).map_err(engine_error)?;
    let urls: Vec<&str> = input
        .urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .collect();
    if urls.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "urls must not be empty"));
    }

    let db = state.engine.db();
    let mut sources = Vec::new();
    let mut failed = Vec::new();
    for url in urls {
        match fetch_url_source(&state.http, url, input.role).await {
            Ok(source) => sources.push(db.create_source(id, source).map_err(internal_error)?),
            Err(e) => {
                tracing::warn!(%url, error = %e, "URL import failed");
                failed.push(ImportFailure {
                    url: url.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let job = if sources.is_empty() {
        None
    } else {
        Some(
            db.enqueue_job(id, JobKind::Normalize, None)
                .map_err(internal_error)?
                .job,
        )
    };

    Ok(Json(ImportUrlsResponse {
        sources,
        failed,
        job,
    }))
}

pub async fn delete_source(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.engine.db().delete_source(id).map_err(internal_error)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(error(StatusCode::NOT_FOUND, "Source not found"))
    }
}

// ============================================================
// Facts & Coverage
// ============================================================

pub async fn list_facts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<RfpFact>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state.engine.db().get_facts(id).map(Json).map_err(internal_error)
}

pub async fn list_fact_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<FactEvent>>> {
    state.engine.db().get_fact_events(id).map(Json).map_err(internal_error)
}

pub async fn answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<AnswerInput>,
) -> ApiResult<Json<CoverageResponse>> {
    state.engine.answer(id, input).map(Json).map_err(engine_error)
}

pub async fn mark_not_applicable(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<MarkNotApplicableInput>,
) -> ApiResult<Json<CoverageResponse>> {
    state
        .engine
        .mark_not_applicable(id, input)
        .map(Json)
        .map_err(engine_error)
}

pub async fn coverage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CoverageResponse>> {
    state.engine.coverage_and_next(id).map(Json).map_err(engine_error)
}

// ============================================================
// Drafts
// ============================================================

pub async fn list_drafts(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Draft>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state.engine.db().get_drafts(id).map(Json).map_err(internal_error)
}

pub async fn get_draft(
    State(state): State<AppState>,
    Path((id, section_id)): Path<(Uuid, String)>,
) -> ApiResult<Json<Draft>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state
        .engine
        .db()
        .get_draft(id, &section_id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Draft not found"))
}

/// Store edited markdown as-is.
pub async fn save_draft(
    State(state): State<AppState>,
    Path((id, section_id)): Path<(Uuid, String)>,
    Json(input): Json<DraftInput>,
) -> ApiResult<Json<Draft>> {
    let input = DraftInput {
        mode: DraftMode::Save,
        ..input
    };
    state
        .engine
        .draft(id, &section_id, input)
        .await
        .map(Json)
        .map_err(engine_error)
}

/// Save or generate, depending on `mode`.
pub async fn draft_section(
    State(state): State<AppState>,
    Path((id, section_id)): Path<(Uuid, String)>,
    Json(input): Json<DraftInput>,
) -> ApiResult<Json<Draft>> {
    state
        .engine
        .draft(id, &section_id, input)
        .await
        .map(Json)
        .map_err(engine_error)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TightenResponse {
    pub tighten: TightenSnapshot,
    pub provenance: ProvenanceSnapshot,
}

pub async fn tighten(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<TightenInput>,
) -> ApiResult<Json<TightenResponse>> {
    let (tighten, provenance) = state.engine.tighten(id, &input).map_err(engine_error)?;
    Ok(Json(TightenResponse {
        tighten,
        provenance,
    }))
}

// ============================================================
// Export
// ============================================================

#[derive(Debug, Default, Deserialize)]
pub struct ExportSessionInput {
    pub filename: Option<String>,
}

fn docx_response(result: export::ExportResult) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"",
        result.filename.replace('"', "")
    );
    (
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        result.bytes,
    )
        .into_response()
}

pub async fn export_markdown(Json(input): Json<ExportInput>) -> ApiResult<Response> {
    if input.markdown.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Missing markdown"));
    }
    let result = export::export_docx(&input.markdown, input.filename.as_deref())
        .map_err(internal_error)?;
    tracing::info!(filename = %result.filename, "Exported markdown");
    Ok(docx_response(result))
}

pub async fn export_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    input: Option<Json<ExportSessionInput>>,
) -> ApiResult<Response> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let result = state
        .engine
        .export_session(id, input.filename.as_deref())
        .map_err(engine_error)?;
    tracing::info!(session_id = %id, filename = %result.filename, "Exported session");
    Ok(docx_response(result))
}

// ============================================================
// Jobs
// ============================================================

pub async fn enqueue_job(
    State(state): State<AppState>,
    Json(input): Json<EnqueueJobInput>,
) -> ApiResult<(StatusCode, Json<EnqueueOutcome>)> {
    state
        .engine
        .require_session(input.session_id)
        .map_err(engine_error)?;
    let outcome = state
        .engine
        .db()
        .enqueue_job(input.session_id, input.kind, input.payload)
        .map_err(internal_error)?;
    let status = if outcome.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn tick_jobs(
    State(state): State<AppState>,
    input: Option<Json<TickInput>>,
) -> ApiResult<Json<TickResponse>> {
    let session_id = input.and_then(|Json(input)| input.session_id);
    jobs::tick(&state.engine, session_id)
        .await
        .map(Json)
        .map_err(internal_error)
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Job>> {
    state
        .engine
        .db()
        .get_job(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Job not found"))
}

pub async fn list_job_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<JobLog>>> {
    state.engine.db().get_job_logs(id).map(Json).map_err(internal_error)
}

pub async fn list_session_jobs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Job>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state
        .engine
        .db()
        .get_jobs_by_session(id)
        .map(Json)
        .map_err(internal_error)
}

// ============================================================
// Discovered definition of done
// ============================================================

pub async fn get_dod(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DodRecord>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state
        .engine
        .db()
        .get_discovered_dod(id)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No discovered checklist for this session"))
}

pub async fn get_dod_history(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<DodRecord>>> {
    state.engine.require_session(id).map_err(engine_error)?;
    state
        .engine
        .db()
        .get_discovered_dod_history(id)
        .map(Json)
        .map_err(internal_error)
}
