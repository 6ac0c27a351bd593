use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use granted::api::{create_router, ErrorBody, SecurityConfig};
use granted::config::AppConfig;
use granted::db::Database;
use granted::engine::Engine;
use granted::llm::OfflineModel;
use granted::models::*;
use serde_json::{json, Value};
use uuid::Uuid;

fn engine() -> Engine {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    Engine::new(db, Arc::new(OfflineModel), AppConfig::offline())
}

fn setup_with(security: SecurityConfig) -> TestServer {
    TestServer::new(create_router(engine(), security)).expect("Failed to create test server")
}

fn setup() -> TestServer {
    setup_with(SecurityConfig::disabled())
}

async fn bootstrap(server: &TestServer) -> SessionState {
    server.get("/api/v1/bootstrap").await.json::<SessionState>()
}

fn cookie_header(value: String) -> (HeaderName, HeaderValue) {
    (header::COOKIE, HeaderValue::from_str(&value).unwrap())
}

mod health {
    use super::*;

    #[tokio::test]
    async fn reports_ok() {
        let server = setup();
        let response = server.get("/api/v1/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["status"], "ok");
    }
}

mod projects {
    use super::*;

    #[tokio::test]
    async fn create_get_update_delete() {
        let server = setup();

        let response = server
            .post("/api/v1/projects")
            .json(&CreateProjectInput {
                name: "Rural Broadband".to_string(),
                description: Some("USDA ReConnect".to_string()),
            })
            .await;
        response.assert_status(StatusCode::CREATED);
        let project = response.json::<Project>();
        assert_eq!(project.name, "Rural Broadband");

        let listed = server.get("/api/v1/projects").await.json::<Vec<Project>>();
        assert_eq!(listed.len(), 1);

        let updated = server
            .put(&format!("/api/v1/projects/{}", project.id))
            .json(&json!({ "name": "Rural Broadband 2026" }))
            .await
            .json::<Project>();
        assert_eq!(updated.name, "Rural Broadband 2026");
        assert_eq!(updated.description.as_deref(), Some("USDA ReConnect"));

        server
            .delete(&format!("/api/v1/projects/{}", project.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .get(&format!("/api/v1/projects/{}", project.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn includes_sessions_on_get() {
        let server = setup();
        let state = bootstrap(&server).await;

        let project = server
            .get(&format!("/api/v1/projects/{}", state.project_id))
            .await
            .json::<Value>();

        assert_eq!(project["name"], "Untitled grant");
        assert_eq!(project["sessions"][0]["id"], state.session_id.to_string());
    }

    #[tokio::test]
    async fn rejects_blank_names() {
        let server = setup();
        let response = server
            .post("/api/v1/projects")
            .json(&json!({ "name": "  " }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<ErrorBody>().error, "name is required");
    }
}

mod bootstrap {
    use super::*;

    #[tokio::test]
    async fn creates_a_session_with_a_greeting_and_cookies() {
        let server = setup();
        let response = server.get("/api/v1/bootstrap").await;
        response.assert_status_ok();

        let state = response.json::<SessionState>();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::Assistant);

        let cookies: Vec<String> = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert!(cookies
            .iter()
            .any(|c| c.starts_with(&format!("granted_session_id={}", state.session_id))));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with(&format!("granted_project_id={}", state.project_id))));
        assert!(cookies.iter().all(|c| c.contains("Max-Age=2592000")));
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "no-store"
        );
    }

    #[tokio::test]
    async fn resumes_from_the_session_cookie() {
        let server = setup();
        let first = bootstrap(&server).await;

        let (name, value) = cookie_header(format!("granted_session_id={}", first.session_id));
        let second = server
            .get("/api/v1/bootstrap")
            .add_header(name, value)
            .await
            .json::<SessionState>();

        assert_eq!(second.session_id, first.session_id);
    }

    #[tokio::test]
    async fn query_parameter_wins_over_cookie() {
        let server = setup();
        let first = bootstrap(&server).await;
        let other = bootstrap(&server).await;

        let (name, value) = cookie_header(format!("granted_session_id={}", other.session_id));
        let resumed = server
            .get(&format!("/api/v1/bootstrap?session_id={}", first.session_id))
            .add_header(name, value)
            .await
            .json::<SessionState>();

        assert_eq!(resumed.session_id, first.session_id);
    }

    #[tokio::test]
    async fn unknown_session_starts_fresh_in_the_given_project() {
        let server = setup();
        let first = bootstrap(&server).await;

        let fresh = server
            .get(&format!(
                "/api/v1/bootstrap?session_id={}&project_id={}",
                Uuid::new_v4(),
                first.project_id
            ))
            .await
            .json::<SessionState>();

        assert_ne!(fresh.session_id, first.session_id);
        assert_eq!(fresh.project_id, first.project_id);
    }
}

mod sessions {
    use super::*;

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let server = setup();
        let response = server
            .get(&format!("/api/v1/sessions/{}", Uuid::new_v4()))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<ErrorBody>().error, "Session not found");
    }

    #[tokio::test]
    async fn posts_and_lists_user_messages() {
        let server = setup();
        let state = bootstrap(&server).await;
        let path = format!("/api/v1/sessions/{}/messages", state.session_id);

        let response = server
            .post(&path)
            .json(&json!({ "content": "  We run rural clinics.  " }))
            .await;
        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.json::<Message>().content, "We run rural clinics.");

        let messages = server.get(&path).await.json::<Vec<Message>>();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);

        server
            .post(&path)
            .json(&json!({ "content": "" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

mod sources {
    use super::*;

    #[tokio::test]
    async fn create_queues_normalize_and_list_hides_content() {
        let server = setup();
        let state = bootstrap(&server).await;
        let path = format!("/api/v1/sessions/{}/sources", state.session_id);

        let response = server
            .post(&path)
            .json(&json!({
                "label": "rfp.txt",
                "kind": "file",
                "role": "rfp",
                "content": "Proposals due March 1, 2026."
            }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let source = response.json::<Source>();
        assert_eq!(source.role, SourceRole::Rfp);

        let listed = server.get(&path).await.json::<Vec<Source>>();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].content.is_none());

        let with_content = server
            .get(&format!("{}?with_content=true", path))
            .await
            .json::<Vec<Source>>();
        assert_eq!(
            with_content[0].content.as_deref(),
            Some("Proposals due March 1, 2026.")
        );

        let jobs = server
            .get(&format!("/api/v1/sessions/{}/jobs", state.session_id))
            .await
            .json::<Vec<Job>>();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].kind, JobKind::Normalize);

        server
            .delete(&format!("/api/v1/sources/{}", source.id))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server
            .delete(&format!("/api/v1/sources/{}", source.id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_on_unknown_session_is_not_found() {
        let server = setup();
        server
            .post(&format!("/api/v1/sessions/{}/sources", Uuid::new_v4()))
            .json(&json!({ "label": "a", "kind": "file", "content": "x" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn import_requires_urls() {
        let server = setup();
        let state = bootstrap(&server).await;
        server
            .post(&format!(
                "/api/v1/sessions/{}/sources/import-url",
                state.session_id
            ))
            .json(&json!({ "urls": ["  "] }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

mod facts_and_coverage {
    use super::*;

    #[tokio::test]
    async fn coverage_starts_at_the_opportunity_overview() {
        let server = setup();
        let state = bootstrap(&server).await;

        let response = server
            .get(&format!("/api/v1/sessions/{}/coverage", state.session_id))
            .await
            .json::<CoverageResponse>();

        assert_eq!(response.coverage.score, 0.0);
        assert_eq!(response.fix_next.id, "rfp-overview");
        assert!(!response.suggestions.is_empty());
    }

    #[tokio::test]
    async fn answering_records_a_user_fact() {
        let server = setup();
        let state = bootstrap(&server).await;

        let response = server
            .post(&format!("/api/v1/sessions/{}/facts/answer", state.session_id))
            .json(&json!({
                "fact_ids": ["rfp.title"],
                "value_text": "Clean Energy Pilots"
            }))
            .await;
        response.assert_status_ok();
        let coverage = response.json::<CoverageResponse>();
        assert!(coverage.coverage.score > 0.0);

        let facts = server
            .get(&format!("/api/v1/sessions/{}/facts", state.session_id))
            .await
            .json::<Vec<RfpFact>>();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].slot_id, "rfp.title");

        let events = server
            .get(&format!("/api/v1/facts/{}/events", facts[0].id))
            .await
            .json::<Vec<FactEvent>>();
        assert!(!events.is_empty());
    }

    #[tokio::test]
    async fn answering_without_fact_ids_is_rejected() {
        let server = setup();
        let state = bootstrap(&server).await;

        server
            .post(&format!("/api/v1/sessions/{}/facts/answer", state.session_id))
            .json(&json!({ "fact_ids": [], "value_text": "x" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn not_applicable_toggles() {
        let server = setup();
        let state = bootstrap(&server).await;
        let path = format!("/api/v1/sessions/{}/facts/na", state.session_id);

        server
            .post(&path)
            .json(&json!({ "slot_id": "budget.match", "na": true, "reason": "No match required" }))
            .await
            .assert_status_ok();
        let facts = server
            .get(&format!("/api/v1/sessions/{}/facts", state.session_id))
            .await
            .json::<Vec<RfpFact>>();
        assert_eq!(facts.len(), 1);

        server
            .post(&path)
            .json(&json!({ "slot_id": "budget.match", "na": false }))
            .await
            .assert_status_ok();
        let facts = server
            .get(&format!("/api/v1/sessions/{}/facts", state.session_id))
            .await
            .json::<Vec<RfpFact>>();
        assert!(facts.is_empty());
    }
}

mod drafts {
    use super::*;

    #[tokio::test]
    async fn save_then_get() {
        let server = setup();
        let state = bootstrap(&server).await;
        let path = format!("/api/v1/sessions/{}/drafts/budget", state.session_id);

        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);

        let saved = server
            .put(&path)
            .json(&json!({ "markdown": "## Budget\n\n$50,000 [RFP].", "status": "complete" }))
            .await
            .json::<Draft>();
        assert_eq!(saved.status, CoverageStatus::Complete);

        let fetched = server.get(&path).await.json::<Draft>();
        assert_eq!(fetched.markdown, "## Budget\n\n$50,000 [RFP].");

        let all = server
            .get(&format!("/api/v1/sessions/{}/drafts", state.session_id))
            .await
            .json::<Vec<Draft>>();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn save_requires_markdown() {
        let server = setup();
        let state = bootstrap(&server).await;

        server
            .put(&format!("/api/v1/sessions/{}/drafts/budget", state.session_id))
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn generate_falls_back_to_a_stub_offline() {
        let server = setup();
        let state = bootstrap(&server).await;

        let draft = server
            .post(&format!("/api/v1/sessions/{}/drafts/timeline", state.session_id))
            .json(&json!({ "mode": "generate", "word_target": 300 }))
            .await
            .json::<Draft>();

        assert!(draft.markdown.starts_with("## timeline"));
        assert!(draft.markdown.contains("(Word target: 300)"));
        assert_eq!(draft.status, CoverageStatus::Partial);
    }

    #[tokio::test]
    async fn tighten_reports_length_and_provenance() {
        let server = setup();
        let state = bootstrap(&server).await;

        let body = server
            .post(&format!("/api/v1/sessions/{}/tighten", state.session_id))
            .json(&json!({ "markdown": "A [RFP].\n\nB.", "limit_words": 10 }))
            .await
            .json::<Value>();

        assert_eq!(body["tighten"]["word_count"], 3);
        assert_eq!(body["tighten"]["within_limit"], true);
        assert_eq!(body["provenance"]["total_paragraphs"], 2);
        assert_eq!(body["provenance"]["paragraphs_with_provenance"], 1);
    }
}

mod export {
    use super::*;

    #[tokio::test]
    async fn markdown_becomes_a_docx_download() {
        let server = setup();

        let response = server
            .post("/api/v1/export")
            .json(&json!({ "markdown": "# Proposal\n\nBody", "filename": "proposal.docx" }))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"proposal.docx\""
        );
        assert!(response.as_bytes().starts_with(b"PK"));
    }

    #[tokio::test]
    async fn missing_markdown_is_rejected() {
        let server = setup();
        server
            .post("/api/v1/export")
            .json(&json!({ "markdown": "" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn session_export_needs_a_draft() {
        let server = setup();
        let state = bootstrap(&server).await;
        let path = format!("/api/v1/sessions/{}/export", state.session_id);

        server
            .post(&path)
            .json(&json!({}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .put(&format!("/api/v1/sessions/{}/drafts/budget", state.session_id))
            .json(&json!({ "markdown": "## Budget\n\nNumbers." }))
            .await
            .assert_status_ok();

        let response = server.post(&path).json(&json!({})).await;
        response.assert_status_ok();
        assert!(response.as_bytes().starts_with(b"PK"));
    }

    #[tokio::test]
    async fn session_export_accepts_an_empty_request() {
        let server = setup();
        let state = bootstrap(&server).await;
        server
            .put(&format!("/api/v1/sessions/{}/drafts/budget", state.session_id))
            .json(&json!({ "markdown": "## Budget\n\nNumbers." }))
            .await
            .assert_status_ok();

        let response = server
            .post(&format!("/api/v1/sessions/{}/export", state.session_id))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"grant-draft.docx\""
        );
        assert!(response.as_bytes().starts_with(b"PK"));
    }
}

mod jobs {
    use super::*;

    #[tokio::test]
    async fn enqueue_is_idempotent_while_queued() {
        let server = setup();
        let state = bootstrap(&server).await;
        let body = json!({ "session_id": state.session_id, "kind": "normalize" });

        let first = server.post("/api/v1/jobs").json(&body).await;
        first.assert_status(StatusCode::CREATED);
        let first = first.json::<EnqueueOutcome>();

        let second = server.post("/api/v1/jobs").json(&body).await;
        second.assert_status_ok();
        let second = second.json::<EnqueueOutcome>();

        assert!(!second.created);
        assert_eq!(second.job.id, first.job.id);
    }

    #[tokio::test]
    async fn tick_runs_the_next_job() {
        let server = setup();
        let state = bootstrap(&server).await;

        let idle = server
            .post("/api/v1/jobs/tick")
            .json(&json!({}))
            .await
            .json::<TickResponse>();
        assert!(!idle.processed);

        let queued = server
            .post("/api/v1/jobs")
            .json(&json!({ "session_id": state.session_id, "kind": "normalize" }))
            .await
            .json::<EnqueueOutcome>();

        let ticked = server
            .post("/api/v1/jobs/tick")
            .json(&json!({ "session_id": state.session_id }))
            .await
            .json::<TickResponse>();
        assert!(ticked.processed);

        let job = server
            .get(&format!("/api/v1/jobs/{}", queued.job.id))
            .await
            .json::<Job>();
        assert_eq!(job.status, JobStatus::Done);

        let logs = server
            .get(&format!("/api/v1/jobs/{}/logs", queued.job.id))
            .await
            .json::<Vec<JobLog>>();
        assert!(logs.len() >= 2);
    }

    #[tokio::test]
    async fn tick_accepts_an_empty_request() {
        let server = setup();

        let idle = server.post("/api/v1/jobs/tick").await;
        idle.assert_status_ok();
        assert!(!idle.json::<TickResponse>().processed);

        let state = bootstrap(&server).await;
        server
            .post("/api/v1/jobs")
            .json(&json!({ "session_id": state.session_id, "kind": "normalize" }))
            .await
            .assert_status(StatusCode::CREATED);

        let ticked = server.post("/api/v1/jobs/tick").await.json::<TickResponse>();
        assert!(ticked.processed);
    }

    #[tokio::test]
    async fn enqueue_on_unknown_session_is_not_found() {
        let server = setup();
        server
            .post("/api/v1/jobs")
            .json(&json!({ "session_id": Uuid::new_v4(), "kind": "normalize" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let server = setup();
        server
            .get(&format!("/api/v1/jobs/{}", Uuid::new_v4()))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}

mod discovered_dod {
    use super::*;

    #[tokio::test]
    async fn absent_until_discovered() {
        let server = setup();
        let state = bootstrap(&server).await;

        server
            .get(&format!("/api/v1/sessions/{}/dod", state.session_id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
        let history = server
            .get(&format!("/api/v1/sessions/{}/dod/history", state.session_id))
            .await
            .json::<Vec<DodRecord>>();
        assert!(history.is_empty());
    }
}

mod security {
    use super::*;

    #[tokio::test]
    async fn api_key_is_required_when_configured() {
        let server = setup_with(SecurityConfig::with_api_key("secret"));

        server
            .get("/api/v1/projects")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/api/v1/projects")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_static("Bearer wrong"),
            )
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        server
            .get("/api/v1/projects")
            .add_header(
                header::AUTHORIZATION,
                HeaderValue::from_static("Bearer secret"),
            )
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn health_skips_authentication() {
        let server = setup_with(SecurityConfig::with_api_key("secret"));
        server.get("/api/v1/health").await.assert_status_ok();
    }

    #[tokio::test]
    async fn rate_limit_rejects_excess_requests() {
        let server = setup_with(SecurityConfig::with_rate_limit(2));

        server.get("/api/v1/projects").await.assert_status_ok();
        server.get("/api/v1/projects").await.assert_status_ok();
        server
            .get("/api/v1/projects")
            .await
            .assert_status(StatusCode::TOO_MANY_REQUESTS);
    }
}
