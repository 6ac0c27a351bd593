//! MCP server integration tests.
//!
//! These exercise the tool logic in-process through the `test_*` helpers,
//! against an in-memory database and the offline model.

use std::sync::Arc;

use granted::config::AppConfig;
use granted::db::Database;
use granted::engine::Engine;
use granted::llm::OfflineModel;
use granted::mcp::*;
use granted::models::*;
use uuid::Uuid;

/// A server plus the engine behind it, with one bootstrapped session.
fn setup() -> (McpServer, Engine, Uuid) {
    let db = Database::open_memory().expect("Failed to create database");
    db.migrate().expect("Failed to migrate");
    let engine = Engine::new(db, Arc::new(OfflineModel), AppConfig::offline());
    let session_id = engine
        .bootstrap(None, None)
        .expect("Failed to bootstrap session")
        .session_id;
    (McpServer::new(engine.clone()), engine, session_id)
}

fn persist(server: &McpServer, session_id: Uuid, fact_id: &str, value: &str) -> CoverageReport {
    server
        .test_persist_fact(PersistFactRequest {
            session_id: session_id.to_string(),
            fact_ids: vec![fact_id.to_string()],
            value: value.to_string(),
            kind: None,
        })
        .expect("persist_fact failed")
}

mod get_coverage {
    use super::*;

    #[test]
    fn starts_with_every_section_missing() {
        let (server, _, session_id) = setup();

        let report = server
            .test_get_coverage(&session_id.to_string())
            .expect("get_coverage failed");

        assert_eq!(report.session_id, session_id.to_string());
        assert_eq!(report.percent, 0);
        assert!(!report.sections.is_empty());
        assert!(report.sections.iter().all(|s| s.status == "missing"));
        assert_eq!(report.fix_next.id, "rfp-overview");
        assert_eq!(report.fix_next.kind, "question");
    }

    #[test]
    fn lists_fact_ids_on_open_questions() {
        let (server, _, session_id) = setup();

        let report = server.test_get_coverage(&session_id.to_string()).unwrap();
        let overview = report
            .sections
            .iter()
            .find(|s| s.id == "rfp-overview")
            .expect("overview section");

        assert!(overview
            .questions
            .iter()
            .any(|q| q.fact_ids.contains(&"rfp.title".to_string())));
    }

    #[test]
    fn rejects_invalid_uuid() {
        let (server, _, _) = setup();
        assert!(server.test_get_coverage("not-a-uuid").is_err());
    }

    #[test]
    fn rejects_unknown_session() {
        let (server, _, _) = setup();
        assert!(server.test_get_coverage(&Uuid::new_v4().to_string()).is_err());
    }
}

mod persist_fact {
    use super::*;

    #[test]
    fn answering_a_question_moves_the_section_forward() {
        let (server, engine, session_id) = setup();

        let report = persist(&server, session_id, "rfp.title", "Clean Energy Pilots");

        let overview = report
            .sections
            .iter()
            .find(|s| s.id == "rfp-overview")
            .unwrap();
        assert_eq!(overview.status, "partial");
        assert!(report.percent > 0);

        let facts = engine.db().get_facts(session_id).unwrap();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].origin, FactOrigin::User);
    }

    #[test]
    fn rejects_unknown_answer_kind() {
        let (server, _, session_id) = setup();

        let result = server.test_persist_fact(PersistFactRequest {
            session_id: session_id.to_string(),
            fact_ids: vec!["rfp.deadline".to_string()],
            value: "next week".to_string(),
            kind: Some("vibes".to_string()),
        });

        assert!(result.is_err());
    }

    #[test]
    fn rejects_empty_fact_ids() {
        let (server, _, session_id) = setup();

        let result = server.test_persist_fact(PersistFactRequest {
            session_id: session_id.to_string(),
            fact_ids: vec![],
            value: "anything".to_string(),
            kind: None,
        });

        assert!(result.is_err());
    }
}

mod draft_section {
    use super::*;

    #[tokio::test]
    async fn stores_markdown_verbatim() {
        let (server, engine, session_id) = setup();

        let draft = server
            .test_draft_section(DraftSectionRequest {
                session_id: session_id.to_string(),
                section_id: "budget".to_string(),
                markdown: Some("## Budget\n\nWe request $50,000 [RFP].".to_string()),
                prompt: None,
                word_target: None,
            })
            .await
            .expect("draft_section failed");

        assert_eq!(draft.section_id, "budget");
        assert_eq!(draft.status, "partial");
        assert_eq!(draft.word_count, 6);

        let stored = engine.db().get_draft(session_id, "budget").unwrap().unwrap();
        assert_eq!(stored.markdown, "## Budget\n\nWe request $50,000 [RFP].");
    }

    #[tokio::test]
    async fn generates_a_placeholder_offline() {
        let (server, _, session_id) = setup();

        let draft = server
            .test_draft_section(DraftSectionRequest {
                session_id: session_id.to_string(),
                section_id: "timeline".to_string(),
                markdown: None,
                prompt: Some("Outline the milestones.".to_string()),
                word_target: Some(200),
            })
            .await
            .expect("draft_section failed");

        assert!(draft.markdown.starts_with("## timeline"));
        assert!(draft.markdown.contains("(Word target: 200)"));
    }
}

mod tighten_section {
    use super::*;

    #[test]
    fn reports_length_and_provenance() {
        let (server, engine, session_id) = setup();

        let report = server
            .test_tighten_section(TightenSectionRequest {
                session_id: session_id.to_string(),
                markdown: "First paragraph [RFP].\n\nSecond paragraph without a tag.".to_string(),
                limit_words: Some(5),
            })
            .expect("tighten_section failed");

        assert_eq!(report.word_count, 8);
        assert!(!report.within_limit);
        assert_eq!(report.limit_words, Some(5));
        assert_eq!(report.total_paragraphs, 2);
        assert_eq!(report.paragraphs_with_provenance, 1);

        assert!(engine
            .db()
            .latest_tighten_snapshot(session_id)
            .unwrap()
            .is_some());
    }
}

mod enqueue_job {
    use super::*;

    #[test]
    fn queues_once_per_kind() {
        let (server, _, session_id) = setup();

        let first = server
            .test_enqueue_job(&session_id.to_string(), "normalize")
            .expect("enqueue failed");
        let second = server
            .test_enqueue_job(&session_id.to_string(), "normalize")
            .expect("enqueue failed");

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);
        assert_eq!(first.status, "queued");
    }

    #[test]
    fn rejects_internal_kinds() {
        let (server, _, session_id) = setup();

        assert!(server
            .test_enqueue_job(&session_id.to_string(), "ingest_url")
            .is_err());
        assert!(server
            .test_enqueue_job(&session_id.to_string(), "bogus")
            .is_err());
    }
}

mod export_docx {
    use super::*;

    #[test]
    fn exports_markdown_directly() {
        let (server, _, _) = setup();

        let export = server
            .test_export_docx(ExportDocxRequest {
                session_id: None,
                markdown: Some("# Title\n\nBody".to_string()),
                filename: None,
            })
            .expect("export failed");

        assert_eq!(export.filename, "grant-draft.docx");
        assert!(!export.base64.is_empty());
    }

    #[tokio::test]
    async fn exports_drafted_sections_of_a_session() {
        let (server, _, session_id) = setup();
        server
            .test_draft_section(DraftSectionRequest {
                session_id: session_id.to_string(),
                section_id: "budget".to_string(),
                markdown: Some("## Budget\n\nNumbers.".to_string()),
                prompt: None,
                word_target: None,
            })
            .await
            .unwrap();

        let export = server
            .test_export_docx(ExportDocxRequest {
                session_id: Some(session_id.to_string()),
                markdown: None,
                filename: Some("budget.docx".to_string()),
            })
            .expect("export failed");

        assert_eq!(export.filename, "budget.docx");
    }

    #[test]
    fn fails_without_drafts_or_markdown() {
        let (server, _, session_id) = setup();

        assert!(server
            .test_export_docx(ExportDocxRequest {
                session_id: Some(session_id.to_string()),
                markdown: None,
                filename: None,
            })
            .is_err());
        assert!(server
            .test_export_docx(ExportDocxRequest {
                session_id: None,
                markdown: None,
                filename: None,
            })
            .is_err());
    }
}
