mod schema;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::coverage::DraftStatuses;
use crate::models::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "granted")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("granted.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        schema::run_migrations(&self.lock())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    // ============================================================
    // Project operations
    // ============================================================

    pub fn get_all_projects(&self) -> Result<Vec<Project>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, created_at, updated_at
             FROM projects ORDER BY name",
        )?;

        let projects = stmt
            .query_map([], row_to_project)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(projects)
    }

    pub fn get_project(&self, id: Uuid) -> Result<Option<Project>> {
        let conn = self.lock();
        let project = conn
            .query_row(
                "SELECT id, name, description, created_at, updated_at
                 FROM projects WHERE id = ?",
                [id.to_string()],
                row_to_project,
            )
            .optional()?;
        Ok(project)
    }

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO projects (id, name, description, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            (
                id.to_string(),
                &input.name,
                &input.description,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Project {
            id,
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Option<Project>> {
        let Some(existing) = self.get_project(id)? else {
            return Ok(None);
        };

        let conn = self.lock();
        let now = Utc::now();
        let name = input.name.unwrap_or(existing.name);
        let description = input.description.or(existing.description);

        conn.execute(
            "UPDATE projects SET name = ?, description = ?, updated_at = ? WHERE id = ?",
            (&name, &description, now.to_rfc3339(), id.to_string()),
        )?;

        Ok(Some(Project {
            id,
            name,
            description,
            created_at: existing.created_at,
            updated_at: now,
        }))
    }

    pub fn delete_project(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM projects WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    pub fn get_project_with_sessions(&self, id: Uuid) -> Result<Option<ProjectWithSessions>> {
        let Some(project) = self.get_project(id)? else {
            return Ok(None);
        };
        let sessions = self.get_sessions_by_project(id)?;
        Ok(Some(ProjectWithSessions { project, sessions }))
    }

    // ============================================================
    // Session operations
    // ============================================================

    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let conn = self.lock();
        let session = conn
            .query_row(
                "SELECT id, project_id, created_at, updated_at FROM sessions WHERE id = ?",
                [id.to_string()],
                row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    pub fn get_sessions_by_project(&self, project_id: Uuid) -> Result<Vec<Session>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, project_id, created_at, updated_at
             FROM sessions WHERE project_id = ? ORDER BY updated_at DESC",
        )?;
        let sessions = stmt
            .query_map([project_id.to_string()], row_to_session)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sessions)
    }

    pub fn create_session(&self, project_id: Uuid) -> Result<Session> {
        self.get_project(project_id)?
            .ok_or_else(|| anyhow::anyhow!("Project not found"))?;

        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (id, project_id, created_at, updated_at) VALUES (?, ?, ?, ?)",
            (
                id.to_string(),
                project_id.to_string(),
                now.to_rfc3339(),
                now.to_rfc3339(),
            ),
        )?;

        Ok(Session {
            id,
            project_id,
            created_at: now,
            updated_at: now,
        })
    }

    fn touch_session(conn: &Connection, id: Uuid) -> Result<()> {
        conn.execute(
            "UPDATE sessions SET updated_at = ? WHERE id = ?",
            (Utc::now().to_rfc3339(), id.to_string()),
        )?;
        Ok(())
    }

    // ============================================================
    // Message operations
    // ============================================================

    pub fn create_message(
        &self,
        session_id: Uuid,
        role: Role,
        content: &str,
        envelope: Option<&Envelope>,
    ) -> Result<Message> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO messages (id, session_id, role, content, envelope, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                session_id.to_string(),
                role.as_str(),
                content,
                envelope.map(serde_json::to_string).transpose()?,
                now.to_rfc3339(),
            ),
        )?;
        Self::touch_session(&conn, session_id)?;

        Ok(Message {
            id,
            session_id,
            role,
            content: content.to_string(),
            envelope: envelope.cloned(),
            created_at: now,
        })
    }

    pub fn get_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, envelope, created_at
             FROM messages WHERE session_id = ? ORDER BY created_at, rowid",
        )?;

        let messages = stmt
            .query_map([session_id.to_string()], |row| {
                Ok(Message {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    session_id: parse_uuid(row.get::<_, String>(1)?),
                    role: Role::from_str(&row.get::<_, String>(2)?).unwrap_or(Role::System),
                    content: row.get(3)?,
                    envelope: parse_json(row.get(4)?),
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    // ============================================================
    // Source operations
    // ============================================================

    /// Insert a source, replacing the content of an existing one with the
    /// same label and href.
    pub fn create_source(&self, session_id: Uuid, input: CreateSourceInput) -> Result<Source> {
        self.get_session(session_id)?
            .ok_or_else(|| anyhow::anyhow!("Session not found"))?;

        let conn = self.lock();
        let now = Utc::now();
        let href = input.href.clone().unwrap_or_default();
        let bytes = input.content.len() as i64;

        conn.execute(
            "INSERT INTO sources (id, session_id, label, kind, role, href, content, bytes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (session_id, label, href) DO UPDATE SET
                kind = excluded.kind,
                role = excluded.role,
                content = excluded.content,
                bytes = excluded.bytes",
            (
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                &input.label,
                input.kind.as_str(),
                input.role.as_str(),
                &href,
                &input.content,
                bytes,
                now.to_rfc3339(),
            ),
        )?;
        Self::touch_session(&conn, session_id)?;

        let source = conn.query_row(
            "SELECT id, session_id, label, kind, role, href, content, bytes, created_at
             FROM sources WHERE session_id = ? AND label = ? AND href = ?",
            (session_id.to_string(), &input.label, &href),
            |row| row_to_source(row, false),
        )?;
        Ok(source)
    }

    /// Sources for a session, oldest first. Content is only loaded when asked for.
    pub fn get_sources(&self, session_id: Uuid, with_content: bool) -> Result<Vec<Source>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, label, kind, role, href, content, bytes, created_at
             FROM sources WHERE session_id = ? ORDER BY created_at, rowid",
        )?;
        let sources = stmt
            .query_map([session_id.to_string()], |row| row_to_source(row, with_content))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let conn = self.lock();
        let source = conn
            .query_row(
                "SELECT id, session_id, label, kind, role, href, content, bytes, created_at
                 FROM sources WHERE id = ?",
                [id.to_string()],
                |row| row_to_source(row, true),
            )
            .optional()?;
        Ok(source)
    }

    pub fn delete_source(&self, id: Uuid) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM sources WHERE id = ?", [id.to_string()])?;
        Ok(rows > 0)
    }

    // ============================================================
    // Fact operations
    // ============================================================

    pub fn get_facts(&self, session_id: Uuid) -> Result<Vec<RfpFact>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, slot_id, value_text, value_json, confidence, evidence, hash,
                    origin, annotations, created_at, updated_at
             FROM rfp_facts WHERE session_id = ? ORDER BY created_at, rowid",
        )?;
        let facts = stmt
            .query_map([session_id.to_string()], row_to_fact)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    pub fn get_fact_hashes(&self, session_id: Uuid) -> Result<HashSet<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT hash FROM rfp_facts WHERE session_id = ?")?;
        let hashes = stmt
            .query_map([session_id.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(hashes)
    }

    /// Insert new facts, skipping any whose hash is already stored for the
    /// slot. Each inserted fact gets an event. Returns the inserted rows.
    pub fn insert_facts(&self, session_id: Uuid, facts: &[NewFact]) -> Result<Vec<RfpFact>> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let mut inserted = Vec::new();

        for fact in facts {
            let id = Uuid::new_v4();
            let rows = tx.execute(
                "INSERT OR IGNORE INTO rfp_facts
                    (id, session_id, slot_id, value_text, value_json, confidence, evidence, hash,
                     origin, annotations, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    id.to_string(),
                    session_id.to_string(),
                    &fact.slot_id,
                    &fact.value_text,
                    to_json(fact.value_json.as_ref())?,
                    fact.confidence,
                    to_json(fact.evidence.as_ref())?,
                    &fact.hash,
                    fact.origin.as_str(),
                    to_json(fact.annotations.as_ref())?,
                    now.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
            if rows == 0 {
                continue;
            }
            record_fact_event(&tx, id, session_id, fact)?;
            inserted.push(stored_fact(id, session_id, fact.clone(), now, now));
        }

        tx.commit()?;
        Ok(inserted)
    }

    /// Insert or refresh a fact keyed on (session, slot, hash).
    pub fn upsert_fact(&self, session_id: Uuid, fact: NewFact) -> Result<RfpFact> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now();

        tx.execute(
            "INSERT INTO rfp_facts
                (id, session_id, slot_id, value_text, value_json, confidence, evidence, hash,
                 origin, annotations, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (session_id, slot_id, hash) DO UPDATE SET
                value_text = excluded.value_text,
                value_json = excluded.value_json,
                confidence = excluded.confidence,
                evidence = excluded.evidence,
                origin = excluded.origin,
                annotations = excluded.annotations,
                updated_at = excluded.updated_at",
            rusqlite::params![
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                &fact.slot_id,
                &fact.value_text,
                to_json(fact.value_json.as_ref())?,
                fact.confidence,
                to_json(fact.evidence.as_ref())?,
                &fact.hash,
                fact.origin.as_str(),
                to_json(fact.annotations.as_ref())?,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        let stored = tx.query_row(
            "SELECT id, session_id, slot_id, value_text, value_json, confidence, evidence, hash,
                    origin, annotations, created_at, updated_at
             FROM rfp_facts WHERE session_id = ? AND slot_id = ? AND hash = ?",
            (session_id.to_string(), &fact.slot_id, &fact.hash),
            row_to_fact,
        )?;
        record_fact_event(&tx, stored.id, session_id, &fact)?;
        Self::touch_session(&tx, session_id)?;

        tx.commit()?;
        Ok(stored)
    }

    /// Remove user-entered N/A markers for a slot.
    pub fn clear_not_applicable(&self, session_id: Uuid, slot_id: &str) -> Result<usize> {
        let conn = self.lock();
        let rows = conn.execute(
            "DELETE FROM rfp_facts
             WHERE session_id = ? AND slot_id = ? AND origin = 'user'
               AND (json_extract(annotations, '$.na') = 1 OR value_text = 'N/A')",
            (session_id.to_string(), slot_id),
        )?;
        Ok(rows)
    }

    pub fn get_fact_events(&self, fact_id: Uuid) -> Result<Vec<FactEvent>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, fact_id, session_id, kind, payload, created_at
             FROM fact_events WHERE fact_id = ? ORDER BY created_at, rowid",
        )?;
        let events = stmt
            .query_map([fact_id.to_string()], |row| {
                Ok(FactEvent {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    fact_id: parse_uuid(row.get::<_, String>(1)?),
                    session_id: parse_uuid(row.get::<_, String>(2)?),
                    kind: row.get(3)?,
                    payload: parse_json(row.get(4)?).unwrap_or(Value::Null),
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    // ============================================================
    // Coverage, tighten and provenance snapshots
    // ============================================================

    pub fn save_coverage_snapshot(&self, session_id: Uuid, snapshot: &CoverageSnapshot) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO coverage_snapshots (id, session_id, score, summary, payload, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                snapshot.score,
                &snapshot.summary,
                serde_json::to_string(snapshot)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    pub fn latest_coverage_snapshot(&self, session_id: Uuid) -> Result<Option<CoverageSnapshot>> {
        self.latest_payload("coverage_snapshots", session_id)
    }

    pub fn save_tighten_snapshot(&self, session_id: Uuid, snapshot: &TightenSnapshot) -> Result<()> {
        self.insert_payload("tighten_snapshots", session_id, snapshot)
    }

    pub fn latest_tighten_snapshot(&self, session_id: Uuid) -> Result<Option<TightenSnapshot>> {
        self.latest_payload("tighten_snapshots", session_id)
    }

    pub fn save_provenance_snapshot(&self, session_id: Uuid, snapshot: &ProvenanceSnapshot) -> Result<()> {
        self.insert_payload("provenance_snapshots", session_id, snapshot)
    }

    pub fn latest_provenance_snapshot(&self, session_id: Uuid) -> Result<Option<ProvenanceSnapshot>> {
        self.latest_payload("provenance_snapshots", session_id)
    }

    fn insert_payload<T: Serialize>(&self, table: &str, session_id: Uuid, payload: &T) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, session_id, payload, created_at) VALUES (?, ?, ?, ?)",
                table
            ),
            (
                Uuid::new_v4().to_string(),
                session_id.to_string(),
                serde_json::to_string(payload)?,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    fn latest_payload<T: DeserializeOwned>(&self, table: &str, session_id: Uuid) -> Result<Option<T>> {
        let conn = self.lock();
        let payload: Option<Option<String>> = conn
            .query_row(
                &format!(
                    "SELECT payload FROM {} WHERE session_id = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
                    table
                ),
                [session_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload.and_then(parse_json))
    }

    // ============================================================
    // Draft operations
    // ============================================================

    pub fn get_draft(&self, session_id: Uuid, section_id: &str) -> Result<Option<Draft>> {
        let conn = self.lock();
        let draft = conn
            .query_row(
                "SELECT session_id, section_id, markdown, status, updated_at
                 FROM drafts WHERE session_id = ? AND section_id = ?",
                (session_id.to_string(), section_id),
                row_to_draft,
            )
            .optional()?;
        Ok(draft)
    }

    pub fn get_drafts(&self, session_id: Uuid) -> Result<Vec<Draft>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, section_id, markdown, status, updated_at
             FROM drafts WHERE session_id = ? ORDER BY section_id",
        )?;
        let drafts = stmt
            .query_map([session_id.to_string()], row_to_draft)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(drafts)
    }

    pub fn get_draft_statuses(&self, session_id: Uuid) -> Result<DraftStatuses> {
        Ok(self
            .get_drafts(session_id)?
            .into_iter()
            .map(|draft| (draft.section_id, draft.status))
            .collect())
    }

    /// Save a section draft, replacing any previous one.
    pub fn save_draft(
        &self,
        session_id: Uuid,
        section_id: &str,
        markdown: &str,
        status: CoverageStatus,
    ) -> Result<Draft> {
        let conn = self.lock();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO drafts (session_id, section_id, markdown, status, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (session_id, section_id) DO UPDATE SET
                markdown = excluded.markdown,
                status = excluded.status,
                updated_at = excluded.updated_at",
            (
                session_id.to_string(),
                section_id,
                markdown,
                status.as_str(),
                now.to_rfc3339(),
            ),
        )?;
        Self::touch_session(&conn, session_id)?;

        Ok(Draft {
            session_id,
            section_id: section_id.to_string(),
            markdown: markdown.to_string(),
            status,
            updated_at: now,
        })
    }

    // ============================================================
    // Job queue
    // ============================================================

    /// Queue a job unless one of the same kind is already queued or running
    /// for the session, in which case that job is returned instead.
    pub fn enqueue_job(&self, session_id: Uuid, kind: JobKind, payload: Option<Value>) -> Result<EnqueueOutcome> {
        self.enqueue_follow_up(session_id, kind, payload, None)
    }

    /// Like [`Database::enqueue_job`], but the running job `from` does not
    /// count as pending, so a job can queue its own successor.
    pub fn enqueue_follow_up(
        &self,
        session_id: Uuid,
        kind: JobKind,
        payload: Option<Value>,
        from: Option<Uuid>,
    ) -> Result<EnqueueOutcome> {
        let conn = self.lock();

        let existing = conn
            .query_row(
                &format!(
                    "SELECT {} FROM jobs
                     WHERE session_id = ? AND kind = ? AND status IN ('queued', 'running') AND id != ?
                     ORDER BY created_at LIMIT 1",
                    JOB_COLUMNS
                ),
                (
                    session_id.to_string(),
                    kind.as_str(),
                    from.map(|id| id.to_string()).unwrap_or_default(),
                ),
                row_to_job,
            )
            .optional()?;
        if let Some(job) = existing {
            tracing::debug!(job_id = %job.id, kind = kind.as_str(), "Job already pending");
            return Ok(EnqueueOutcome { job, created: false });
        }

        let id = Uuid::new_v4();
        let now = Utc::now();
        let payload = payload.unwrap_or_else(|| json!({}));
        conn.execute(
            "INSERT INTO jobs (id, session_id, kind, status, payload, created_at)
             VALUES (?, ?, ?, 'queued', ?, ?)",
            (
                id.to_string(),
                session_id.to_string(),
                kind.as_str(),
                serde_json::to_string(&payload)?,
                now.to_rfc3339(),
            ),
        )?;

        Ok(EnqueueOutcome {
            job: Job {
                id,
                session_id,
                kind,
                status: JobStatus::Queued,
                payload,
                result: None,
                error_message: None,
                created_at: now,
                started_at: None,
                finished_at: None,
            },
            created: true,
        })
    }

    pub fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        let conn = self.lock();
        let job = conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
                [id.to_string()],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    pub fn get_jobs_by_session(&self, session_id: Uuid) -> Result<Vec<Job>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE session_id = ? ORDER BY created_at DESC, rowid DESC",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map([session_id.to_string()], row_to_job)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Job counts per status, across all sessions.
    pub fn count_jobs_by_status(&self) -> Result<Vec<(JobStatus, usize)>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")?;
        let counts = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts
            .into_iter()
            .filter_map(|(status, count)| {
                JobStatus::from_str(&status).map(|status| (status, count as usize))
            })
            .collect())
    }

    /// Claim the oldest queued job, optionally limited to one session.
    ///
    /// The claim is a conditional update on `status = 'queued'`; a job that
    /// another worker claimed first is skipped.
    pub fn claim_next_job(&self, session_id: Option<Uuid>) -> Result<Option<Job>> {
        let conn = self.lock();
        let candidates: Vec<String> = match session_id {
            Some(session_id) => {
                let mut stmt = conn.prepare(
                    "SELECT id FROM jobs WHERE status = 'queued' AND session_id = ?
                     ORDER BY created_at, rowid LIMIT 5",
                )?;
                let ids = stmt
                    .query_map([session_id.to_string()], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id FROM jobs WHERE status = 'queued' ORDER BY created_at, rowid LIMIT 5",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                ids
            }
        };

        let now = Utc::now().to_rfc3339();
        for id in candidates {
            let claimed = conn.execute(
                "UPDATE jobs SET status = 'running', started_at = ? WHERE id = ? AND status = 'queued'",
                (&now, &id),
            )?;
            if claimed == 1 {
                let job = conn.query_row(
                    &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
                    [&id],
                    row_to_job,
                )?;
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    pub fn complete_job(
        &self,
        id: Uuid,
        status: JobStatus,
        result: Option<&Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = ?, result = ?, error_message = ?, finished_at = ? WHERE id = ?",
            (
                status.as_str(),
                to_json(result)?,
                error_message,
                Utc::now().to_rfc3339(),
                id.to_string(),
            ),
        )?;
        Ok(())
    }

    pub fn add_job_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
        details: Option<&Value>,
    ) -> Result<JobLog> {
        let conn = self.lock();
        let id = Uuid::new_v4();
        let now = Utc::now();
        conn.execute(
            "INSERT INTO job_logs (id, job_id, level, message, details, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.to_string(),
                job_id.to_string(),
                level.as_str(),
                message,
                to_json(details)?,
                now.to_rfc3339(),
            ),
        )?;
        Ok(JobLog {
            id,
            job_id,
            level,
            message: message.to_string(),
            details: details.cloned(),
            created_at: now,
        })
    }

    pub fn get_job_logs(&self, job_id: Uuid) -> Result<Vec<JobLog>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, level, message, details, created_at
             FROM job_logs WHERE job_id = ? ORDER BY created_at, rowid",
        )?;
        let logs = stmt
            .query_map([job_id.to_string()], |row| {
                Ok(JobLog {
                    id: parse_uuid(row.get::<_, String>(0)?),
                    job_id: parse_uuid(row.get::<_, String>(1)?),
                    level: LogLevel::from_str(&row.get::<_, String>(2)?).unwrap_or(LogLevel::Info),
                    message: row.get(3)?,
                    details: parse_json(row.get(4)?),
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(logs)
    }

    // ============================================================
    // Discovered definition of done
    // ============================================================

    pub fn get_discovered_dod(&self, session_id: Uuid) -> Result<Option<DodRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                "SELECT session_id, version, dod, sources_signature, model_id, created_job_id,
                        created_at, updated_at
                 FROM discovered_dod WHERE session_id = ?",
                [session_id.to_string()],
                row_to_dod_record,
            )
            .optional()?;
        Ok(record.flatten())
    }

    /// Store a newly discovered checklist. The previous one, if any, is
    /// archived to history and the version is bumped.
    pub fn save_discovered_dod(
        &self,
        session_id: Uuid,
        dod: &DiscoveredDod,
        sources_signature: &str,
        model_id: &str,
        created_job_id: Option<Uuid>,
    ) -> Result<DodRecord> {
        let previous = self.get_discovered_dod(session_id)?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now();

        if let Some(previous) = &previous {
            tx.execute(
                "INSERT INTO discovered_dod_history
                    (id, session_id, version, dod, sources_signature, model_id, created_job_id,
                     created_at, archived_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    session_id.to_string(),
                    previous.version,
                    serde_json::to_string(&previous.dod)?,
                    &previous.sources_signature,
                    &previous.model_id,
                    previous.created_job_id.map(|id| id.to_string()),
                    previous.created_at.to_rfc3339(),
                    now.to_rfc3339(),
                ],
            )?;
        }

        let version = previous.as_ref().map(|p| p.version + 1).unwrap_or(1);
        let created_at = previous.as_ref().map(|p| p.created_at).unwrap_or(now);
        let mut stored = dod.clone();
        stored.version = version;

        tx.execute(
            "INSERT INTO discovered_dod
                (session_id, version, dod, sources_signature, model_id, created_job_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (session_id) DO UPDATE SET
                version = excluded.version,
                dod = excluded.dod,
                sources_signature = excluded.sources_signature,
                model_id = excluded.model_id,
                created_job_id = excluded.created_job_id,
                updated_at = excluded.updated_at",
            rusqlite::params![
                session_id.to_string(),
                version,
                serde_json::to_string(&stored)?,
                sources_signature,
                model_id,
                created_job_id.map(|id| id.to_string()),
                created_at.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        Ok(DodRecord {
            session_id,
            version,
            dod: stored,
            sources_signature: sources_signature.to_string(),
            model_id: model_id.to_string(),
            created_job_id,
            created_at,
            updated_at: now,
        })
    }

    /// Archived checklists, newest first. `updated_at` is the archive time.
    pub fn get_discovered_dod_history(&self, session_id: Uuid) -> Result<Vec<DodRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id, version, dod, sources_signature, model_id, created_job_id,
                    created_at, archived_at
             FROM discovered_dod_history WHERE session_id = ? ORDER BY archived_at DESC, rowid DESC",
        )?;
        let records = stmt
            .query_map([session_id.to_string()], row_to_dod_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records.into_iter().flatten().collect())
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

const JOB_COLUMNS: &str =
    "id, session_id, kind, status, payload, result, error_message, created_at, started_at, finished_at";

fn record_fact_event(conn: &Connection, fact_id: Uuid, session_id: Uuid, fact: &NewFact) -> Result<()> {
    conn.execute(
        "INSERT INTO fact_events (id, fact_id, session_id, kind, payload, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            fact_id.to_string(),
            session_id.to_string(),
            fact.origin.as_str(),
            json!({
                "slot_id": fact.slot_id,
                "value_text": fact.value_text,
                "confidence": fact.confidence,
                "hash": fact.hash,
            })
            .to_string(),
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn stored_fact(
    id: Uuid,
    session_id: Uuid,
    fact: NewFact,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
) -> RfpFact {
    RfpFact {
        id,
        session_id,
        slot_id: fact.slot_id,
        value_text: fact.value_text,
        value_json: fact.value_json,
        confidence: fact.confidence,
        evidence: fact.evidence,
        hash: fact.hash,
        origin: fact.origin,
        annotations: fact.annotations,
        created_at,
        updated_at,
    }
}

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(row.get::<_, String>(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: parse_datetime(row.get::<_, String>(3)?),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: parse_uuid(row.get::<_, String>(0)?),
        project_id: parse_uuid(row.get::<_, String>(1)?),
        created_at: parse_datetime(row.get::<_, String>(2)?),
        updated_at: parse_datetime(row.get::<_, String>(3)?),
    })
}

fn row_to_source(row: &Row, with_content: bool) -> rusqlite::Result<Source> {
    let href: String = row.get(5)?;
    Ok(Source {
        id: parse_uuid(row.get::<_, String>(0)?),
        session_id: parse_uuid(row.get::<_, String>(1)?),
        label: row.get(2)?,
        kind: SourceKind::from_str(&row.get::<_, String>(3)?).unwrap_or(SourceKind::File),
        role: SourceRole::from_str(&row.get::<_, String>(4)?).unwrap_or_default(),
        href: (!href.is_empty()).then_some(href),
        content: if with_content { Some(row.get(6)?) } else { None },
        bytes: row.get(7)?,
        created_at: parse_datetime(row.get::<_, String>(8)?),
    })
}

fn row_to_fact(row: &Row) -> rusqlite::Result<RfpFact> {
    Ok(RfpFact {
        id: parse_uuid(row.get::<_, String>(0)?),
        session_id: parse_uuid(row.get::<_, String>(1)?),
        slot_id: row.get(2)?,
        value_text: row.get(3)?,
        value_json: parse_json(row.get(4)?),
        confidence: row.get(5)?,
        evidence: parse_json(row.get(6)?),
        hash: row.get(7)?,
        origin: FactOrigin::from_str(&row.get::<_, String>(8)?).unwrap_or(FactOrigin::Ingested),
        annotations: parse_json(row.get(9)?),
        created_at: parse_datetime(row.get::<_, String>(10)?),
        updated_at: parse_datetime(row.get::<_, String>(11)?),
    })
}

fn row_to_draft(row: &Row) -> rusqlite::Result<Draft> {
    Ok(Draft {
        session_id: parse_uuid(row.get::<_, String>(0)?),
        section_id: row.get(1)?,
        markdown: row.get(2)?,
        status: CoverageStatus::from_str(&row.get::<_, String>(3)?).unwrap_or(CoverageStatus::Partial),
        updated_at: parse_datetime(row.get::<_, String>(4)?),
    })
}

fn row_to_job(row: &Row) -> rusqlite::Result<Job> {
    Ok(Job {
        id: parse_uuid(row.get::<_, String>(0)?),
        session_id: parse_uuid(row.get::<_, String>(1)?),
        kind: JobKind::from_str(&row.get::<_, String>(2)?).unwrap_or(JobKind::Normalize),
        status: JobStatus::from_str(&row.get::<_, String>(3)?).unwrap_or(JobStatus::Error),
        payload: parse_json(row.get(4)?).unwrap_or_else(|| json!({})),
        result: parse_json(row.get(5)?),
        error_message: row.get(6)?,
        created_at: parse_datetime(row.get::<_, String>(7)?),
        started_at: row.get::<_, Option<String>>(8)?.map(parse_datetime),
        finished_at: row.get::<_, Option<String>>(9)?.map(parse_datetime),
    })
}

/// `None` when the stored checklist no longer deserialises.
fn row_to_dod_record(row: &Row) -> rusqlite::Result<Option<DodRecord>> {
    let Some(dod) = parse_json::<DiscoveredDod>(row.get(2)?) else {
        tracing::warn!("Skipping unreadable discovered checklist");
        return Ok(None);
    };
    Ok(Some(DodRecord {
        session_id: parse_uuid(row.get::<_, String>(0)?),
        version: row.get(1)?,
        dod,
        sources_signature: row.get(3)?,
        model_id: row.get(4)?,
        created_job_id: row.get::<_, Option<String>>(5)?.map(parse_uuid),
        created_at: parse_datetime(row.get::<_, String>(6)?),
        updated_at: parse_datetime(row.get::<_, String>(7)?),
    }))
}

fn to_json<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    Ok(value.map(serde_json::to_string).transpose()?)
}

fn parse_json<T: DeserializeOwned>(s: Option<String>) -> Option<T> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn parse_uuid(s: String) -> Uuid {
    Uuid::parse_str(&s).unwrap_or_else(|_| Uuid::nil())
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
