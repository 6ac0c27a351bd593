//! Background jobs.
//!
//! Jobs are rows in the `jobs` table. The worker polls on an interval,
//! claims the oldest queued job and runs it through the processor. A tick
//! can also be triggered by hand (`POST /jobs/tick`, `granted tick`).

mod processor;

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::engine::Engine;
use crate::models::TickResponse;

pub use processor::{extract_checklist, process_job, AUTODRAFT_WORD_TARGET};

/// Jobs drained per worker wake-up.
const MAX_JOBS_PER_POLL: usize = 16;

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Claim and run one queued job, optionally limited to a session.
pub async fn tick(engine: &Engine, session_id: Option<Uuid>) -> anyhow::Result<TickResponse> {
    let Some(job) = engine.db().claim_next_job(session_id)? else {
        return Ok(TickResponse {
            processed: false,
            job: None,
        });
    };

    tracing::debug!(job_id = %job.id, kind = job.kind.as_str(), session_id = %job.session_id, "Claimed job");
    process_job(engine, &job).await?;

    Ok(TickResponse {
        processed: true,
        job: engine.db().get_job(job.id)?,
    })
}

/// Poll the queue forever on the given interval.
pub fn spawn_worker(engine: Engine, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
        tracing::info!(interval_ms = interval.as_millis() as u64, "Job worker started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for _ in 0..MAX_JOBS_PER_POLL {
                match tick(&engine, None).await {
                    Ok(TickResponse { processed: true, .. }) => continue,
                    Ok(_) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Job worker tick failed");
                        break;
                    }
                }
            }
        }
    })
}
