#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod extraction;
pub mod intake;
pub mod maintenance;
pub mod pipeline;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_pdfs;
pub mod validation;

use chrono::Utc;
use common::storage::{
    db::SurrealDbClient, store::ContentStore, types::extraction_job::ExtractionJob,
};
pub use pipeline::{IngestionConfig, IngestionPipeline, IngestionTuning};
use std::sync::Arc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::maintenance::run_maintenance;

pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    ingestion_pipeline: Arc<IngestionPipeline>,
    store: ContentStore,
) -> Result<(), Box<dyn std::error::Error>> {
    let worker_id = format!("extraction-worker-{}", Uuid::new_v4());
    let tuning = ingestion_pipeline.config().tuning.clone();
    let idle_backoff = Duration::from_millis(tuning.idle_backoff_ms);
    let claim_error_backoff = Duration::from_millis(tuning.claim_error_backoff_ms);
    let temp_retention = Duration::from_secs(tuning.temp_retention_secs);
    let job_retention = Duration::from_secs(tuning.job_retention_secs);

    let sweep_every = Duration::from_secs(tuning.cleanup_interval_secs.max(1));
    let mut last_sweep: Option<Instant> = None;

    info!(%worker_id, "extraction worker started");

    loop {
        let sweep_due = match last_sweep {
            Some(at) => at.elapsed() >= sweep_every,
            None => true,
        };
        if sweep_due {
            match run_maintenance(&db, &store, temp_retention, job_retention).await {
                Ok(report) => info!(
                    %worker_id,
                    temp_files_removed = report.temp_files_removed,
                    jobs_removed = report.jobs_removed,
                    jobs_expired = report.jobs_expired,
                    "maintenance sweep finished"
                ),
                Err(err) => warn!(%worker_id, error = %err, "maintenance sweep failed"),
            }
            last_sweep = Some(Instant::now());
        }

        match ExtractionJob::claim_next_queued(&db, &worker_id, Utc::now()).await {
            Ok(Some(job)) => {
                let job_id = job.id.clone();
                info!(%worker_id, %job_id, book_id = %job.book_id, "claimed extraction job");
                if let Err(err) = ingestion_pipeline.process_job(job).await {
                    error!(%worker_id, %job_id, error = %err, "extraction job failed");
                }
            }
            Ok(None) => {
                sleep(idle_backoff).await;
            }
            Err(err) => {
                error!(%worker_id, error = %err, "failed to claim extraction job");
                warn!(backoff_ms = tuning.claim_error_backoff_ms, "backing off after claim error");
                sleep(claim_error_backoff).await;
            }
        }
    }
}
