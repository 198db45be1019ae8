use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::ContentStore,
        types::{
            book::{Book, ProcessingStatus},
            extraction_job::ExtractionJob,
        },
    },
};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub temp_files_removed: usize,
    pub jobs_removed: usize,
    pub jobs_expired: usize,
}

/// Fails jobs whose worker stopped heartbeating, then removes staging files
/// older than `temp_retention` and finished jobs not touched for
/// `job_retention`.
pub async fn run_maintenance(
    db: &SurrealDbClient,
    store: &ContentStore,
    temp_retention: Duration,
    job_retention: Duration,
) -> Result<MaintenanceReport, AppError> {
    let jobs_expired = fail_abandoned_jobs(db, Utc::now()).await?;
    let temp_files_removed = store.cleanup_stale_temp(temp_retention).await?;
    let jobs_removed = ExtractionJob::delete_finished_before(job_cutoff(job_retention), db).await?;

    if temp_files_removed > 0 || jobs_removed > 0 || jobs_expired > 0 {
        info!(
            temp_files_removed,
            jobs_removed, jobs_expired, "maintenance sweep removed stale data"
        );
    }

    Ok(MaintenanceReport {
        temp_files_removed,
        jobs_removed,
        jobs_expired,
    })
}

/// Cleanup limited to one user's staging files and finished jobs.
pub async fn run_user_maintenance(
    db: &SurrealDbClient,
    store: &ContentStore,
    user_id: &str,
    temp_retention: Duration,
    job_retention: Duration,
) -> Result<MaintenanceReport, AppError> {
    let temp_files_removed = store.cleanup_stale_temp_for(user_id, temp_retention).await?;
    let jobs_removed =
        ExtractionJob::delete_finished_before_for_user(job_cutoff(job_retention), user_id, db)
            .await?;

    Ok(MaintenanceReport {
        temp_files_removed,
        jobs_removed,
        jobs_expired: 0,
    })
}

/// Marks expired running jobs and their books as failed.
pub async fn fail_abandoned_jobs(
    db: &SurrealDbClient,
    now: DateTime<Utc>,
) -> Result<usize, AppError> {
    let expired = ExtractionJob::fail_expired_leases(now, db).await?;
    for job in &expired {
        warn!(job_id = %job.id, book_id = %job.book_id, "extraction lease expired");
        if let Err(err) = Book::set_status(&job.book_id, ProcessingStatus::Failed, db).await {
            warn!(book_id = %job.book_id, error = %err, "could not mark book failed");
        }
    }
    Ok(expired.len())
}

fn job_cutoff(job_retention: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(job_retention)
        .ok()
        .and_then(|retention| Utc::now().checked_sub_signed(retention))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
