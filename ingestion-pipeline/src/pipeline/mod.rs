mod config;
mod services;
mod state;

pub use config::{IngestionConfig, IngestionTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{DefaultPipelineServices, PipelineServices};

use std::{
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            book::{Book, ProcessingStatus},
            extraction_job::{ExtractionJob, PROGRESS_EXTRACTED, PROGRESS_RECORDED},
        },
    },
};
use state_machines::core::GuardError;
use tracing::{debug, info, warn};

use self::state::ready;

#[allow(clippy::module_name_repetitions)]
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    pipeline_config: IngestionConfig,
    services: Arc<dyn PipelineServices>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, pipeline_config: IngestionConfig) -> Self {
        Self::with_services(db, pipeline_config, Arc::new(DefaultPipelineServices))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        pipeline_config: IngestionConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Self {
        Self {
            db,
            pipeline_config,
            services,
        }
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.pipeline_config
    }

    /// Runs extraction for a job the caller has already claimed. A failure
    /// marks both the book and the job failed and is returned as
    /// `AppError::Processing`.
    #[tracing::instrument(
        skip_all,
        fields(
            job_id = %job.id,
            book_id = %job.book_id,
            worker_id = job.worker_id.as_deref().unwrap_or("unknown-worker"),
            user_id = %job.user_id
        )
    )]
    pub async fn process_job(&self, job: ExtractionJob) -> Result<(), AppError> {
        match self.drive_pipeline(&job).await.map_err(|err| {
            debug!(job_id = %job.id, error = %err, "extraction pipeline failed");
            err
        }) {
            Ok(()) => {
                job.mark_completed(&self.db).await?;
                info!(job_id = %job.id, book_id = %job.book_id, "extraction job completed");
                Ok(())
            }
            Err(err) => {
                let reason = err.to_string();
                if let Err(status_err) =
                    Book::set_status(&job.book_id, ProcessingStatus::Failed, &self.db).await
                {
                    warn!(
                        book_id = %job.book_id,
                        error = %status_err,
                        "could not mark book failed"
                    );
                }
                job.mark_failed(&reason, &self.db).await?;
                warn!(job_id = %job.id, book_id = %job.book_id, %reason, "extraction job failed");

                Err(AppError::Processing(reason))
            }
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    async fn drive_pipeline(&self, job: &ExtractionJob) -> Result<(), AppError> {
        let machine = ready();
        let pipeline_started = Instant::now();

        let stage_start = Instant::now();
        let metadata = self
            .services
            .extract_metadata(Path::new(&job.file_path))
            .await
            .map_err(|err| AppError::Processing(format!("Metadata extraction failed: {err}")))?;
        let machine = machine
            .extract()
            .map_err(|(_, guard)| map_guard_error("extract", &guard))?;
        job.record_progress(PROGRESS_EXTRACTED, &self.db).await?;
        let extract_duration = stage_start.elapsed();

        let stage_start = Instant::now();
        let title = metadata.resolve_title(job.title_override.as_deref(), &job.file_name);
        let author = metadata.resolve_author(job.author_override.as_deref());
        let total_pages = metadata.total_pages;
        let degraded_fields = metadata.extraction_errors.len();
        Book::apply_extraction(&job.book_id, title, author, metadata, &self.db).await?;
        let _machine = machine
            .record()
            .map_err(|(_, guard)| map_guard_error("record", &guard))?;
        job.record_progress(PROGRESS_RECORDED, &self.db).await?;
        let record_duration = stage_start.elapsed();

        info!(
            job_id = %job.id,
            book_id = %job.book_id,
            total_pages,
            degraded_fields,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            extract_ms = Self::duration_millis(extract_duration),
            record_ms = Self::duration_millis(record_duration),
            "extraction pipeline finished"
        );

        Ok(())
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid extraction pipeline transition during {event}: {guard:?}"
    ))
}
