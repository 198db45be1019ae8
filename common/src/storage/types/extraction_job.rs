use chrono::{DateTime as ChronoDateTime, Utc as ChronoUtc};
use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

pub const PROGRESS_QUEUED: u8 = 0;
pub const PROGRESS_STARTED: u8 = 10;
pub const PROGRESS_EXTRACTED: u8 = 30;
pub const PROGRESS_RECORDED: u8 = 80;
pub const PROGRESS_DONE: u8 = 100;

/// How long a running job may go without a progress update before its
/// worker is presumed dead.
pub const DEFAULT_LEASE_SECS: i64 = 600;
const LEASE_EXPIRED_MESSAGE: &str = "Extraction worker stopped before finishing";

fn default_lease_secs() -> i64 {
    DEFAULT_LEASE_SECS
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    #[default]
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Coarse status reported to clients polling a job.
    pub fn status_label(&self) -> &'static str {
        match self {
            JobState::Queued | JobState::Running => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum JobTransition {
    Start,
    Complete,
    Fail,
    Requeue,
}

impl JobTransition {
    fn as_str(self) -> &'static str {
        match self {
            JobTransition::Start => "start",
            JobTransition::Complete => "complete",
            JobTransition::Fail => "fail",
            JobTransition::Requeue => "requeue",
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Queued,
        states: [Queued, Running, Completed, Failed],
        events {
            start {
                transition: { from: Queued, to: Running }
            }
            complete {
                transition: { from: Running, to: Completed }
            }
            fail {
                transition: { from: Running, to: Failed }
            }
            requeue {
                transition: { from: Completed, to: Queued }
                transition: { from: Failed, to: Queued }
            }
        }
    }

    pub(super) fn queued() -> JobLifecycleMachine<(), Queued> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn running() -> JobLifecycleMachine<(), Running> {
        queued()
            .start()
            .expect("start transition from Queued should exist")
    }

    pub(super) fn completed() -> JobLifecycleMachine<(), Completed> {
        running()
            .complete()
            .expect("complete transition from Running should exist")
    }

    pub(super) fn failed() -> JobLifecycleMachine<(), Failed> {
        running()
            .fail()
            .expect("fail transition from Running should exist")
    }
}

fn finished_states() -> Vec<&'static str> {
    vec![JobState::Completed.as_str(), JobState::Failed.as_str()]
}

fn invalid_transition(state: JobState, event: JobTransition) -> AppError {
    AppError::Validation(format!(
        "Invalid job transition: {} -> {}",
        state.as_str(),
        event.as_str()
    ))
}

fn compute_next_state(state: JobState, event: JobTransition) -> Result<JobState, AppError> {
    use lifecycle::*;
    match (state, event) {
        (JobState::Queued, JobTransition::Start) => queued()
            .start()
            .map(|_| JobState::Running)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Running, JobTransition::Complete) => running()
            .complete()
            .map(|_| JobState::Completed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Running, JobTransition::Fail) => running()
            .fail()
            .map(|_| JobState::Failed)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Completed, JobTransition::Requeue) => completed()
            .requeue()
            .map(|_| JobState::Queued)
            .map_err(|_| invalid_transition(state, event)),
        (JobState::Failed, JobTransition::Requeue) => failed()
            .requeue()
            .map(|_| JobState::Queued)
            .map_err(|_| invalid_transition(state, event)),
        _ => Err(invalid_transition(state, event)),
    }
}

stored_object!(ExtractionJob, "extraction_job", {
    book_id: String,
    user_id: String,
    file_path: String,
    file_name: String,
    title_override: Option<String>,
    author_override: Option<String>,
    state: JobState,
    progress: u8,
    worker_id: Option<String>,
    #[serde(default = "default_lease_secs")]
    lease_duration_secs: i64,
    error_message: Option<String>,
    #[serde(with = "crate::storage::types::surreal_serde::option_datetime", default)]
    started_at: Option<ChronoDateTime<ChronoUtc>>,
    #[serde(with = "crate::storage::types::surreal_serde::option_datetime", default)]
    completed_at: Option<ChronoDateTime<ChronoUtc>>
});

/// What a caller needs to enqueue extraction for a freshly stored book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExtractionJob {
    pub book_id: String,
    pub user_id: String,
    pub file_path: String,
    pub file_name: String,
    pub title_override: Option<String>,
    pub author_override: Option<String>,
}

impl ExtractionJob {
    pub fn new(request: NewExtractionJob) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            book_id: request.book_id,
            user_id: request.user_id,
            file_path: request.file_path,
            file_name: request.file_name,
            title_override: request.title_override,
            author_override: request.author_override,
            state: JobState::Queued,
            progress: PROGRESS_QUEUED,
            worker_id: None,
            lease_duration_secs: DEFAULT_LEASE_SECS,
            error_message: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// A running job whose last update is older than its lease has lost its
    /// worker.
    pub fn lease_expired(&self, now: ChronoDateTime<ChronoUtc>) -> bool {
        self.state == JobState::Running
            && now.signed_duration_since(self.updated_at).num_seconds() >= self.lease_duration_secs
    }

    pub async fn create_and_add_to_db(
        request: NewExtractionJob,
        db: &SurrealDbClient,
    ) -> Result<ExtractionJob, AppError> {
        let job = Self::new(request);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    pub async fn get_for_user(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<ExtractionJob, AppError> {
        match db.get_item::<ExtractionJob>(id).await? {
            Some(job) if job.user_id == user_id => Ok(job),
            _ => Err(AppError::NotFound(format!("Job {id} not found"))),
        }
    }

    pub async fn latest_for_book(
        book_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<ExtractionJob>, AppError> {
        let mut result = db
            .client
            .query(
                "SELECT * FROM type::table($table) WHERE book_id = $book_id ORDER BY created_at DESC LIMIT 1",
            )
            .bind(("table", Self::table_name()))
            .bind(("book_id", book_id.to_string()))
            .await?;

        let job: Option<ExtractionJob> = result.take(0)?;
        Ok(job)
    }

    /// Atomically moves the oldest queued job to running and hands it to
    /// `worker_id`. Each job is claimed at most once per queueing.
    pub async fn claim_next_queued(
        db: &SurrealDbClient,
        worker_id: &str,
        now: ChronoDateTime<ChronoUtc>,
    ) -> Result<Option<ExtractionJob>, AppError> {
        debug_assert!(compute_next_state(JobState::Queued, JobTransition::Start).is_ok());

        const CLAIM_QUERY: &str = r#"
            UPDATE (
                SELECT * FROM type::table($table)
                WHERE state = $queued
                ORDER BY created_at ASC
                LIMIT 1
            )
            SET state = $running,
                worker_id = $worker_id,
                progress = $progress,
                started_at = $now,
                updated_at = $now
            WHERE state = $queued
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("queued", JobState::Queued.as_str()))
            .bind(("running", JobState::Running.as_str()))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("progress", PROGRESS_STARTED))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let job: Option<ExtractionJob> = result.take(0)?;
        Ok(job)
    }

    pub async fn record_progress(
        &self,
        progress: u8,
        db: &SurrealDbClient,
    ) -> Result<ExtractionJob, AppError> {
        const PROGRESS_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET progress = $progress,
                updated_at = $now
            WHERE state = $running AND worker_id = $worker_id
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(PROGRESS_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("progress", progress.min(PROGRESS_DONE)))
            .bind(("running", JobState::Running.as_str()))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<ExtractionJob> = result.take(0)?;
        updated.ok_or_else(|| {
            AppError::Validation(format!(
                "Job {} is no longer running on this worker",
                self.id
            ))
        })
    }

    pub async fn mark_completed(&self, db: &SurrealDbClient) -> Result<ExtractionJob, AppError> {
        let next = compute_next_state(self.state, JobTransition::Complete)?;
        debug_assert_eq!(next, JobState::Completed);

        const COMPLETE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $completed,
                progress = $progress,
                error_message = NONE,
                completed_at = $now,
                updated_at = $now
            WHERE state = $running AND worker_id = $worker_id
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(COMPLETE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("completed", JobState::Completed.as_str()))
            .bind(("running", JobState::Running.as_str()))
            .bind(("progress", PROGRESS_DONE))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<ExtractionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Complete))
    }

    pub async fn mark_failed(
        &self,
        message: &str,
        db: &SurrealDbClient,
    ) -> Result<ExtractionJob, AppError> {
        let next = compute_next_state(self.state, JobTransition::Fail)?;
        debug_assert_eq!(next, JobState::Failed);

        const FAIL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $failed,
                error_message = $error_message,
                completed_at = $now,
                updated_at = $now
            WHERE state = $running AND worker_id = $worker_id
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(FAIL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("running", JobState::Running.as_str()))
            .bind(("error_message", message.to_string()))
            .bind(("worker_id", self.worker_id.clone().unwrap_or_default()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<ExtractionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Fail))
    }

    /// Puts a finished job back in the queue so a worker extracts it again.
    pub async fn requeue(&self, db: &SurrealDbClient) -> Result<ExtractionJob, AppError> {
        let next = compute_next_state(self.state, JobTransition::Requeue)?;
        debug_assert_eq!(next, JobState::Queued);

        const REQUEUE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $queued,
                progress = $progress,
                worker_id = NONE,
                error_message = NONE,
                started_at = NONE,
                completed_at = NONE,
                updated_at = $now
            WHERE state IN $finished
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(REQUEUE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("queued", JobState::Queued.as_str()))
            .bind(("progress", PROGRESS_QUEUED))
            .bind(("finished", finished_states()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<ExtractionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Requeue))
    }

    /// Fails every running job whose lease ran out at `now` and returns the
    /// failed jobs.
    pub async fn fail_expired_leases(
        now: ChronoDateTime<ChronoUtc>,
        db: &SurrealDbClient,
    ) -> Result<Vec<ExtractionJob>, AppError> {
        debug_assert!(compute_next_state(JobState::Running, JobTransition::Fail).is_ok());

        const EXPIRE_QUERY: &str = r#"
            UPDATE type::table($table)
            SET state = $failed,
                error_message = $error_message,
                completed_at = $now,
                updated_at = $now
            WHERE state = $running
                AND time::unix($now) - time::unix(updated_at) >= lease_duration_secs
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(EXPIRE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("running", JobState::Running.as_str()))
            .bind(("error_message", LEASE_EXPIRED_MESSAGE))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let expired: Vec<ExtractionJob> = result.take(0)?;
        Ok(expired)
    }

    /// Fails this job if its lease ran out at `now`, so it can be requeued.
    pub async fn expire_lease(
        &self,
        now: ChronoDateTime<ChronoUtc>,
        db: &SurrealDbClient,
    ) -> Result<ExtractionJob, AppError> {
        compute_next_state(self.state, JobTransition::Fail)?;
        if !self.lease_expired(now) {
            return Err(AppError::Validation(format!(
                "Job {} is still {}",
                self.id,
                self.state.as_str()
            )));
        }

        const EXPIRE_ONE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET state = $failed,
                error_message = $error_message,
                completed_at = $now,
                updated_at = $now
            WHERE state = $running
                AND time::unix($now) - time::unix(updated_at) >= lease_duration_secs
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(EXPIRE_ONE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("failed", JobState::Failed.as_str()))
            .bind(("running", JobState::Running.as_str()))
            .bind(("error_message", LEASE_EXPIRED_MESSAGE))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let updated: Option<ExtractionJob> = result.take(0)?;
        updated.ok_or_else(|| invalid_transition(self.state, JobTransition::Fail))
    }

    /// Removes finished jobs whose last update is older than `cutoff`.
    pub async fn delete_finished_before(
        cutoff: ChronoDateTime<ChronoUtc>,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let mut result = db
            .client
            .query(
                "DELETE type::table($table) WHERE state IN $finished AND updated_at < $cutoff RETURN BEFORE",
            )
            .bind(("table", Self::table_name()))
            .bind(("finished", finished_states()))
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .await?;

        let removed: Vec<ExtractionJob> = result.take(0)?;
        Ok(removed.len())
    }

    pub async fn delete_finished_before_for_user(
        cutoff: ChronoDateTime<ChronoUtc>,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let mut result = db
            .client
            .query(
                "DELETE type::table($table) WHERE user_id = $user_id AND state IN $finished AND updated_at < $cutoff RETURN BEFORE",
            )
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("finished", finished_states()))
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .await?;

        let removed: Vec<ExtractionJob> = result.take(0)?;
        Ok(removed.len())
    }

    pub async fn delete_for_book(book_id: &str, db: &SurrealDbClient) -> Result<(), AppError> {
        db.client
            .query("DELETE type::table($table) WHERE book_id = $book_id")
            .bind(("table", Self::table_name()))
            .bind(("book_id", book_id.to_string()))
            .await?;
        Ok(())
    }
}
