use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{extracted_metadata::ExtractedMetadata, stored_file::StoredUpload};

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    #[default]
    Processing,
    Completed,
    Failed,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
        }
    }
}

stored_object!(Book, "book", {
    user_id: String,
    title: String,
    author: String,
    file_path: String,
    file_name: String,
    sha256: String,
    file_size: u64,
    total_pages: u32,
    status: ProcessingStatus,
    #[serde(default)]
    metadata: Option<ExtractedMetadata>
});

impl Book {
    /// Builds the placeholder record for an upload that still awaits
    /// extraction. Title and author start from whatever the uploader supplied.
    pub fn new(
        user_id: &str,
        upload: &StoredUpload,
        title_override: Option<&str>,
        author_override: Option<&str>,
    ) -> Self {
        let now = Utc::now();
        let placeholder = ExtractedMetadata::default();

        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            user_id: user_id.to_string(),
            title: placeholder.resolve_title(title_override, &upload.original_filename),
            author: placeholder.resolve_author(author_override),
            file_path: upload.file.path.clone(),
            file_name: upload.original_filename.clone(),
            sha256: upload.file.sha256.clone(),
            file_size: upload.file.size_bytes,
            total_pages: 0,
            status: ProcessingStatus::Processing,
            metadata: None,
        }
    }

    pub async fn get_for_user(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Book, AppError> {
        match db.get_item::<Book>(id).await? {
            Some(book) if book.user_id == user_id => Ok(book),
            _ => Err(AppError::NotFound(format!("Book {id} not found"))),
        }
    }

    /// Stores extracted metadata and the resolved title and author, marking
    /// the book completed.
    pub async fn apply_extraction(
        id: &str,
        title: String,
        author: String,
        metadata: ExtractedMetadata,
        db: &SurrealDbClient,
    ) -> Result<Book, AppError> {
        const APPLY_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET title = $title,
                author = $author,
                total_pages = $total_pages,
                metadata = $metadata,
                status = $status,
                updated_at = $now
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(APPLY_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("title", title))
            .bind(("author", author))
            .bind(("total_pages", metadata.total_pages))
            .bind(("metadata", metadata))
            .bind(("status", ProcessingStatus::Completed.as_str()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<Book> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("Book {id} not found")))
    }

    pub async fn set_status(
        id: &str,
        status: ProcessingStatus,
        db: &SurrealDbClient,
    ) -> Result<Book, AppError> {
        let mut result = db
            .client
            .query("UPDATE type::thing($table, $id) SET status = $status, updated_at = $now RETURN AFTER")
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind(("status", status.as_str()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<Book> = result.take(0)?;
        updated.ok_or_else(|| AppError::NotFound(format!("Book {id} not found")))
    }

    /// Number of the user's books pointing at `file_path`. Deduplicated
    /// uploads share one stored file, so it may only be removed at zero.
    pub async fn count_referencing_file(
        user_id: &str,
        file_path: &str,
        db: &SurrealDbClient,
    ) -> Result<usize, AppError> {
        let mut result = db
            .client
            .query("SELECT * FROM type::table($table) WHERE user_id = $user_id AND file_path = $file_path")
            .bind(("table", Self::table_name()))
            .bind(("user_id", user_id.to_string()))
            .bind(("file_path", file_path.to_string()))
            .await?;

        let books: Vec<Book> = result.take(0)?;
        Ok(books.len())
    }

    pub async fn delete_for_user(
        id: &str,
        user_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Book, AppError> {
        let book = Self::get_for_user(id, user_id, db).await?;
        db.delete_item::<Book>(&book.id).await?;
        Ok(book)
    }
}
