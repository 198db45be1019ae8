use crate::error::AppError;

use super::types::StoredObject;
use std::ops::Deref;
use tracing::debug;
use surrealdb::{
    engine::any::{connect, Any},
    opt::auth::Root,
    Error, Surreal,
};

/// Secondary indexes as `(name, table, fields)`.
const INDEXES: &[(&str, &str, &str)] = &[
    ("idx_book_user", "book", "user_id"),
    ("idx_book_sha", "book", "sha256"),
    ("idx_book_file", "book", "user_id, file_path"),
    ("idx_job_state", "extraction_job", "state"),
    ("idx_job_user", "extraction_job", "user_id"),
    ("idx_job_book", "extraction_job", "book_id"),
    ("idx_job_created", "extraction_job", "created_at"),
];

#[derive(Clone)]
pub struct SurrealDbClient {
    pub client: Surreal<Any>,
}

impl SurrealDbClient {
    /// Connects to `address`, signs in as root and selects the namespace
    /// and database.
    pub async fn new(
        address: &str,
        username: &str,
        password: &str,
        namespace: &str,
        database: &str,
    ) -> Result<Self, Error> {
        let db = connect(address).await?;

        db.signin(Root { username, password }).await?;
        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }

    pub async fn ensure_initialized(&self) -> Result<(), AppError> {
        self.build_indexes().await?;
        debug!(indexes = INDEXES.len(), "database initialized");

        Ok(())
    }

    pub async fn build_indexes(&self) -> Result<(), Error> {
        for (name, table, fields) in INDEXES {
            self.client
                .query(format!(
                    "DEFINE INDEX IF NOT EXISTS {name} ON {table} FIELDS {fields}"
                ))
                .await?
                .check()?;
        }

        Ok(())
    }

    /// Round trip used by readiness checks.
    pub async fn ping(&self) -> Result<(), Error> {
        self.client.query("RETURN true").await?.check()?;
        Ok(())
    }

    /// Creates `item` under its own id in its table.
    pub async fn store_item<T>(&self, item: T) -> Result<Option<T>, Error>
    where
        T: StoredObject + Send + Sync + 'static,
    {
        self.client
            .create((T::table_name(), item.get_id()))
            .content(item)
            .await
    }

    /// Every record of `T`'s table.
    pub async fn get_all_stored_items<T>(&self) -> Result<Vec<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select(T::table_name()).await
    }

    pub async fn get_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.select((T::table_name(), id)).await
    }

    /// Deletes a record, returning it when it existed.
    pub async fn delete_item<T>(&self, id: &str) -> Result<Option<T>, Error>
    where
        T: for<'de> StoredObject,
    {
        self.client.delete((T::table_name(), id)).await
    }
}

impl Deref for SurrealDbClient {
    type Target = Surreal<Any>;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl SurrealDbClient {
    /// Create an in-memory SurrealDB client for testing.
    pub async fn memory(namespace: &str, database: &str) -> Result<Self, Error> {
        let db = connect("mem://").await?;

        db.use_ns(namespace).use_db(database).await?;

        Ok(SurrealDbClient { client: db })
    }
}
