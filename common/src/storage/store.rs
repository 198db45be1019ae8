use std::io::{BufReader, ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::types::stored_file::{
    human_readable_size, FileDescription, FileError, StoredFile, StoredUpload,
};
use crate::utils::config::AppConfig;

const HASH_CHUNK_BYTES: usize = 8192;
const STORED_EXTENSION: &str = "pdf";
const STAGING_PREFIX: &str = "upload-";
const STAGING_EXTENSION: &str = "tmp";
const MAX_NAMESPACE_LEN: usize = 128;

/// Content-addressed file store rooted at a single directory.
///
/// Files live at `<root>/<user_id>/<sha256>.pdf`. Identical content uploaded
/// twice by the same user resolves to the same path; the user id is the only
/// client-controlled path segment and is validated before use.
#[derive(Clone, Debug)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub async fn new(cfg: &AppConfig) -> Result<Self, FileError> {
        let root = resolve_base_dir(cfg);
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "content store ready");
        Ok(Self { root })
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn user_dir(&self, user_id: &str) -> Result<PathBuf, FileError> {
        validate_namespace(user_id)?;
        Ok(self.root.join(user_id))
    }

    pub fn content_path(&self, user_id: &str, sha256: &str) -> Result<PathBuf, FileError> {
        Ok(self
            .user_dir(user_id)?
            .join(format!("{sha256}.{STORED_EXTENSION}")))
    }

    async fn ensure_user_dir(&self, user_id: &str) -> Result<PathBuf, FileError> {
        let dir = self.user_dir(user_id)?;
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Moves a received upload into the user's namespace under a unique
    /// staging name, so that the later placement is a same-filesystem move.
    pub async fn stage_upload(
        &self,
        user_id: &str,
        upload: NamedTempFile,
    ) -> Result<PathBuf, FileError> {
        let dir = self.ensure_user_dir(user_id).await?;
        let staged = dir.join(format!(
            "{STAGING_PREFIX}{}.{STAGING_EXTENSION}",
            Uuid::new_v4()
        ));

        if let Err(err) = upload.persist(&staged) {
            debug!(error = %err.error, "persist failed, copying upload into staging instead");
            let source = err.file;
            fs::copy(source.path(), &staged).await?;
        }

        Ok(staged)
    }

    /// Places a validated temp file at its content address.
    ///
    /// # Arguments
    /// * `temp_path` - staged file, consumed on success
    /// * `user_id` - owning namespace
    /// * `original_filename` - client file name, kept only as data
    ///
    /// # Returns
    /// * `StoredUpload` with `deduplicated` set when the content was already present
    #[tracing::instrument(skip_all, fields(user_id = %user_id))]
    pub async fn store(
        &self,
        temp_path: &Path,
        user_id: &str,
        original_filename: &str,
    ) -> Result<StoredUpload, FileError> {
        let dir = self.ensure_user_dir(user_id).await?;
        let size_bytes = match fs::metadata(temp_path).await {
            Ok(metadata) => metadata.len(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(FileError::FileNotFound(temp_path.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let sha256 = hash_file(temp_path).await?;
        let target = dir.join(format!("{sha256}.{STORED_EXTENSION}"));

        let deduplicated = if fs::try_exists(&target).await? {
            remove_quietly(temp_path).await;
            true
        } else {
            place_atomically(temp_path, &target).await?
        };

        if deduplicated {
            info!(%sha256, path = %target.display(), "content already stored, reusing existing file");
        } else {
            info!(%sha256, path = %target.display(), size_bytes, "stored new content");
        }

        Ok(StoredUpload {
            file: StoredFile {
                sha256,
                path: target.to_string_lossy().into_owned(),
                user_id: user_id.to_string(),
                size_bytes,
            },
            original_filename: original_filename.to_string(),
            deduplicated,
        })
    }

    /// Best-effort removal of a temp file. Never fails.
    pub async fn discard(&self, path: &Path) {
        remove_quietly(path).await;
    }

    /// Removes a stored file. Returns `false` when it was already gone.
    pub async fn remove(&self, path: &Path) -> Result<bool, FileError> {
        let path = self.contained(path)?;
        match fs::remove_file(path).await {
            Ok(()) => {
                info!(path = %path.display(), "removed stored file");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn describe(&self, path: &Path) -> Result<FileDescription, FileError> {
        let path = self.contained(path)?;
        let metadata = match fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(FileError::FileNotFound(path.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };
        let sha256 = hash_file(path).await?;

        Ok(FileDescription {
            path: path.to_string_lossy().into_owned(),
            sha256,
            size_bytes: metadata.len(),
            size_human: human_readable_size(metadata.len()),
            modified_at: metadata.modified().ok().map(DateTime::<Utc>::from),
        })
    }

    /// Deletes staging files older than `retention` across all namespaces.
    /// Stored content is never touched.
    pub async fn cleanup_stale_temp(&self, retention: Duration) -> Result<usize, FileError> {
        let cutoff = staging_cutoff(retention);
        let mut removed: usize = 0;

        let mut namespaces = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        while let Some(namespace) = namespaces.next_entry().await? {
            if !namespace.file_type().await?.is_dir() {
                continue;
            }
            removed = removed.saturating_add(remove_stale_staging(&namespace.path(), cutoff).await?);
        }

        if removed > 0 {
            info!(removed, "removed stale staging files");
        }
        Ok(removed)
    }

    /// Same as [`ContentStore::cleanup_stale_temp`], limited to one user's
    /// namespace.
    pub async fn cleanup_stale_temp_for(
        &self,
        user_id: &str,
        retention: Duration,
    ) -> Result<usize, FileError> {
        let dir = self.user_dir(user_id)?;
        let removed = remove_stale_staging(&dir, staging_cutoff(retention)).await?;
        if removed > 0 {
            info!(%user_id, removed, "removed stale staging files");
        }
        Ok(removed)
    }

    fn contained<'a>(&self, path: &'a Path) -> Result<&'a Path, FileError> {
        let escapes = path
            .components()
            .any(|component| matches!(component, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(FileError::OutsideRoot(path.display().to_string()));
        }
        Ok(path)
    }
}

fn staging_cutoff(retention: Duration) -> SystemTime {
    SystemTime::now()
        .checked_sub(retention)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

async fn remove_stale_staging(dir: &Path, cutoff: SystemTime) -> Result<usize, FileError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut removed: usize = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !is_staging_file(&path) {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if modified > cutoff {
            continue;
        }
        match fs::remove_file(&path).await {
            Ok(()) => removed = removed.saturating_add(1),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to remove stale staging file");
            }
        }
    }
    Ok(removed)
}

/// Hard-links the temp file into place so an existing target is never
/// overwritten; an `AlreadyExists` race means another writer stored the same
/// content first. Falls back to rename where links are unsupported.
async fn place_atomically(temp_path: &Path, target: &Path) -> Result<bool, FileError> {
    match fs::hard_link(temp_path, target).await {
        Ok(()) => {
            remove_quietly(temp_path).await;
            Ok(false)
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            remove_quietly(temp_path).await;
            Ok(true)
        }
        Err(err) => {
            debug!(error = %err, "hard link unavailable, falling back to rename");
            fs::rename(temp_path, target).await.map_err(|rename_err| {
                FileError::PersistError(format!(
                    "could not move {} into place: {rename_err}",
                    temp_path.display()
                ))
            })?;
            Ok(false)
        }
    }
}

async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed temp file"),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove temp file"),
    }
}

fn is_staging_file(path: &Path) -> bool {
    let has_prefix = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(STAGING_PREFIX));
    has_prefix && path.extension().and_then(|ext| ext.to_str()) == Some(STAGING_EXTENSION)
}

/// SHA-256 of a file as lowercase hex, read in fixed-size chunks.
pub async fn hash_file(path: &Path) -> Result<String, FileError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<String, FileError> {
        let file = std::fs::File::open(&path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; HASH_CHUNK_BYTES];

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    })
    .await?
}

/// User ids become directory names, so only `[A-Za-z0-9_-]` is accepted.
pub fn validate_namespace(user_id: &str) -> Result<(), FileError> {
    let valid = !user_id.is_empty()
        && user_id.len() <= MAX_NAMESPACE_LEN
        && user_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(FileError::InvalidNamespace(user_id.to_string()))
    }
}

/// Resolve the absolute base directory used for local storage from config.
///
/// If `data_dir` is relative, it is resolved against the current working directory.
pub fn resolve_base_dir(cfg: &AppConfig) -> PathBuf {
    if cfg.data_dir.starts_with('/') {
        PathBuf::from(&cfg.data_dir)
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(&cfg.data_dir)
    }
}
