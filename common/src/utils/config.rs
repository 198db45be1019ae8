use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 104_857_600;
const MULTIPART_OVERHEAD_BYTES: u64 = 1024 * 1024;

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    pub surrealdb_address: String,
    pub surrealdb_username: String,
    pub surrealdb_password: String,
    pub surrealdb_namespace: String,
    pub surrealdb_database: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    pub http_port: u16,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default = "default_page_context_lines")]
    pub page_context_lines: usize,
    #[serde(default = "default_temp_retention_secs")]
    pub temp_retention_secs: u64,
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    #[serde(default = "default_max_field_bytes")]
    pub max_field_bytes: usize,
}

fn default_data_dir() -> String {
    "./data".to_string()
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_page_context_lines() -> usize {
    2
}

fn default_temp_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_job_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_cleanup_interval_secs() -> u64 {
    60 * 60
}

fn default_max_field_bytes() -> usize {
    1024
}

impl AppConfig {
    /// Request body ceiling for uploads: the file limit plus room for the
    /// multipart framing and the text fields that travel with it.
    pub fn upload_body_limit(&self) -> usize {
        usize::try_from(self.max_upload_size.saturating_add(MULTIPART_OVERHEAD_BYTES))
            .unwrap_or(usize::MAX)
    }

    pub fn temp_retention(&self) -> Duration {
        Duration::from_secs(self.temp_retention_secs)
    }

    pub fn job_retention(&self) -> Duration {
        Duration::from_secs(self.job_retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            surrealdb_address: "mem://".to_string(),
            surrealdb_username: "root".to_string(),
            surrealdb_password: "root".to_string(),
            surrealdb_namespace: "shelf".to_string(),
            surrealdb_database: "shelf".to_string(),
            data_dir: default_data_dir(),
            http_port: 3000,
            max_upload_size: default_max_upload_size(),
            page_context_lines: default_page_context_lines(),
            temp_retention_secs: default_temp_retention_secs(),
            job_retention_secs: default_job_retention_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_field_bytes: default_max_field_bytes(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default())
        .build()?;

    config.try_deserialize()
}
