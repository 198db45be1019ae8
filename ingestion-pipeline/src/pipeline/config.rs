use common::utils::config::AppConfig;

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub idle_backoff_ms: u64,
    pub claim_error_backoff_ms: u64,
    pub cleanup_interval_secs: u64,
    pub temp_retention_secs: u64,
    pub job_retention_secs: u64,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            idle_backoff_ms: 500,
            claim_error_backoff_ms: 1_000,
            cleanup_interval_secs: 60 * 60,
            temp_retention_secs: 24 * 60 * 60,
            job_retention_secs: 7 * 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            tuning: IngestionTuning::default(),
        }
    }
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: IngestionTuning {
                cleanup_interval_secs: config.cleanup_interval_secs.max(1),
                temp_retention_secs: config.temp_retention_secs,
                job_retention_secs: config.job_retention_secs,
                ..IngestionTuning::default()
            },
        }
    }
}
