//! Runtime configuration from environment variables.

use orgsync_client::source::MAX_PAGE_SIZE;
use std::path::PathBuf;
use std::time::Duration;

/// Settings for one `orgsync` invocation.
#[derive(Clone)]
pub struct Config {
    pub dataspot_base_url: String,
    pub dataspot_database: String,
    /// Scheme holding the organisation units.
    pub dataspot_scheme: String,
    /// Short scheme name used in the mapping file name.
    pub dataspot_scheme_short: String,
    pub dataspot_token: String,
    pub ods_base_url: String,
    pub ods_dataset_id: String,
    pub ods_page_size: usize,
    pub mapping_dir: PathBuf,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Default log filter, overridden by `RUST_LOG`.
    pub log_filter: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dataspot_base_url", &self.dataspot_base_url)
            .field("dataspot_database", &self.dataspot_database)
            .field("dataspot_scheme", &self.dataspot_scheme)
            .field("dataspot_scheme_short", &self.dataspot_scheme_short)
            .field("dataspot_token", &"[REDACTED]")
            .field("ods_base_url", &self.ods_base_url)
            .field("ods_dataset_id", &self.ods_dataset_id)
            .field("ods_page_size", &self.ods_page_size)
            .field("mapping_dir", &self.mapping_dir)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_reader(|key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    pub fn from_reader<F>(reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let var = |key: &str, default: &str| reader(key).unwrap_or_else(|_| default.to_string());

        let dataspot_token = reader("DATASPOT_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("DATASPOT_TOKEN".into()))?;

        let ods_page_size = var("ODS_PAGE_SIZE", "100")
            .parse::<usize>()
            .map_err(|e| ConfigError::InvalidValue("ODS_PAGE_SIZE".into(), e.to_string()))?;
        if !(1..=MAX_PAGE_SIZE).contains(&ods_page_size) {
            return Err(ConfigError::InvalidValue(
                "ODS_PAGE_SIZE".into(),
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }

        let timeout_secs = var("ORGSYNC_TIMEOUT_SECS", "30")
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue("ORGSYNC_TIMEOUT_SECS".into(), e.to_string()))?;

        let max_retries = var("ORGSYNC_MAX_RETRIES", "3")
            .parse::<u32>()
            .map_err(|e| ConfigError::InvalidValue("ORGSYNC_MAX_RETRIES".into(), e.to_string()))?;

        Ok(Self {
            dataspot_base_url: var("DATASPOT_BASE_URL", "https://bs.dataspot.io"),
            dataspot_database: var("DATASPOT_DATABASE", "prod"),
            dataspot_scheme: var("DATASPOT_SCHEME", "Datennutzungskatalog"),
            dataspot_scheme_short: var("DATASPOT_SCHEME_SHORT", "DNK"),
            dataspot_token,
            ods_base_url: var("ODS_BASE_URL", "https://data.bs.ch"),
            ods_dataset_id: var("ODS_DATASET_ID", "100349"),
            ods_page_size,
            mapping_dir: PathBuf::from(var("ORGSYNC_MAPPING_DIR", ".")),
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
            log_filter: var("ORGSYNC_LOG", "info"),
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
