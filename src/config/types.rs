use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Catalog-Ingest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
    pub input: InputConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Remote record API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Static API key sent as the `api_key` query parameter
    #[serde(rename = "api-key")]
    pub api_key: String,

    /// Base URL of the API; records live at `{base-url}/movie/{id}`
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_language")]
    pub language: String,

    /// Sub-resources requested alongside each record
    #[serde(rename = "append-to-response", default = "default_append")]
    pub append_to_response: String,

    #[serde(rename = "include-video-language", default = "default_video_language")]
    pub include_video_language: String,

    #[serde(rename = "include-image-language", default = "default_image_language")]
    pub include_image_language: String,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Table holding one document per record id
    pub collection: String,

    /// How long a store waits on a locked database (milliseconds)
    #[serde(rename = "busy-timeout-ms", default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

/// Input dataset configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    /// Newline-delimited JSON export of record ids
    pub path: String,

    /// Number of eligible records to skip before dispatching
    #[serde(default)]
    pub offset: usize,

    /// Maximum number of records to dispatch (0 = unlimited)
    #[serde(default)]
    pub limit: usize,
}

/// Worker pool and throttling configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of records in flight
    #[serde(rename = "pool-size")]
    pub pool_size: u32,

    /// Requests allowed per batch interval (token bucket capacity)
    #[serde(rename = "batch-size")]
    pub batch_size: u32,

    /// Length of one batch interval (milliseconds)
    #[serde(rename = "batch-delay-ms")]
    pub batch_delay_ms: u64,

    /// Emit a progress summary every N dispatched records
    #[serde(rename = "progress-interval")]
    pub progress_interval: u64,

    /// Initial cooldown after a rate-limit response (milliseconds)
    #[serde(rename = "cooldown-ms")]
    pub cooldown_ms: u64,

    /// Upper bound for the escalating cooldown (milliseconds)
    #[serde(rename = "max-cooldown-ms")]
    pub max_cooldown_ms: u64,

    /// Write the report every N completed records (0 = only at the end)
    #[serde(rename = "checkpoint-every")]
    pub checkpoint_every: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path of the JSON run report
    #[serde(rename = "report-path")]
    pub report_path: String,
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl PipelineConfig {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn max_cooldown(&self) -> Duration {
        Duration::from_millis(self.max_cooldown_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pool_size: 40,
            batch_size: 40,
            batch_delay_ms: 1000,
            progress_interval: 40,
            cooldown_ms: 1000,
            max_cooldown_ms: 60_000,
            checkpoint_every: 200,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            report_path: "dump-state.json".to_string(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_language() -> String {
    "es-MX,es,en".to_string()
}

fn default_append() -> String {
    "videos,images,credits,keywords".to_string()
}

fn default_video_language() -> String {
    "es-MX,en-US".to_string()
}

fn default_image_language() -> String {
    "es-MX,en-US,null".to_string()
}

fn default_busy_timeout() -> u64 {
    10_000
}
