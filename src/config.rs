use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::search::{DEFAULT_LIMIT, DEFAULT_MIN_SIMILARITY};

const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_DIMENSIONS: usize = 1536;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_CHUNK_MAX_LEN: usize = 1000;
const DEFAULT_CHUNK_OVERLAP: usize = 200;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Chat model used by the relevance filter
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Vector dimension the embedding model produces
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Bounded retries for transient provider failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum similarity hits per query
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum cosine similarity for a hit to qualify
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queue poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Maximum queue entries handled per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    #[serde(default = "default_chunk_max_len")]
    pub max_len: usize,

    /// Overlap between consecutive chunks in characters
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            dimensions: default_dimensions(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            api_key_env: default_api_key_env(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            min_similarity: default_min_similarity(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_len: default_chunk_max_len(),
            overlap: default_chunk_overlap(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            database: DatabaseConfig::default(),
            provider: ProviderConfig::default(),
            search: SearchConfig::default(),
            worker: WorkerConfig::default(),
            chunking: ChunkingConfig::default(),
        }
    }
}

fn default_db_path() -> String {
    "talentsearch.db".to_string()
}
fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}
fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}
fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}
fn default_dimensions() -> usize {
    DEFAULT_DIMENSIONS
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}
fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}
fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}
fn default_limit() -> usize {
    DEFAULT_LIMIT
}
fn default_min_similarity() -> f64 {
    DEFAULT_MIN_SIMILARITY
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
fn default_chunk_max_len() -> usize {
    DEFAULT_CHUNK_MAX_LEN
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

impl Config {
    fn validate(&self) {
        if self.provider.dimensions == 0 {
            panic!("provider.dimensions must be greater than 0");
        }
        if self.provider.timeout_secs == 0 {
            panic!("provider.timeout_secs must be greater than 0");
        }
        if self.search.limit == 0 {
            panic!("search.limit must be greater than 0");
        }
        if !(-1.0..=1.0).contains(&self.search.min_similarity) {
            panic!(
                "search.min_similarity must be between -1.0 and 1.0, got {}",
                self.search.min_similarity
            );
        }
        if self.worker.poll_interval_secs == 0 {
            panic!("worker.poll_interval_secs must be greater than 0");
        }
        if self.worker.batch_size == 0 {
            panic!("worker.batch_size must be greater than 0");
        }
        if self.chunking.overlap >= self.chunking.max_len {
            panic!(
                "chunking.overlap ({}) must be smaller than chunking.max_len ({})",
                self.chunking.overlap, self.chunking.max_len
            );
        }
    }

    /// Load the config from `path`, writing a default file if none
    /// exists yet.
    pub fn load_with(path: &str) -> Self {
        if !Path::new(path).exists() {
            std::fs::write(
                path,
                serde_yml::to_string(&Self::default())
                    .expect("default config serializes")
                    .as_bytes(),
            )
            .expect("could not write default config");
        }

        let config_str = std::fs::read_to_string(path).expect("could not read config file");
        let config: Self = serde_yml::from_str(&config_str).expect("config is malformed");
        config.validate();
        config
    }

    /// Resolve the provider API key from the configured environment
    /// variable.
    pub fn api_key(&self) -> anyhow::Result<String> {
        std::env::var(&self.provider.api_key_env).map_err(|_| {
            anyhow::anyhow!(
                "environment variable {} is not set",
                self.provider.api_key_env
            )
        })
    }
}
