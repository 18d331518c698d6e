//! Query limits and the command-line argument groups shared by the binaries.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::corpus::CorpusPaths;
use crate::embedder::hashing::HashingEncoder;
use crate::embedder::openai::{OpenAiEncoder, OpenAiSettings};
use crate::embedder::Encoder;

/// Bounds applied to the number of results a search may return.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueryControls {
    default_top_k: usize,
    max_top_k: usize,
}

impl QueryControls {
    /// Builds controls; the maximum is at least 1 and the default never exceeds it.
    pub fn new(default_top_k: usize, max_top_k: usize) -> Self {
        let max_top_k = max_top_k.max(1);
        Self {
            default_top_k: default_top_k.clamp(1, max_top_k),
            max_top_k,
        }
    }

    /// Count used when a caller does not ask for one.
    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Upper bound on any request.
    pub fn max_top_k(&self) -> usize {
        self.max_top_k
    }

    /// Library-level policy: non-positive counts mean "nothing", large counts
    /// are clamped to the maximum.
    pub fn effective_top_k(&self, requested: i64) -> usize {
        if requested <= 0 {
            return 0;
        }
        usize::try_from(requested).map_or(self.max_top_k, |k| k.min(self.max_top_k))
    }

    /// End-user policy: a missing or non-positive count falls back to the default.
    pub fn user_top_k(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(k) if k >= 1 => k,
            _ => self.default_top_k as i64,
        }
    }
}

impl Default for QueryControls {
    fn default() -> Self {
        Self::new(5, 50)
    }
}

/// Result-count flags.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Results returned when a request omits top_k or sends a value below 1
    #[arg(long, env = "JOBMATCH_DEFAULT_TOP_K", default_value_t = 5)]
    pub default_top_k: usize,

    /// Maximum results returned per request
    #[arg(long, env = "JOBMATCH_MAX_TOP_K", default_value_t = 50)]
    pub max_top_k: usize,
}

impl QueryArgs {
    /// Converts the parsed flags into `QueryControls`.
    pub fn controls(&self) -> QueryControls {
        QueryControls::new(self.default_top_k, self.max_top_k)
    }
}

/// Corpus source flags.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// JSON Lines file of job postings, one per corpus row
    #[arg(long, env = "JOBMATCH_RECORDS", default_value = "data/jobs.jsonl")]
    pub records: PathBuf,

    /// Embedding matrix aligned with the records (binary or JSON Lines)
    #[arg(
        long,
        env = "JOBMATCH_EMBEDDINGS",
        default_value = "data/job_embeddings.bin"
    )]
    pub embeddings: PathBuf,
}

impl CorpusArgs {
    /// Bundles the two paths.
    pub fn paths(&self) -> CorpusPaths {
        CorpusPaths::new(self.records.clone(), self.embeddings.clone())
    }
}

/// Encoder backends selectable from the command line.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum EncoderKind {
    /// OpenAI-compatible embeddings endpoint.
    Openai,
    /// Offline feature-hashing encoder.
    Hashing,
}

/// Encoder flags.
#[derive(Args, Debug, Clone)]
pub struct EncoderArgs {
    /// Encoder backend
    #[arg(long, env = "JOBMATCH_ENCODER", value_enum, default_value = "openai")]
    pub encoder: EncoderKind,

    /// OpenAI API key used for embeddings
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Embedding model identifier
    #[arg(
        long,
        env = "JOBMATCH_OPENAI_MODEL",
        default_value = "text-embedding-3-small"
    )]
    pub openai_model: String,

    /// Base URL for OpenAI-compatible endpoints
    #[arg(
        long,
        env = "JOBMATCH_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    pub openai_base_url: String,

    /// Embedding width; must match the corpus
    #[arg(long, env = "JOBMATCH_DIMENSIONS", default_value_t = 384)]
    pub dimensions: usize,

    /// Seconds before embedding requests time out
    #[arg(long, env = "JOBMATCH_OPENAI_TIMEOUT_SECS", default_value_t = 30)]
    pub openai_timeout_secs: u64,

    /// Attempts for transient embedding errors
    #[arg(long, env = "JOBMATCH_OPENAI_MAX_RETRIES", default_value_t = 5)]
    pub max_retries: usize,

    /// Max inputs per embedding request
    #[arg(long, env = "JOBMATCH_OPENAI_BATCH", default_value_t = 32)]
    pub batch_size: usize,
}

impl EncoderArgs {
    /// Builds the selected encoder.
    pub fn build(&self) -> Result<Arc<dyn Encoder>> {
        match self.encoder {
            EncoderKind::Hashing => Ok(Arc::new(HashingEncoder::new(self.dimensions))),
            EncoderKind::Openai => {
                let api_key = self.openai_api_key.clone().ok_or_else(|| {
                    anyhow::anyhow!("--openai-api-key (or OPENAI_API_KEY) is required for the openai encoder")
                })?;
                let encoder = OpenAiEncoder::new(OpenAiSettings {
                    api_key,
                    base_url: self.openai_base_url.clone(),
                    model: self.openai_model.clone(),
                    dimensions: self.dimensions,
                    timeout: Duration::from_secs(self.openai_timeout_secs.max(1)),
                    max_retries: self.max_retries,
                    batch_size: self.batch_size,
                })?;
                Ok(Arc::new(encoder))
            }
        }
    }
}
