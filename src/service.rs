//! Query orchestration: encode, rank against the current corpus snapshot and
//! project rows onto serialization-safe response fields.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::controls::QueryControls;
use crate::corpus::{CorpusLoadError, CorpusPaths, CorpusSlot, CorpusStore};
use crate::embedder::{EncodingError, Encoder};
use crate::ranker::{self, RankError};
use crate::records::JobRecord;

/// Per-request failures.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The encoder could not embed the query.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    /// The query vector does not fit the corpus.
    #[error(transparent)]
    Rank(#[from] RankError),
}

/// Reasons an out-of-band reload was refused.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// The service was built from in-memory data and has nothing to re-read.
    #[error("no corpus source configured for reload")]
    NotConfigured,
    /// The new snapshot failed to load; the previous one keeps serving.
    #[error(transparent)]
    Load(#[from] CorpusLoadError),
}

/// Presentable fields of a matched job. `None` serializes as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMatch {
    /// Posting headline.
    pub title: Option<String>,
    /// Hiring company.
    pub company: Option<String>,
    /// Industry sector.
    pub sector: Option<String>,
    /// Advertised salary.
    pub salary: Option<String>,
}

impl JobMatch {
    /// Projects a record, normalizing missing or numeric-garbage values to `None`.
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            title: present_field(record.title.as_deref()),
            company: present_field(record.company.as_deref()),
            sector: present_field(record.sector.as_deref()),
            salary: present_field(record.salary.as_deref()),
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResult {
    /// Corpus row.
    pub row: usize,
    /// Finite cosine similarity.
    pub score: f32,
    /// Presentable fields.
    pub job: JobMatch,
}

/// Operational snapshot reported by health endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusHealth {
    /// Always `"online"` while the process serves traffic.
    pub status: String,
    /// Whether a corpus snapshot is installed.
    pub corpus_loaded: bool,
    /// Number of jobs in the snapshot.
    pub total_jobs: usize,
    /// `[N, D]`.
    pub embedding_shape: [usize; 2],
    /// Encoder model identifier.
    pub model: String,
}

const MISSING_TOKENS: &[&str] = &[
    "nan", "na", "n/a", "null", "none", "<na>", "#n/a", "nat", "-nan",
];

/// Returns the trimmed value, or `None` when it is blank, a missing-value
/// token, or spells a non-finite number.
pub fn present_field(value: Option<&str>) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if MISSING_TOKENS.contains(&lowered.as_str()) {
        return None;
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        if !number.is_finite() {
            return None;
        }
    }
    Some(trimmed.to_string())
}

/// Stateless search facade over an injected corpus and encoder.
pub struct QueryService {
    corpus: CorpusSlot,
    encoder: Arc<dyn Encoder>,
    controls: QueryControls,
    source: Option<CorpusPaths>,
}

impl QueryService {
    /// Wires a loaded corpus to an encoder.
    ///
    /// Fails when the corpus width differs from the encoder's output width.
    pub fn new(
        store: CorpusStore,
        encoder: Arc<dyn Encoder>,
        controls: QueryControls,
    ) -> Result<Self, CorpusLoadError> {
        check_encoder_fit(&store, encoder.as_ref())?;
        Ok(Self {
            corpus: CorpusSlot::new(store),
            encoder,
            controls,
            source: None,
        })
    }

    /// Loads the corpus from disk and remembers the paths for later reloads.
    pub fn open(
        paths: CorpusPaths,
        encoder: Arc<dyn Encoder>,
        controls: QueryControls,
    ) -> Result<Self, CorpusLoadError> {
        let store = CorpusStore::open(&paths)?;
        let mut service = Self::new(store, encoder, controls)?;
        service.source = Some(paths);
        Ok(service)
    }

    /// Top-k policy in effect.
    pub fn controls(&self) -> &QueryControls {
        &self.controls
    }

    /// Current corpus snapshot.
    pub fn corpus(&self) -> Arc<CorpusStore> {
        self.corpus.snapshot()
    }

    /// Ranks the corpus against `text`.
    ///
    /// `top_k <= 0` returns no results; larger values are clamped to the
    /// configured maximum and to the corpus size.
    pub fn search(&self, text: &str, top_k: i64) -> Result<Vec<RankedResult>, ServiceError> {
        let started = Instant::now();
        let limit = self.controls.effective_top_k(top_k);
        let corpus = self.corpus.snapshot();
        let query = self.encoder.encode(text)?;
        let ranked = ranker::rank(&query, corpus.embeddings(), limit)?;
        let results: Vec<RankedResult> = ranked
            .into_iter()
            .filter_map(|hit| {
                corpus.record_at(hit.row).map(|record| RankedResult {
                    row: hit.row,
                    score: hit.score,
                    job: JobMatch::from_record(record),
                })
            })
            .collect();
        debug!(
            requested = top_k,
            limit,
            returned = results.len(),
            latency_ms = started.elapsed().as_secs_f64() * 1000.0,
            "search complete"
        );
        Ok(results)
    }

    /// Health payload for the current snapshot.
    pub fn health(&self) -> CorpusHealth {
        let corpus = self.corpus.snapshot();
        CorpusHealth {
            status: "online".to_string(),
            corpus_loaded: true,
            total_jobs: corpus.size(),
            embedding_shape: corpus.embeddings().shape(),
            model: self.encoder.model_name().to_string(),
        }
    }

    /// Re-reads the configured sources and swaps the new snapshot in.
    ///
    /// In-flight searches finish on the snapshot they started with.
    pub fn reload(&self) -> Result<CorpusHealth, ReloadError> {
        let paths = self.source.as_ref().ok_or(ReloadError::NotConfigured)?;
        let store = CorpusStore::open(paths)
            .and_then(|store| check_encoder_fit(&store, self.encoder.as_ref()).map(|_| store))
            .inspect_err(|err| warn!(error = %err, "corpus reload failed; keeping current snapshot"))?;
        let previous = self.corpus.replace(store);
        let health = self.health();
        info!(
            previous_jobs = previous.size(),
            total_jobs = health.total_jobs,
            "corpus reloaded"
        );
        Ok(health)
    }
}

fn check_encoder_fit(store: &CorpusStore, encoder: &dyn Encoder) -> Result<(), CorpusLoadError> {
    if store.dims() != encoder.dimensions() {
        return Err(CorpusLoadError::EncoderMismatch {
            encoder: encoder.dimensions(),
            corpus: store.dims(),
        });
    }
    Ok(())
}
