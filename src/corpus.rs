//! Read-only job corpus: typed records positionally aligned with a sanitized
//! embedding matrix, plus the swap slot used for out-of-band reloads.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::matrix::EmbeddingMatrix;
use crate::matrix_file;
use crate::records::{JobPosting, JobRecord};

/// Reasons a corpus snapshot cannot be brought up.
#[derive(Debug, thiserror::Error)]
pub enum CorpusLoadError {
    /// A source file could not be opened or read.
    #[error("failed to read {source_name}: {source}")]
    Unreadable {
        /// Path or label of the source.
        source_name: String,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// A line-oriented source contained an unparseable entry.
    #[error("malformed entry in {source_name} at line {line}: {message}")]
    Malformed {
        /// Path or label of the source.
        source_name: String,
        /// One-based line number.
        line: usize,
        /// Parser message.
        message: String,
    },
    /// A binary source violated its layout.
    #[error("invalid embedding data in {source_name}: {message}")]
    Format {
        /// Path or label of the source.
        source_name: String,
        /// What was wrong.
        message: String,
    },
    /// Embedding rows of differing width.
    #[error("embedding row {row} has {found} values, expected {expected}")]
    RaggedRow {
        /// Offending row.
        row: usize,
        /// Width of the first row.
        expected: usize,
        /// Width of the offending row.
        found: usize,
    },
    /// Records and embedding rows are not aligned one-to-one.
    #[error("record count {records} does not match embedding row count {rows}")]
    CountMismatch {
        /// Number of job records.
        records: usize,
        /// Number of embedding rows.
        rows: usize,
    },
    /// Embeddings have no columns.
    #[error("embedding dimensionality is zero")]
    ZeroDimension,
    /// The corpus was embedded with a different model than the one serving queries.
    #[error("corpus embeddings have {corpus} dimensions but the encoder produces {encoder}")]
    EncoderMismatch {
        /// Encoder output width.
        encoder: usize,
        /// Corpus column count.
        corpus: usize,
    },
}

/// Locations of the two aligned corpus sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusPaths {
    /// JSON Lines of [`JobPosting`] values.
    pub records: PathBuf,
    /// Embedding matrix, binary or JSON Lines.
    pub embeddings: PathBuf,
}

impl CorpusPaths {
    /// Bundles the two source paths.
    pub fn new(records: impl Into<PathBuf>, embeddings: impl Into<PathBuf>) -> Self {
        Self {
            records: records.into(),
            embeddings: embeddings.into(),
        }
    }
}

/// Immutable corpus snapshot.
#[derive(Debug)]
pub struct CorpusStore {
    records: Vec<JobRecord>,
    embeddings: EmbeddingMatrix,
}

impl CorpusStore {
    /// Validates shape, sanitizes the matrix and freezes the snapshot.
    pub fn load(
        postings: Vec<JobPosting>,
        mut embeddings: EmbeddingMatrix,
    ) -> Result<Self, CorpusLoadError> {
        if postings.len() != embeddings.rows() {
            return Err(CorpusLoadError::CountMismatch {
                records: postings.len(),
                rows: embeddings.rows(),
            });
        }
        if embeddings.dims() == 0 {
            return Err(CorpusLoadError::ZeroDimension);
        }
        let replaced = embeddings.sanitize();
        if replaced > 0 {
            warn!(replaced, "zeroed non-finite embedding values");
        }
        let records = postings
            .into_iter()
            .enumerate()
            .map(|(row, posting)| JobRecord::from_posting(row, posting))
            .collect();
        Ok(Self {
            records,
            embeddings,
        })
    }

    /// Reads both sources from disk and loads them.
    pub fn open(paths: &CorpusPaths) -> Result<Self, CorpusLoadError> {
        let postings = read_postings(&paths.records)?;
        let embeddings = matrix_file::read_matrix(&paths.embeddings)?;
        let store = Self::load(postings, embeddings)?;
        info!(
            jobs = store.size(),
            dims = store.dims(),
            records = %paths.records.display(),
            embeddings = %paths.embeddings.display(),
            "loaded job corpus"
        );
        Ok(store)
    }

    /// Number of jobs (`N`).
    pub fn size(&self) -> usize {
        self.records.len()
    }

    /// Embedding width (`D`).
    pub fn dims(&self) -> usize {
        self.embeddings.dims()
    }

    /// Sanitized embedding of row `index`.
    pub fn embedding_at(&self, index: usize) -> Option<&[f32]> {
        self.embeddings.row(index)
    }

    /// Record stored at row `index`.
    pub fn record_at(&self, index: usize) -> Option<&JobRecord> {
        self.records.get(index)
    }

    /// Read-only view of the whole matrix.
    pub fn embeddings(&self) -> &EmbeddingMatrix {
        &self.embeddings
    }
}

/// Reads posting JSON Lines, skipping blank lines.
pub fn read_postings(path: &Path) -> Result<Vec<JobPosting>, CorpusLoadError> {
    let source_name = path.display().to_string();
    let file = File::open(path).map_err(|source| CorpusLoadError::Unreadable {
        source_name: source_name.clone(),
        source,
    })?;
    parse_postings(BufReader::new(file), &source_name)
}

/// Parses posting JSON Lines from any buffered reader.
pub fn parse_postings<R: BufRead>(
    reader: R,
    source_name: &str,
) -> Result<Vec<JobPosting>, CorpusLoadError> {
    let mut postings = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CorpusLoadError::Unreadable {
            source_name: source_name.to_string(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        let posting = serde_json::from_str(&line).map_err(|err| CorpusLoadError::Malformed {
            source_name: source_name.to_string(),
            line: line_no + 1,
            message: err.to_string(),
        })?;
        postings.push(posting);
    }
    Ok(postings)
}

/// Shared slot holding the current corpus snapshot.
///
/// Readers clone the `Arc` and never hold the lock while ranking; a reload
/// swaps in a store that is already fully loaded and sanitized.
#[derive(Debug)]
pub struct CorpusSlot {
    current: RwLock<Arc<CorpusStore>>,
}

impl CorpusSlot {
    /// Wraps the initial snapshot.
    pub fn new(store: CorpusStore) -> Self {
        Self {
            current: RwLock::new(Arc::new(store)),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<CorpusStore> {
        self.current.read().clone()
    }

    /// Installs `store` and returns the previous snapshot.
    pub fn replace(&self, store: CorpusStore) -> Arc<CorpusStore> {
        let next = Arc::new(store);
        std::mem::replace(&mut *self.current.write(), next)
    }
}
