#![warn(missing_docs)]
//! Semantic job recommendation: an immutable embedding corpus, an exhaustive
//! cosine ranker hardened against non-finite values, and the query service and
//! HTTP API built on top of them.

pub mod api;
pub mod controls;
pub mod corpus;
pub mod corpus_builder;
pub mod embedder;
pub mod matrix;
pub mod matrix_file;
pub mod ranker;
pub mod records;
pub mod service;
pub mod telemetry;

pub use controls::{CorpusArgs, EncoderArgs, EncoderKind, QueryArgs, QueryControls};
pub use corpus::{CorpusLoadError, CorpusPaths, CorpusSlot, CorpusStore};
pub use embedder::{CachedEncoder, EncodingError, Encoder};
pub use matrix::{sanitize, EmbeddingMatrix};
pub use ranker::{cosine_similarity, rank, RankError, ScoredRow};
pub use records::{JobPosting, JobRecord};
pub use service::{
    present_field, CorpusHealth, JobMatch, QueryService, RankedResult, ReloadError, ServiceError,
};
