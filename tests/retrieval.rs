mod common;

use std::sync::Arc;

use common::{posting, write_matrix, write_postings, FixedEncoder};
use jobmatch::{
    CorpusLoadError, CorpusPaths, CorpusStore, EmbeddingMatrix, Encoder, JobMatch, QueryControls,
    QueryService, RankError, ReloadError, ServiceError,
};
use pretty_assertions::assert_eq;

fn abc_service() -> QueryService {
    let store = CorpusStore::load(
        vec![posting("A"), posting("B"), posting("C")],
        EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])
            .expect("matrix"),
    )
    .expect("load");
    let encoder = FixedEncoder::new(2)
        .with("backend", vec![1.0, 0.0])
        .with("broken", vec![f32::NAN, f32::INFINITY]);
    QueryService::new(store, Arc::new(encoder), QueryControls::default()).expect("service")
}

fn titles(results: &[jobmatch::RankedResult]) -> Vec<&str> {
    results
        .iter()
        .map(|r| r.job.title.as_deref().unwrap_or("-"))
        .collect()
}

#[test]
fn ranks_end_to_end_scenario() {
    let service = abc_service();
    let results = service.search("backend", 5).expect("search");

    assert_eq!(titles(&results), vec!["A", "C", "B"]);
    assert_eq!(results[0].score, 1.0);
    assert!((results[1].score - 0.707_106_8).abs() < 1e-5);
    assert_eq!(results[2].score, 0.0);
    assert_eq!(
        results[0].job,
        JobMatch {
            title: Some("A".into()),
            company: Some("A SARL".into()),
            sector: Some("Informatique".into()),
            salary: None,
        }
    );
}

#[test]
fn repeated_searches_are_identical() {
    let service = abc_service();
    let first = service.search("backend", 3).expect("search");
    for _ in 0..5 {
        assert_eq!(service.search("backend", 3).expect("search"), first);
    }
}

#[test]
fn top_k_boundaries() {
    let service = abc_service();
    assert!(service.search("backend", 0).expect("search").is_empty());
    assert!(service.search("backend", -4).expect("search").is_empty());
    assert_eq!(service.search("backend", 10_000).expect("search").len(), 3);
    assert_eq!(service.search("backend", 2).expect("search").len(), 2);
}

#[test]
fn max_top_k_caps_large_corpora() {
    let rows: Vec<Vec<f32>> = (0..80).map(|i| vec![1.0, i as f32]).collect();
    let postings = (0..80).map(|i| posting(&format!("job{i}"))).collect();
    let store =
        CorpusStore::load(postings, EmbeddingMatrix::from_rows(rows).expect("matrix")).expect("load");
    let encoder = FixedEncoder::new(2).with("q", vec![1.0, 0.0]);
    let service =
        QueryService::new(store, Arc::new(encoder), QueryControls::new(5, 50)).expect("service");

    assert_eq!(service.search("q", 10_000).expect("search").len(), 50);
}

#[test]
fn non_finite_query_vector_scores_zero_everywhere() {
    let service = abc_service();
    let results = service.search("broken", 3).expect("search");
    assert!(results.iter().all(|r| r.score == 0.0));
    let rows: Vec<usize> = results.iter().map(|r| r.row).collect();
    assert_eq!(rows, vec![0, 1, 2]);
}

#[test]
fn encoder_failure_is_surfaced() {
    let service = abc_service();
    match service.search("unknown text", 3).unwrap_err() {
        ServiceError::Encoding(err) => {
            assert!(err.to_string().contains("cannot tokenize"), "{err}");
        }
        other => panic!("expected encoding error, got {other:?}"),
    }
    // the failure leaves the service usable
    assert_eq!(service.search("backend", 1).expect("search").len(), 1);
}

#[test]
fn encoder_width_must_match_corpus() {
    let store = CorpusStore::load(
        vec![posting("A")],
        EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]]).expect("matrix"),
    )
    .expect("load");
    let err = QueryService::new(store, Arc::new(FixedEncoder::new(3)), QueryControls::default())
        .err()
        .expect("mismatch rejected");
    assert!(matches!(
        err,
        CorpusLoadError::EncoderMismatch {
            encoder: 3,
            corpus: 2
        }
    ));
}

/// Encoder that claims the corpus width but emits something else.
struct LyingEncoder;

impl Encoder for LyingEncoder {
    fn dimensions(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "lying"
    }

    fn encode(&self, _text: &str) -> Result<Vec<f32>, jobmatch::EncodingError> {
        Ok(vec![1.0, 0.0, 0.0])
    }
}

#[test]
fn dimension_skew_is_reported_per_request() {
    let store = CorpusStore::load(
        vec![posting("A")],
        EmbeddingMatrix::from_rows(vec![vec![1.0, 0.0]]).expect("matrix"),
    )
    .expect("load");
    let service =
        QueryService::new(store, Arc::new(LyingEncoder), QueryControls::default()).expect("service");
    match service.search("anything", 1).unwrap_err() {
        ServiceError::Rank(RankError::DimensionMismatch { query, corpus }) => {
            assert_eq!((query, corpus), (3, 2));
        }
        other => panic!("expected dimension mismatch, got {other:?}"),
    }
}

#[test]
fn empty_corpus_returns_nothing() {
    let store = CorpusStore::load(Vec::new(), EmbeddingMatrix::empty(2)).expect("load");
    let encoder = FixedEncoder::new(2).with("backend", vec![1.0, 0.0]);
    let service =
        QueryService::new(store, Arc::new(encoder), QueryControls::default()).expect("service");
    assert!(service.search("backend", 5).expect("search").is_empty());
    assert_eq!(service.health().total_jobs, 0);
}

#[test]
fn nan_row_is_sanitized_on_disk_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = dir.path().join("jobs.jsonl");
    let embeddings = dir.path().join("embeddings.bin");
    write_postings(&records, &[posting("A"), posting("B"), posting("C")]);
    write_matrix(
        &embeddings,
        vec![vec![1.0, 0.0], vec![0.0, f32::NEG_INFINITY], vec![f32::NAN, 1.0]],
    );

    let store = CorpusStore::open(&CorpusPaths::new(&records, &embeddings)).expect("open");
    assert_eq!(store.embedding_at(2), Some(&[0.0, 1.0][..]));
    assert_eq!(store.embedding_at(1), Some(&[0.0, 0.0][..]));

    let encoder = FixedEncoder::new(2).with("same as C", vec![0.0, 1.0]);
    let service =
        QueryService::new(store, Arc::new(encoder), QueryControls::default()).expect("service");
    let results = service.search("same as C", 3).expect("search");
    assert_eq!(results[0].row, 2);
    assert_eq!(results[0].score, 1.0);
    assert!(results.iter().all(|r| r.score.is_finite()));
}

#[test]
fn mismatched_files_fail_to_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = dir.path().join("jobs.jsonl");
    let embeddings = dir.path().join("embeddings.bin");
    write_postings(&records, &[posting("A"), posting("B")]);
    write_matrix(&embeddings, vec![vec![1.0, 0.0]]);

    let err = CorpusStore::open(&CorpusPaths::new(&records, &embeddings)).unwrap_err();
    assert!(matches!(
        err,
        CorpusLoadError::CountMismatch {
            records: 2,
            rows: 1
        }
    ));

    let missing = CorpusStore::open(&CorpusPaths::new(dir.path().join("nope.jsonl"), &embeddings))
        .unwrap_err();
    assert!(matches!(missing, CorpusLoadError::Unreadable { .. }));
}

#[test]
fn reload_swaps_snapshot_and_keeps_old_one_on_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = dir.path().join("jobs.jsonl");
    let embeddings = dir.path().join("embeddings.jsonl");
    write_postings(&records, &[posting("A")]);
    std::fs::write(&embeddings, "[1.0, 0.0]\n").expect("write embeddings");

    let encoder = FixedEncoder::new(2).with("backend", vec![1.0, 0.0]);
    let service = QueryService::open(
        CorpusPaths::new(&records, &embeddings),
        Arc::new(encoder),
        QueryControls::default(),
    )
    .expect("open");
    let before = service.corpus();
    assert_eq!(before.size(), 1);

    write_postings(&records, &[posting("A"), posting("B")]);
    std::fs::write(&embeddings, "[1.0, 0.0]\n[0.0, 1.0]\n").expect("write embeddings");
    let health = service.reload().expect("reload");
    assert_eq!(health.total_jobs, 2);
    assert_eq!(health.embedding_shape, [2, 2]);
    assert_eq!(before.size(), 1);

    std::fs::write(&embeddings, "[1.0, 0.0]\n").expect("write embeddings");
    assert!(matches!(
        service.reload().unwrap_err(),
        ReloadError::Load(CorpusLoadError::CountMismatch { .. })
    ));
    assert_eq!(service.health().total_jobs, 2);
    assert_eq!(titles(&service.search("backend", 5).expect("search")), vec!["A", "B"]);
}

#[test]
fn in_memory_service_cannot_reload() {
    assert!(matches!(
        abc_service().reload().unwrap_err(),
        ReloadError::NotConfigured
    ));
}
