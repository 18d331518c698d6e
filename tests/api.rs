mod common;

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use common::{posting, write_postings, FixedEncoder};
use jobmatch::api::{health, recommend, reload, AppState, RecommendRequest};
use jobmatch::{
    CorpusPaths, CorpusStore, EmbeddingMatrix, JobMatch, JobPosting, QueryControls, QueryService,
};
use pretty_assertions::assert_eq;

fn encoder() -> FixedEncoder {
    FixedEncoder::new(2)
        .with("backend", vec![1.0, 0.0])
        .with("", vec![0.0, 0.0])
}

fn state_with(postings: Vec<JobPosting>, rows: Vec<Vec<f32>>, controls: QueryControls) -> AppState {
    let store =
        CorpusStore::load(postings, EmbeddingMatrix::from_rows(rows).expect("matrix")).expect("load");
    let service = QueryService::new(store, Arc::new(encoder()), controls).expect("service");
    AppState::new(Arc::new(service))
}

fn abc_state() -> AppState {
    state_with(
        vec![posting("A"), posting("B"), posting("C")],
        vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]],
        QueryControls::new(2, 50),
    )
}

fn request(text: &str, top_k: Option<i64>) -> Json<RecommendRequest> {
    Json(RecommendRequest {
        text: text.to_string(),
        top_k,
    })
}

fn titles(matches: &[JobMatch]) -> Vec<&str> {
    matches
        .iter()
        .map(|m| m.title.as_deref().unwrap_or("-"))
        .collect()
}

#[tokio::test(flavor = "current_thread")]
async fn health_reports_corpus_shape() {
    let Json(body) = health(State(abc_state())).await;
    assert_eq!(body.status, "online");
    assert!(body.corpus_loaded);
    assert_eq!(body.total_jobs, 3);
    assert_eq!(body.embedding_shape, [3, 2]);
    assert_eq!(body.model, "fixed");
}

#[tokio::test(flavor = "current_thread")]
async fn recommend_returns_ranked_jobs() {
    let Json(body) = recommend(State(abc_state()), request("backend", Some(3)))
        .await
        .expect("recommend");
    assert_eq!(titles(&body), vec!["A", "C", "B"]);
}

#[tokio::test(flavor = "current_thread")]
async fn missing_or_non_positive_top_k_uses_default() {
    let state = abc_state();
    for top_k in [None, Some(0), Some(-3)] {
        let Json(body) = recommend(State(state.clone()), request("backend", top_k))
            .await
            .expect("recommend");
        assert_eq!(titles(&body), vec!["A", "C"], "top_k = {top_k:?}");
    }
}

#[tokio::test(flavor = "current_thread")]
async fn oversized_top_k_is_clamped_to_corpus() {
    let Json(body) = recommend(State(abc_state()), request("backend", Some(10_000)))
        .await
        .expect("recommend");
    assert_eq!(body.len(), 3);
}

#[tokio::test(flavor = "current_thread")]
async fn empty_text_is_accepted() {
    let Json(body) = recommend(State(abc_state()), request("", Some(3)))
        .await
        .expect("recommend");
    assert_eq!(titles(&body), vec!["A", "B", "C"]);
}

#[tokio::test(flavor = "current_thread")]
async fn missing_fields_serialize_as_null() {
    let sparse = JobPosting {
        title: Some("Data Engineer".into()),
        company: Some("NaN".into()),
        salary: Some("  ".into()),
        job_url: "https://jobs.test/sparse".into(),
        ..JobPosting::default()
    };
    let state = state_with(vec![sparse], vec![vec![1.0, 0.0]], QueryControls::default());
    let Json(body) = recommend(State(state), request("backend", None))
        .await
        .expect("recommend");
    let json = serde_json::to_value(&body).expect("json");
    assert_eq!(
        json,
        serde_json::json!([
            {"title": "Data Engineer", "company": null, "sector": null, "salary": null}
        ])
    );
}

#[tokio::test(flavor = "current_thread")]
async fn encoder_failure_maps_to_internal_error() {
    let (status, Json(body)) = recommend(State(abc_state()), request("frontend", Some(3)))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(
        body.message.starts_with("Recommendation error:"),
        "{}",
        body.message
    );
    assert!(body.message.contains("cannot tokenize"), "{}", body.message);
}

#[tokio::test(flavor = "current_thread")]
async fn rate_limit_rejects_after_burst() {
    let state = abc_state().with_rate_limit(1, 1);
    recommend(State(state.clone()), request("backend", None))
        .await
        .expect("first request");
    let (status, _) = recommend(State(state), request("backend", None))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test(flavor = "current_thread")]
async fn reload_picks_up_new_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = dir.path().join("jobs.jsonl");
    let embeddings = dir.path().join("embeddings.jsonl");
    write_postings(&records, &[posting("A")]);
    std::fs::write(&embeddings, "[1.0, 0.0]\n").expect("write embeddings");

    let service = QueryService::open(
        CorpusPaths::new(&records, &embeddings),
        Arc::new(encoder()),
        QueryControls::default(),
    )
    .expect("open");
    let state = AppState::new(Arc::new(service)).with_reload(true);

    write_postings(&records, &[posting("A"), posting("B")]);
    std::fs::write(&embeddings, "[1.0, 0.0]\n[0.0, 1.0]\n").expect("write embeddings");
    let Json(body) = reload(State(state.clone())).await.expect("reload");
    assert_eq!(body.total_jobs, 2);

    std::fs::write(&embeddings, "not json\n").expect("write embeddings");
    let (status, Json(err)) = reload(State(state.clone())).await.unwrap_err();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(err.message.starts_with("Reload error:"), "{}", err.message);

    let Json(body) = health(State(state)).await;
    assert_eq!(body.total_jobs, 2);
}
