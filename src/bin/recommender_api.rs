use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use jobmatch::api::{self, AppState};
use jobmatch::telemetry::{init_tracing, LogArgs};
use jobmatch::{CachedEncoder, CorpusArgs, EncoderArgs, Encoder, QueryArgs, QueryService};
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "jobmatch-api",
    about = "HTTP API serving semantic job recommendations over a precomputed embedding corpus"
)]
struct ApiCli {
    /// Address to bind the HTTP server to (host:port).
    #[arg(long, env = "JOBMATCH_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    #[command(flatten)]
    corpus: CorpusArgs,

    #[command(flatten)]
    encoder: EncoderArgs,

    #[command(flatten)]
    query: QueryArgs,

    /// Max cached query embeddings kept in-memory (0 disables caching).
    #[arg(long, env = "JOBMATCH_EMBEDDING_CACHE", default_value_t = 1024)]
    embedding_cache_size: usize,

    /// Max requests per minute allowed (0 disables rate limiting).
    #[arg(long, default_value_t = 120)]
    max_requests_per_minute: u32,

    /// Rate-limit burst size (tokens available instantly).
    #[arg(long, default_value_t = 12)]
    rate_limit_burst: u32,

    /// Expose POST /admin/reload to swap in a re-read corpus.
    #[arg(long, env = "JOBMATCH_ALLOW_RELOAD", default_value_t = false)]
    allow_reload: bool,

    /// Tokio worker threads (defaults to the number of cores).
    #[arg(long, env = "JOBMATCH_WORKER_THREADS")]
    worker_threads: Option<usize>,

    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let cli = ApiCli::parse();
    init_tracing(&cli.log);

    let encoder = cli.encoder.build()?;
    let encoder: Arc<dyn Encoder> =
        Arc::new(CachedEncoder::new(encoder, cli.embedding_cache_size));
    let service = QueryService::open(cli.corpus.paths(), encoder, cli.query.controls())
        .context("failed to load job corpus; refusing to serve")?;
    let service = Arc::new(service);
    let health = service.health();
    info!(
        total_jobs = health.total_jobs,
        dims = health.embedding_shape[1],
        model = %health.model,
        "corpus ready"
    );

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let state = AppState::new(Arc::clone(&service))
        .with_rate_limit(cli.max_requests_per_minute, cli.rate_limit_burst)
        .with_reload(cli.allow_reload);

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cli.worker_threads {
        builder.worker_threads(threads.max(1));
    }
    let runtime = builder.build().context("failed to start tokio runtime")?;
    runtime.block_on(async move {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        api::serve(listener, state).await
    })?;
    // the blocking HTTP client inside the encoder must be dropped outside the runtime
    drop(runtime);
    drop(service);
    Ok(())
}
