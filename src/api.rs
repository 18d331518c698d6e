//! HTTP surface for the query service.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::service::{CorpusHealth, JobMatch, QueryService};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    service: Arc<QueryService>,
    rate_limiter: Option<RateLimiter>,
    allow_reload: bool,
}

impl AppState {
    /// State with no rate limit and reload disabled.
    pub fn new(service: Arc<QueryService>) -> Self {
        Self {
            service,
            rate_limiter: None,
            allow_reload: false,
        }
    }

    /// Enables the token-bucket limiter; zero for either value disables it.
    pub fn with_rate_limit(mut self, max_per_minute: u32, burst: u32) -> Self {
        self.rate_limiter = RateLimiter::new(max_per_minute, burst);
        self
    }

    /// Exposes `POST /admin/reload`.
    pub fn with_reload(mut self, allow: bool) -> Self {
        self.allow_reload = allow;
        self
    }
}

/// Body of `POST /recommend`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendRequest {
    /// Free-text query; may be empty.
    pub text: String,
    /// Requested result count; missing or below 1 means the configured default.
    #[serde(default)]
    pub top_k: Option<i64>,
}

/// Error payload returned with non-2xx statuses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable cause.
    pub message: String,
}

/// Handler error type.
pub type ApiError = (StatusCode, Json<ErrorBody>);

/// Builds the router.
pub fn router(state: AppState) -> Router {
    let mut router: Router<AppState> = Router::new()
        .route("/", get(health))
        .route("/healthz", get(health))
        .route("/recommend", post(recommend));
    if state.allow_reload {
        router = router.route("/admin/reload", post(reload));
    }
    router.with_state(state)
}

/// Serves `state` on `listener` until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let addr = listener.local_addr().context("listener has no local address")?;
    info!(%addr, "jobmatch api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// `GET /` and `GET /healthz`.
pub async fn health(State(state): State<AppState>) -> Json<CorpusHealth> {
    Json(state.service.health())
}

/// `POST /recommend`.
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendRequest>,
) -> Result<Json<Vec<JobMatch>>, ApiError> {
    if let Some(limiter) = &state.rate_limiter {
        if !limiter.try_acquire() {
            return Err(too_many_requests("rate limit exceeded"));
        }
    }
    let top_k = state.service.controls().user_top_k(request.top_k);
    let started = Instant::now();
    let service = Arc::clone(&state.service);
    let text = request.text;
    let results = tokio::task::spawn_blocking(move || service.search(&text, top_k))
        .await
        .map_err(|err| internal_error(format!("search task join error: {err}")))?
        .map_err(|err| {
            error!(error = %err, "recommendation failed");
            internal_error(format!("Recommendation error: {err}"))
        })?;
    info!(
        top_k,
        returned = results.len(),
        latency_ms = started.elapsed().as_secs_f64() * 1000.0,
        "served recommendation"
    );
    Ok(Json(results.into_iter().map(|result| result.job).collect()))
}

/// `POST /admin/reload`.
pub async fn reload(State(state): State<AppState>) -> Result<Json<CorpusHealth>, ApiError> {
    let service = Arc::clone(&state.service);
    tokio::task::spawn_blocking(move || service.reload())
        .await
        .map_err(|err| internal_error(format!("reload task join error: {err}")))?
        .map(Json)
        .map_err(|err| internal_error(format!("Reload error: {err}")))
}

fn internal_error(message: impl Into<String>) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

fn too_many_requests(message: impl Into<String>) -> ApiError {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(ErrorBody {
            message: message.into(),
        }),
    )
}

/// Token bucket shared by every request: `burst` tokens up front, refilled
/// continuously at `max_per_minute`.
#[derive(Clone)]
struct RateLimiter {
    bucket: Arc<Mutex<TokenBucket>>,
}

impl RateLimiter {
    fn new(max_per_minute: u32, burst: u32) -> Option<Self> {
        if max_per_minute == 0 || burst == 0 {
            return None;
        }
        let bucket = TokenBucket {
            tokens: f64::from(burst),
            capacity: f64::from(burst),
            per_second: f64::from(max_per_minute) / 60.0,
            refilled_at: Instant::now(),
        };
        Some(Self {
            bucket: Arc::new(Mutex::new(bucket)),
        })
    }

    fn try_acquire(&self) -> bool {
        self.bucket.lock().take(Instant::now())
    }
}

struct TokenBucket {
    tokens: f64,
    capacity: f64,
    per_second: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn take(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.refilled_at);
        self.refilled_at = now;
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.per_second).min(self.capacity);
        if self.tokens < 1.0 {
            return false;
        }
        self.tokens -= 1.0;
        true
    }
}
