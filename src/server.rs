use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use pulldown_cmark::{Options, Parser, html};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::artifact::has_findings;
use crate::classifier::Classifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::orchestrator::{Orchestrator, RunSummary};
use crate::progress::{ProgressSnapshot, RunGuard, RunPermit};
use crate::sources::ReviewSource;

pub const FETCH_SUCCESS_BODY: &str = "Comments fetched successfully";

/// Shared state behind every route.
pub struct AppState<S, C> {
    orchestrator: Orchestrator<S, C>,
    guard: RunGuard,
    days_back: u32,
    max_prs: u32,
    index_path: PathBuf,
    refresh_window: Duration,
    refresh_timeout: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl<S: ReviewSource, C: Classifier> AppState<S, C> {
    pub fn new(config: &Config, orchestrator: Orchestrator<S, C>) -> Self {
        Self {
            orchestrator,
            guard: RunGuard::new(),
            days_back: config.days_back,
            max_prs: config.max_prs,
            index_path: config.index_path.clone(),
            refresh_window: Duration::from_secs(config.refresh_window_secs),
            refresh_timeout: Duration::from_secs(config.refresh_timeout_secs),
            last_refresh: Mutex::new(None),
        }
    }

    pub fn guard(&self) -> &RunGuard {
        &self.guard
    }

    pub fn orchestrator(&self) -> &Orchestrator<S, C> {
        &self.orchestrator
    }

    /// Claim the refresh window. Returns false when the last refresh is
    /// still within it.
    fn claim_refresh(&self) -> bool {
        let mut last = self
            .last_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let due = last.is_none_or(|at| at.elapsed() >= self.refresh_window);
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    fn mark_refreshed(&self) {
        *self
            .last_refresh
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Instant::now());
    }
}

/// Run the orchestrator on its own task so a dropped request cannot cancel
/// it. The permit is released when the run ends.
fn spawn_run<S, C>(state: Arc<AppState<S, C>>, permit: RunPermit) -> JoinHandle<Result<RunSummary>>
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    tokio::spawn(async move {
        let _permit = permit;
        state
            .orchestrator
            .run(state.days_back, state.max_prs)
            .await
    })
}

pub fn router<S, C>(state: Arc<AppState<S, C>>) -> Router
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    Router::new()
        .route("/", get(index::<S, C>))
        .route("/api/fetch-comments", post(fetch_comments::<S, C>))
        .route("/api/progress", get(progress::<S, C>))
        .route("/results", get(results::<S, C>))
        .with_state(state)
}

/// Bind and serve until shutdown. Hosted mode listens on every interface and
/// stops on Ctrl-C; local mode listens on loopback and also stops on Enter.
pub async fn serve<S, C>(state: Arc<AppState<S, C>>, port: u16, hosted: bool) -> Result<()>
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    let ip = if hosted {
        Ipv4Addr::UNSPECIFIED
    } else {
        Ipv4Addr::LOCALHOST
    };
    let addr = SocketAddr::from((ip, port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("failed to bind {addr}: {e}")))?;

    if hosted {
        info!(%addr, "listening");
    } else {
        info!(%addr, "listening, press Enter to stop");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(hosted))
        .await
        .map_err(|e| Error::Server(e.to_string()))?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(hosted: bool) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    if hosted {
        ctrl_c.await;
        return;
    }

    let enter = async {
        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(n) if n > 0 => {}
            // stdin closed or unreadable: only Ctrl-C stops us
            _ => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = enter => {}
    }
}

async fn index<S, C>(State(state): State<Arc<AppState<S, C>>>) -> Response
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    match tokio::fs::read_to_string(&state.index_path).await {
        Ok(page) => Html(page).into_response(),
        Err(e) => {
            warn!(path = %state.index_path.display(), error = %e, "landing page unavailable");
            (StatusCode::NOT_FOUND, "Not found").into_response()
        }
    }
}

async fn fetch_comments<S, C>(State(state): State<Arc<AppState<S, C>>>) -> Response
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    let Some(permit) = state.guard.try_acquire() else {
        return (
            StatusCode::CONFLICT,
            format!("Error: {}", Error::RunInProgress),
        )
            .into_response();
    };

    let outcome = spawn_run(Arc::clone(&state), permit).await;
    match outcome {
        Ok(Ok(summary)) => {
            state.mark_refreshed();
            info!(found = summary.found, processed = summary.processed, "fetch request complete");
            (StatusCode::OK, FETCH_SUCCESS_BODY).into_response()
        }
        Ok(Err(e)) => {
            error!(error = %e, "fetch request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response()
        }
        Err(e) => {
            error!(error = %e, "run task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {e}")).into_response()
        }
    }
}

async fn progress<S, C>(State(state): State<Arc<AppState<S, C>>>) -> Json<ProgressSnapshot>
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    Json(state.orchestrator.progress().snapshot())
}

async fn results<S, C>(State(state): State<Arc<AppState<S, C>>>) -> Response
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    if let Some(permit) = state.guard.try_acquire() {
        if state.claim_refresh() {
            if let Err(e) = refresh(&state, permit).await {
                error!(error = %e, "refresh failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html(error_page(&e.to_string())),
                )
                    .into_response();
            }
        } else {
            drop(permit);
        }
    }

    match state.orchestrator.artifact().read() {
        Ok(Some(content)) if has_findings(&content) => Html(results_page(&content)).into_response(),
        Ok(_) => Html(placeholder_page()).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read digest");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(error_page(&e.to_string())),
            )
                .into_response()
        }
    }
}

/// Delete the previous digest and start a fresh run, waiting at most the
/// refresh timeout for it. A run still going after that keeps running.
async fn refresh<S, C>(state: &Arc<AppState<S, C>>, permit: RunPermit) -> Result<()>
where
    S: ReviewSource + 'static,
    C: Classifier + 'static,
{
    info!("refreshing results");
    state.orchestrator.artifact().remove()?;
    let handle = spawn_run(Arc::clone(state), permit);
    match tokio::time::timeout(state.refresh_timeout, handle).await {
        Ok(Ok(Ok(summary))) => {
            info!(found = summary.found, processed = summary.processed, "refresh complete");
            Ok(())
        }
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(e)) => Err(Error::Server(format!("run task failed: {e}"))),
        Err(_) => {
            warn!(
                timeout_secs = state.refresh_timeout.as_secs(),
                "refresh still running, serving current results"
            );
            Ok(())
        }
    }
}

fn html_escape(v: &str) -> String {
    v.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// Render the digest's Markdown (including its raw `<details>` blocks).
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let mut out = String::new();
    html::push_html(&mut out, Parser::new_ext(markdown, options));
    out
}

pub fn results_page(markdown: &str) -> String {
    page("Important PR Comments", &render_markdown(markdown))
}

pub fn placeholder_page() -> String {
    page(
        "Important PR Comments",
        "<h1>Important PR Comments</h1>\n<p>No content yet. Results will appear here once a run finds important comments.</p>",
    )
}

pub fn error_page(message: &str) -> String {
    page(
        "Error",
        &format!(
            "<h1>Error</h1>\n<p>Failed to refresh results: {}</p>",
            html_escape(message)
        ),
    )
}
