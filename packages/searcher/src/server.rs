//! The query server's two routes, both on `/`. Built on axum; each
//! request takes its own pool connection, so concurrent requests each
//! see a consistent snapshot of the store.

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use index_core::{QueryEngine, SearchHit, StoreError};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/",
            get(show_form).post(run_search).fallback(reject_other_methods),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

/// `StoreError::Unavailable` becomes 503; every other per-request error
/// becomes 500, both with a plain-text body.
enum AppError {
    Unavailable,
    Internal(StoreError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => AppError::Unavailable,
            other => AppError::Internal(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "search index unavailable").into_response()
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "error handling search request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

async fn show_form() -> Html<String> {
    Html(page_shell(FORM_HTML))
}

async fn run_search(
    State(state): State<AppState>,
    Form(req): Form<SearchRequest>,
) -> Result<Html<String>, AppError> {
    let hits = state.engine.query(&req.query).await?;
    Ok(Html(page_shell(&render_results(&req.query, &hits))))
}

async fn reject_other_methods() -> StatusCode {
    StatusCode::BAD_REQUEST
}

const FORM_HTML: &str = r#"<form method="post" action="/">
  <input type="text" name="query" autofocus>
  <button type="submit">Search</button>
</form>"#;

fn render_results(raw_query: &str, hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return format!(
            "{FORM_HTML}<p>No results for \"{}\".</p>",
            escape_html(raw_query)
        );
    }

    let mut rows = String::new();
    for hit in hits {
        rows.push_str(&format!(
            "<li><a href=\"{url}\">{url}</a> (score {score})</li>",
            url = escape_html(&hit.url),
            score = hit.score,
        ));
    }
    format!("{FORM_HTML}<ul>{rows}</ul>")
}

fn page_shell(body: &str) -> String {
    format!("<!DOCTYPE html><html><head><title>search</title></head><body>{body}</body></html>")
}

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
