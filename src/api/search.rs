//! Search API endpoint.

use std::time::Duration;

use axum::extract::{Query, State};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::{current_revision, error, success, ApiResult};
use crate::models::SearchResults;
use crate::AppState;

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Search query string. Missing and blank are both rejected by the engine.
    #[serde(default)]
    pub q: String,
}

/// GET /api/search - Case-insensitive substring search over current content.
///
/// The search is cancelled once `search_timeout_ms` elapses.
pub async fn search_documents(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<SearchResults> {
    let revision_id = current_revision(&state).await;

    let cancel = CancellationToken::new();
    let timeout = Duration::from_millis(state.config.search_timeout_ms);
    let timer = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        }
    });

    let result = state.engine.search(&params.q, &cancel).await;
    timer.abort();

    match result {
        Ok(results) => success(results, revision_id),
        Err(e) => error(e, revision_id),
    }
}
