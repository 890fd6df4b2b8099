//! Metadata, tag and recency endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use super::{current_revision, error, success, ApiResult};
use crate::models::{DocumentSummaries, MetadataRecord, SetMetadataRequest, TagsResponse};
use crate::AppState;

/// Recent documents query parameters.
#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    /// Number of documents to return (default: 10).
    #[serde(default = "default_recent_limit")]
    pub limit: i64,
}

fn default_recent_limit() -> i64 {
    10
}

/// GET /api/metadata/{filename} - Title and tags of a document.
pub async fn get_metadata(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<MetadataRecord> {
    let revision_id = current_revision(&state).await;

    match state.engine.get_metadata(&filename).await {
        Ok(record) => success(record, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/metadata/{filename} - Replace title and tags.
pub async fn set_metadata(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(request): Json<SetMetadataRequest>,
) -> ApiResult<MetadataRecord> {
    let revision_id = current_revision(&state).await;

    match state.engine.set_metadata(&filename, &request).await {
        Ok(record) => {
            let new_revision = current_revision(&state).await;
            success(record, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/tags - All tags in use.
pub async fn list_tags(State(state): State<AppState>) -> ApiResult<TagsResponse> {
    let revision_id = current_revision(&state).await;

    match state.engine.tags().await {
        Ok(tags) => success(TagsResponse { tags }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/tags/{tag} - Documents carrying a tag.
pub async fn documents_by_tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> ApiResult<DocumentSummaries> {
    let revision_id = current_revision(&state).await;

    match state.engine.documents_by_tag(&tag).await {
        Ok(documents) => success(DocumentSummaries { documents }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// Tag lookup query parameters.
#[derive(Debug, Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    pub tag: String,
}

/// GET /api/tags/search?tag= - Same as `/api/tags/{tag}`, tag taken from the query.
pub async fn search_by_tag(
    State(state): State<AppState>,
    Query(params): Query<TagQuery>,
) -> ApiResult<DocumentSummaries> {
    let revision_id = current_revision(&state).await;

    match state.engine.documents_by_tag(&params.tag).await {
        Ok(documents) => success(DocumentSummaries { documents }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/recent - Most recently updated documents.
pub async fn recent_documents(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> ApiResult<DocumentSummaries> {
    let revision_id = current_revision(&state).await;

    match state.engine.recent(params.limit).await {
        Ok(documents) => success(DocumentSummaries { documents }, revision_id),
        Err(e) => error(e, revision_id),
    }
}
