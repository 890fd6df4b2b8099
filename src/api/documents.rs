//! Document API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{current_revision, error, success, ApiResult};
use crate::models::{
    CommitSummary, CreateDocumentRequest, DocumentContent, DocumentHistory, DocumentList,
    DocumentVersion, WriteDocumentRequest,
};
use crate::AppState;

/// GET /api/documents - List all documents.
pub async fn list_documents(State(state): State<AppState>) -> ApiResult<DocumentList> {
    let revision_id = current_revision(&state).await;

    match state.engine.list_documents().await {
        Ok(documents) => success(DocumentList { documents }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/{filename} - Current content; counts as a view.
pub async fn get_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<DocumentContent> {
    let revision_id = current_revision(&state).await;

    match state.engine.view_document(&filename).await {
        Ok(document) => success(document, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/documents - Create a document that must not exist yet.
pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> ApiResult<CommitSummary> {
    let revision_id = current_revision(&state).await;

    match state
        .engine
        .create_document(&request.filename, &request.body)
        .await
    {
        Ok(commit) => {
            let new_revision = current_revision(&state).await;
            success(commit, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// PUT /api/documents/{filename} - Write a new version, creating the document if needed.
pub async fn write_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
    Json(request): Json<WriteDocumentRequest>,
) -> ApiResult<CommitSummary> {
    let revision_id = current_revision(&state).await;

    match state.engine.write_document(&filename, &request).await {
        Ok(commit) => {
            let new_revision = current_revision(&state).await;
            success(commit, new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// DELETE /api/documents/{filename} - Delete a document with its history and indexes.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<()> {
    let revision_id = current_revision(&state).await;

    match state.engine.delete_document(&filename).await {
        Ok(()) => {
            let new_revision = current_revision(&state).await;
            success((), new_revision)
        }
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/history/{filename} - Commit history, newest first.
pub async fn get_history(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> ApiResult<DocumentHistory> {
    let revision_id = current_revision(&state).await;

    match state.engine.get_history(&filename).await {
        Ok(commits) => success(DocumentHistory { filename, commits }, revision_id),
        Err(e) => error(e, revision_id),
    }
}

/// GET /api/documents/version/{filename}/{commit_id} - Content at a past commit.
pub async fn get_version(
    State(state): State<AppState>,
    Path((filename, commit_id)): Path<(String, String)>,
) -> ApiResult<DocumentVersion> {
    let revision_id = current_revision(&state).await;

    match state.engine.get_version(&filename, &commit_id).await {
        Ok(version) => success(version, revision_id),
        Err(e) => error(e, revision_id),
    }
}
