//! Wiki engine: the façade the HTTP layer calls.
//!
//! Mutations take the document's lock, run every store inside one SQLite
//! transaction and publish the search update only after that transaction has
//! committed, so SQLite's write lock is never held while waiting on search.
//! Reads run in a read transaction so they see one consistent snapshot across
//! the stores.

mod clock;
mod locks;

pub use clock::*;
pub use locks::LockTable;

use std::sync::Arc;

use sqlx::{Sqlite, SqlitePool, Transaction};
use tokio_util::sync::CancellationToken;

use crate::db::{
    self, normalize_tags, normalize_title, ActivityTracker, CommitAuthor, CommitStore,
    MetadataIndex,
};
use crate::errors::AppError;
use crate::models::{
    CommitSummary, DocumentContent, DocumentSummary, DocumentVersion, MetadataRecord,
    SearchResults, SetMetadataRequest, WriteDocumentRequest,
};
use crate::search::SearchIndex;

/// Longest accepted filename, in bytes.
pub const MAX_FILENAME_LEN: usize = 255;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub default_author: String,
    pub default_email: String,
    pub preview_radius: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_author: "MD Wiki User".to_string(),
            default_email: "user@md-wiki.example".to_string(),
            preview_radius: 100,
        }
    }
}

/// Steps of a mutating transaction, named in failure logs.
#[derive(Debug, Clone, Copy)]
enum TxStep {
    Begin,
    Revision,
    CommitAppend,
    MetadataTouch,
    ActivityStamp,
    Delete,
    Commit,
}

/// Log a failed step; the transaction is dropped by the caller's `?`.
fn rolled_back(filename: &str, step: TxStep) -> impl FnOnce(AppError) -> AppError + '_ {
    move |err| {
        tracing::error!(
            "Mutation of {} failed at {:?}, rolled back: {}",
            filename,
            step,
            err
        );
        err
    }
}

/// Reject names that cannot serve as a document key.
pub fn validate_filename(filename: &str) -> Result<(), AppError> {
    let invalid = |reason: &str| {
        Err(AppError::Validation(format!(
            "Invalid filename {:?}: {}",
            filename, reason
        )))
    };

    if filename.trim().is_empty() {
        return invalid("must not be empty");
    }
    if filename.len() > MAX_FILENAME_LEN {
        return invalid("too long");
    }
    if filename.starts_with('.') {
        return invalid("must not start with '.'");
    }
    if filename
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return invalid("contains a path separator or control character");
    }
    Ok(())
}

/// Document version store with metadata, search and activity indexes.
pub struct WikiEngine {
    pool: SqlitePool,
    search: SearchIndex,
    locks: LockTable,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
}

impl WikiEngine {
    /// Open the engine over an initialized pool and rebuild the search index.
    pub async fn open(pool: SqlitePool, options: EngineOptions) -> Result<Self, AppError> {
        Self::with_clock(pool, options, Arc::new(SystemClock)).await
    }

    pub async fn with_clock(
        pool: SqlitePool,
        options: EngineOptions,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let engine = Self {
            search: SearchIndex::new(options.preview_radius),
            pool,
            locks: LockTable::new(),
            clock,
            options,
        };

        let mut conn = engine.pool.acquire().await?;
        let heads = CommitStore::heads(&mut conn).await?;
        drop(conn);
        engine.search.rebuild(heads).await;
        tracing::info!("Wiki engine ready, {} documents indexed", engine.search.len().await);

        Ok(engine)
    }

    async fn snapshot(&self) -> Result<Transaction<'static, Sqlite>, AppError> {
        Ok(self.pool.begin().await?)
    }

    /// Global revision counter, bumped by every mutation.
    pub async fn revision(&self) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        db::get_revision_id(&mut conn).await
    }

    // ==================== DOCUMENTS ====================

    pub async fn list_documents(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await?;
        CommitStore::list(&mut conn).await
    }

    /// Current content and head commit id.
    pub async fn get_document(&self, filename: &str) -> Result<DocumentContent, AppError> {
        let mut conn = self.pool.acquire().await?;
        let (content, commit_id) = CommitStore::get(&mut conn, filename).await?;
        Ok(DocumentContent {
            filename: filename.to_string(),
            content,
            commit_id,
        })
    }

    /// Read a document and count the view.
    pub async fn view_document(&self, filename: &str) -> Result<DocumentContent, AppError> {
        let _guard = self.locks.lock(filename).await;
        let now = self.clock.now();

        let mut tx = self.snapshot().await?;
        // Writing first takes SQLite's write lock before the read.
        ActivityTracker::record_view(&mut tx, filename, now).await?;
        let (content, commit_id) = CommitStore::get(&mut tx, filename).await?;
        tx.commit().await?;

        tracing::debug!("Viewed {}", filename);
        Ok(DocumentContent {
            filename: filename.to_string(),
            content,
            commit_id,
        })
    }

    /// Append a new version; creates the document if it does not exist.
    ///
    /// Concurrent writers to one filename are serialized and each gets its own
    /// commit, the last one becoming the head.
    pub async fn write_document(
        &self,
        filename: &str,
        request: &WriteDocumentRequest,
    ) -> Result<CommitSummary, AppError> {
        self.commit_write(filename, request, false).await
    }

    /// Like [`WikiEngine::write_document`], but fails with `Conflict` if the
    /// document already exists.
    pub async fn create_document(
        &self,
        filename: &str,
        request: &WriteDocumentRequest,
    ) -> Result<CommitSummary, AppError> {
        self.commit_write(filename, request, true).await
    }

    async fn commit_write(
        &self,
        filename: &str,
        request: &WriteDocumentRequest,
        create_only: bool,
    ) -> Result<CommitSummary, AppError> {
        validate_filename(filename)?;
        let _guard = self.locks.lock(filename).await;
        let now = self.clock.now();

        let mut tx = self
            .snapshot()
            .await
            .map_err(rolled_back(filename, TxStep::Begin))?;
        db::increment_revision(&mut tx)
            .await
            .map_err(rolled_back(filename, TxStep::Revision))?;

        let is_new = !CommitStore::exists(&mut tx, filename).await?;
        if create_only && !is_new {
            return Err(AppError::Conflict(format!(
                "Document {} already exists",
                filename
            )));
        }

        let message = match request.message.as_deref().map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ if is_new => format!("Create {}.md", filename),
            _ => format!("Update {}.md", filename),
        };
        let sig = CommitAuthor {
            author: non_blank(request.author.as_deref()).unwrap_or(self.options.default_author.as_str()),
            email: non_blank(request.email.as_deref()).unwrap_or(self.options.default_email.as_str()),
            message: &message,
            timestamp: now,
        };

        let commit = CommitStore::put(&mut tx, filename, &request.content, &sig)
            .await
            .map_err(rolled_back(filename, TxStep::CommitAppend))?;
        MetadataIndex::touch(&mut tx, filename)
            .await
            .map_err(rolled_back(filename, TxStep::MetadataTouch))?;
        ActivityTracker::record_write(&mut tx, filename, now)
            .await
            .map_err(rolled_back(filename, TxStep::ActivityStamp))?;

        let staged = SearchIndex::stage(filename, &request.content);
        tx.commit()
            .await
            .map_err(AppError::from)
            .map_err(rolled_back(filename, TxStep::Commit))?;
        // Still under the filename lock, so updates to one document land in order.
        self.search.write().await.apply(staged);

        tracing::info!(
            "Committed {} to {} ({} bytes)",
            &commit.id[..12],
            filename,
            request.content.len()
        );
        Ok(commit)
    }

    /// Remove a document, its history links, metadata, tags and activity.
    pub async fn delete_document(&self, filename: &str) -> Result<(), AppError> {
        let _guard = self.locks.lock(filename).await;

        let mut tx = self
            .snapshot()
            .await
            .map_err(rolled_back(filename, TxStep::Begin))?;
        db::increment_revision(&mut tx)
            .await
            .map_err(rolled_back(filename, TxStep::Revision))?;

        if !CommitStore::delete(&mut tx, filename)
            .await
            .map_err(rolled_back(filename, TxStep::Delete))?
        {
            return Err(AppError::NotFound(format!(
                "Document {} not found",
                filename
            )));
        }
        MetadataIndex::remove(&mut tx, filename)
            .await
            .map_err(rolled_back(filename, TxStep::Delete))?;
        ActivityTracker::remove(&mut tx, filename)
            .await
            .map_err(rolled_back(filename, TxStep::Delete))?;

        tx.commit()
            .await
            .map_err(AppError::from)
            .map_err(rolled_back(filename, TxStep::Commit))?;
        self.search.write().await.remove(filename);

        tracing::info!("Deleted {}", filename);
        Ok(())
    }

    /// Commit summaries, newest first.
    pub async fn get_history(&self, filename: &str) -> Result<Vec<CommitSummary>, AppError> {
        let mut tx = self.snapshot().await?;
        CommitStore::history(&mut tx, filename).await
    }

    /// Content at a commit of this document's history.
    pub async fn get_version(
        &self,
        filename: &str,
        commit_id: &str,
    ) -> Result<DocumentVersion, AppError> {
        let mut tx = self.snapshot().await?;
        let (content, commit_info) = CommitStore::get_version(&mut tx, filename, commit_id).await?;
        Ok(DocumentVersion {
            filename: filename.to_string(),
            content,
            commit_info,
        })
    }

    // ==================== METADATA ====================

    pub async fn get_metadata(&self, filename: &str) -> Result<MetadataRecord, AppError> {
        let mut tx = self.snapshot().await?;
        MetadataIndex::get(&mut tx, filename).await
    }

    /// Replace title and tags; counts as an update for recency.
    pub async fn set_metadata(
        &self,
        filename: &str,
        request: &SetMetadataRequest,
    ) -> Result<MetadataRecord, AppError> {
        let tags = normalize_tags(&request.tags)?;
        let title = normalize_title(request.title.as_deref(), filename);

        let _guard = self.locks.lock(filename).await;
        let now = self.clock.now();

        let mut tx = self
            .snapshot()
            .await
            .map_err(rolled_back(filename, TxStep::Begin))?;
        db::increment_revision(&mut tx)
            .await
            .map_err(rolled_back(filename, TxStep::Revision))?;

        if !CommitStore::exists(&mut tx, filename).await? {
            return Err(AppError::NotFound(format!(
                "Document {} not found",
                filename
            )));
        }

        let record = MetadataIndex::set(&mut tx, filename, &title, &tags)
            .await
            .map_err(rolled_back(filename, TxStep::MetadataTouch))?;
        ActivityTracker::record_write(&mut tx, filename, now)
            .await
            .map_err(rolled_back(filename, TxStep::ActivityStamp))?;
        tx.commit()
            .await
            .map_err(AppError::from)
            .map_err(rolled_back(filename, TxStep::Commit))?;

        tracing::info!("Updated metadata of {} ({} tags)", filename, record.tags.len());
        Ok(record)
    }

    pub async fn tags(&self) -> Result<Vec<String>, AppError> {
        let mut conn = self.pool.acquire().await?;
        MetadataIndex::all_tags(&mut conn).await
    }

    pub async fn documents_by_tag(&self, tag: &str) -> Result<Vec<DocumentSummary>, AppError> {
        if tag.trim().is_empty() {
            return Err(AppError::Validation("Tag must not be empty".to_string()));
        }

        let mut tx = self.snapshot().await?;
        let filenames = MetadataIndex::documents_by_tag(&mut tx, tag).await?;
        let mut summaries = Vec::with_capacity(filenames.len());
        for filename in filenames {
            summaries.push(ActivityTracker::summary(&mut tx, &filename).await?);
        }
        Ok(summaries)
    }

    // ==================== ACTIVITY & SEARCH ====================

    pub async fn recent(&self, limit: i64) -> Result<Vec<DocumentSummary>, AppError> {
        let mut tx = self.snapshot().await?;
        ActivityTracker::recent(&mut tx, limit).await
    }

    /// Substring search over current content; aborts with `Cancelled` when
    /// `cancel` fires.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResults, AppError> {
        if query.trim().is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }
        let results = self.search.search(query, cancel).await;
        if let Err(AppError::Cancelled(msg)) = &results {
            tracing::warn!("{}", msg);
        }
        results
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
