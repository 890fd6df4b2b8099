//! Content-addressed commit store.
//!
//! Snapshots live in `blobs` keyed by the SHA-256 of their content, so
//! identical text is stored once. Each write appends a row to `commits` whose
//! `parent_id` points at the previous head; `documents.head_id` names the
//! current head. History is the parent chain walked from the head, which keeps
//! ordering independent of timestamps.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqliteConnection};

use crate::errors::AppError;
use crate::models::CommitSummary;

/// Shortest commit-id prefix accepted by version lookups.
pub const MIN_COMMIT_PREFIX: usize = 4;

/// Authorship and message for a new commit.
#[derive(Debug, Clone)]
pub struct CommitAuthor<'a> {
    pub author: &'a str,
    pub email: &'a str,
    pub message: &'a str,
    pub timestamp: i64,
}

/// Linear, append-only history per document.
pub struct CommitStore;

impl CommitStore {
    /// Append `content` as the new head of `filename`.
    pub async fn put(
        conn: &mut SqliteConnection,
        filename: &str,
        content: &str,
        sig: &CommitAuthor<'_>,
    ) -> Result<CommitSummary, AppError> {
        let blob_hash = content_hash(content);

        sqlx::query("INSERT OR IGNORE INTO blobs (hash, content, size) VALUES (?, ?, ?)")
            .bind(&blob_hash)
            .bind(content)
            .bind(content.len() as i64)
            .execute(&mut *conn)
            .await?;

        let parent_id = Self::head(conn, filename).await?;
        let id = commit_id(filename, parent_id.as_deref(), &blob_hash, sig);

        sqlx::query(
            "INSERT INTO commits (id, filename, parent_id, blob_hash, author, email, message, timestamp) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        )
        .bind(&id)
        .bind(filename)
        .bind(&parent_id)
        .bind(&blob_hash)
        .bind(sig.author)
        .bind(sig.email)
        .bind(sig.message)
        .bind(sig.timestamp)
        .execute(&mut *conn)
        .await?;

        sqlx::query(
            r#"INSERT INTO documents (filename, head_id) VALUES (?, ?)
               ON CONFLICT(filename) DO UPDATE SET head_id = excluded.head_id"#,
        )
        .bind(filename)
        .bind(&id)
        .execute(&mut *conn)
        .await?;

        Ok(CommitSummary {
            id,
            parent_id,
            author: sig.author.to_string(),
            email: sig.email.to_string(),
            message: sig.message.to_string(),
            timestamp: sig.timestamp,
            date: format_timestamp(sig.timestamp),
        })
    }

    /// Current head commit id, if the document exists.
    pub async fn head(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT head_id FROM documents WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.map(|r| r.get("head_id")))
    }

    pub async fn exists(conn: &mut SqliteConnection, filename: &str) -> Result<bool, AppError> {
        Ok(Self::head(conn, filename).await?.is_some())
    }

    /// Current snapshot and head commit id.
    pub async fn get(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<(String, String), AppError> {
        let row = sqlx::query(
            r#"SELECT b.content AS content, d.head_id AS head_id
               FROM documents d
               JOIN commits c ON c.id = d.head_id
               JOIN blobs b ON b.hash = c.blob_hash
               WHERE d.filename = ?"#,
        )
        .bind(filename)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => Ok((row.get("content"), row.get("head_id"))),
            None => Err(not_found(filename)),
        }
    }

    /// Commit summaries from head to root.
    pub async fn history(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<Vec<CommitSummary>, AppError> {
        let chain = Self::chain(conn, filename).await?;
        if chain.is_empty() {
            return Err(not_found(filename));
        }
        Ok(chain.into_iter().map(|(summary, _)| summary).collect())
    }

    /// Snapshot at `commit_ref`, which may be a full id or an unambiguous prefix.
    ///
    /// Only this document's chain is searched and an exact id wins over prefixes.
    pub async fn get_version(
        conn: &mut SqliteConnection,
        filename: &str,
        commit_ref: &str,
    ) -> Result<(String, CommitSummary), AppError> {
        let chain = Self::chain(conn, filename).await?;
        if chain.is_empty() {
            return Err(not_found(filename));
        }

        let commit_ref = commit_ref.trim().to_ascii_lowercase();
        let (summary, blob_hash) = resolve_ref(&chain, &commit_ref, filename)?;

        let row = sqlx::query("SELECT content FROM blobs WHERE hash = ?")
            .bind(blob_hash)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok((row.get("content"), summary.clone())),
            None => Err(AppError::Internal(format!(
                "Blob {} referenced by commit {} is missing",
                blob_hash, summary.id
            ))),
        }
    }

    /// Filenames with at least one commit, ascending.
    pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT filename FROM documents ORDER BY filename")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("filename")).collect())
    }

    /// Current content of every document, used to rebuild the search index.
    pub async fn heads(conn: &mut SqliteConnection) -> Result<Vec<(String, String)>, AppError> {
        let rows = sqlx::query(
            r#"SELECT d.filename AS filename, b.content AS content
               FROM documents d
               JOIN commits c ON c.id = d.head_id
               JOIN blobs b ON b.hash = c.blob_hash
               ORDER BY d.filename"#,
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get("filename"), r.get("content")))
            .collect())
    }

    /// Remove the document and its chain. Blobs stay behind.
    ///
    /// Returns `false` when the document did not exist.
    pub async fn delete(conn: &mut SqliteConnection, filename: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE filename = ?")
            .bind(filename)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM commits WHERE filename = ?")
            .bind(filename)
            .execute(&mut *conn)
            .await?;

        Ok(true)
    }

    /// Walk the parent chain from the head; each entry carries its blob hash.
    async fn chain(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<Vec<(CommitSummary, String)>, AppError> {
        let rows = sqlx::query(
            r#"
            WITH RECURSIVE chain(id, parent_id, blob_hash, author, email, message, timestamp, depth) AS (
                SELECT c.id, c.parent_id, c.blob_hash, c.author, c.email, c.message, c.timestamp, 0
                FROM documents d
                JOIN commits c ON c.id = d.head_id
                WHERE d.filename = ?
                UNION ALL
                SELECT c.id, c.parent_id, c.blob_hash, c.author, c.email, c.message, c.timestamp, chain.depth + 1
                FROM commits c
                JOIN chain ON c.id = chain.parent_id
                WHERE c.filename = ?
            )
            SELECT id, parent_id, blob_hash, author, email, message, timestamp
            FROM chain
            ORDER BY depth
            "#,
        )
        .bind(filename)
        .bind(filename)
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (commit_from_row(row), row.get("blob_hash")))
            .collect())
    }
}

/// Hex SHA-256 of a snapshot; the blob key.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Commit ids hash the whole record plus a random nonce, so re-committing the
/// same text never reuses an id.
fn commit_id(
    filename: &str,
    parent_id: Option<&str>,
    blob_hash: &str,
    sig: &CommitAuthor<'_>,
) -> String {
    let nonce = uuid::Uuid::new_v4();
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update([0u8]);
    hasher.update(parent_id.unwrap_or_default().as_bytes());
    hasher.update([0u8]);
    hasher.update(blob_hash.as_bytes());
    hasher.update([0u8]);
    hasher.update(sig.author.as_bytes());
    hasher.update([0u8]);
    hasher.update(sig.email.as_bytes());
    hasher.update([0u8]);
    hasher.update(sig.message.as_bytes());
    hasher.update(sig.timestamp.to_le_bytes());
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Find `commit_ref` in one document's chain: an exact id, or a prefix of at
/// least [`MIN_COMMIT_PREFIX`] chars matching exactly one commit.
fn resolve_ref<'c>(
    chain: &'c [(CommitSummary, String)],
    commit_ref: &str,
    filename: &str,
) -> Result<&'c (CommitSummary, String), AppError> {
    if let Some(exact) = chain.iter().find(|(summary, _)| summary.id == commit_ref) {
        return Ok(exact);
    }

    let missing = || {
        AppError::NotFound(format!(
            "Commit {} not found for document {}",
            commit_ref, filename
        ))
    };
    if commit_ref.len() < MIN_COMMIT_PREFIX {
        return Err(missing());
    }

    let mut found = chain
        .iter()
        .filter(|(summary, _)| summary.id.starts_with(commit_ref));
    let first = found.next().ok_or_else(missing)?;
    if found.next().is_some() {
        return Err(AppError::Validation(format!(
            "Commit prefix {} is ambiguous for document {}",
            commit_ref, filename
        )));
    }
    Ok(first)
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ts.to_string())
}

fn not_found(filename: &str) -> AppError {
    AppError::NotFound(format!("Document {} not found", filename))
}

fn commit_from_row(row: &sqlx::sqlite::SqliteRow) -> CommitSummary {
    let timestamp: i64 = row.get("timestamp");
    CommitSummary {
        id: row.get("id"),
        parent_id: row.get("parent_id"),
        author: row.get("author"),
        email: row.get("email"),
        message: row.get("message"),
        timestamp,
        date: format_timestamp(timestamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;

    fn sig(ts: i64) -> CommitAuthor<'static> {
        CommitAuthor {
            author: "Alice",
            email: "alice@example.com",
            message: "edit",
            timestamp: ts,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let commit = CommitStore::put(&mut conn, "intro", "# intro\nHello", &sig(100))
            .await
            .unwrap();
        assert!(commit.parent_id.is_none());
        assert_eq!(commit.id.len(), 64);

        let (content, head) = CommitStore::get(&mut conn, "intro").await.unwrap();
        assert_eq!(content, "# intro\nHello");
        assert_eq!(head, commit.id);
    }

    #[tokio::test]
    async fn test_history_is_parent_chain() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        // Equal timestamps: chain order must still decide.
        let mut ids = Vec::new();
        for i in 0..4 {
            let c = CommitStore::put(&mut conn, "page", &format!("v{}", i), &sig(50))
                .await
                .unwrap();
            ids.push(c.id);
        }

        let history = CommitStore::history(&mut conn, "page").await.unwrap();
        assert_eq!(history.len(), 4);
        let newest_first: Vec<String> = ids.iter().rev().cloned().collect();
        let got: Vec<String> = history.iter().map(|c| c.id.clone()).collect();
        assert_eq!(got, newest_first);

        for pair in history.windows(2) {
            assert_eq!(pair[0].parent_id.as_deref(), Some(pair[1].id.as_str()));
        }
        assert!(history.last().unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn test_identical_content_shares_blob_but_not_id() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let a = CommitStore::put(&mut conn, "a", "same text", &sig(1)).await.unwrap();
        let b = CommitStore::put(&mut conn, "b", "same text", &sig(1)).await.unwrap();
        let a2 = CommitStore::put(&mut conn, "a", "same text", &sig(1)).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.id, a2.id);

        let row = sqlx::query("SELECT COUNT(*) AS n FROM blobs")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        let blobs: i64 = row.get("n");
        assert_eq!(blobs, 1);
    }

    #[tokio::test]
    async fn test_get_version_by_id_and_prefix() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = CommitStore::put(&mut conn, "doc", "first", &sig(1)).await.unwrap();
        CommitStore::put(&mut conn, "doc", "second", &sig(2)).await.unwrap();

        let (content, info) = CommitStore::get_version(&mut conn, "doc", &first.id)
            .await
            .unwrap();
        assert_eq!(content, "first");
        assert_eq!(info.id, first.id);

        let (content, _) = CommitStore::get_version(&mut conn, "doc", &first.id[..12])
            .await
            .unwrap();
        assert_eq!(content, "first");

        let short = CommitStore::get_version(&mut conn, "doc", &first.id[..2]).await;
        assert!(matches!(short, Err(AppError::NotFound(_))));
    }

    fn fake_chain(ids: &[&str]) -> Vec<(CommitSummary, String)> {
        ids.iter()
            .map(|id| {
                let summary = CommitSummary {
                    id: id.to_string(),
                    parent_id: None,
                    author: "Alice".to_string(),
                    email: "alice@example.com".to_string(),
                    message: "edit".to_string(),
                    timestamp: 0,
                    date: format_timestamp(0),
                };
                (summary, format!("blob-{}", id))
            })
            .collect()
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        let chain = fake_chain(&["abcd1111", "abcd2222", "ffff0000"]);

        let (unique, blob) = resolve_ref(&chain, "abcd2", "doc").unwrap();
        assert_eq!(unique.id, "abcd2222");
        assert_eq!(blob, "blob-abcd2222");

        assert!(matches!(
            resolve_ref(&chain, "abcd", "doc"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            resolve_ref(&chain, "abc", "doc"),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            resolve_ref(&chain, "0123", "doc"),
            Err(AppError::NotFound(_))
        ));

        // A full id wins even when it prefixes another one.
        let nested = fake_chain(&["abcd", "abcdef"]);
        assert_eq!(resolve_ref(&nested, "abcd", "doc").unwrap().0.id, "abcd");
    }

    #[tokio::test]
    async fn test_version_ids_are_scoped_to_document() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let other = CommitStore::put(&mut conn, "other", "text", &sig(1)).await.unwrap();
        CommitStore::put(&mut conn, "doc", "text", &sig(1)).await.unwrap();

        let result = CommitStore::get_version(&mut conn, "doc", &other.id).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_document() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        assert!(matches!(
            CommitStore::get(&mut conn, "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            CommitStore::history(&mut conn, "nope").await,
            Err(AppError::NotFound(_))
        ));
        assert!(!CommitStore::delete(&mut conn, "nope").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_drops_chain_keeps_blobs() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        CommitStore::put(&mut conn, "gone", "body", &sig(1)).await.unwrap();
        CommitStore::put(&mut conn, "gone", "body 2", &sig(2)).await.unwrap();
        assert!(CommitStore::delete(&mut conn, "gone").await.unwrap());

        assert!(CommitStore::list(&mut conn).await.unwrap().is_empty());
        let row = sqlx::query("SELECT COUNT(*) AS n FROM commits")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        let commits: i64 = row.get("n");
        assert_eq!(commits, 0);

        // Re-creating starts a fresh root.
        let again = CommitStore::put(&mut conn, "gone", "body", &sig(3)).await.unwrap();
        assert!(again.parent_id.is_none());
        assert_eq!(CommitStore::history(&mut conn, "gone").await.unwrap().len(), 1);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
