//! View counts and last-write times per document.

use sqlx::{Row, SqliteConnection};

use crate::db::MetadataIndex;
use crate::errors::AppError;
use crate::models::{ActivityRecord, DocumentSummary};

pub struct ActivityTracker;

impl ActivityTracker {
    /// Count one view. `updated_at` is left alone.
    pub async fn record_view(
        conn: &mut SqliteConnection,
        filename: &str,
        now: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO activity (filename, view_count, created_at, updated_at) VALUES (?, 1, ?, ?)
               ON CONFLICT(filename) DO UPDATE SET view_count = view_count + 1"#,
        )
        .bind(filename)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Stamp a write. `view_count` is left alone.
    pub async fn record_write(
        conn: &mut SqliteConnection,
        filename: &str,
        timestamp: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO activity (filename, view_count, created_at, updated_at) VALUES (?, 0, ?, ?)
               ON CONFLICT(filename) DO UPDATE SET updated_at = excluded.updated_at"#,
        )
        .bind(filename)
        .bind(timestamp)
        .bind(timestamp)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<Option<ActivityRecord>, AppError> {
        let row = sqlx::query(
            "SELECT filename, view_count, created_at, updated_at FROM activity WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(|r| ActivityRecord {
            filename: r.get("filename"),
            view_count: r.get("view_count"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    pub async fn remove(conn: &mut SqliteConnection, filename: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM activity WHERE filename = ?")
            .bind(filename)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Most recently updated documents, newest first, ties by filename.
    pub async fn recent(
        conn: &mut SqliteConnection,
        limit: i64,
    ) -> Result<Vec<DocumentSummary>, AppError> {
        if limit <= 0 {
            return Err(AppError::Validation(
                "limit must be a positive integer".to_string(),
            ));
        }

        let rows = sqlx::query(
            r#"SELECT a.filename AS filename
               FROM activity a
               JOIN documents d ON d.filename = a.filename
               ORDER BY a.updated_at DESC, a.filename ASC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in rows {
            let filename: String = row.get("filename");
            summaries.push(Self::summary(conn, &filename).await?);
        }
        Ok(summaries)
    }

    /// Listing row combining metadata and activity for one document.
    pub async fn summary(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<DocumentSummary, AppError> {
        let metadata = MetadataIndex::get_unchecked(conn, filename).await?;
        let activity = Self::get(conn, filename).await?;
        let (view_count, created_at, updated_at) = activity
            .map(|a| (a.view_count, a.created_at, a.updated_at))
            .unwrap_or((0, 0, 0));

        Ok(DocumentSummary {
            filename: metadata.filename,
            title: metadata.title,
            tags: metadata.tags,
            created_at,
            updated_at,
            view_count,
        })
    }
}
