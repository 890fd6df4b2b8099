//! Title/tag metadata and the tag inverted index.
//!
//! `document_tags` is keyed by `(tag, filename)` and serves both directions:
//! a record's tags and a tag's documents are read from the same rows, and
//! every change goes through the caller's transaction.

use std::collections::BTreeSet;

use sqlx::{Row, SqliteConnection};

use crate::db::CommitStore;
use crate::errors::AppError;
use crate::models::MetadataRecord;

pub struct MetadataIndex;

impl MetadataIndex {
    /// Stored record, or the default (`title = filename`, no tags).
    pub async fn get(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<MetadataRecord, AppError> {
        if !CommitStore::exists(conn, filename).await? {
            return Err(AppError::NotFound(format!("Document {} not found", filename)));
        }
        Self::get_unchecked(conn, filename).await
    }

    /// Like [`MetadataIndex::get`] without the existence check.
    pub async fn get_unchecked(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<MetadataRecord, AppError> {
        let row = sqlx::query("SELECT title FROM metadata WHERE filename = ?")
            .bind(filename)
            .fetch_optional(&mut *conn)
            .await?;

        let mut record = MetadataRecord::default_for(filename);
        if let Some(row) = row {
            record.title = row.get("title");
        }
        record.tags = Self::tags_for(conn, filename).await?;
        Ok(record)
    }

    /// Replace the record wholesale and move the tag index along with it.
    pub async fn set(
        conn: &mut SqliteConnection,
        filename: &str,
        title: &str,
        tags: &BTreeSet<String>,
    ) -> Result<MetadataRecord, AppError> {
        sqlx::query(
            r#"INSERT INTO metadata (filename, title) VALUES (?, ?)
               ON CONFLICT(filename) DO UPDATE SET title = excluded.title"#,
        )
        .bind(filename)
        .bind(title)
        .execute(&mut *conn)
        .await?;

        let current = Self::tags_for(conn, filename).await?;

        for removed in current.difference(tags) {
            sqlx::query("DELETE FROM document_tags WHERE tag = ? AND filename = ?")
                .bind(removed)
                .bind(filename)
                .execute(&mut *conn)
                .await?;
        }

        for added in tags.difference(&current) {
            sqlx::query("INSERT INTO document_tags (tag, filename) VALUES (?, ?)")
                .bind(added)
                .bind(filename)
                .execute(&mut *conn)
                .await?;
        }

        Ok(MetadataRecord {
            filename: filename.to_string(),
            title: title.to_string(),
            tags: tags.clone(),
        })
    }

    /// Create the default record if none exists yet.
    pub async fn touch(conn: &mut SqliteConnection, filename: &str) -> Result<(), AppError> {
        sqlx::query("INSERT OR IGNORE INTO metadata (filename, title) VALUES (?, ?)")
            .bind(filename)
            .bind(filename)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Drop the record and every tag posting for `filename`.
    pub async fn remove(conn: &mut SqliteConnection, filename: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM document_tags WHERE filename = ?")
            .bind(filename)
            .execute(&mut *conn)
            .await?;
        sqlx::query("DELETE FROM metadata WHERE filename = ?")
            .bind(filename)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub async fn tags_for(
        conn: &mut SqliteConnection,
        filename: &str,
    ) -> Result<BTreeSet<String>, AppError> {
        let rows = sqlx::query("SELECT tag FROM document_tags WHERE filename = ?")
            .bind(filename)
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("tag")).collect())
    }

    /// Every tag carried by at least one document, ascending.
    pub async fn all_tags(conn: &mut SqliteConnection) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query("SELECT DISTINCT tag FROM document_tags ORDER BY tag")
            .fetch_all(&mut *conn)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("tag")).collect())
    }

    /// Filenames carrying `tag`, ascending. Unknown tags give an empty list.
    pub async fn documents_by_tag(
        conn: &mut SqliteConnection,
        tag: &str,
    ) -> Result<Vec<String>, AppError> {
        let rows =
            sqlx::query("SELECT filename FROM document_tags WHERE tag = ? ORDER BY filename")
                .bind(tag)
                .fetch_all(&mut *conn)
                .await?;
        Ok(rows.into_iter().map(|r| r.get("filename")).collect())
    }
}

/// Trim tags and reject blanks and duplicates.
pub fn normalize_tags(raw: &[String]) -> Result<BTreeSet<String>, AppError> {
    let mut tags = BTreeSet::new();
    for tag in raw {
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(AppError::Validation("Tags must not be empty".to_string()));
        }
        if !tags.insert(trimmed.to_string()) {
            return Err(AppError::Validation(format!("Duplicate tag: {}", trimmed)));
        }
    }
    Ok(tags)
}

/// Blank titles fall back to the filename.
pub fn normalize_title(title: Option<&str>, filename: &str) -> String {
    match title.map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => filename.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::temp_pool;
    use crate::db::CommitAuthor;

    async fn seed(conn: &mut SqliteConnection, filename: &str) {
        let sig = CommitAuthor {
            author: "a",
            email: "a@example.com",
            message: "seed",
            timestamp: 1,
        };
        CommitStore::put(conn, filename, "body", &sig).await.unwrap();
    }

    fn set_of(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_default_record() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed(&mut conn, "intro").await;

        let record = MetadataIndex::get(&mut conn, "intro").await.unwrap();
        assert_eq!(record, MetadataRecord::default_for("intro"));

        let missing = MetadataIndex::get(&mut conn, "ghost").await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_set_updates_inverted_index() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed(&mut conn, "intro").await;
        seed(&mut conn, "setup").await;

        MetadataIndex::set(&mut conn, "intro", "Intro Guide", &set_of(&["intro", "guide"]))
            .await
            .unwrap();
        MetadataIndex::set(&mut conn, "setup", "Setup", &set_of(&["guide"]))
            .await
            .unwrap();

        assert_eq!(
            MetadataIndex::all_tags(&mut conn).await.unwrap(),
            vec!["guide", "intro"]
        );
        assert_eq!(
            MetadataIndex::documents_by_tag(&mut conn, "guide").await.unwrap(),
            vec!["intro", "setup"]
        );

        // Replace: "guide" removed from intro, "howto" added.
        MetadataIndex::set(&mut conn, "intro", "Intro", &set_of(&["intro", "howto"]))
            .await
            .unwrap();
        assert_eq!(
            MetadataIndex::documents_by_tag(&mut conn, "guide").await.unwrap(),
            vec!["setup"]
        );
        assert_eq!(
            MetadataIndex::all_tags(&mut conn).await.unwrap(),
            vec!["guide", "howto", "intro"]
        );

        let record = MetadataIndex::get(&mut conn, "intro").await.unwrap();
        assert_eq!(record.title, "Intro");
        assert_eq!(record.tags, set_of(&["howto", "intro"]));
    }

    #[tokio::test]
    async fn test_unknown_tag_is_empty() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(MetadataIndex::documents_by_tag(&mut conn, "nothing")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_remove_clears_tags() {
        let (pool, _dir) = temp_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed(&mut conn, "doc").await;

        MetadataIndex::set(&mut conn, "doc", "Doc", &set_of(&["solo"]))
            .await
            .unwrap();
        MetadataIndex::remove(&mut conn, "doc").await.unwrap();

        assert!(MetadataIndex::all_tags(&mut conn).await.unwrap().is_empty());
        let record = MetadataIndex::get_unchecked(&mut conn, "doc").await.unwrap();
        assert_eq!(record.title, "doc");
    }

    #[test]
    fn test_normalize_tags() {
        let tags = normalize_tags(&[" rust ".to_string(), "Rust".to_string()]).unwrap();
        assert_eq!(tags, set_of(&["Rust", "rust"]));

        assert!(matches!(
            normalize_tags(&["ok".to_string(), "  ".to_string()]),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            normalize_tags(&["dup".to_string(), " dup".to_string()]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_normalize_title() {
        assert_eq!(normalize_title(Some("  Guide "), "intro"), "Guide");
        assert_eq!(normalize_title(Some("   "), "intro"), "intro");
        assert_eq!(normalize_title(None, "intro"), "intro");
    }
}
