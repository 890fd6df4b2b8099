//! View and update activity per document.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Activity ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub filename: String,
    pub view_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Document listing row used by the recent and by-tag views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub filename: String,
    pub title: String,
    pub tags: BTreeSet<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub view_count: i64,
}

/// Response wrapper for document listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummaries {
    pub documents: Vec<DocumentSummary>,
}
