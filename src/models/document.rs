//! Document and commit models for the version store.

use serde::{Deserialize, Serialize};

/// One entry in a document's history, without the snapshot body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    pub id: String,
    /// Previous commit in this document's chain; `None` for the root commit.
    pub parent_id: Option<String>,
    pub author: String,
    pub email: String,
    pub message: String,
    /// Epoch seconds.
    pub timestamp: i64,
    /// `timestamp` rendered as RFC 3339.
    pub date: String,
}

/// Current snapshot of a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContent {
    pub filename: String,
    pub content: String,
    pub commit_id: String,
}

/// Historical snapshot of a document at a specific commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub filename: String,
    pub content: String,
    pub commit_info: CommitSummary,
}

/// Full history of a document, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHistory {
    pub filename: String,
    pub commits: Vec<CommitSummary>,
}

/// All documents with at least one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentList {
    pub documents: Vec<String>,
}

/// Request body for writing a document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WriteDocumentRequest {
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for creating a document that must not exist yet.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentRequest {
    pub filename: String,
    #[serde(flatten)]
    pub body: WriteDocumentRequest,
}

impl WriteDocumentRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self.email = Some(email.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}
