//! Title and tag metadata attached to documents.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Per-document metadata record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub filename: String,
    pub title: String,
    pub tags: BTreeSet<String>,
}

impl MetadataRecord {
    /// Record returned for documents that never had metadata written.
    pub fn default_for(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            title: filename.to_string(),
            tags: BTreeSet::new(),
        }
    }
}

/// Request body for replacing a document's metadata.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetMetadataRequest {
    /// Blank or missing titles fall back to the filename.
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// All tags currently in use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagsResponse {
    pub tags: Vec<String>,
}
