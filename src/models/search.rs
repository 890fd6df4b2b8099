//! Search response models.

use serde::{Deserialize, Serialize};

/// One matching document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub filename: String,
    pub content_preview: String,
    pub matches: usize,
}

/// Ranked search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    pub query: String,
    pub total_matches: usize,
}
