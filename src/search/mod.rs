//! In-memory search index over the current revision of every document.
//!
//! Queries are literal, case-insensitive substrings. The term index narrows
//! the candidate set for single-word queries; every candidate is then counted
//! exactly against its case-folded content, so `matches` is always the real
//! number of non-overlapping occurrences.
//!
//! Updates are two-phase: [`SearchIndex::stage`] does the tokenizing without
//! touching shared state, and [`SearchWriteGuard::apply`] swaps the prepared
//! entry in. The engine applies it only after its SQL commit, under a short
//! write guard, so search readers never see content the store has not
//! committed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

use crate::errors::AppError;
use crate::models::{SearchHit, SearchResults};

/// Cancellation is polled once per this many vocabulary terms.
const TERM_POLL_INTERVAL: usize = 1024;

/// Occurrence data for one term in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub filename: String,
    pub occurrences: usize,
    /// Byte offset of the first occurrence in the original content.
    pub first_offset: usize,
}

/// Case-folded copy of a document with a map back to original byte offsets.
#[derive(Debug, Clone)]
struct Folded {
    text: String,
    /// `origin[i]` is the original offset of the char that produced folded
    /// byte `i`, plus a trailing entry for the end. `None` when folding kept
    /// every char at the same width, so offsets are identical.
    origin: Option<Vec<usize>>,
}

impl Folded {
    fn new(text: &str) -> Self {
        let mut folded = String::with_capacity(text.len());
        let mut origin: Option<Vec<usize>> = None;

        for (offset, c) in text.char_indices() {
            let start = folded.len();
            folded.extend(c.to_lowercase());
            let width = folded.len() - start;

            if origin.is_none() && width != c.len_utf8() {
                origin = Some((0..start).collect());
            }
            if let Some(map) = origin.as_mut() {
                map.extend(std::iter::repeat(offset).take(width));
            }
        }
        if let Some(map) = origin.as_mut() {
            map.push(text.len());
        }

        Self {
            text: folded,
            origin,
        }
    }

    fn original_offset(&self, folded_offset: usize) -> usize {
        match &self.origin {
            Some(map) => map[folded_offset],
            None => folded_offset,
        }
    }
}

/// Case folding used for content, terms and queries alike.
pub fn fold(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Split content into folded word tokens with their original byte offsets.
pub fn tokenize(content: &str) -> Vec<(String, usize)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    for (offset, c) in content.char_indices() {
        match (is_word_char(c), start) {
            (true, None) => start = Some(offset),
            (false, Some(s)) => {
                tokens.push((fold(&content[s..offset]), s));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        tokens.push((fold(&content[s..]), s));
    }
    tokens
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    content: String,
    folded: Folded,
    terms: Vec<String>,
}

/// Tokenized document waiting to be applied.
#[derive(Debug)]
pub struct StagedDocument {
    filename: String,
    document: IndexedDocument,
    postings: Vec<(String, Posting)>,
}

#[derive(Default)]
struct IndexState {
    documents: BTreeMap<String, IndexedDocument>,
    /// term -> postings ordered by filename
    postings: HashMap<String, Vec<Posting>>,
}

impl IndexState {
    fn remove(&mut self, filename: &str) -> bool {
        let Some(old) = self.documents.remove(filename) else {
            return false;
        };
        for term in old.terms {
            if let Some(list) = self.postings.get_mut(&term) {
                list.retain(|p| p.filename != filename);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        true
    }

    fn apply(&mut self, staged: StagedDocument) {
        self.remove(&staged.filename);
        for (term, posting) in staged.postings {
            let list = self.postings.entry(term).or_default();
            let at = list
                .binary_search_by(|p| p.filename.as_str().cmp(posting.filename.as_str()))
                .unwrap_or_else(|i| i);
            list.insert(at, posting);
        }
        self.documents.insert(staged.filename, staged.document);
    }
}

/// Exclusive access to the index; changes become visible when dropped.
pub struct SearchWriteGuard<'a> {
    state: RwLockWriteGuard<'a, IndexState>,
}

impl SearchWriteGuard<'_> {
    pub fn apply(&mut self, staged: StagedDocument) {
        self.state.apply(staged);
    }

    pub fn remove(&mut self, filename: &str) -> bool {
        self.state.remove(filename)
    }
}

/// Search index over current document content.
pub struct SearchIndex {
    state: RwLock<IndexState>,
    preview_radius: usize,
}

impl SearchIndex {
    pub fn new(preview_radius: usize) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            preview_radius,
        }
    }

    /// Tokenize `content` for `filename` without touching the index.
    pub fn stage(filename: &str, content: &str) -> StagedDocument {
        let mut per_term: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for (term, offset) in tokenize(content) {
            per_term
                .entry(term)
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, offset));
        }

        let terms: Vec<String> = per_term.keys().cloned().collect();
        let postings = per_term
            .into_iter()
            .map(|(term, (occurrences, first_offset))| {
                (
                    term,
                    Posting {
                        filename: filename.to_string(),
                        occurrences,
                        first_offset,
                    },
                )
            })
            .collect();

        StagedDocument {
            filename: filename.to_string(),
            document: IndexedDocument {
                content: content.to_string(),
                folded: Folded::new(content),
                terms,
            },
            postings,
        }
    }

    pub async fn write(&self) -> SearchWriteGuard<'_> {
        SearchWriteGuard {
            state: self.state.write().await,
        }
    }

    /// Drop everything and index `documents` from scratch.
    pub async fn rebuild(&self, documents: Vec<(String, String)>) {
        let staged: Vec<StagedDocument> = documents
            .iter()
            .map(|(filename, content)| Self::stage(filename, content))
            .collect();

        let mut state = self.state.write().await;
        *state = IndexState::default();
        for doc in staged {
            state.apply(doc);
        }
        tracing::info!("Search index rebuilt with {} documents", state.documents.len());
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.documents.len()
    }

    /// Literal case-insensitive substring search over current content.
    ///
    /// Results are ranked by match count descending, then filename ascending.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<SearchResults, AppError> {
        let needle = fold(query);
        if needle.is_empty() {
            return Err(AppError::Validation(
                "Search query cannot be empty".to_string(),
            ));
        }

        let state = self.state.read().await;
        let candidates = candidates(&state, &needle, cancel)?;

        let mut results = Vec::new();
        for filename in candidates {
            if cancel.is_cancelled() {
                return Err(cancelled(query));
            }
            let Some(doc) = state.documents.get(filename) else {
                continue;
            };

            let mut found = doc.folded.text.match_indices(needle.as_str());
            let Some((first, _)) = found.next() else {
                continue;
            };
            let matches = 1 + found.count();

            results.push(SearchHit {
                filename: filename.to_string(),
                content_preview: preview(doc, first, needle.len(), self.preview_radius),
                matches,
            });
        }

        results.sort_by(|a, b| {
            b.matches
                .cmp(&a.matches)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        let total_matches = results.iter().map(|r| r.matches).sum();

        tracing::debug!(
            "Search {:?}: {} documents, {} matches",
            needle,
            results.len(),
            total_matches
        );

        Ok(SearchResults {
            results,
            query: needle,
            total_matches,
        })
    }
}

/// Shared hold on the index, standing in for a long-running search.
#[cfg(test)]
pub struct SearchReadHold<'a>(#[allow(dead_code)] tokio::sync::RwLockReadGuard<'a, IndexState>);

#[cfg(test)]
impl SearchIndex {
    pub async fn hold_read(&self) -> SearchReadHold<'_> {
        SearchReadHold(self.state.read().await)
    }

    /// Replace all postings for `filename` with ones computed from `content`.
    pub async fn index(&self, filename: &str, content: &str) {
        let staged = Self::stage(filename, content);
        self.write().await.apply(staged);
    }

    /// Strip all postings for a deleted document.
    pub async fn remove_document(&self, filename: &str) -> bool {
        self.write().await.remove(filename)
    }

    /// Postings for a single folded term.
    pub async fn postings(&self, term: &str) -> Vec<Posting> {
        self.state
            .read()
            .await
            .postings
            .get(&fold(term))
            .cloned()
            .unwrap_or_default()
    }
}

/// Documents that can contain `needle`.
///
/// A needle made only of word chars can only occur inside a single token, so
/// scanning the vocabulary is enough. Anything else falls back to every document.
fn candidates<'a>(
    state: &'a IndexState,
    needle: &str,
    cancel: &CancellationToken,
) -> Result<BTreeSet<&'a str>, AppError> {
    if !needle.chars().all(is_word_char) {
        return Ok(state.documents.keys().map(String::as_str).collect());
    }

    let mut set = BTreeSet::new();
    for (i, (term, postings)) in state.postings.iter().enumerate() {
        if i % TERM_POLL_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(cancelled(needle));
        }
        if term.contains(needle) {
            set.extend(postings.iter().map(|p| p.filename.as_str()));
        }
    }
    Ok(set)
}

/// Window of `radius` chars on each side of the first match, clipped at the
/// document boundaries.
fn preview(doc: &IndexedDocument, folded_start: usize, needle_len: usize, radius: usize) -> String {
    let content = doc.content.as_str();
    let start = doc.folded.original_offset(folded_start);
    let end = doc
        .folded
        .original_offset(folded_start + needle_len)
        .max(start);

    let begin = content[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let finish = content[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(content.len());

    content[begin..finish].to_string()
}

fn cancelled(query: &str) -> AppError {
    AppError::Cancelled(format!("Search for {:?} was cancelled", query))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn index_with(docs: &[(&str, &str)]) -> SearchIndex {
        let index = SearchIndex::new(100);
        for (name, content) in docs {
            index.index(name, content).await;
        }
        index
    }

    #[test]
    fn test_tokenize() {
        let tokens = tokenize("# Hello, World_2 héllo");
        assert_eq!(
            tokens,
            vec![
                ("hello".to_string(), 2),
                ("world_2".to_string(), 9),
                ("héllo".to_string(), 17),
            ]
        );
    }

    #[tokio::test]
    async fn test_reindex_replaces_postings() {
        let index = index_with(&[("doc", "apple apple banana")]).await;

        let apple = index.postings("Apple").await;
        assert_eq!(apple.len(), 1);
        assert_eq!(apple[0].occurrences, 2);
        assert_eq!(apple[0].first_offset, 0);

        index.index("doc", "cherry").await;
        assert!(index.postings("apple").await.is_empty());
        assert_eq!(index.postings("cherry").await.len(), 1);

        assert!(index.remove_document("doc").await);
        assert!(index.postings("cherry").await.is_empty());
        assert_eq!(index.len().await, 0);
    }

    #[tokio::test]
    async fn test_substring_case_insensitive() {
        let index = index_with(&[
            ("intro", "# intro\nHello world"),
            ("other", "Say HELLO, hello and hello again"),
            ("none", "nothing to see"),
        ])
        .await;
        let token = CancellationToken::new();

        let results = index.search("hello", &token).await.unwrap();
        assert_eq!(results.results.len(), 2);
        assert_eq!(results.results[0].filename, "other");
        assert_eq!(results.results[0].matches, 3);
        assert_eq!(results.results[1].filename, "intro");
        assert_eq!(results.results[1].matches, 1);
        assert_eq!(results.total_matches, 4);

        // Inside a word.
        let partial = index.search("ELL", &token).await.unwrap();
        assert_eq!(partial.total_matches, 4);

        // Spans a word boundary: full scan path.
        let phrase = index.search("o w", &token).await.unwrap();
        assert_eq!(phrase.results.len(), 1);
        assert_eq!(phrase.results[0].filename, "intro");
    }

    #[tokio::test]
    async fn test_ties_sorted_by_filename() {
        let index = index_with(&[("zeta", "needle"), ("alpha", "needle"), ("mid", "needle")]).await;
        let results = index
            .search("needle", &CancellationToken::new())
            .await
            .unwrap();
        let names: Vec<&str> = results.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_preview_window_is_clipped() {
        let body = format!("{}TARGET{}", "a ".repeat(200), "b ".repeat(200));
        let index = SearchIndex::new(10);
        index.index("long", &body).await;

        let results = index
            .search("target", &CancellationToken::new())
            .await
            .unwrap();
        let preview = &results.results[0].content_preview;
        assert_eq!(preview, &format!("{}TARGET{}", "a ".repeat(5), "b ".repeat(5)));

        index.index("short", "target here").await;
        let results = index
            .search("target", &CancellationToken::new())
            .await
            .unwrap();
        let short = results
            .results
            .iter()
            .find(|r| r.filename == "short")
            .unwrap();
        assert_eq!(short.content_preview, "target here");
    }

    #[tokio::test]
    async fn test_preview_maps_offsets_after_case_folding() {
        // 'İ' folds to two chars, shifting folded offsets.
        let index = SearchIndex::new(3);
        index.index("city", "İİ Istanbul").await;

        let results = index
            .search("stan", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(results.results[0].matches, 1);
        assert_eq!(results.results[0].content_preview, "İ Istanbul");
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let index = SearchIndex::new(100);
        let result = index.search("", &CancellationToken::new()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_cancelled_search_returns_no_partial_results() {
        let index = index_with(&[("a", "hello"), ("b", "hello")]).await;
        let token = CancellationToken::new();
        token.cancel();

        let result = index.search("hello", &token).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_staged_update_invisible_until_applied() {
        let index = index_with(&[("doc", "old words")]).await;
        let staged = SearchIndex::stage("doc", "new words");

        let before = index
            .search("new", &CancellationToken::new())
            .await
            .unwrap();
        assert!(before.results.is_empty());

        index.write().await.apply(staged);
        let after = index
            .search("new", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(after.results.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild() {
        let index = index_with(&[("stale", "gone")]).await;
        index
            .rebuild(vec![("fresh".to_string(), "brand new".to_string())])
            .await;
        assert_eq!(index.len().await, 1);
        assert!(index.postings("gone").await.is_empty());
    }
}
