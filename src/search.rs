//! Note search: substring ranking, index similarity, or both.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;

use crate::index::VectorIndex;
use crate::notes::{DocumentStore, Note, NoteMatch};

/// Score for a query found in the title.
const TITLE_HIT: f64 = 5.0;
/// Score for a query found in the content.
const CONTENT_HIT: f64 = 1.0;
/// Index hits fetched per requested result when a vault filter will drop some.
const VAULT_OVERFETCH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
    Text,
    Semantic,
    #[default]
    Hybrid,
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown search mode: {other}. Use text, semantic, or hybrid")),
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
        })
    }
}

/// Which search produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Text,
    Semantic,
    Hybrid,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub note: Note,
    pub score: f64,
    pub match_kind: MatchKind,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub limit: usize,
    pub vault_id: Option<String>,
}

/// Run a search. Text-side store failures propagate; semantic lookups that
/// fail are logged and dropped. Every returned note has its retrieval
/// recorded.
pub fn search_notes(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    request: &SearchRequest,
    semantic_scale: f64,
) -> Result<Vec<SearchResult>> {
    let query = request.query.trim();
    anyhow::ensure!(!query.is_empty(), "search query is required");

    let text = match request.mode {
        SearchMode::Text | SearchMode::Hybrid => text_search(store, query)?,
        SearchMode::Semantic => vec![],
    };
    let semantic = match request.mode {
        SearchMode::Semantic | SearchMode::Hybrid => {
            let k = match request.vault_id {
                Some(_) => request.limit.saturating_mul(VAULT_OVERFETCH),
                None => request.limit,
            };
            semantic_search(store, index, query, k, semantic_scale)
        }
        SearchMode::Text => vec![],
    };

    let mut results = merge(text, semantic);
    if let Some(vault) = &request.vault_id {
        results.retain(|r| r.note.vault_id.as_deref() == Some(vault.as_str()));
    }
    sort_by_score(&mut results);
    results.truncate(request.limit);

    for result in &results {
        if let Err(e) = store.record_retrieval(&result.note.id) {
            tracing::warn!(note_id = %result.note.id, error = %e, "failed to record retrieval");
        }
    }

    tracing::debug!(query, mode = %request.mode, count = results.len(), "search complete");
    Ok(results)
}

fn text_search(store: &dyn DocumentStore, query: &str) -> Result<Vec<SearchResult>> {
    let needle = query.to_lowercase();
    let mut results: Vec<SearchResult> = store
        .find_notes(&NoteMatch::Text(query.to_string()))?
        .into_iter()
        .map(|note| {
            let mut score = 0.0;
            if note.title.to_lowercase().contains(&needle) {
                score += TITLE_HIT;
            }
            if note.content.to_lowercase().contains(&needle) {
                score += CONTENT_HIT;
            }
            SearchResult {
                note,
                score,
                match_kind: MatchKind::Text,
            }
        })
        .collect();
    sort_by_score(&mut results);
    Ok(results)
}

fn semantic_search(
    store: &dyn DocumentStore,
    index: &VectorIndex,
    query: &str,
    limit: usize,
    scale: f64,
) -> Vec<SearchResult> {
    index
        .search(query, limit)
        .into_iter()
        .filter_map(|hit| match store.find_note(&hit.id) {
            Ok(Some(note)) => Some(SearchResult {
                note,
                score: f64::from(hit.score) * scale,
                match_kind: MatchKind::Semantic,
            }),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(note_id = %hit.id, error = %e, "failed to load semantic hit");
                None
            }
        })
        .collect()
}

/// Union by note id. A note found by both searches sums its scores.
fn merge(text: Vec<SearchResult>, semantic: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::with_capacity(text.len() + semantic.len());
    let mut positions: HashMap<String, usize> = HashMap::new();
    for result in text.into_iter().chain(semantic) {
        match positions.get(&result.note.id) {
            Some(&i) => {
                merged[i].score += result.score;
                merged[i].match_kind = MatchKind::Hybrid;
            }
            None => {
                positions.insert(result.note.id.clone(), merged.len());
                merged.push(result);
            }
        }
    }
    merged
}

fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}
