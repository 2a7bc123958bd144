//! In-memory similarity index over note documents.
//!
//! [`VectorIndex`] keeps one *generation* of `(id, embedding, text)` entries in
//! a dense row-major matrix and answers queries with an exhaustive cosine scan.
//! Entries are append-only and ids are unique within a generation. A rebuild
//! encodes a complete shadow generation first and swaps it in under the lock,
//! so a query never observes a half-built index.
//!
//! Every public operation degrades instead of failing: a missing embedding
//! capability, an encoder error, or a corrupt snapshot is logged and turns
//! into a no-op or an empty result.

pub mod snapshot;

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use snapshot::Snapshot;

/// Neighbours returned when the caller does not ask for a specific count.
pub const DEFAULT_SEARCH_K: usize = 5;

/// Texts per `embed_batch` call.
const ENCODE_BATCH: usize = 32;

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

/// Position of the index when a rebuild started reading its source.
///
/// Entries added after the mark are carried into the rebuilt generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildMark {
    generation: u64,
    len: usize,
}

/// Result of [`VectorIndex::load_snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotLoad {
    Loaded(usize),
    NotFound,
}

#[derive(Default)]
struct Generation {
    number: u64,
    ids: Vec<String>,
    texts: Vec<String>,
    /// `None` until the first vector fixes the width.
    embeddings: Option<Array2<f32>>,
    id_set: HashSet<String>,
}

impl Generation {
    fn len(&self) -> usize {
        self.ids.len()
    }

    /// Append encoded entries, skipping ids already present. Returns how many
    /// were added.
    fn append(&mut self, texts: Vec<String>, ids: Vec<String>, vectors: Vec<Vec<f32>>) -> usize {
        let mut added = 0;
        for ((text, id), vector) in texts.into_iter().zip(ids).zip(vectors) {
            if self.push(id, text, ArrayView1::from(vector.as_slice())) {
                added += 1;
            }
        }
        added
    }

    /// Copy rows `from_row..` of `other` whose ids are not present here.
    fn carry_over(&mut self, other: &Generation, from_row: usize) -> usize {
        let Some(matrix) = other.embeddings.as_ref() else {
            return 0;
        };
        let mut carried = 0;
        for row in from_row..other.len() {
            if self.push(other.ids[row].clone(), other.texts[row].clone(), matrix.row(row)) {
                carried += 1;
            }
        }
        carried
    }

    fn push(&mut self, id: String, text: String, vector: ArrayView1<'_, f32>) -> bool {
        if self.id_set.contains(&id) {
            tracing::debug!(doc_id = %id, "id already indexed in this generation, skipping");
            return false;
        }
        let matrix = self
            .embeddings
            .get_or_insert_with(|| Array2::zeros((0, vector.len())));
        if let Err(e) = matrix.push_row(vector) {
            tracing::warn!(doc_id = %id, error = %e, "embedding width mismatch, skipping entry");
            return false;
        }
        self.id_set.insert(id.clone());
        self.ids.push(id);
        self.texts.push(text);
        true
    }

    fn from_snapshot(number: u64, snapshot: Snapshot) -> Self {
        let id_set = snapshot.ids.iter().cloned().collect();
        Self {
            number,
            embeddings: (!snapshot.ids.is_empty()).then_some(snapshot.embeddings),
            ids: snapshot.ids,
            texts: snapshot.texts,
            id_set,
        }
    }
}

pub struct VectorIndex {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    snapshot_path: Option<PathBuf>,
    state: Mutex<Generation>,
}

impl VectorIndex {
    /// `provider: None` builds an index whose operations are all no-ops.
    /// `snapshot_path: None` keeps the index purely in memory.
    pub fn new(provider: Option<Arc<dyn EmbeddingProvider>>, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            provider,
            snapshot_path,
            state: Mutex::new(Generation::default()),
        }
    }

    /// Whether an embedding capability is present.
    pub fn is_available(&self) -> bool {
        self.provider.is_some()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.provider.as_deref().map(|p| p.model_id())
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Incremented by every reset, rebuild, and snapshot load.
    pub fn generation(&self) -> u64 {
        self.lock().number
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().id_set.contains(id)
    }

    /// Encode `texts` and append them under `ids`. Returns the number of new
    /// entries. Ids already present in the current generation are skipped.
    pub fn add_documents(&self, texts: Vec<String>, ids: Vec<String>) -> usize {
        let Some(provider) = self.provider.as_deref() else {
            tracing::debug!("embedding capability unavailable, add_documents is a no-op");
            return 0;
        };
        if texts.is_empty() {
            return 0;
        }
        if texts.len() != ids.len() {
            tracing::warn!(
                texts = texts.len(),
                ids = ids.len(),
                "texts and ids differ in length, nothing added"
            );
            return 0;
        }

        let vectors = match encode(provider, &texts) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, count = texts.len(), "failed to encode documents");
                return 0;
            }
        };

        let mut state = self.lock();
        let added = state.append(texts, ids, vectors);
        if added > 0 {
            self.persist(&state);
        }
        tracing::debug!(added, total = state.len(), generation = state.number, "documents indexed");
        added
    }

    /// Top-`k` entries by cosine similarity to `query`, best first. Equal
    /// scores keep insertion order.
    pub fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        let Some(provider) = self.provider.as_deref() else {
            return vec![];
        };
        if k == 0 || self.is_empty() {
            return vec![];
        }

        let query_vec = match provider.embed(query) {
            Ok(v) => Array1::from(v),
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode query");
                return vec![];
            }
        };

        let state = self.lock();
        let Some(matrix) = state.embeddings.as_ref() else {
            return vec![];
        };
        if matrix.ncols() != query_vec.len() {
            tracing::warn!(
                index_width = matrix.ncols(),
                query_width = query_vec.len(),
                "query width does not match the index"
            );
            return vec![];
        }

        let scores = cosine_scores(matrix, &query_vec);
        let mut ranked: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        ranked
            .into_iter()
            .take(k)
            .map(|(row, score)| SearchHit {
                id: state.ids[row].clone(),
                score,
            })
            .collect()
    }

    /// Drop every entry, start a new generation, and delete the snapshot.
    pub fn reset(&self) {
        let mut state = self.lock();
        let next = state.number + 1;
        *state = Generation {
            number: next,
            ..Generation::default()
        };
        if let Some(path) = &self.snapshot_path {
            if let Err(e) = snapshot::remove(path) {
                tracing::warn!(error = %e, "failed to delete index snapshot");
            }
        }
        tracing::info!(generation = next, "vector index reset");
    }

    /// Where the index stands now. Take the mark before reading the documents
    /// to rebuild from.
    pub fn mark(&self) -> RebuildMark {
        let state = self.lock();
        RebuildMark {
            generation: state.number,
            len: state.len(),
        }
    }

    /// Replace the whole index with a freshly encoded generation.
    ///
    /// Encoding happens outside the lock. On failure the current generation
    /// stays in place and `None` is returned.
    pub fn rebuild(&self, texts: Vec<String>, ids: Vec<String>) -> Option<usize> {
        let mark = self.mark();
        self.rebuild_since(mark, texts, ids)
    }

    /// [`rebuild`](Self::rebuild) from documents read after `mark` was taken.
    /// Entries added since the mark and missing from `ids` survive the swap.
    pub fn rebuild_since(&self, mark: RebuildMark, texts: Vec<String>, ids: Vec<String>) -> Option<usize> {
        let Some(provider) = self.provider.as_deref() else {
            tracing::debug!("embedding capability unavailable, rebuild skipped");
            return None;
        };
        if texts.len() != ids.len() {
            tracing::error!(texts = texts.len(), ids = ids.len(), "rebuild input misaligned");
            return None;
        }

        let mut shadow = Generation::default();
        if !texts.is_empty() {
            match encode(provider, &texts) {
                Ok(vectors) => {
                    shadow.append(texts, ids, vectors);
                }
                Err(e) => {
                    tracing::error!(error = %e, "rebuild failed, keeping previous generation");
                    return None;
                }
            }
        }

        let mut state = self.lock();
        // A reset or another rebuild since the mark means every current entry
        // is newer than the mark.
        let from_row = if state.number == mark.generation { mark.len } else { 0 };
        let carried = shadow.carry_over(&state, from_row);
        if carried > 0 {
            tracing::info!(carried, "kept entries added while rebuilding");
        }
        shadow.number = state.number + 1;
        *state = shadow;
        let count = state.len();
        match &self.snapshot_path {
            Some(path) if count == 0 => {
                if let Err(e) = snapshot::remove(path) {
                    tracing::warn!(error = %e, "failed to delete index snapshot");
                }
            }
            _ => {
                self.persist(&state);
            }
        }
        tracing::info!(count, generation = state.number, "vector index rebuilt");
        Some(count)
    }

    /// Write the current generation to the snapshot path. Returns `false` when
    /// there is no path, nothing to write, or the write failed.
    pub fn save_snapshot(&self) -> bool {
        let state = self.lock();
        self.persist(&state)
    }

    /// Replace the in-memory state with the on-disk snapshot.
    ///
    /// An absent, unreadable, or foreign-model snapshot is reported as
    /// [`SnapshotLoad::NotFound`] and leaves the index untouched.
    pub fn load_snapshot(&self) -> SnapshotLoad {
        let Some(path) = &self.snapshot_path else {
            return SnapshotLoad::NotFound;
        };
        let loaded = match snapshot::read(path) {
            Ok(Some(s)) => s,
            Ok(None) => {
                tracing::debug!(path = %path.display(), "no index snapshot");
                return SnapshotLoad::NotFound;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt index snapshot");
                return SnapshotLoad::NotFound;
            }
        };

        if let Some(model) = self.model_id() {
            if loaded.model != model {
                tracing::warn!(
                    snapshot_model = %loaded.model,
                    current_model = %model,
                    "index snapshot was built with a different model, ignoring it"
                );
                return SnapshotLoad::NotFound;
            }
        }

        let count = loaded.ids.len();
        let mut state = self.lock();
        let next = state.number + 1;
        *state = Generation::from_snapshot(next, loaded);
        tracing::info!(count, path = %path.display(), "index snapshot loaded");
        SnapshotLoad::Loaded(count)
    }

    fn persist(&self, state: &Generation) -> bool {
        let (Some(path), Some(matrix)) = (&self.snapshot_path, &state.embeddings) else {
            return false;
        };
        let snap = Snapshot::new(
            self.model_id().unwrap_or_default(),
            state.texts.clone(),
            state.ids.clone(),
            matrix.clone(),
        );
        match snapshot::write(path, &snap) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to write index snapshot");
                false
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Generation> {
        // A panic mid-append leaves at worst a skipped entry; keep serving.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn encode(provider: &dyn EmbeddingProvider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut vectors = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(ENCODE_BATCH) {
        let refs: Vec<&str> = chunk.iter().map(String::as_str).collect();
        vectors.extend(provider.embed_batch(&refs)?);
    }
    anyhow::ensure!(
        vectors.len() == texts.len(),
        "provider returned {} vectors for {} texts",
        vectors.len(),
        texts.len()
    );
    Ok(vectors)
}

/// Cosine similarity of every row against `query`. Zero-norm rows score 0.0.
fn cosine_scores(matrix: &Array2<f32>, query: &Array1<f32>) -> Array1<f32> {
    let query_norm = query.dot(query).sqrt();
    let dots = matrix.dot(query);
    let norms = matrix.map_axis(Axis(1), |row| row.dot(&row).sqrt());
    ndarray::Zip::from(&dots)
        .and(&norms)
        .map_collect(|&dot, &norm| {
            if norm == 0.0 || query_norm == 0.0 {
                0.0
            } else {
                dot / (norm * query_norm)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::hashing::HashingEmbeddingProvider;
    use tempfile::TempDir;

    fn hashing() -> Arc<dyn EmbeddingProvider> {
        Arc::new(HashingEmbeddingProvider::new(512).unwrap())
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn capitals(index: &VectorIndex) {
        index.add_documents(
            strings(&["Paris is the capital of France", "Berlin is the capital of Germany"]),
            strings(&["1", "2"]),
        );
    }

    #[test]
    fn self_match_scores_one() {
        let index = VectorIndex::new(Some(hashing()), None);
        let texts = strings(&[
            "rust ownership and the borrow checker",
            "python garbage collector",
            "tokio async runtime futures",
        ]);
        assert_eq!(index.add_documents(texts.clone(), strings(&["a", "b", "c"])), 3);

        for (i, text) in texts.iter().enumerate() {
            let hits = index.search(text, DEFAULT_SEARCH_K);
            assert_eq!(hits[0].id, ["a", "b", "c"][i]);
            assert!((hits[0].score - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn closer_capital_wins() {
        let index = VectorIndex::new(Some(hashing()), None);
        capitals(&index);

        let all = index.search("capital of France", 2);
        assert_eq!(all[0].id, "1");
        assert!(all[0].score > all[1].score);

        let top = index.search("capital of France", 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].id, "1");
    }

    #[test]
    fn ties_keep_insertion_order() {
        let index = VectorIndex::new(Some(hashing()), None);
        index.add_documents(strings(&["same words", "same words"]), strings(&["x", "y"]));
        let hits = index.search("same words", 2);
        assert_eq!(hits[0].id, "x");
        assert_eq!(hits[1].id, "y");
    }

    #[test]
    fn duplicate_ids_are_skipped() {
        let index = VectorIndex::new(Some(hashing()), None);
        assert_eq!(index.add_documents(strings(&["one"]), strings(&["a"])), 1);
        assert_eq!(index.add_documents(strings(&["two", "three"]), strings(&["a", "b"])), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn unavailable_capability_is_a_no_op() {
        let index = VectorIndex::new(None, None);
        assert!(!index.is_available());
        assert_eq!(index.add_documents(strings(&["text"]), strings(&["a"])), 0);
        assert!(index.search("text", 5).is_empty());
        assert!(index.rebuild(strings(&["text"]), strings(&["a"])).is_none());
    }

    #[test]
    fn empty_or_misaligned_input_adds_nothing() {
        let index = VectorIndex::new(Some(hashing()), None);
        assert_eq!(index.add_documents(vec![], vec![]), 0);
        assert_eq!(index.add_documents(strings(&["a", "b"]), strings(&["1"])), 0);
        assert!(index.is_empty());
        assert!(index.search("anything", 5).is_empty());
    }

    #[test]
    fn reset_empties_index_and_deletes_snapshot() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.snapshot");
        let index = VectorIndex::new(Some(hashing()), Some(path.clone()));
        capitals(&index);
        assert!(path.exists());
        let before = index.generation();

        index.reset();

        assert!(index.search("capital", 5).is_empty());
        assert!(!path.exists());
        assert_eq!(index.generation(), before + 1);
    }

    #[test]
    fn rebuild_swaps_generation() {
        let index = VectorIndex::new(Some(hashing()), None);
        capitals(&index);
        let before = index.generation();

        let count = index.rebuild(strings(&["rust memory safety"]), strings(&["r"]));

        assert_eq!(count, Some(1));
        assert_eq!(index.generation(), before + 1);
        assert!(!index.contains("1"));
        assert_eq!(index.search("rust", 5)[0].id, "r");
    }

    #[test]
    fn snapshot_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.snapshot");

        let writer = VectorIndex::new(Some(hashing()), Some(path.clone()));
        capitals(&writer);
        let expected = writer.search("capital of France", 2);

        let reader = VectorIndex::new(Some(hashing()), Some(path));
        assert_eq!(reader.load_snapshot(), SnapshotLoad::Loaded(2));
        assert_eq!(reader.search("capital of France", 2), expected);
    }

    #[test]
    fn corrupt_snapshot_is_treated_as_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.snapshot");
        std::fs::write(&path, b"\x00\x01garbage").unwrap();

        let index = VectorIndex::new(Some(hashing()), Some(path));
        assert_eq!(index.load_snapshot(), SnapshotLoad::NotFound);
        assert!(index.is_empty());
    }

    #[test]
    fn snapshot_from_other_model_is_ignored() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.snapshot");
        let writer = VectorIndex::new(Some(hashing()), Some(path.clone()));
        capitals(&writer);

        let other: Arc<dyn EmbeddingProvider> = Arc::new(HashingEmbeddingProvider::new(64).unwrap());
        let reader = VectorIndex::new(Some(other), Some(path));
        assert_eq!(reader.load_snapshot(), SnapshotLoad::NotFound);
    }

    #[test]
    fn missing_snapshot_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let index = VectorIndex::new(Some(hashing()), Some(tmp.path().join("absent")));
        assert_eq!(index.load_snapshot(), SnapshotLoad::NotFound);
    }

    #[test]
    fn zero_norm_rows_score_zero() {
        let matrix = ndarray::array![[0.0, 0.0], [1.0, 0.0]];
        let scores = cosine_scores(&matrix, &ndarray::array![1.0, 0.0]);
        assert_eq!(scores.to_vec(), vec![0.0, 1.0]);
    }
}
