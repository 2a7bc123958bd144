//! Per-note evolution and periodic consolidation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use super::{note_document, ApplyReport, RelationAnalyzer, SuggestionApplier};
use crate::completion::CompletionModel;
use crate::config::EvolutionConfig;
use crate::index::VectorIndex;
use crate::notes::DocumentStore;

/// Notes processed since the last consolidation.
///
/// Cloning shares the count. Lives as long as its owner; a restart starts
/// from zero again.
#[derive(Debug, Clone, Default)]
pub struct EvolutionCounter(Arc<AtomicUsize>);

impl EvolutionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one and return the new count.
    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    /// Reset to zero if the count has reached `threshold`. Returns whether it
    /// did. Only one of several racing callers wins.
    pub fn take_if_reached(&self, threshold: usize) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count >= threshold).then_some(0)
            })
            .is_ok()
    }
}

/// How [`EvolutionCoordinator::process_new_note`] ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Embedding or completion capability missing.
    Disabled,
    NotFound,
    NoRelatedNotes,
    Evolved {
        report: ApplyReport,
        consolidation: Option<ConsolidationOutcome>,
    },
}

/// How [`EvolutionCoordinator::consolidate_knowledge_base`] ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsolidationOutcome {
    Rebuilt { notes: usize, indexed: usize },
    /// No embedding capability.
    Disabled,
    /// Nothing was swapped in; the previous generation is still served.
    Failed,
}

#[derive(Clone)]
pub struct EvolutionCoordinator {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    analyzer: RelationAnalyzer,
    applier: SuggestionApplier,
    counter: EvolutionCounter,
    threshold: usize,
    related_k: usize,
    ai_enabled: bool,
}

impl EvolutionCoordinator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        completion: Option<Arc<dyn CompletionModel>>,
        config: &EvolutionConfig,
    ) -> Self {
        Self::with_counter(store, index, completion, config, EvolutionCounter::new())
    }

    /// Construct around an existing counter.
    pub fn with_counter(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        completion: Option<Arc<dyn CompletionModel>>,
        config: &EvolutionConfig,
        counter: EvolutionCounter,
    ) -> Self {
        let ai_enabled = index.is_available() && completion.is_some();
        if !ai_enabled {
            tracing::info!(
                embedding = index.is_available(),
                completion = completion.is_some(),
                "memory evolution disabled"
            );
        }
        Self {
            analyzer: RelationAnalyzer::new(store.clone(), index.clone(), completion),
            applier: SuggestionApplier::new(store.clone()),
            store,
            index,
            counter,
            threshold: config.threshold,
            related_k: config.related_k,
            ai_enabled,
        }
    }

    /// Both an embedding-backed index and a completion model are present.
    pub fn ai_enabled(&self) -> bool {
        self.ai_enabled
    }

    pub fn counter(&self) -> &EvolutionCounter {
        &self.counter
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn analyzer(&self) -> &RelationAnalyzer {
        &self.analyzer
    }

    /// Relate a freshly stored note to its neighbours.
    ///
    /// Counts the note first, whatever happens next. Must run before the
    /// note's own document is added to the index.
    pub async fn process_new_note(&self, note_id: &str) -> ProcessOutcome {
        let count = self.counter.increment();
        tracing::debug!(note_id, count, threshold = self.threshold, "processing new note");

        if !self.ai_enabled {
            return ProcessOutcome::Disabled;
        }

        let store = self.store.clone();
        let id = note_id.to_string();
        let note = match blocking(move || store.find_note(&id)).await {
            Some(Ok(Some(note))) => note,
            Some(Ok(None)) => {
                tracing::error!(note_id, "note not found");
                return ProcessOutcome::NotFound;
            }
            Some(Err(e)) => {
                tracing::error!(note_id, error = %e, "failed to load note");
                return ProcessOutcome::NotFound;
            }
            None => return ProcessOutcome::NotFound,
        };

        let analyzer = self.analyzer.clone();
        let k = self.related_k;
        let (note, related) = match blocking(move || {
            let related = analyzer.find_related(&note, k);
            (note, related)
        })
        .await
        {
            Some(found) => found,
            None => return ProcessOutcome::NoRelatedNotes,
        };
        if related.is_empty() {
            tracing::info!(note_id, "no related notes found");
            return ProcessOutcome::NoRelatedNotes;
        }

        let bundle = self.analyzer.suggest_evolution(&note, &related).await;

        let applier = self.applier.clone();
        let report = blocking(move || applier.apply(&note, &related, &bundle))
            .await
            .unwrap_or_default();

        let consolidation = if self.counter.take_if_reached(self.threshold) {
            tracing::info!(count, threshold = self.threshold, "evolution threshold reached");
            let this = self.clone();
            Some(
                blocking(move || this.consolidate_knowledge_base())
                    .await
                    .unwrap_or(ConsolidationOutcome::Failed),
            )
        } else {
            None
        };

        ProcessOutcome::Evolved {
            report,
            consolidation,
        }
    }

    /// Rebuild the index from every note in the store.
    ///
    /// Blocking. The new generation replaces the old one only once fully
    /// encoded.
    pub fn consolidate_knowledge_base(&self) -> ConsolidationOutcome {
        if !self.index.is_available() {
            return ConsolidationOutcome::Disabled;
        }

        // Notes indexed after this point may be missing from the read below.
        let mark = self.index.mark();
        let notes = match self.store.find_all_notes() {
            Ok(notes) => notes,
            Err(e) => {
                tracing::error!(error = %e, "failed to read notes for consolidation");
                return ConsolidationOutcome::Failed;
            }
        };

        let (texts, ids): (Vec<String>, Vec<String>) =
            notes.iter().map(|n| (note_document(n), n.id.clone())).unzip();

        match self.index.rebuild_since(mark, texts, ids) {
            Some(indexed) => {
                tracing::info!(notes = notes.len(), indexed, "knowledge base consolidated");
                ConsolidationOutcome::Rebuilt {
                    notes: notes.len(),
                    indexed,
                }
            }
            None => ConsolidationOutcome::Failed,
        }
    }
}

/// Run store or index work off the async executor.
async fn blocking<T, F>(f: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "blocking evolution task failed");
            None
        }
    }
}
