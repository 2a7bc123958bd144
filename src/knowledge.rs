//! The knowledge base: storage, capabilities, and evolution wired together.
//!
//! [`KnowledgeBase`] is what the MCP tools and the CLI talk to. It owns the
//! note-creation pipeline (link extraction, optional enrichment, insert,
//! evolution, indexing) and exposes search, inspection, and index
//! maintenance. Blocking store and index work runs on tokio's blocking pool.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::completion::{self, CompletionModel};
use crate::config::NoesisConfig;
use crate::db::migrations;
use crate::embedding::{self, EmbeddingProvider};
use crate::enrich::MetadataEnricher;
use crate::evolution::{
    note_document, ConsolidationOutcome, EvolutionCoordinator, ProcessOutcome, RelatedNotes,
};
use crate::index::VectorIndex;
use crate::notes::links::extract_links;
use crate::notes::types::normalize_labels;
use crate::notes::{DocumentStore, NewNote, Note, NoteMatch, SqliteStore};
use crate::search::{search_notes, SearchRequest, SearchResult};

/// Optional model backends. A missing one disables the features needing it.
#[derive(Clone, Default)]
pub struct Capabilities {
    pub embedding: Option<Arc<dyn EmbeddingProvider>>,
    pub completion: Option<Arc<dyn CompletionModel>>,
}

impl Capabilities {
    /// Build both backends from config. Failures are logged, not returned.
    pub fn load(config: &NoesisConfig) -> Self {
        let embedding = match embedding::create_provider(&config.embedding) {
            Ok(provider) => Some(Arc::from(provider)),
            Err(e) => {
                tracing::warn!(error = %e, "embedding capability unavailable, semantic features disabled");
                None
            }
        };
        let completion = match completion::create_model(&config.completion) {
            Ok(model) => Some(Arc::from(model)),
            Err(e) => {
                tracing::warn!(error = %e, "completion capability unavailable, AI enrichment disabled");
                None
            }
        };
        Self {
            embedding,
            completion,
        }
    }
}

/// Input for [`KnowledgeBase::create_note`].
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    pub vault_id: Option<String>,
    pub tags: Vec<String>,
    pub keywords: Vec<String>,
    pub context: Option<String>,
    pub importance_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedNote {
    pub note: Note,
    pub evolution: ProcessOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Backlink {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NoteDetails {
    pub note: Note,
    pub backlinks: Vec<Backlink>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvolutionStatus {
    pub ai_enabled: bool,
    pub embedding_model: Option<String>,
    pub completion_model: Option<String>,
    pub note_count: usize,
    pub indexed_documents: usize,
    pub index_generation: u64,
    pub notes_since_consolidation: usize,
    pub consolidation_threshold: usize,
}

#[derive(Clone)]
pub struct KnowledgeBase {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    coordinator: EvolutionCoordinator,
    enricher: Option<MetadataEnricher>,
    completion_model: Option<String>,
    config: Arc<NoesisConfig>,
}

impl KnowledgeBase {
    /// Open the configured database, load capabilities, and restore the index
    /// snapshot if one matches the embedding model.
    pub fn open(config: NoesisConfig) -> Result<Self> {
        let db_path = config.resolved_db_path();
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("failed to open note store at {}", db_path.display()))?;

        let capabilities = Capabilities::load(&config);
        if let Some(provider) = &capabilities.embedding {
            check_embedding_model(&store, provider.model_id())?;
        }

        let kb = Self::new(Arc::new(store), capabilities, config);
        kb.restore_index();
        Ok(kb)
    }

    /// Assemble from parts. The index starts empty.
    pub fn new(store: Arc<dyn DocumentStore>, capabilities: Capabilities, config: NoesisConfig) -> Self {
        let index = Arc::new(VectorIndex::new(
            capabilities.embedding,
            config.resolved_index_path(),
        ));
        let completion_model = capabilities
            .completion
            .as_ref()
            .map(|c| c.model_id().to_string());
        let enricher = capabilities.completion.clone().map(MetadataEnricher::new);
        let coordinator = EvolutionCoordinator::new(
            store.clone(),
            index.clone(),
            capabilities.completion,
            &config.evolution,
        );
        Self {
            store,
            index,
            coordinator,
            enricher,
            completion_model,
            config: Arc::new(config),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn coordinator(&self) -> &EvolutionCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &NoesisConfig {
        &self.config
    }

    fn restore_index(&self) {
        if self.index.is_available() {
            self.index.load_snapshot();
        }
    }

    /// Rebuild the index when it holds fewer documents than the store, as
    /// after a lost snapshot or a model change.
    pub fn rebuild_if_stale(&self) -> Result<()> {
        if !self.index.is_available() {
            return Ok(());
        }
        let notes = self.store.find_all_notes()?.len();
        if self.index.len() >= notes {
            return Ok(());
        }
        tracing::info!(notes, indexed = self.index.len(), "index is behind the store, rebuilding");
        if let ConsolidationOutcome::Failed = self.coordinator.consolidate_knowledge_base() {
            tracing::warn!("could not rebuild index, semantic search is incomplete");
        }
        Ok(())
    }

    /// Store a new note and let it evolve its neighbours.
    pub async fn create_note(&self, draft: NoteDraft) -> Result<CreatedNote> {
        anyhow::ensure!(!draft.title.trim().is_empty(), "title must not be empty");
        anyhow::ensure!(!draft.content.trim().is_empty(), "content must not be empty");

        let mut links = extract_links(&draft.content);
        let mut tags = normalize_labels(&draft.tags);
        let mut keywords = normalize_labels(&draft.keywords);
        let mut context = draft.context.filter(|c| !c.trim().is_empty());
        let mut importance_score = draft.importance_score;

        if let Some(enricher) = self.active_enricher() {
            let analysis = enricher.analyze_content(&draft.content).await;
            tags = normalize_labels(tags.iter().chain(&analysis.tags));
            keywords = normalize_labels(keywords.iter().chain(&analysis.keywords));
            if context.is_none() {
                context = Some(analysis.context);
            }

            let analyzer = self.coordinator.analyzer().clone();
            let query = draft.content.clone();
            let k = self.config.evolution.related_k;
            let related = run_blocking(move || Ok(analyzer.related_to_text(&query, None, k)))
                .await
                .unwrap_or_default();

            let connections = enricher.find_connections(&draft.content, &related).await;
            if importance_score.is_none() {
                importance_score = Some(connections.importance_score);
            }
            append_connection_titles(&mut links, &related, &connections.suggested_connections);
        }

        let new_note = NewNote {
            vault_id: draft.vault_id,
            title: draft.title.trim().to_string(),
            content: draft.content,
            tags,
            links,
            keywords,
            context,
            importance_score,
        };
        let store = self.store.clone();
        let note = run_blocking(move || {
            let note = store.insert_note(new_note)?;
            for tag in &note.tags {
                if let Err(e) = store.upsert_tag_member(tag, &note.id) {
                    tracing::warn!(note_id = %note.id, tag = %tag, error = %e, "failed to record tag membership");
                }
            }
            Ok(note)
        })
        .await?;
        tracing::info!(note_id = %note.id, title = %note.title, "note created");

        let evolution = self.coordinator.process_new_note(&note.id).await;

        let index = self.index.clone();
        let store = self.store.clone();
        let note = run_blocking(move || {
            // Evolution may have linked this note to its neighbours.
            let latest = store.find_note(&note.id)?.unwrap_or(note);
            index.add_documents(vec![note_document(&latest)], vec![latest.id.clone()]);
            Ok(latest)
        })
        .await?;

        Ok(CreatedNote { note, evolution })
    }

    pub async fn search(&self, request: SearchRequest) -> Result<Vec<SearchResult>> {
        let store = self.store.clone();
        let index = self.index.clone();
        let scale = self.config.retrieval.semantic_score_scale;
        run_blocking(move || search_notes(store.as_ref(), &index, &request, scale)).await
    }

    /// A note with its backlinks. Counts as a retrieval.
    pub async fn inspect(&self, note_id: &str) -> Result<Option<NoteDetails>> {
        let store = self.store.clone();
        let id = note_id.to_string();
        run_blocking(move || {
            let Some(note) = store.find_note(&id)? else {
                return Ok(None);
            };
            store.record_retrieval(&note.id)?;
            let backlinks = store
                .find_notes(&NoteMatch::LinksTo(note.title.clone()))?
                .into_iter()
                .filter(|n| n.id != note.id)
                .map(|n| Backlink {
                    id: n.id,
                    title: n.title,
                })
                .collect();
            let note = store.find_note(&id)?.unwrap_or(note);
            Ok(Some(NoteDetails { note, backlinks }))
        })
        .await
    }

    /// Rebuild the index from every stored note.
    pub async fn consolidate(&self) -> ConsolidationOutcome {
        let coordinator = self.coordinator.clone();
        let outcome = run_blocking(move || Ok(coordinator.consolidate_knowledge_base()))
            .await
            .unwrap_or(ConsolidationOutcome::Failed);
        if matches!(outcome, ConsolidationOutcome::Rebuilt { .. }) {
            self.coordinator.counter().reset();
        }
        outcome
    }

    /// Empty the index and delete its snapshot.
    pub fn reset_index(&self) {
        self.index.reset();
    }

    pub fn status(&self) -> Result<EvolutionStatus> {
        Ok(EvolutionStatus {
            ai_enabled: self.coordinator.ai_enabled(),
            embedding_model: self.index.model_id().map(str::to_string),
            completion_model: self.completion_model.clone(),
            note_count: self.store.find_all_notes()?.len(),
            indexed_documents: self.index.len(),
            index_generation: self.index.generation(),
            notes_since_consolidation: self.coordinator.counter().get(),
            consolidation_threshold: self.coordinator.threshold(),
        })
    }

    fn active_enricher(&self) -> Option<&MetadataEnricher> {
        if self.coordinator.ai_enabled() && self.config.evolution.enrich_on_create {
            self.enricher.as_ref()
        } else {
            None
        }
    }
}

/// Warn when the index was last built by a different embedding model, then
/// record the current one.
fn check_embedding_model(store: &SqliteStore, current: &str) -> Result<()> {
    store.with_conn(|conn| {
        let stored = migrations::get_embedding_model(conn)?;
        if stored.as_deref() != Some(current) {
            if let Some(previous) = &stored {
                tracing::warn!(
                    previous = %previous,
                    current = %current,
                    "embedding model changed, run `noesis consolidate` to rebuild the index"
                );
            }
            migrations::set_embedding_model(conn, current)?;
        }
        Ok(())
    })
}

fn append_connection_titles(links: &mut Vec<String>, related: &RelatedNotes, indices: &[i64]) {
    for &i in indices {
        let Some(note) = related.get(i) else {
            continue;
        };
        if !note.title.is_empty() && !links.contains(&note.title) {
            links.push(note.title.clone());
        }
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("blocking task panicked")?
}
