#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use noesis::completion::{CompletionModel, ResponseFormat};
use noesis::config::NoesisConfig;
use noesis::embedding::hashing::HashingEmbeddingProvider;
use noesis::embedding::EmbeddingProvider;
use noesis::evolution::note_document;
use noesis::index::VectorIndex;
use noesis::notes::{
    DocumentStore, FieldUpdate, NewNote, Note, NoteMatch, SetField, SqliteStore, Tag,
};

/// Fresh in-memory store with schema and migrations applied.
pub fn test_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

/// Deterministic offline embedder.
pub fn hashing_provider() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingEmbeddingProvider::new(512).unwrap())
}

/// Index without a snapshot file.
pub fn memory_index() -> Arc<VectorIndex> {
    Arc::new(VectorIndex::new(Some(hashing_provider()), None))
}

/// Config with snapshots off and the given consolidation threshold.
pub fn test_config(threshold: usize) -> NoesisConfig {
    let mut config = NoesisConfig::default();
    config.storage.index_path = String::new();
    config.embedding.provider = "hashing".into();
    config.completion.provider = "mock".into();
    config.evolution.threshold = threshold;
    config
}

pub fn insert_note(store: &SqliteStore, title: &str, content: &str) -> Note {
    store
        .insert_note(NewNote {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        })
        .unwrap()
}

/// Insert a note and add it to `index`.
pub fn insert_indexed(store: &SqliteStore, index: &VectorIndex, title: &str, content: &str) -> Note {
    let note = insert_note(store, title, content);
    index.add_documents(vec![note_document(&note)], vec![note.id.clone()]);
    note
}

/// Completion model answering by response-format name, counting calls.
///
/// Unscripted formats answer `{}`; calls without a format answer `""`.
#[derive(Default)]
pub struct ScriptedCompletion {
    responses: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, format_name: &str, response: &str) -> Self {
        self.responses.insert(format_name.into(), response.into());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, format_name: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == format_name)
            .count()
    }
}

#[async_trait]
impl CompletionModel for ScriptedCompletion {
    async fn complete(&self, _prompt: &str, format: Option<&ResponseFormat>) -> Result<String> {
        let name = format.map(|f| f.name.clone()).unwrap_or_default();
        self.calls.lock().unwrap().push(name.clone());
        Ok(match format {
            Some(_) => self.responses.get(&name).cloned().unwrap_or_else(|| "{}".into()),
            None => String::new(),
        })
    }

    fn model_id(&self) -> &str {
        "scripted"
    }
}

/// Completion model whose every call errors.
pub struct FailingCompletion;

#[async_trait]
impl CompletionModel for FailingCompletion {
    async fn complete(&self, _prompt: &str, _format: Option<&ResponseFormat>) -> Result<String> {
        anyhow::bail!("completion backend unreachable")
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

/// Evolution response suggesting a link to related note 0.
pub const LINK_FIRST: &str = r#"{
    "bidirectional_links": [{"index": 0, "link_reason": "same topic"}],
    "tag_suggestions": [],
    "context_updates": []
}"#;

/// Store whose list and field writes fail for one note id.
pub struct FailingWritesStore {
    inner: Arc<SqliteStore>,
    failing_id: String,
}

impl FailingWritesStore {
    pub fn new(inner: Arc<SqliteStore>, failing_id: &str) -> Self {
        Self {
            inner,
            failing_id: failing_id.into(),
        }
    }

    fn check(&self, id: &str) -> Result<()> {
        if id == self.failing_id {
            anyhow::bail!("disk I/O error writing {id}");
        }
        Ok(())
    }
}

impl DocumentStore for FailingWritesStore {
    fn insert_note(&self, note: NewNote) -> Result<Note> {
        self.inner.insert_note(note)
    }

    fn find_note(&self, id: &str) -> Result<Option<Note>> {
        self.inner.find_note(id)
    }

    fn find_all_notes(&self) -> Result<Vec<Note>> {
        self.inner.find_all_notes()
    }

    fn find_notes(&self, query: &NoteMatch) -> Result<Vec<Note>> {
        self.inner.find_notes(query)
    }

    fn set_field(&self, id: &str, update: FieldUpdate) -> Result<bool> {
        self.check(id)?;
        self.inner.set_field(id, update)
    }

    fn add_to_set(&self, id: &str, field: SetField, values: &[String]) -> Result<Vec<String>> {
        self.check(id)?;
        self.inner.add_to_set(id, field, values)
    }

    fn upsert_tag_member(&self, tag: &str, note_id: &str) -> Result<()> {
        self.inner.upsert_tag_member(tag, note_id)
    }

    fn pull_tag_member(&self, tag: &str, note_id: &str) -> Result<()> {
        self.inner.pull_tag_member(tag, note_id)
    }

    fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.inner.find_tag(name)
    }

    fn delete_note(&self, id: &str) -> Result<bool> {
        self.inner.delete_note(id)
    }

    fn record_retrieval(&self, id: &str) -> Result<()> {
        self.inner.record_retrieval(id)
    }
}
