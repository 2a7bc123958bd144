//! Memory evolution: relating new notes to their semantic neighbours.
//!
//! A new note flows through three stages:
//!
//! 1. [`RelationAnalyzer::find_related`] searches the [`VectorIndex`](crate::index::VectorIndex)
//!    and resolves the hits to a [`RelatedNotes`] table.
//! 2. [`RelationAnalyzer::suggest_evolution`] asks the completion model for a
//!    [`SuggestionBundle`] whose entries point into that table by position.
//! 3. [`SuggestionApplier::apply`] writes links, tags, and context edits back
//!    to the document store.
//!
//! [`EvolutionCoordinator`] drives the stages per note and rebuilds the index
//! every `threshold` notes.

pub mod analyzer;
pub mod applier;
pub mod coordinator;
pub mod prompts;

pub use analyzer::RelationAnalyzer;
pub use applier::{ApplyReport, SuggestionApplier};
pub use coordinator::{ConsolidationOutcome, EvolutionCoordinator, EvolutionCounter, ProcessOutcome};

use serde::{Deserialize, Serialize};

use crate::notes::Note;

/// Related notes in the order the completion model saw them.
///
/// Built once per analysis and handed unchanged to the applier, so a
/// suggestion's `index` always resolves against the same ordering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedNotes {
    notes: Vec<Note>,
}

impl RelatedNotes {
    pub fn new(notes: Vec<Note>) -> Self {
        Self { notes }
    }

    /// Resolve a suggestion index. Out-of-range (including negative) is `None`.
    pub fn get(&self, index: i64) -> Option<&Note> {
        usize::try_from(index).ok().and_then(|i| self.notes.get(i))
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Note> {
        self.notes.iter()
    }
}

/// Suggestions for one note. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionBundle {
    pub bidirectional_links: Vec<LinkSuggestion>,
    pub tag_suggestions: Vec<TagSuggestion>,
    pub context_updates: Vec<ContextUpdate>,
}

impl SuggestionBundle {
    pub fn is_empty(&self) -> bool {
        self.bidirectional_links.is_empty()
            && self.tag_suggestions.is_empty()
            && self.context_updates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkSuggestion {
    /// Position in [`RelatedNotes`]. Unvalidated.
    pub index: i64,
    /// Echo of the related note id. Informational only; `index` is authoritative.
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub link_reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSuggestion {
    pub index: i64,
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub tags_to_add: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub index: i64,
    #[serde(default)]
    pub note_id: Option<String>,
    #[serde(default)]
    pub new_context: String,
}

/// Text a note is indexed under: title, content, keywords, context, tags.
pub fn note_document(note: &Note) -> String {
    format!(
        "{} {} {} {} {}",
        note.title,
        note.content,
        note.keywords.join(" "),
        note.context,
        note.tags.join(" ")
    )
}

/// Query used to find a note's neighbours: title, content, keywords, tags.
pub fn note_query(note: &Note) -> String {
    format!(
        "{} {} {} {}",
        note.title,
        note.content,
        note.keywords.join(" "),
        note.tags.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(title: &str) -> Note {
        Note {
            id: format!("id-{title}"),
            vault_id: None,
            title: title.into(),
            content: "body".into(),
            tags: vec!["t1".into(), "t2".into()],
            links: vec![],
            keywords: vec!["k".into()],
            context: "ctx".into(),
            importance_score: 1.0,
            retrieval_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
            last_accessed: None,
        }
    }

    #[test]
    fn related_notes_rejects_out_of_range() {
        let related = RelatedNotes::new(vec![note("a"), note("b")]);
        assert_eq!(related.get(1).map(|n| n.title.as_str()), Some("b"));
        assert!(related.get(2).is_none());
        assert!(related.get(-1).is_none());
    }

    #[test]
    fn composite_texts() {
        let n = note("Title");
        assert_eq!(note_document(&n), "Title body k ctx t1 t2");
        assert_eq!(note_query(&n), "Title body k t1 t2");
    }

    #[test]
    fn bundle_emptiness() {
        let mut bundle = SuggestionBundle::default();
        assert!(bundle.is_empty());
        bundle.context_updates.push(ContextUpdate {
            index: 0,
            note_id: None,
            new_context: "x".into(),
        });
        assert!(!bundle.is_empty());
    }
}
