//! Note and tag record definitions.
//!
//! [`Note`] is owned by the document store; the evolution subsystem only reads
//! notes and issues field-level updates through [`FieldUpdate`] and [`SetField`].

use serde::{Deserialize, Serialize};

/// Context assigned to notes that were never analyzed.
pub const DEFAULT_CONTEXT: &str = "General";

/// Importance assigned when none is known.
pub const DEFAULT_IMPORTANCE: f64 = 1.0;

/// A note record, matching the `notes` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// UUID v7 assigned by the store.
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vault_id: Option<String>,
    /// Link target for `[[Title]]` references. Unique by convention only.
    pub title: String,
    pub content: String,
    /// Set semantics, insertion order kept for display.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Titles of linked notes. Set semantics, insertion order kept for display.
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub context: String,
    /// Nominally `0.0..=2.0`.
    pub importance_score: f64,
    pub retrieval_count: u32,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<String>,
}

/// A tag record with its member note ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub note_ids: Vec<String>,
    pub created_at: String,
}

/// Everything needed to insert a note. The store assigns id and timestamps.
#[derive(Debug, Clone, Default)]
pub struct NewNote {
    pub vault_id: Option<String>,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub links: Vec<String>,
    pub keywords: Vec<String>,
    pub context: Option<String>,
    pub importance_score: Option<f64>,
}

/// Single-field overwrite on a note.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Context(String),
    ImportanceScore(f64),
}

/// List-valued note fields that support set-union updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    Links,
    Tags,
}

impl SetField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::Tags => "tags",
        }
    }
}

/// Field-match queries over notes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoteMatch {
    /// Exact title.
    Title(String),
    /// Notes carrying the tag.
    Tag(String),
    /// Case-insensitive substring of title or content.
    Text(String),
    /// Notes whose content contains a `[[title]]` marker.
    LinksTo(String),
}

/// Normalise a list of labels: trim, drop empties, dedup preserving first occurrence.
pub fn normalize_labels<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for label in labels {
        let label = label.as_ref().trim();
        if !label.is_empty() && !out.iter().any(|l| l == label) {
            out.push(label.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_labels_trims_and_dedups() {
        let labels = normalize_labels(["rust", " rust ", "", "  ", "memory", "rust"]);
        assert_eq!(labels, vec!["rust", "memory"]);
    }

    #[test]
    fn note_deserializes_with_missing_lists() {
        let json = serde_json::json!({
            "id": "n1",
            "title": "T",
            "content": "C",
            "context": "General",
            "importance_score": 1.0,
            "retrieval_count": 0,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let note: Note = serde_json::from_value(json).unwrap();
        assert!(note.tags.is_empty());
        assert!(note.links.is_empty());
        assert!(note.keywords.is_empty());
        assert!(note.vault_id.is_none());
    }
}
