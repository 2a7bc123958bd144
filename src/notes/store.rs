//! The document store seam.
//!
//! The evolution subsystem never owns note records. It reads them and issues
//! single-document updates through [`DocumentStore`]; each call is atomic for
//! one document, and nothing spans documents.

use anyhow::Result;

use super::types::{FieldUpdate, NewNote, Note, NoteMatch, SetField, Tag};

pub trait DocumentStore: Send + Sync {
    /// Insert a note and return the stored record.
    fn insert_note(&self, note: NewNote) -> Result<Note>;

    fn find_note(&self, id: &str) -> Result<Option<Note>>;

    /// Every note, oldest first.
    fn find_all_notes(&self) -> Result<Vec<Note>>;

    fn find_notes(&self, query: &NoteMatch) -> Result<Vec<Note>>;

    /// Overwrite one field. Returns `false` when the note does not exist.
    fn set_field(&self, id: &str, update: FieldUpdate) -> Result<bool>;

    /// Union `values` into a list field and return the values that were not
    /// already present. An unknown id yields an empty vec.
    fn add_to_set(&self, id: &str, field: SetField, values: &[String]) -> Result<Vec<String>>;

    /// Create the tag if absent and add `note_id` to its members.
    fn upsert_tag_member(&self, tag: &str, note_id: &str) -> Result<()>;

    /// Remove `note_id` from the tag's members.
    fn pull_tag_member(&self, tag: &str, note_id: &str) -> Result<()>;

    fn find_tag(&self, name: &str) -> Result<Option<Tag>>;

    /// Delete a note and its tag memberships. Returns `false` if it was absent.
    fn delete_note(&self, id: &str) -> Result<bool>;

    /// Bump `retrieval_count` and stamp `last_accessed`.
    fn record_retrieval(&self, id: &str) -> Result<()>;
}
