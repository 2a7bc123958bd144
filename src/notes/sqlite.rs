//! SQLite-backed [`DocumentStore`].
//!
//! One connection behind a mutex. Each trait call takes the lock once, so a
//! read-modify-write such as [`DocumentStore::add_to_set`] is atomic for its
//! document. List columns are JSON arrays; rows are validated on the way out
//! and an unreadable list decodes as empty rather than failing the read.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::links::link_marker;
use super::store::DocumentStore;
use super::types::{
    normalize_labels, FieldUpdate, NewNote, Note, NoteMatch, SetField, Tag, DEFAULT_CONTEXT,
    DEFAULT_IMPORTANCE,
};

const NOTE_COLUMNS: &str = "id, vault_id, title, content, tags, links, keywords, context, \
     importance_score, retrieval_count, created_at, updated_at, last_accessed";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(crate::db::open_database(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(crate::db::open_memory_database()?))
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("db lock poisoned: {e}"))?;
        f(&mut conn)
    }

    fn query_notes(&self, sql: &str, param: &str) -> Result<Vec<Note>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let notes = stmt
                .query_map(params![param], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
    }
}

impl DocumentStore for SqliteStore {
    fn insert_note(&self, note: NewNote) -> Result<Note> {
        let now = chrono::Utc::now().to_rfc3339();
        let stored = Note {
            id: uuid::Uuid::now_v7().to_string(),
            vault_id: note.vault_id,
            title: note.title,
            content: note.content,
            tags: normalize_labels(&note.tags),
            links: normalize_labels(&note.links),
            keywords: normalize_labels(&note.keywords),
            context: note.context.unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
            importance_score: note.importance_score.unwrap_or(DEFAULT_IMPORTANCE),
            retrieval_count: 0,
            created_at: now.clone(),
            updated_at: now.clone(),
            last_accessed: Some(now),
        };

        self.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO notes ({NOTE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
                ),
                params![
                    stored.id,
                    stored.vault_id,
                    stored.title,
                    stored.content,
                    serde_json::to_string(&stored.tags)?,
                    serde_json::to_string(&stored.links)?,
                    serde_json::to_string(&stored.keywords)?,
                    stored.context,
                    stored.importance_score,
                    stored.retrieval_count,
                    stored.created_at,
                    stored.updated_at,
                    stored.last_accessed,
                ],
            )?;
            Ok(())
        })?;

        tracing::debug!(note_id = %stored.id, title = %stored.title, "note inserted");
        Ok(stored)
    }

    fn find_note(&self, id: &str) -> Result<Option<Note>> {
        self.with_conn(|conn| {
            let note = conn
                .query_row(
                    &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1"),
                    params![id],
                    note_from_row,
                )
                .optional()?;
            Ok(note)
        })
    }

    fn find_all_notes(&self) -> Result<Vec<Note>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {NOTE_COLUMNS} FROM notes ORDER BY created_at, rowid"
            ))?;
            let notes = stmt
                .query_map([], note_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(notes)
        })
    }

    fn find_notes(&self, query: &NoteMatch) -> Result<Vec<Note>> {
        match query {
            NoteMatch::Title(title) => self.query_notes(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE title = ?1 ORDER BY rowid"),
                title,
            ),
            NoteMatch::Tag(tag) => self.query_notes(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes \
                     WHERE EXISTS (SELECT 1 FROM json_each(notes.tags) WHERE json_each.value = ?1) \
                     ORDER BY rowid"
                ),
                tag,
            ),
            NoteMatch::Text(text) => self.query_notes(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes \
                     WHERE instr(lower(title), lower(?1)) > 0 OR instr(lower(content), lower(?1)) > 0 \
                     ORDER BY rowid"
                ),
                text,
            ),
            NoteMatch::LinksTo(title) => self.query_notes(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes WHERE instr(content, ?1) > 0 ORDER BY rowid"
                ),
                &link_marker(title),
            ),
        }
    }

    fn set_field(&self, id: &str, update: FieldUpdate) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let rows = match &update {
                FieldUpdate::Context(context) => conn.execute(
                    "UPDATE notes SET context = ?1, updated_at = ?2 WHERE id = ?3",
                    params![context, now, id],
                )?,
                FieldUpdate::ImportanceScore(score) => conn.execute(
                    "UPDATE notes SET importance_score = ?1, updated_at = ?2 WHERE id = ?3",
                    params![score, now, id],
                )?,
            };
            Ok(rows > 0)
        })
    }

    fn add_to_set(&self, id: &str, field: SetField, values: &[String]) -> Result<Vec<String>> {
        let column = field.column();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let raw: Option<Option<String>> = tx
                .query_row(
                    &format!("SELECT {column} FROM notes WHERE id = ?1"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(raw) = raw else {
                return Ok(Vec::new());
            };

            let mut current = parse_list(column, raw);
            let mut added = Vec::new();
            for value in normalize_labels(values) {
                if !current.contains(&value) {
                    current.push(value.clone());
                    added.push(value);
                }
            }

            if !added.is_empty() {
                tx.execute(
                    &format!("UPDATE notes SET {column} = ?1, updated_at = ?2 WHERE id = ?3"),
                    params![
                        serde_json::to_string(&current)?,
                        chrono::Utc::now().to_rfc3339(),
                        id
                    ],
                )?;
            }
            tx.commit()?;
            Ok(added)
        })
    }

    fn upsert_tag_member(&self, tag: &str, note_id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO tags (name, created_at) VALUES (?1, ?2)",
                params![tag, now],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO tag_notes (tag_name, note_id) VALUES (?1, ?2)",
                params![tag, note_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    fn pull_tag_member(&self, tag: &str, note_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM tag_notes WHERE tag_name = ?1 AND note_id = ?2",
                params![tag, note_id],
            )?;
            Ok(())
        })
    }

    fn find_tag(&self, name: &str) -> Result<Option<Tag>> {
        self.with_conn(|conn| {
            let created_at: Option<String> = conn
                .query_row(
                    "SELECT created_at FROM tags WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(created_at) = created_at else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT note_id FROM tag_notes WHERE tag_name = ?1 ORDER BY rowid",
            )?;
            let note_ids = stmt
                .query_map(params![name], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Some(Tag {
                name: name.to_string(),
                note_ids,
                created_at,
            }))
        })
    }

    fn delete_note(&self, id: &str) -> Result<bool> {
        // tag_notes rows go with the note via ON DELETE CASCADE
        self.with_conn(|conn| {
            let rows = conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            Ok(rows > 0)
        })
    }

    fn record_retrieval(&self, id: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE notes SET retrieval_count = retrieval_count + 1, last_accessed = ?1 WHERE id = ?2",
                params![now, id],
            )?;
            Ok(())
        })
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        vault_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        tags: parse_list("tags", row.get(4)?),
        links: parse_list("links", row.get(5)?),
        keywords: parse_list("keywords", row.get(6)?),
        context: row
            .get::<_, Option<String>>(7)?
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string()),
        importance_score: row.get::<_, Option<f64>>(8)?.unwrap_or(DEFAULT_IMPORTANCE),
        retrieval_count: row.get::<_, Option<u32>>(9)?.unwrap_or(0),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        last_accessed: row.get(12)?,
    })
}

/// Decode a JSON string-array column. Missing or malformed values become empty.
fn parse_list(column: &str, raw: Option<String>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str::<Vec<String>>(&raw) {
        Ok(values) => values,
        Err(e) => {
            tracing::warn!(column, error = %e, "unreadable list column, treating as empty");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn draft(title: &str, content: &str) -> NewNote {
        NewNote {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn insert_and_find_note() {
        let store = store();
        let note = store
            .insert_note(NewNote {
                tags: vec!["rust".into(), "rust".into(), " lang ".into()],
                ..draft("Ownership", "Every value has an owner.")
            })
            .unwrap();

        assert_eq!(note.tags, vec!["rust", "lang"]);
        assert_eq!(note.context, DEFAULT_CONTEXT);
        assert_eq!(note.importance_score, DEFAULT_IMPORTANCE);

        let found = store.find_note(&note.id).unwrap().unwrap();
        assert_eq!(found, note);
        assert!(store.find_note("missing").unwrap().is_none());
    }

    #[test]
    fn add_to_set_reports_only_new_values() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();

        let added = store
            .add_to_set(&note.id, SetField::Links, &["B".into(), "C".into()])
            .unwrap();
        assert_eq!(added, vec!["B", "C"]);

        let added = store
            .add_to_set(&note.id, SetField::Links, &["C".into(), "D".into()])
            .unwrap();
        assert_eq!(added, vec!["D"]);

        let links = store.find_note(&note.id).unwrap().unwrap().links;
        assert_eq!(links, vec!["B", "C", "D"]);

        assert!(store
            .add_to_set("missing", SetField::Tags, &["x".into()])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn set_field_overwrites_and_reports_missing() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();

        assert!(store
            .set_field(&note.id, FieldUpdate::Context("Systems programming".into()))
            .unwrap());
        assert!(store
            .set_field(&note.id, FieldUpdate::ImportanceScore(1.5))
            .unwrap());
        assert!(!store
            .set_field("missing", FieldUpdate::Context("x".into()))
            .unwrap());

        let found = store.find_note(&note.id).unwrap().unwrap();
        assert_eq!(found.context, "Systems programming");
        assert_eq!(found.importance_score, 1.5);
    }

    #[test]
    fn tag_membership_is_a_set() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();

        store.upsert_tag_member("rust", &note.id).unwrap();
        store.upsert_tag_member("rust", &note.id).unwrap();

        let tag = store.find_tag("rust").unwrap().unwrap();
        assert_eq!(tag.note_ids, vec![note.id.clone()]);

        store.pull_tag_member("rust", &note.id).unwrap();
        let tag = store.find_tag("rust").unwrap().unwrap();
        assert!(tag.note_ids.is_empty());
        assert!(store.find_tag("absent").unwrap().is_none());
    }

    #[test]
    fn find_notes_by_field() {
        let store = store();
        let a = store
            .insert_note(NewNote {
                tags: vec!["lang".into()],
                ..draft("Rust", "Rust is a systems language.")
            })
            .unwrap();
        let b = store
            .insert_note(draft("Cargo", "The build tool for [[Rust]]."))
            .unwrap();

        let by_title = store.find_notes(&NoteMatch::Title("Rust".into())).unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].id, a.id);

        let by_tag = store.find_notes(&NoteMatch::Tag("lang".into())).unwrap();
        assert_eq!(by_tag.len(), 1);

        let by_text = store.find_notes(&NoteMatch::Text("BUILD TOOL".into())).unwrap();
        assert_eq!(by_text.len(), 1);
        assert_eq!(by_text[0].id, b.id);

        let backlinks = store.find_notes(&NoteMatch::LinksTo("Rust".into())).unwrap();
        assert_eq!(backlinks.len(), 1);
        assert_eq!(backlinks[0].id, b.id);
    }

    #[test]
    fn delete_note_removes_tag_membership() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();
        store.upsert_tag_member("rust", &note.id).unwrap();

        assert!(store.delete_note(&note.id).unwrap());
        assert!(!store.delete_note(&note.id).unwrap());
        assert!(store.find_tag("rust").unwrap().unwrap().note_ids.is_empty());
    }

    #[test]
    fn malformed_list_column_reads_as_empty() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE notes SET tags = 'not json' WHERE id = ?1",
                    params![note.id],
                )?;
                Ok(())
            })
            .unwrap();

        let found = store.find_note(&note.id).unwrap().unwrap();
        assert!(found.tags.is_empty());
    }

    #[test]
    fn record_retrieval_increments_count() {
        let store = store();
        let note = store.insert_note(draft("A", "a")).unwrap();
        store.record_retrieval(&note.id).unwrap();
        store.record_retrieval(&note.id).unwrap();
        assert_eq!(store.find_note(&note.id).unwrap().unwrap().retrieval_count, 2);
    }
}
