//! Forward-only migrations and `schema_meta` bookkeeping.
//!
//! `schema_meta` is a small key/value table. Besides the schema version it
//! remembers which embedding model the vector index was last built with.

use rusqlite::{Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: u32 = 2;

const SCHEMA_VERSION_KEY: &str = "schema_version";
const EMBEDDING_MODEL_KEY: &str = "embedding_model";

type Migration = fn(&Connection) -> rusqlite::Result<()>;

/// `(target version, step)`, in order.
const MIGRATIONS: &[(u32, Migration)] = &[(2, backfill_tag_membership)];

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schema_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
    )?;
    Ok(())
}

/// Unreadable versions count as 0, so every migration reruns. All steps are
/// idempotent.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(get_meta(conn, SCHEMA_VERSION_KEY)?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, EMBEDDING_MODEL_KEY)
}

pub fn set_embedding_model(conn: &Connection, model: &str) -> rusqlite::Result<()> {
    set_meta(conn, EMBEDDING_MODEL_KEY, model)
}

/// Apply every step above the stored version, each in its own transaction.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(to, _)| *to > current).collect();
    if pending.is_empty() {
        tracing::debug!(schema_version = current, "schema up to date");
        return Ok(());
    }

    for (to, step) in pending {
        tracing::info!(to, "running migration");
        let tx = conn.transaction()?;
        step(&tx)?;
        set_meta(&tx, SCHEMA_VERSION_KEY, &to.to_string())?;
        tx.commit()?;
    }
    Ok(())
}

/// v2: `tag_notes` became the source for tag lookups. Rebuild it from the
/// JSON `tags` column of every note.
fn backfill_tag_membership(conn: &Connection) -> rusqlite::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO tags (name, created_at)
         SELECT DISTINCT trim(t.value), ?1 FROM notes, json_each(notes.tags) AS t
         WHERE json_valid(notes.tags) AND trim(t.value) <> ''",
        [&now],
    )?;
    let added = conn.execute(
        "INSERT OR IGNORE INTO tag_notes (tag_name, note_id)
         SELECT DISTINCT trim(t.value), notes.id FROM notes, json_each(notes.tags) AS t
         WHERE json_valid(notes.tags) AND trim(t.value) <> ''",
        [],
    )?;
    tracing::info!(memberships = added, "tag membership backfilled");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v1_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        conn
    }

    fn insert_raw(conn: &Connection, id: &str, tags: &str) {
        conn.execute(
            "INSERT INTO notes (id, title, content, tags, created_at, updated_at)
             VALUES (?1, ?1, 'body', ?2, 'now', 'now')",
            [id, tags],
        )
        .unwrap();
    }

    fn members(conn: &Connection, tag: &str) -> Vec<String> {
        conn.prepare("SELECT note_id FROM tag_notes WHERE tag_name = ?1 ORDER BY note_id")
            .unwrap()
            .query_map([tag], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn fresh_db_starts_at_version_1() {
        let conn = v1_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
        assert!(get_embedding_model(&conn).unwrap().is_none());
    }

    #[test]
    fn v2_backfills_tag_membership() {
        let mut conn = v1_db();
        insert_raw(&conn, "a", r#"["rust", " systems "]"#);
        insert_raw(&conn, "b", r#"["rust", ""]"#);
        insert_raw(&conn, "c", "not json");

        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(members(&conn, "rust"), vec!["a", "b"]);
        assert_eq!(members(&conn, "systems"), vec!["a"]);
    }

    #[test]
    fn embedding_model_is_overwritten() {
        let conn = v1_db();
        set_embedding_model(&conn, "all-MiniLM-L6-v2").unwrap();
        set_embedding_model(&conn, "hashing-512").unwrap();
        assert_eq!(get_embedding_model(&conn).unwrap().as_deref(), Some("hashing-512"));
    }
}
