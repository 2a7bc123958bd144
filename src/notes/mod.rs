pub mod links;
pub mod sqlite;
pub mod store;
pub mod types;

pub use sqlite::SqliteStore;
pub use store::DocumentStore;
pub use types::{FieldUpdate, NewNote, Note, NoteMatch, SetField, Tag};
