//! Writes evolution suggestions back to the document store.
//!
//! Each entry is applied on its own: a store error is logged against that
//! entry and the rest of the bundle still runs. All writes are set unions or
//! overwrites, so re-applying a bundle changes nothing.

use std::sync::Arc;

use serde::Serialize;

use super::{ContextUpdate, LinkSuggestion, RelatedNotes, SuggestionBundle, TagSuggestion};
use crate::notes::types::normalize_labels;
use crate::notes::{DocumentStore, FieldUpdate, Note, SetField};

/// What one [`SuggestionApplier::apply`] call did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    /// Link suggestions written in both directions.
    pub links_applied: usize,
    /// Tags newly added to related notes.
    pub tags_added: usize,
    pub contexts_updated: usize,
    /// Entries with an out-of-range index or nothing to write.
    pub skipped: usize,
    /// Entries where at least one store call failed.
    pub failed: usize,
}

#[derive(Clone)]
pub struct SuggestionApplier {
    store: Arc<dyn DocumentStore>,
}

impl SuggestionApplier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Apply `bundle` for `note`, resolving indices against `related`.
    pub fn apply(&self, note: &Note, related: &RelatedNotes, bundle: &SuggestionBundle) -> ApplyReport {
        let mut report = ApplyReport::default();

        for link in &bundle.bidirectional_links {
            match related.get(link.index) {
                Some(target) => self.apply_link(note, target, link, &mut report),
                None => skip_index(&mut report, "link", link.index, related.len()),
            }
        }
        for tags in &bundle.tag_suggestions {
            match related.get(tags.index) {
                Some(target) => self.apply_tags(target, tags, &mut report),
                None => skip_index(&mut report, "tag", tags.index, related.len()),
            }
        }
        for update in &bundle.context_updates {
            match related.get(update.index) {
                Some(target) => self.apply_context(target, update, &mut report),
                None => skip_index(&mut report, "context", update.index, related.len()),
            }
        }

        tracing::info!(
            note_id = %note.id,
            links = report.links_applied,
            tags = report.tags_added,
            contexts = report.contexts_updated,
            skipped = report.skipped,
            failed = report.failed,
            "evolution suggestions applied"
        );
        report
    }

    /// Both directions are written whichever note the suggestion named.
    fn apply_link(&self, note: &Note, target: &Note, link: &LinkSuggestion, report: &mut ApplyReport) {
        if note.title.trim().is_empty() || target.title.trim().is_empty() {
            tracing::debug!(note_id = %note.id, target_id = %target.id, "untitled note, link skipped");
            report.skipped += 1;
            return;
        }

        let forward = self
            .store
            .add_to_set(&note.id, SetField::Links, std::slice::from_ref(&target.title));
        let backward = self
            .store
            .add_to_set(&target.id, SetField::Links, std::slice::from_ref(&note.title));

        match (forward, backward) {
            (Ok(_), Ok(_)) => {
                tracing::info!(
                    note_id = %note.id,
                    target_id = %target.id,
                    reason = %link.link_reason,
                    "bidirectional link created"
                );
                report.links_applied += 1;
            }
            (forward, backward) => {
                for e in [forward.err(), backward.err()].into_iter().flatten() {
                    tracing::error!(note_id = %note.id, target_id = %target.id, error = %e, "failed to write link");
                }
                report.failed += 1;
            }
        }
    }

    fn apply_tags(&self, target: &Note, suggestion: &TagSuggestion, report: &mut ApplyReport) {
        let tags = normalize_labels(&suggestion.tags_to_add);
        if tags.is_empty() {
            report.skipped += 1;
            return;
        }

        let added = match self.store.add_to_set(&target.id, SetField::Tags, &tags) {
            Ok(added) => added,
            Err(e) => {
                tracing::error!(note_id = %target.id, error = %e, "failed to add tags");
                report.failed += 1;
                return;
            }
        };

        // Membership is upserted for every suggested tag, so a run that died
        // between the two writes is repaired by the next one.
        let mut failed = false;
        for tag in &tags {
            if let Err(e) = self.store.upsert_tag_member(tag, &target.id) {
                tracing::error!(note_id = %target.id, tag = %tag, error = %e, "failed to record tag membership");
                failed = true;
            }
        }
        if failed {
            report.failed += 1;
        }
        if !added.is_empty() {
            tracing::info!(note_id = %target.id, tags = ?added, "tags added");
        }
        report.tags_added += added.len();
    }

    fn apply_context(&self, target: &Note, update: &ContextUpdate, report: &mut ApplyReport) {
        let context = update.new_context.trim();
        if context.is_empty() {
            report.skipped += 1;
            return;
        }
        match self
            .store
            .set_field(&target.id, FieldUpdate::Context(context.to_string()))
        {
            Ok(true) => {
                tracing::info!(note_id = %target.id, context = %context, "context updated");
                report.contexts_updated += 1;
            }
            Ok(false) => {
                tracing::debug!(note_id = %target.id, "note vanished before context update");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(note_id = %target.id, error = %e, "failed to update context");
                report.failed += 1;
            }
        }
    }
}

fn skip_index(report: &mut ApplyReport, kind: &str, index: i64, len: usize) {
    tracing::debug!(kind, index, related = len, "suggestion index out of range, skipped");
    report.skipped += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::{NewNote, SqliteStore};

    fn setup() -> (Arc<SqliteStore>, SuggestionApplier) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let applier = SuggestionApplier::new(store.clone());
        (store, applier)
    }

    fn insert(store: &SqliteStore, title: &str) -> Note {
        store
            .insert_note(NewNote {
                title: title.into(),
                content: format!("{title} body"),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn out_of_range_indices_are_skipped() {
        let (store, applier) = setup();
        let note = insert(&store, "A");
        let related = RelatedNotes::new(vec![insert(&store, "B")]);
        let bundle = SuggestionBundle {
            bidirectional_links: vec![LinkSuggestion {
                index: 3,
                note_id: None,
                link_reason: String::new(),
            }],
            tag_suggestions: vec![],
            context_updates: vec![ContextUpdate {
                index: -1,
                note_id: None,
                new_context: "x".into(),
            }],
        };

        let report = applier.apply(&note, &related, &bundle);
        assert_eq!(report.skipped, 2);
        assert!(store.find_note(&note.id).unwrap().unwrap().links.is_empty());
    }

    #[test]
    fn empty_context_is_not_written() {
        let (store, applier) = setup();
        let note = insert(&store, "A");
        let b = insert(&store, "B");
        let related = RelatedNotes::new(vec![b.clone()]);
        let bundle = SuggestionBundle {
            context_updates: vec![ContextUpdate {
                index: 0,
                note_id: None,
                new_context: "   ".into(),
            }],
            ..Default::default()
        };

        let report = applier.apply(&note, &related, &bundle);
        assert_eq!(report.contexts_updated, 0);
        assert_eq!(store.find_note(&b.id).unwrap().unwrap().context, "General");
    }

    #[test]
    fn context_update_overwrites() {
        let (store, applier) = setup();
        let note = insert(&store, "A");
        let b = insert(&store, "B");
        let related = RelatedNotes::new(vec![b.clone()]);
        let bundle = SuggestionBundle {
            context_updates: vec![ContextUpdate {
                index: 0,
                note_id: None,
                new_context: "European geography".into(),
            }],
            ..Default::default()
        };

        assert_eq!(applier.apply(&note, &related, &bundle).contexts_updated, 1);
        assert_eq!(
            store.find_note(&b.id).unwrap().unwrap().context,
            "European geography"
        );
    }
}
