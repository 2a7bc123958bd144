//! Neighbour lookup and suggestion requests.

use std::sync::Arc;

use serde::de::{DeserializeOwned, Error as _};
use serde_json::{Map, Value};

use super::prompts::{evolution_format, evolution_prompt};
use super::{note_query, RelatedNotes, SuggestionBundle};
use crate::completion::CompletionModel;
use crate::index::VectorIndex;
use crate::notes::{DocumentStore, Note};

#[derive(Clone)]
pub struct RelationAnalyzer {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    completion: Option<Arc<dyn CompletionModel>>,
}

impl RelationAnalyzer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<VectorIndex>,
        completion: Option<Arc<dyn CompletionModel>>,
    ) -> Self {
        Self {
            store,
            index,
            completion,
        }
    }

    /// Up to `k` indexed neighbours of `note`, excluding the note itself.
    ///
    /// Hits whose note no longer exists are dropped.
    pub fn find_related(&self, note: &Note, k: usize) -> RelatedNotes {
        self.related_to_text(&note_query(note), Some(&note.id), k)
    }

    /// Up to `k` indexed notes similar to `query`, skipping `exclude_id`.
    pub fn related_to_text(&self, query: &str, exclude_id: Option<&str>, k: usize) -> RelatedNotes {
        let hits = self.index.search(query, k);
        let mut related = Vec::with_capacity(hits.len());
        for hit in hits {
            if exclude_id == Some(hit.id.as_str()) {
                continue;
            }
            match self.store.find_note(&hit.id) {
                Ok(Some(found)) => related.push(found),
                Ok(None) => {
                    tracing::debug!(note_id = %hit.id, "indexed note no longer exists, skipping");
                }
                Err(e) => {
                    tracing::warn!(note_id = %hit.id, error = %e, "failed to load related note");
                }
            }
        }
        RelatedNotes::new(related)
    }

    /// Ask the completion model how `note` should reshape its neighbours.
    ///
    /// Never fails: no neighbours, no model, a model error, or unparsable
    /// output all produce an empty bundle. The model is not called when
    /// `related` is empty.
    pub async fn suggest_evolution(&self, note: &Note, related: &RelatedNotes) -> SuggestionBundle {
        if related.is_empty() {
            return SuggestionBundle::default();
        }
        let Some(completion) = self.completion.as_deref() else {
            return SuggestionBundle::default();
        };

        let prompt = evolution_prompt(note, related);
        let response = match completion.complete(&prompt, Some(&evolution_format())).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(note_id = %note.id, error = %e, "evolution completion failed");
                return SuggestionBundle::default();
            }
        };

        match parse_suggestions(&response) {
            Ok(bundle) => {
                tracing::debug!(
                    note_id = %note.id,
                    links = bundle.bidirectional_links.len(),
                    tags = bundle.tag_suggestions.len(),
                    contexts = bundle.context_updates.len(),
                    "evolution suggestions received"
                );
                bundle
            }
            Err(e) => {
                tracing::error!(
                    note_id = %note.id,
                    error = %e,
                    response = %response,
                    "failed to parse evolution suggestions"
                );
                SuggestionBundle::default()
            }
        }
    }
}

/// Parse a completion response into a bundle.
///
/// The response must be a JSON object whose suggestion keys, when present,
/// hold arrays. A missing key counts as empty, and individual entries that do
/// not fit their shape are dropped. Indices are not range-checked here.
pub fn parse_suggestions(response: &str) -> Result<SuggestionBundle, serde_json::Error> {
    let Value::Object(mut object) = serde_json::from_str::<Value>(response)? else {
        return Err(serde_json::Error::custom("suggestions must be a JSON object"));
    };
    Ok(SuggestionBundle {
        bidirectional_links: entries(&mut object, "bidirectional_links")?,
        tag_suggestions: entries(&mut object, "tag_suggestions")?,
        context_updates: entries(&mut object, "context_updates")?,
    })
}

fn entries<T: DeserializeOwned>(
    object: &mut Map<String, Value>,
    kind: &str,
) -> Result<Vec<T>, serde_json::Error> {
    let values = match object.remove(kind) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(values)) => values,
        Some(_) => return Err(serde_json::Error::custom(format!("{kind} must be an array"))),
    };
    Ok(values
        .into_iter()
        .filter_map(|v| match serde_json::from_value(v) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(kind, error = %e, "dropping malformed suggestion entry");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_response() {
        let bundle = parse_suggestions(
            r#"{
                "bidirectional_links": [{"index": 0, "note_id": "x", "link_reason": "same topic"}],
                "tag_suggestions": [{"index": 1, "tags_to_add": ["rust", "systems"]}],
                "context_updates": [{"index": 7, "new_context": "Memory safety"}]
            }"#,
        )
        .unwrap();
        assert_eq!(bundle.bidirectional_links[0].link_reason, "same topic");
        assert_eq!(bundle.tag_suggestions[0].tags_to_add, vec!["rust", "systems"]);
        // Out-of-range indices survive parsing.
        assert_eq!(bundle.context_updates[0].index, 7);
    }

    #[test]
    fn missing_arrays_are_empty() {
        let bundle = parse_suggestions(r#"{"tag_suggestions": []}"#).unwrap();
        assert!(bundle.is_empty());
    }

    #[test]
    fn malformed_entries_are_dropped() {
        let bundle = parse_suggestions(
            r#"{"bidirectional_links": [{"link_reason": "no index"}, {"index": 2}, "junk"]}"#,
        )
        .unwrap();
        assert_eq!(bundle.bidirectional_links.len(), 1);
        assert_eq!(bundle.bidirectional_links[0].index, 2);
    }

    #[test]
    fn non_json_is_an_error() {
        assert!(parse_suggestions("not valid json").is_err());
        assert!(parse_suggestions("[]").is_err());
    }

    #[test]
    fn positional_array_response_is_rejected() {
        assert!(parse_suggestions(r#"[[{"index":0,"link_reason":"x"}],[],[]]"#).is_err());
        assert!(parse_suggestions(r#""text""#).is_err());
    }

    #[test]
    fn non_array_field_is_rejected() {
        assert!(parse_suggestions(r#"{"bidirectional_links": {"index": 0}}"#).is_err());
        assert!(parse_suggestions(r#"{"context_updates": null}"#).unwrap().is_empty());
    }
}
