//! Prompt and response schema for evolution suggestions.

use serde_json::{json, Value};

use super::RelatedNotes;
use crate::completion::ResponseFormat;
use crate::notes::Note;

/// Prompt enumerating `note` and each related note with its position.
pub fn evolution_prompt(note: &Note, related: &RelatedNotes) -> String {
    let listing: Vec<Value> = related
        .iter()
        .enumerate()
        .map(|(index, rel)| {
            json!({
                "index": index,
                "id": rel.id,
                "title": rel.title,
                "content": rel.content,
                "context": rel.context,
                "keywords": rel.keywords,
                "tags": rel.tags,
            })
        })
        .collect();
    let listing = serde_json::to_string_pretty(&listing).unwrap_or_else(|_| "[]".to_string());

    format!(
        "Analyze how a new note relates to existing notes in a knowledge base.

New note:
Title: {title}
Content: {content}
Context: {context}
Keywords: {keywords}
Tags: {tags}

Related notes:
{listing}

Suggest how the knowledge base should evolve:
1. Related notes that should be linked to the new note in both directions
2. Tags that should be added to related notes
3. Related notes whose context description should be updated

Refer to related notes by their \"index\". Respond with JSON:
{{
  \"bidirectional_links\": [{{\"index\": 0, \"note_id\": \"...\", \"link_reason\": \"...\"}}],
  \"tag_suggestions\": [{{\"index\": 0, \"note_id\": \"...\", \"tags_to_add\": [\"tag\"]}}],
  \"context_updates\": [{{\"index\": 0, \"note_id\": \"...\", \"new_context\": \"...\"}}]
}}",
        title = note.title,
        content = note.content,
        context = note.context,
        keywords = note.keywords.join(", "),
        tags = note.tags.join(", "),
    )
}

/// Schema constraining the response to exactly the three suggestion arrays.
pub fn evolution_format() -> ResponseFormat {
    let entry = |extra_name: &str, extra: Value| {
        json!({
            "type": "object",
            "properties": {
                "note_id": {"type": "string"},
                "index": {"type": "integer"},
                extra_name: extra,
            },
            "required": ["index"],
        })
    };
    ResponseFormat::json_schema(
        "evolution_suggestions",
        json!({
            "type": "object",
            "properties": {
                "bidirectional_links": {
                    "type": "array",
                    "items": entry("link_reason", json!({"type": "string"})),
                },
                "tag_suggestions": {
                    "type": "array",
                    "items": entry("tags_to_add", json!({"type": "array", "items": {"type": "string"}})),
                },
                "context_updates": {
                    "type": "array",
                    "items": entry("new_context", json!({"type": "string"})),
                },
            },
            "required": ["bidirectional_links", "tag_suggestions", "context_updates"],
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(id: &str, title: &str) -> Note {
        Note {
            id: id.into(),
            vault_id: None,
            title: title.into(),
            content: format!("{title} content"),
            tags: vec![],
            links: vec![],
            keywords: vec!["alpha".into(), "beta".into()],
            context: "General".into(),
            importance_score: 1.0,
            retrieval_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
            last_accessed: None,
        }
    }

    #[test]
    fn prompt_lists_related_notes_by_index() {
        let related = RelatedNotes::new(vec![note("r0", "First"), note("r1", "Second")]);
        let prompt = evolution_prompt(&note("n", "New"), &related);
        assert!(prompt.contains("Title: New"));
        assert!(prompt.contains("Keywords: alpha, beta"));
        assert!(prompt.contains("\"index\": 1"));
        assert!(prompt.contains("\"title\": \"Second\""));
    }

    #[test]
    fn schema_has_three_arrays() {
        let format = evolution_format();
        let props = &format.schema["properties"];
        for key in ["bidirectional_links", "tag_suggestions", "context_updates"] {
            assert_eq!(props[key]["type"], "array");
            assert_eq!(props[key]["items"]["properties"]["index"]["type"], "integer");
        }
        assert_eq!(
            props["tag_suggestions"]["items"]["properties"]["tags_to_add"]["type"],
            "array"
        );
    }
}
