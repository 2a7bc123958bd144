//! Metadata enrichment for notes being created.
//!
//! Two completion calls: one extracts keywords, a one-line context, and tags
//! from the content; the other picks which neighbours the new note should
//! link to and scores its importance. Both fall back to neutral defaults on
//! any failure.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::completion::{CompletionModel, ResponseFormat};
use crate::evolution::RelatedNotes;
use crate::notes::types::{normalize_labels, DEFAULT_CONTEXT, DEFAULT_IMPORTANCE};

pub const MIN_IMPORTANCE: f64 = 0.0;
pub const MAX_IMPORTANCE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ContentAnalysis {
    pub keywords: Vec<String>,
    pub context: String,
    pub tags: Vec<String>,
}

impl Default for ContentAnalysis {
    fn default() -> Self {
        Self {
            keywords: vec![],
            context: DEFAULT_CONTEXT.to_string(),
            tags: vec![],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionAnalysis {
    /// Positions into the related notes passed in. Unvalidated.
    pub suggested_connections: Vec<i64>,
    /// Clamped to `[MIN_IMPORTANCE, MAX_IMPORTANCE]`.
    pub importance_score: f64,
}

impl Default for ConnectionAnalysis {
    fn default() -> Self {
        Self {
            suggested_connections: vec![],
            importance_score: DEFAULT_IMPORTANCE,
        }
    }
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Deserialize)]
struct RawConnections {
    #[serde(default)]
    suggested_connections: Vec<i64>,
    importance_score: Option<f64>,
}

#[derive(Clone)]
pub struct MetadataEnricher {
    completion: Arc<dyn CompletionModel>,
}

impl MetadataEnricher {
    pub fn new(completion: Arc<dyn CompletionModel>) -> Self {
        Self { completion }
    }

    pub async fn analyze_content(&self, content: &str) -> ContentAnalysis {
        let prompt = format!(
            "Produce a structured analysis of the content below:
1. The most salient keywords (nouns, verbs, key concepts), most important first, at least three
2. One sentence summarizing the main topic or domain
3. Several broad categorical tags, at least three

Respond with JSON: {{\"keywords\": [...], \"context\": \"...\", \"tags\": [...]}}

Content:
{content}"
        );
        let format = ResponseFormat::json_schema(
            "content_analysis",
            json!({
                "type": "object",
                "properties": {
                    "keywords": {"type": "array", "items": {"type": "string"}},
                    "context": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["keywords", "context", "tags"],
            }),
        );

        let raw: RawAnalysis = match self.request(&prompt, &format).await {
            Some(raw) => raw,
            None => return ContentAnalysis::default(),
        };
        let context = raw.context.trim();
        ContentAnalysis {
            keywords: normalize_labels(raw.keywords),
            context: if context.is_empty() {
                DEFAULT_CONTEXT.to_string()
            } else {
                context.to_string()
            },
            tags: normalize_labels(raw.tags),
        }
    }

    /// Which of `related` the new note should link to, and how important it is.
    ///
    /// With no related notes the model is not called.
    pub async fn find_connections(&self, content: &str, related: &RelatedNotes) -> ConnectionAnalysis {
        if related.is_empty() {
            return ConnectionAnalysis::default();
        }

        let listing = related
            .iter()
            .enumerate()
            .map(|(i, note)| format!("Note {i}:\nTitle: {}\nContent: {}", note.title, note.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Analyze how a new note relates to existing notes in a knowledge base.

New note:
{content}

Existing related notes:
{listing}

Identify:
1. Which existing notes the new note should link to, by note number
2. An importance score for the new note from 0.0 to 2.0:
   0.0-0.5 auxiliary, 0.5-1.0 useful, 1.0-1.5 key information, 1.5-2.0 foundational

Respond with JSON: {{\"suggested_connections\": [0, 2], \"importance_score\": 1.2}}"
        );
        let format = ResponseFormat::json_schema(
            "connection_analysis",
            json!({
                "type": "object",
                "properties": {
                    "suggested_connections": {"type": "array", "items": {"type": "integer"}},
                    "importance_score": {"type": "number"},
                },
                "required": ["suggested_connections", "importance_score"],
            }),
        );

        let raw: RawConnections = match self.request(&prompt, &format).await {
            Some(raw) => raw,
            None => return ConnectionAnalysis::default(),
        };
        ConnectionAnalysis {
            suggested_connections: raw.suggested_connections,
            importance_score: clamp_importance(raw.importance_score.unwrap_or(DEFAULT_IMPORTANCE)),
        }
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        prompt: &str,
        format: &ResponseFormat,
    ) -> Option<T> {
        let response = match self.completion.complete(prompt, Some(format)).await {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(schema = %format.name, error = %e, "enrichment completion failed");
                return None;
            }
        };
        match serde_json::from_str(&response) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(schema = %format.name, error = %e, "unparsable enrichment response");
                None
            }
        }
    }
}

/// Clamp a model-supplied importance into range; non-finite values become the default.
pub fn clamp_importance(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE)
    } else {
        DEFAULT_IMPORTANCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::mock::MockCompletionModel;
    use crate::notes::Note;
    use anyhow::Result;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl CompletionModel for Fixed {
        async fn complete(&self, _prompt: &str, _format: Option<&ResponseFormat>) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn related() -> RelatedNotes {
        RelatedNotes::new(vec![Note {
            id: "r".into(),
            vault_id: None,
            title: "Related".into(),
            content: "text".into(),
            tags: vec![],
            links: vec![],
            keywords: vec![],
            context: DEFAULT_CONTEXT.into(),
            importance_score: 1.0,
            retrieval_count: 0,
            created_at: String::new(),
            updated_at: String::new(),
            last_accessed: None,
        }])
    }

    #[test]
    fn importance_is_clamped() {
        assert_eq!(clamp_importance(3.5), 2.0);
        assert_eq!(clamp_importance(-1.0), 0.0);
        assert_eq!(clamp_importance(1.2), 1.2);
        assert_eq!(clamp_importance(f64::NAN), 1.0);
    }

    #[tokio::test]
    async fn analysis_normalizes_labels() {
        let enricher = MetadataEnricher::new(Arc::new(Fixed(
            r#"{"keywords": ["rust", " rust ", ""], "context": "Systems programming", "tags": ["lang"]}"#,
        )));
        let analysis = enricher.analyze_content("Rust is a language").await;
        assert_eq!(analysis.keywords, vec!["rust"]);
        assert_eq!(analysis.context, "Systems programming");
        assert_eq!(analysis.tags, vec!["lang"]);
    }

    #[tokio::test]
    async fn mock_model_yields_defaults() {
        let enricher = MetadataEnricher::new(Arc::new(MockCompletionModel));
        assert_eq!(enricher.analyze_content("anything").await, ContentAnalysis::default());

        let connections = enricher.find_connections("anything", &related()).await;
        assert!(connections.suggested_connections.is_empty());
        // The mock answers 0 for numbers.
        assert_eq!(connections.importance_score, 0.0);
    }

    #[tokio::test]
    async fn garbage_yields_defaults() {
        let enricher = MetadataEnricher::new(Arc::new(Fixed("not json")));
        assert_eq!(enricher.analyze_content("x").await, ContentAnalysis::default());
        assert_eq!(
            enricher.find_connections("x", &related()).await,
            ConnectionAnalysis::default()
        );
    }

    #[tokio::test]
    async fn out_of_range_importance_is_clamped() {
        let enricher = MetadataEnricher::new(Arc::new(Fixed(
            r#"{"suggested_connections": [0, 4], "importance_score": 9.0}"#,
        )));
        let connections = enricher.find_connections("x", &related()).await;
        assert_eq!(connections.suggested_connections, vec![0, 4]);
        assert_eq!(connections.importance_score, 2.0);
    }

    #[tokio::test]
    async fn no_related_notes_skips_the_model() {
        let enricher = MetadataEnricher::new(Arc::new(Fixed("not json")));
        let connections = enricher.find_connections("x", &RelatedNotes::default()).await;
        assert_eq!(connections, ConnectionAnalysis::default());
    }
}
