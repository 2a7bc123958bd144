//! Structured text-completion capability.
//!
//! [`CompletionModel`] maps a prompt plus an optional JSON-schema constraint to
//! raw text. Callers must treat that text as untrusted and validate it as JSON
//! themselves. Implementations: an OpenAI-compatible HTTP client
//! ([`openai`]) and a schema-shaped mock ([`mock`]).

pub mod mock;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::CompletionConfig;

/// A JSON-schema response constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: Value,
}

impl ResponseFormat {
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// The `response_format` object of a chat-completions request.
    pub fn to_request_value(&self) -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "schema": self.schema,
            }
        })
    }
}

#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str, format: Option<&ResponseFormat>) -> Result<String>;

    fn model_id(&self) -> &str;
}

/// Create a completion model from config.
///
/// `"openai"` fails when the API key variable is unset; `"mock"` always
/// succeeds; `"none"` disables completions.
pub fn create_model(config: &CompletionConfig) -> Result<Box<dyn CompletionModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(openai::OpenAiCompletionModel::new(config)?)),
        "mock" => Ok(Box::new(mock::MockCompletionModel)),
        "none" => anyhow::bail!("completion provider disabled by configuration"),
        other => anyhow::bail!("unknown completion provider: {other}. Supported: openai, mock, none"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_format_request_shape() {
        let format = ResponseFormat::json_schema("analysis", json!({"type": "object"}));
        let value = format.to_request_value();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], "analysis");
        assert_eq!(value["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn create_model_by_provider() {
        let mut config = CompletionConfig::default();
        config.provider = "mock".into();
        assert_eq!(create_model(&config).unwrap().model_id(), "mock");
        config.provider = "none".into();
        assert!(create_model(&config).is_err());
        config.provider = "davinci".into();
        assert!(create_model(&config).is_err());
    }
}
