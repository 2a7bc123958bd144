//! Offline completion model.
//!
//! Answers every schema-constrained prompt with the emptiest object the schema
//! allows, so the evolution pipeline runs end to end and applies nothing.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{CompletionModel, ResponseFormat};

pub struct MockCompletionModel;

#[async_trait]
impl CompletionModel for MockCompletionModel {
    async fn complete(&self, _prompt: &str, format: Option<&ResponseFormat>) -> Result<String> {
        Ok(match format {
            Some(format) => empty_for_schema(&format.schema).to_string(),
            None => String::new(),
        })
    }

    fn model_id(&self) -> &str {
        "mock"
    }
}

/// Top-level properties mapped to their type's zero value.
fn empty_for_schema(schema: &Value) -> Value {
    let mut out = Map::new();
    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (name, prop) in properties {
            let zero = match prop.get("type").and_then(Value::as_str).unwrap_or("string") {
                "array" => Value::Array(vec![]),
                "object" => Value::Object(Map::new()),
                "number" | "integer" => Value::from(0),
                "boolean" => Value::Bool(false),
                _ => Value::String(String::new()),
            };
            out.insert(name.clone(), zero);
        }
    }
    Value::Object(out)
}
