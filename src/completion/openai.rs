//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{CompletionModel, ResponseFormat};
use crate::config::CompletionConfig;

const SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const JSON_SYSTEM_PROMPT: &str =
    "You must respond with a JSON object following the provided schema.";

pub struct OpenAiCompletionModel {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompletionModel {
    pub fn new(config: &CompletionConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{} is not set", config.api_key_env))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        tracing::info!(model = %config.model, "completion model configured");

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, prompt: &str, format: Option<&ResponseFormat>) -> serde_json::Value {
        let system = if format.is_some() {
            JSON_SYSTEM_PROMPT
        } else {
            SYSTEM_PROMPT
        };
        let mut body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": prompt},
            ],
        });
        if let Some(format) = format {
            body["response_format"] = format.to_request_value();
        }
        body
    }
}

#[async_trait]
impl CompletionModel for OpenAiCompletionModel {
    async fn complete(&self, prompt: &str, format: Option<&ResponseFormat>) -> Result<String> {
        let body = self.request_body(prompt, format);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .await
            .with_context(|| format!("HTTP request failed for {}", self.endpoint))?;

        let status = response.status();
        let text = response.text().await.context("error reading response")?;
        anyhow::ensure!(status.is_success(), "completion failed with HTTP {status}: {text}");

        let parsed: ChatResponse =
            serde_json::from_str(&text).context("unexpected completion response shape")?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> OpenAiCompletionModel {
        OpenAiCompletionModel {
            client: reqwest::Client::new(),
            endpoint: "http://localhost/v1/chat/completions".into(),
            api_key: "test".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    #[test]
    fn body_without_format_uses_plain_system_prompt() {
        let body = model().request_body("hello", None);
        assert_eq!(body["messages"][0]["content"], SYSTEM_PROMPT);
        assert_eq!(body["messages"][1]["content"], "hello");
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn body_with_format_requests_json() {
        let format = ResponseFormat::json_schema("s", json!({"type": "object"}));
        let body = model().request_body("hello", Some(&format));
        assert_eq!(body["messages"][0]["content"], JSON_SYSTEM_PROMPT);
        assert_eq!(body["response_format"]["type"], "json_schema");
    }

    #[test]
    fn missing_api_key_fails_construction() {
        let mut config = CompletionConfig::default();
        config.api_key_env = "NOESIS_TEST_UNSET_KEY".into();
        assert!(OpenAiCompletionModel::new(&config).is_err());
    }

    #[test]
    fn parses_chat_response() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\":1}"}}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("{\"a\":1}"));
    }
}
