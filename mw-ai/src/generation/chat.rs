//! OpenAI-compatible chat completion client
//!
//! `POST {base_url}/chat/completions` with a single user message; the text
//! of the first choice is the completion.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mw_common::config::GenerationConfig;

use super::{GenerationClient, GenerationError};

const USER_AGENT: &str = concat!("magicword/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct ChatCompletionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatCompletionClient {
    /// Build a client from `[generation]` settings and a resolved API key
    ///
    /// The connect timeout is short and the overall timeout long; a timeout
    /// surfaces as [`GenerationError::Timeout`].
    pub fn new(config: &GenerationConfig, api_key: Option<String>) -> Result<Self, GenerationError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(GenerationError::MissingApiKey)?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: chat_endpoint(&config.base_url),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

fn chat_endpoint(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

fn map_send_error(err: reqwest::Error) -> GenerationError {
    if err.is_timeout() {
        GenerationError::Timeout(err.to_string())
    } else {
        GenerationError::Network(err.to_string())
    }
}

#[async_trait]
impl GenerationClient for ChatCompletionClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String, GenerationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            max_tokens: self.max_tokens,
            temperature,
        };

        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            "Sending completion request"
        );

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api(status.as_u16(), error_text));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                GenerationError::Timeout(e.to_string())
            } else {
                GenerationError::Parse(e.to_string())
            }
        })?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            chat_endpoint("https://api.siliconflow.cn/v1/"),
            "https://api.siliconflow.cn/v1/chat/completions"
        );
        assert_eq!(
            chat_endpoint("http://localhost:8080/v1"),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_missing_key_rejected() {
        let config = GenerationConfig::default();
        assert!(matches!(
            ChatCompletionClient::new(&config, None),
            Err(GenerationError::MissingApiKey)
        ));
        assert!(matches!(
            ChatCompletionClient::new(&config, Some("  ".to_string())),
            Err(GenerationError::MissingApiKey)
        ));
    }

    #[test]
    fn test_client_creation() {
        let config = GenerationConfig::default();
        assert!(ChatCompletionClient::new(&config, Some("sk-test".to_string())).is_ok());
    }

    #[test]
    fn test_request_shape() {
        let request = ChatRequest {
            model: "Qwen/Qwen2.5-7B-Instruct",
            messages: vec![ChatMessage { role: "user", content: "hi" }],
            max_tokens: 2048,
            temperature: 0.5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 2048);
    }

    #[test]
    fn test_response_parsing() {
        let body: ChatResponse = serde_json::from_str(
            r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"[\"a\"]"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.choices[0].message.content.as_deref(), Some("[\"a\"]"));
    }
}
