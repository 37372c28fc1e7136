//! Chat-completion access.
//!
//! The pipeline only sees [`ChatModel`]; [`OpenAiProvider`] is the production
//! implementation and works against any OpenAI-compatible endpoint.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tuneconf::LlmConfig;

use crate::error::LlmError;
use crate::notation::strip_code_fences;

/// Token budget and sampling settings for one call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Sampling {
    /// Parameter and instrument extraction.
    pub const PLANNING: Sampling = Sampling {
        max_tokens: 500,
        temperature: 0.5,
        top_p: 0.9,
    };

    /// Per-part notation; looser sampling for more varied material.
    pub fn notation(max_tokens: u32) -> Sampling {
        Sampling {
            max_tokens,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// A single system + user exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub sampling: Sampling,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send the request and return the trimmed reply text.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// [`ChatModel`] backed by `async-openai`.
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiProvider {
    /// Build a provider from the `[llm]` config section.
    ///
    /// Fails before any network traffic when no API key is configured.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(config.api_base.trim_end_matches('/'));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client: Client::with_config(openai_config).with_http_client(http),
            model: config.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for OpenAiProvider {
    #[tracing::instrument(skip_all, fields(model = %self.model, max_tokens = request.sampling.max_tokens))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.as_str())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.user.as_str())
                .build()?
                .into(),
        ];

        #[allow(deprecated)]
        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .max_tokens(request.sampling.max_tokens)
            .temperature(request.sampling.temperature)
            .top_p(request.sampling.top_p)
            .build()?;

        let response = self.client.chat().create(chat_request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::EmptyResponse)?;

        tracing::debug!(reply = %content, "Raw model reply");
        Ok(content)
    }
}

/// Parse a JSON object out of a model reply.
///
/// Tolerates a surrounding code fence and whole-line `//` comments, both of
/// which models add despite being asked not to.
pub fn parse_json_reply(reply: &str) -> Result<serde_json::Value, serde_json::Error> {
    let body: Vec<&str> = strip_code_fences(reply)
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect();
    serde_json::from_str(&body.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_reply_plain() {
        let value = parse_json_reply(r#"{"tempo": 100}"#).unwrap();
        assert_eq!(value, json!({"tempo": 100}));
    }

    #[test]
    fn json_reply_with_fence_and_comments() {
        let reply = "```json\n{\n  // the groove\n  \"tempo\": 96\n}\n```";
        let value = parse_json_reply(reply).unwrap();
        assert_eq!(value, json!({"tempo": 96}));
    }

    #[test]
    fn json_reply_garbage() {
        assert!(parse_json_reply("Sure! Here is your song.").is_err());
    }

    #[test]
    fn provider_requires_key() {
        let config = LlmConfig {
            api_key: None,
            ..Default::default()
        };
        assert!(matches!(OpenAiProvider::new(&config), Err(LlmError::MissingApiKey)));

        let blank = LlmConfig {
            api_key: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(OpenAiProvider::new(&blank), Err(LlmError::MissingApiKey)));
    }

    #[test]
    fn sampling_presets() {
        assert_eq!(Sampling::PLANNING.max_tokens, 500);
        let notation = Sampling::notation(1000);
        assert_eq!(notation.max_tokens, 1000);
        assert_eq!(notation.temperature, 0.7);
    }
}
