//! OpenAI-compatible chat-completions client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{check_status, http_client, AdapterResult, TextGenerator, TextGeneratorSource};
use crate::config::{Settings, TextGenerationSettings};
use crate::error::IntegrationError;

#[derive(Clone)]
pub struct OpenAiTextGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
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

impl OpenAiTextGenerator {
    pub fn new(
        client: reqwest::Client,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, system: &str, user: &str) -> AdapterResult<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: user,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let chat: ChatResponse = check_status(response).await?.json().await?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| IntegrationError::Permanent("empty completion".to_string()))?;

        debug!(chars = text.chars().count(), "Generated text");
        Ok(text)
    }
}

/// Builds a generator from an organization key or the configured default
pub struct OpenAiSource {
    client: reqwest::Client,
    settings: TextGenerationSettings,
}

impl OpenAiSource {
    pub fn new(client: reqwest::Client, settings: TextGenerationSettings) -> Self {
        Self { client, settings }
    }

    pub fn from_settings(settings: &Settings) -> AdapterResult<Self> {
        Ok(Self::new(
            http_client(settings.http.timeout())?,
            settings.text_generation.clone(),
        ))
    }
}

impl TextGeneratorSource for OpenAiSource {
    fn for_key(&self, organization_key: Option<&str>) -> Option<Arc<dyn TextGenerator>> {
        let key = organization_key
            .filter(|k| !k.is_empty())
            .or(self.settings.api_key.as_deref().filter(|k| !k.is_empty()))?;

        Some(Arc::new(OpenAiTextGenerator::new(
            self.client.clone(),
            key,
            self.settings.base_url.clone(),
            self.settings.model.clone(),
        )))
    }
}
