//! Azure OpenAI chat completions client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{validate_history, CompletionClient, CompletionError};
use crate::history::Message;
use crate::settings::CompletionSettings;

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

/// Error response body
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AzureOpenAiClient {
    http: Client,
    url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl AzureOpenAiClient {
    pub fn new(
        settings: &CompletionSettings,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: chat_url(
                &settings.endpoint,
                &settings.deployment,
                &settings.api_version,
            ),
            api_key,
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
    }
}

fn chat_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        endpoint.trim_end_matches('/'),
        deployment,
        api_version
    )
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorResponse>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    async fn complete(&self, history: &[Message]) -> Result<String, CompletionError> {
        validate_history(history)?;

        let body = ChatCompletionRequest {
            messages: history,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        };

        log::info!("Requesting completion ({} messages)", history.len());

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Timeout
                } else {
                    CompletionError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            if e.is_timeout() {
                CompletionError::Timeout
            } else {
                CompletionError::Network(e.to_string())
            }
        })?;

        if !status.is_success() {
            let message = error_message(&text);
            log::error!("Completion API error ({}): {}", status.as_u16(), message);
            return Err(match status.as_u16() {
                401 | 403 => CompletionError::Auth(message),
                429 => CompletionError::RateLimited,
                code => CompletionError::Network(format!("HTTP {}: {}", code, message)),
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| CompletionError::Malformed(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| CompletionError::Malformed("response contained no reply".into()))?;

        log::info!("Completion received: {} chars", content.len());
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_endpoint_without_double_slash() {
        assert_eq!(
            chat_url("https://example.openai.azure.com/", "gpt-4o-mini", "2024-08-01-preview"),
            "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-08-01-preview"
        );
    }

    #[test]
    fn error_message_prefers_structured_body() {
        assert_eq!(
            error_message(r#"{"error":{"message":"Access denied"}}"#),
            "Access denied"
        );
        assert_eq!(error_message("plain failure"), "plain failure");
    }

    #[test]
    fn request_serializes_full_history_in_order() {
        let history = vec![
            Message::system("persona"),
            Message::user("hello"),
            Message::assistant("hi"),
        ];
        let body = ChatCompletionRequest {
            messages: &history,
            max_tokens: 100,
            temperature: 0.5,
            top_p: 1.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 100);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][2]["content"], "hi");
    }
}
