//! Azure Translator (v3) client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TranslationError, Translator};
use crate::settings::TranslationSettings;

#[derive(Debug, Serialize)]
struct TranslateInput<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResult {
    #[serde(default)]
    translations: Vec<TranslatedText>,
}

#[derive(Debug, Deserialize)]
struct TranslatedText {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct AzureTranslator {
    http: Client,
    url: String,
    api_version: String,
    key: String,
    region: Option<String>,
}

impl AzureTranslator {
    pub fn new(
        settings: &TranslationSettings,
        key: String,
        timeout: Duration,
    ) -> Result<Self, TranslationError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslationError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: format!("{}/translate", settings.endpoint.trim_end_matches('/')),
            api_version: settings.api_version.clone(),
            key,
            region: settings.region.clone().filter(|r| !r.is_empty()),
        })
    }
}

/// Concatenate every translated fragment, in order, separated by one space.
fn join_translations(results: Vec<TranslateResult>) -> Option<String> {
    let fragments: Vec<String> = results
        .into_iter()
        .flat_map(|r| r.translations.into_iter().map(|t| t.text))
        .collect();
    if fragments.is_empty() {
        None
    } else {
        Some(fragments.join(" "))
    }
}

#[async_trait]
impl Translator for AzureTranslator {
    async fn translate(
        &self,
        text: &str,
        from: &str,
        to: &str,
    ) -> Result<String, TranslationError> {
        if text.trim().is_empty() {
            return Err(TranslationError::EmptyInput);
        }

        let trace_id = Uuid::new_v4();
        log::info!(
            "Translating {} chars {} -> {} (trace {})",
            text.chars().count(),
            from,
            to,
            trace_id
        );

        let mut request = self
            .http
            .post(&self.url)
            .query(&[
                ("api-version", self.api_version.as_str()),
                ("from", from),
                ("to", to),
            ])
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .header("X-ClientTraceId", trace_id.to_string())
            .json(&[TranslateInput { text }]);
        if let Some(region) = &self.region {
            request = request.header("Ocp-Apim-Subscription-Region", region);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranslationError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranslationError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            log::error!("Translator API error ({}): {}", status.as_u16(), message);
            return Err(match status.as_u16() {
                401 | 403 => TranslationError::Auth(message),
                code => TranslationError::Network(format!("HTTP {}: {}", code, message)),
            });
        }

        let results: Vec<TranslateResult> = serde_json::from_str(&body)
            .map_err(|e| TranslationError::Malformed(e.to_string()))?;

        join_translations(results)
            .ok_or_else(|| TranslationError::Malformed("response contained no translations".into()))
    }
}
