use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{SpeechPayload, SpeechService, TextService, body_snippet};
use crate::error::{PipelineError, PipelineResult};
use crate::keys::{CredentialSet, with_key_rotation};

const SERVICE: &str = "gemini";

pub const VOICE_MODELS: &[&str] = &[
    "tts-1",
    "tts-1-hd",
    "gemini-2.5-flash-preview-tts",
    "gemini-2.5-pro-preview-tts",
];

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    async fn generate_content(&self, api_key: &str, model: &str, body: &Value) -> PipelineResult<Value> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let resp = self
            .client
            .post(url)
            .query(&[("key", api_key)])
            .json(body)
            .send()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, None, format!("Gemini request failed: {}", e)))?;

        read_json(resp, "Failed to generate content").await
    }

    /// Model ids usable with `generateContent`, `models/` prefix removed.
    pub async fn list_text_models(&self, credentials: &CredentialSet) -> PipelineResult<Vec<String>> {
        with_key_rotation(credentials, "Model listing", |key| async move {
            let resp = self
                .client
                .get(format!("{}/v1beta/models", self.base_url))
                .query(&[("key", key.as_str())])
                .send()
                .await
                .map_err(|e| PipelineError::transport(SERVICE, None, format!("Gemini request failed: {}", e)))?;
            let root = read_json(resp, "Failed to fetch models").await?;
            Ok(text_model_ids(&root))
        })
        .await
    }
}

async fn read_json(resp: reqwest::Response, fallback: &str) -> PipelineResult<Value> {
    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();
    let root: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);

    if !status.is_success() {
        warn!("Gemini HTTP {}", status.as_u16());
        if !raw.is_empty() {
            debug!("Gemini raw body: {}", body_snippet(&raw));
        }
        let message = error_message(&root).unwrap_or_else(|| fallback.to_string());
        return Err(PipelineError::transport(SERVICE, Some(status.as_u16()), message));
    }

    if root.is_null() {
        return Err(PipelineError::transport(
            SERVICE,
            Some(status.as_u16()),
            format!("{}: response was not JSON", fallback),
        ));
    }
    Ok(root)
}

fn error_message(root: &Value) -> Option<String> {
    let err = root.get("error")?;
    let msg = err.get("message").and_then(Value::as_str)?;
    let status = err.get("status").and_then(Value::as_str);
    Some(match status {
        Some(s) if !msg.contains(s) => format!("{} ({})", msg, s),
        _ => msg.to_string(),
    })
}

fn first_candidate_parts(root: &Value) -> Option<&Vec<Value>> {
    root.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()
}

fn extract_text(root: &Value) -> Option<String> {
    first_candidate_parts(root)?
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .find(|t| !t.trim().is_empty())
        .map(str::to_string)
}

fn extract_audio(root: &Value) -> Option<SpeechPayload> {
    for part in first_candidate_parts(root)? {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
        if let Some(inline) = inline {
            if let Some(data) = inline.get("data").and_then(Value::as_str) {
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                return Some(SpeechPayload {
                    data_base64: data.to_string(),
                    mime_type,
                });
            }
        }
        if let Some(data) = part.get("audio_data").and_then(Value::as_str) {
            return Some(SpeechPayload {
                data_base64: data.to_string(),
                mime_type: None,
            });
        }
    }
    None
}

fn text_model_ids(root: &Value) -> Vec<String> {
    let Some(models) = root.get("models").and_then(Value::as_array) else {
        return Vec::new();
    };
    models
        .iter()
        .filter(|m| {
            m.get("supportedGenerationMethods")
                .and_then(Value::as_array)
                .map(|methods| methods.iter().any(|v| v.as_str() == Some("generateContent")))
                .unwrap_or(false)
        })
        .filter_map(|m| m.get("name").and_then(Value::as_str))
        .map(|name| name.trim_start_matches("models/").to_string())
        .collect()
}

#[async_trait]
impl TextService for GeminiClient {
    async fn generate_text(&self, api_key: &str, model: &str, prompt: &str) -> PipelineResult<Option<String>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        let root = self.generate_content(api_key, model, &body).await?;
        Ok(extract_text(&root))
    }
}

#[async_trait]
impl SpeechService for GeminiClient {
    async fn generate_speech(
        &self,
        api_key: &str,
        model: &str,
        text: &str,
    ) -> PipelineResult<Option<SpeechPayload>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "temperature": 0.8,
                "responseModalities": ["AUDIO"],
            },
        });
        let root = self.generate_content(api_key, model, &body).await?;
        Ok(extract_audio(&root))
    }
}
