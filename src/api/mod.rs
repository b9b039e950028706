//! Seams to the external services. The pipeline only talks to these traits;
//! `gemini` and `pexels` hold the HTTP implementations.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::error::PipelineResult;

pub mod gemini;
pub mod pexels;

const USER_AGENT: &str = concat!("ai-video-shorts/", env!("CARGO_PKG_VERSION"));

/// Inline audio returned by a speech model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechPayload {
    pub data_base64: String,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait TextService: Send + Sync {
    /// First text part of the reply, or `None` when the service answered
    /// successfully without any text.
    async fn generate_text(&self, api_key: &str, model: &str, prompt: &str) -> PipelineResult<Option<String>>;
}

#[async_trait]
pub trait SpeechService: Send + Sync {
    async fn generate_speech(
        &self,
        api_key: &str,
        model: &str,
        text: &str,
    ) -> PipelineResult<Option<SpeechPayload>>;
}

#[async_trait]
pub trait FootageService: Send + Sync {
    /// Download link of the best match, if any.
    async fn search_video(&self, api_key: &str, query: &str) -> PipelineResult<Option<String>>;

    async fn download(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")
}

pub(crate) fn body_snippet(raw: &str) -> String {
    raw.chars().take(800).collect()
}
