use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{FootageService, body_snippet};
use crate::error::{PipelineError, PipelineResult};

const SERVICE: &str = "pexels";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    videos: Vec<Video>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    video_files: Vec<VideoFile>,
}

#[derive(Debug, Deserialize)]
struct VideoFile {
    link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PexelsClient {
    client: Client,
    base_url: String,
}

impl PexelsClient {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }
}

fn error_message(raw: &str) -> Option<String> {
    let root: Value = serde_json::from_str(raw).ok()?;
    let err = root.get("error")?;
    err.as_str()
        .or_else(|| err.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

#[async_trait]
impl FootageService for PexelsClient {
    async fn search_video(&self, api_key: &str, query: &str) -> PipelineResult<Option<String>> {
        let resp = self
            .client
            .get(format!("{}/videos/search", self.base_url))
            .query(&[("query", query), ("per_page", "1")])
            .header("Authorization", api_key)
            .send()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, None, format!("Pexels request failed: {}", e)))?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!("Pexels HTTP {}", status.as_u16());
            debug!("Pexels raw body: {}", body_snippet(&raw));
            let message = error_message(&raw).unwrap_or_else(|| "Failed to fetch video from Pexels".to_string());
            return Err(PipelineError::transport(SERVICE, Some(status.as_u16()), message));
        }

        let parsed: SearchResponse = serde_json::from_str(&raw).map_err(|e| {
            PipelineError::transport(SERVICE, Some(status.as_u16()), format!("Unexpected Pexels response: {}", e))
        })?;

        Ok(parsed
            .videos
            .into_iter()
            .next()
            .and_then(|v| v.video_files.into_iter().next())
            .and_then(|f| f.link)
            .filter(|link| !link.is_empty()))
    }

    async fn download(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, None, format!("Video download failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::transport(
                SERVICE,
                Some(status.as_u16()),
                format!("Video download failed with HTTP {}", status.as_u16()),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::transport(SERVICE, None, format!("Video download read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}
