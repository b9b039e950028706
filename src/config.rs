use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::info;

use crate::error::{PipelineError, PipelineResult};
use crate::keys::CredentialSet;

/// Where intermediate media lives between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Disk,
    Memory,
}

/// Process-wide settings shared by every job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    #[serde(default = "default_retention_secs")]
    pub result_retention_secs: u64,
    #[serde(default)]
    pub storage: StorageMode,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_encode_timeout_secs")]
    pub encode_timeout_secs: u64,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_pexels_base_url")]
    pub pexels_base_url: String,
    #[serde(default = "default_text_model")]
    pub default_text_model: String,
    #[serde(default = "default_voice_model")]
    pub default_voice_model: String,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_retention_secs() -> u64 {
    60 * 60
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_http_timeout_secs() -> u64 {
    300
}

fn default_encode_timeout_secs() -> u64 {
    1800
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_pexels_base_url() -> String {
    "https://api.pexels.com".to_string()
}

fn default_text_model() -> String {
    "gemini-1.5-pro-latest".to_string()
}

fn default_voice_model() -> String {
    "gemini-2.5-flash-preview-tts".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            results_dir: default_results_dir(),
            result_retention_secs: default_retention_secs(),
            storage: StorageMode::default(),
            ffmpeg_path: default_ffmpeg_path(),
            http_timeout_secs: default_http_timeout_secs(),
            encode_timeout_secs: default_encode_timeout_secs(),
            gemini_base_url: default_gemini_base_url(),
            pexels_base_url: default_pexels_base_url(),
            default_text_model: default_text_model(),
            default_voice_model: default_voice_model(),
        }
    }
}

impl AppConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;

        if config.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("config.json: ffmpeg_path must not be empty");
        }

        Ok(config)
    }

    pub async fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if fs::metadata(&path).await.is_err() {
            info!("No config at {}; using defaults", path.as_ref().display());
            return Ok(Self::default());
        }
        Self::load(path).await
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn encode_timeout(&self) -> Duration {
        Duration::from_secs(self.encode_timeout_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.result_retention_secs)
    }
}

/// One video request, as submitted by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default)]
    pub project_title: String,
    #[serde(default)]
    pub main_prompt: String,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub google_api_keys: String,
    #[serde(default)]
    pub pexels_api_keys: String,
    #[serde(default)]
    pub text_model: String,
    #[serde(default)]
    pub voice_model: String,
}

impl GenerationConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read job file: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse job file: {}", path.as_ref().display()))
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.project_title.trim().is_empty() || self.main_prompt.trim().is_empty() {
            return Err(PipelineError::validation("Project title and prompt are required"));
        }
        if self.text_credentials().is_empty() || self.footage_credentials().is_empty() {
            return Err(PipelineError::validation("API keys are required"));
        }
        if self.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(PipelineError::validation("At least one language must be selected"));
        }
        Ok(())
    }

    pub fn text_credentials(&self) -> CredentialSet {
        CredentialSet::parse(&self.google_api_keys)
    }

    pub fn footage_credentials(&self) -> CredentialSet {
        CredentialSet::parse(&self.pexels_api_keys)
    }

    pub fn primary_language(&self) -> Option<&str> {
        self.languages
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty())
    }

    pub fn text_model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.text_model.trim().is_empty() {
            fallback
        } else {
            self.text_model.trim()
        }
    }

    pub fn voice_model_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.voice_model.trim().is_empty() {
            fallback
        } else {
            self.voice_model.trim()
        }
    }
}
