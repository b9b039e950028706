use once_cell::sync::OnceCell;
use regex::Regex;
use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

const UNKNOWN_FAILURE: &str = "Video generation failed due to an unknown error";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No valid API keys provided for {label}")]
    NoCredentials { label: String },

    #[error("All provided API keys have exceeded their quota for {label} ({attempts} tried): {last}")]
    CredentialsExhausted {
        label: String,
        attempts: usize,
        last: String,
    },

    #[error("{message}")]
    Transport {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("No plan generated")]
    PlanEmpty,

    #[error("Invalid plan format: {0}")]
    PlanFormat(String),

    #[error("No audio content generated")]
    NoAudioContent,

    #[error("Audio payload could not be decoded: {0}")]
    AudioDecode(String),

    #[error("No video found for \"{query}\"")]
    NoFootageFound { query: String },

    #[error("No video files provided")]
    NoClips,

    #[error("FFmpeg processing failed: {message}")]
    Encode {
        message: String,
        stderr: Option<String>,
    },

    #[error("{0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn quota_regex() -> Result<&'static Regex, regex::Error> {
    static QUOTA_RE: OnceCell<Regex> = OnceCell::new();
    QUOTA_RE.get_or_try_init(|| Regex::new(r"(?i)quota|rate[ _]limit|resource_exhausted"))
}

/// Heuristic match against the wording providers use for quota and
/// rate-limit rejections.
pub fn looks_like_quota_message(message: &str) -> bool {
    quota_regex()
        .map(|re| re.is_match(message))
        .unwrap_or(false)
}

impl PipelineError {
    pub fn transport(service: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            status,
            message: message.into(),
        }
    }

    pub fn encode(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::Encode {
            message: message.into(),
            stderr,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether rotating to the next credential could help.
    pub fn is_quota_exhausted(&self) -> bool {
        match self {
            Self::Transport {
                status, message, ..
            } => *status == Some(429) || looks_like_quota_message(message),
            _ => false,
        }
    }

    pub fn user_message(&self) -> String {
        let text = self.to_string();
        if text.trim().is_empty() {
            UNKNOWN_FAILURE.to_string()
        } else {
            text
        }
    }
}
