use crate::error::{PipelineError, PipelineResult};
use std::future::Future;
use tracing::{debug, warn};

const KEY_PREFIX_CHARS: usize = 4;

/// Ordered API keys parsed from a comma-separated string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CredentialSet {
    keys: Vec<String>,
}

impl CredentialSet {
    pub fn parse(raw: &str) -> Self {
        let keys = raw
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect();
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }
}

// Keys must never reach logs in full.
impl std::fmt::Debug for CredentialSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.keys.iter().map(|k| mask_key(k)))
            .finish()
    }
}

pub fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(KEY_PREFIX_CHARS).collect();
    format!("{}...", prefix)
}

/// Runs `operation` with each key in order until one succeeds.
///
/// Only quota-class failures move on to the next key; any other error is
/// returned as-is without touching the remaining keys.
pub async fn with_key_rotation<T, F, Fut>(
    credentials: &CredentialSet,
    label: &str,
    mut operation: F,
) -> PipelineResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = PipelineResult<T>>,
{
    if credentials.is_empty() {
        return Err(PipelineError::NoCredentials {
            label: label.to_string(),
        });
    }

    let mut last_error: Option<PipelineError> = None;
    let mut attempts = 0usize;

    for key in credentials.iter() {
        attempts += 1;
        debug!("Attempting {} with key {}", label, mask_key(key));

        match operation(key.to_string()).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_quota_exhausted() => {
                warn!("{} hit quota with key {}: {}", label, mask_key(key), err);
                last_error = Some(err);
            }
            Err(err) => {
                warn!("{} failed with key {}: {}", label, mask_key(key), err);
                return Err(err);
            }
        }
    }

    Err(PipelineError::CredentialsExhausted {
        label: label.to_string(),
        attempts,
        last: last_error.map(|e| e.to_string()).unwrap_or_default(),
    })
}
