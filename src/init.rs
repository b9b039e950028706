use anyhow::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::config::AppConfig;

pub async fn ensure_directories(config: &AppConfig) -> Result<()> {
    for dir in [&config.work_dir, &config.results_dir] {
        if !dir.exists() {
            fs::create_dir_all(dir).await?;
            info!("Created directory: {}", dir.display());
        }
    }
    Ok(())
}

pub async fn check_ffmpeg(program: &str) -> bool {
    match tokio::process::Command::new(program)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Deletes published videos older than `retention`. Expiry timers do not
/// survive a restart, so this runs at startup. Returns how many were removed.
pub fn purge_stale_results(dir: &Path, retention: Duration) -> usize {
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let is_mp4 = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("mp4"))
            .unwrap_or(false);
        if !is_mp4 {
            continue;
        }

        let age = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .and_then(|t| now.duration_since(t).ok());
        if age.is_some_and(|age| age >= retention) {
            match std::fs::remove_file(path) {
                Ok(()) => removed += 1,
                Err(err) => warn!("Could not purge {}: {}", path.display(), err),
            }
        }
    }

    if removed > 0 {
        info!("Purged {} stale result(s) from {}", removed, dir.display());
    }
    removed
}
