use tracing::info;

use crate::api::FootageService;
use crate::error::{PipelineError, PipelineResult};
use crate::keys::{CredentialSet, with_key_rotation};
use crate::media::{AssetStore, MediaAsset, MediaKind};

/// Finds the best stock clip for `keywords` and downloads it in full.
pub async fn fetch_footage(
    footage: &dyn FootageService,
    store: &AssetStore,
    keywords: &str,
    credentials: &CredentialSet,
) -> PipelineResult<MediaAsset> {
    let bytes = with_key_rotation(credentials, "Pexels video fetch", |key| async move {
        let link = footage
            .search_video(&key, keywords)
            .await?
            .ok_or_else(|| PipelineError::NoFootageFound {
                query: keywords.to_string(),
            })?;
        footage.download(&link).await
    })
    .await?;

    if bytes.is_empty() {
        return Err(PipelineError::NoFootageFound {
            query: keywords.to_string(),
        });
    }

    info!("Downloaded clip for \"{}\" ({} bytes)", keywords, bytes.len());
    Ok(store.put(MediaKind::Video, "mp4", bytes).await?)
}
