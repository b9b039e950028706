use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

use crate::config::StorageMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    fn tag(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetData {
    File(PathBuf),
    Memory(Vec<u8>),
}

/// Handle to one intermediate or final media file of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub kind: MediaKind,
    pub extension: String,
    pub data: AssetData,
}

impl MediaAsset {
    pub fn file(kind: MediaKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_string();
        Self {
            kind,
            extension,
            data: AssetData::File(path),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            AssetData::File(p) => Some(p.as_path()),
            AssetData::Memory(_) => None,
        }
    }
}

/// Per-job scratch area. Everything inside is removed when the store is
/// dropped, so only assets moved out with [`AssetStore::publish`] survive.
pub struct AssetStore {
    dir: TempDir,
    mode: StorageMode,
    counter: AtomicU32,
}

impl AssetStore {
    pub fn create(root: &Path, job_id: &str, mode: StorageMode) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(root)?;
        Ok(Self {
            dir,
            mode,
            counter: AtomicU32::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Fresh path inside the job directory; names never repeat within a job.
    pub fn reserve_path(&self, kind: MediaKind, extension: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.dir
            .path()
            .join(format!("{}_{:03}.{}", kind.tag(), n, extension))
    }

    pub async fn put(&self, kind: MediaKind, extension: &str, bytes: Vec<u8>) -> std::io::Result<MediaAsset> {
        match self.mode {
            StorageMode::Memory => Ok(MediaAsset {
                kind,
                extension: extension.to_string(),
                data: AssetData::Memory(bytes),
            }),
            StorageMode::Disk => {
                let path = self.reserve_path(kind, extension);
                fs::write(&path, &bytes).await?;
                Ok(MediaAsset::file(kind, path))
            }
        }
    }

    /// Path the encoder can read. In-memory assets are spilled to disk first.
    pub async fn materialize(&self, asset: &MediaAsset) -> std::io::Result<PathBuf> {
        match &asset.data {
            AssetData::File(path) => Ok(path.clone()),
            AssetData::Memory(bytes) => {
                let path = self.reserve_path(asset.kind, &asset.extension);
                fs::write(&path, bytes).await?;
                Ok(path)
            }
        }
    }

    /// Removes `path` if it was spilled from an in-memory `asset` by
    /// [`AssetStore::materialize`]. File-backed assets are left alone.
    pub async fn release(&self, asset: &MediaAsset, path: &Path) {
        if let AssetData::Memory(_) = asset.data {
            if path.starts_with(self.dir.path()) {
                if let Err(err) = fs::remove_file(path).await {
                    debug!("Could not remove {}: {}", path.display(), err);
                }
            }
        }
    }

    pub async fn discard(&self, asset: MediaAsset) {
        if let AssetData::File(path) = asset.data {
            if path.starts_with(self.dir.path()) {
                if let Err(err) = fs::remove_file(&path).await {
                    debug!("Could not remove {}: {}", path.display(), err);
                }
            }
        }
    }

    /// Moves the asset to `dest`, outside the scratch directory.
    pub async fn publish(&self, asset: &MediaAsset, dest: &Path) -> std::io::Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        match &asset.data {
            AssetData::Memory(bytes) => fs::write(dest, bytes).await?,
            AssetData::File(path) => {
                if fs::rename(path, dest).await.is_err() {
                    fs::copy(path, dest).await?;
                    let _ = fs::remove_file(path).await;
                }
            }
        }
        Ok(dest.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disk_assets_live_under_the_job_dir_and_vanish_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let store = AssetStore::create(root.path(), "job1", StorageMode::Disk).unwrap();
        let asset = store.put(MediaKind::Audio, "mp3", vec![1, 2, 3]).await.unwrap();
        let path = asset.path().unwrap().to_path_buf();
        assert!(path.starts_with(store.dir()));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);

        let dir = store.dir().to_path_buf();
        drop(store);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn concurrent_jobs_get_distinct_dirs_and_names() {
        let root = tempfile::tempdir().unwrap();
        let a = AssetStore::create(root.path(), "job", StorageMode::Disk).unwrap();
        let b = AssetStore::create(root.path(), "job", StorageMode::Disk).unwrap();
        assert_ne!(a.dir(), b.dir());
        let p1 = a.reserve_path(MediaKind::Video, "mp4");
        let p2 = a.reserve_path(MediaKind::Video, "mp4");
        assert_ne!(p1, p2);
    }

    #[tokio::test]
    async fn memory_assets_materialize_on_demand() {
        let root = tempfile::tempdir().unwrap();
        let store = AssetStore::create(root.path(), "job2", StorageMode::Memory).unwrap();
        let asset = store.put(MediaKind::Video, "mp4", b"clip".to_vec()).await.unwrap();
        assert!(asset.path().is_none());
        let path = store.materialize(&asset).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"clip");
    }

    #[tokio::test]
    async fn release_only_removes_spilled_copies() {
        let root = tempfile::tempdir().unwrap();
        let store = AssetStore::create(root.path(), "job4", StorageMode::Memory).unwrap();
        let in_memory = store.put(MediaKind::Video, "mp4", b"clip".to_vec()).await.unwrap();
        let spilled = store.materialize(&in_memory).await.unwrap();
        store.release(&in_memory, &spilled).await;
        assert!(!spilled.exists());

        let on_disk = MediaAsset::file(MediaKind::Video, store.reserve_path(MediaKind::Video, "mp4"));
        let path = on_disk.path().unwrap().to_path_buf();
        std::fs::write(&path, b"keep").unwrap();
        store.release(&on_disk, &path).await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn publish_moves_out_of_scratch() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let store = AssetStore::create(root.path(), "job3", StorageMode::Disk).unwrap();
        let asset = store.put(MediaKind::Video, "mp4", b"final".to_vec()).await.unwrap();
        let dest = out.path().join("final.mp4");
        store.publish(&asset, &dest).await.unwrap();
        drop(store);
        assert_eq!(std::fs::read(dest).unwrap(), b"final");
    }
}
