use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs;
use tracing::warn;

use crate::error::{Error, Result};

/// A stored asset, derived by scanning the media directory. The directory
/// is the source of truth; nothing here is cached between calls.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

/// Disk-backed asset store
pub struct AssetStore {
    dir: PathBuf,
}

impl AssetStore {
    /// Open the store, creating the media directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create media dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Absolute path of a stored (or to-be-stored) asset
    pub fn path_of(&self, filename: &str) -> PathBuf {
        self.dir.join(filename)
    }

    /// Enumerate current assets. Unreadable entries are skipped with a
    /// warning rather than failing the whole scan.
    pub async fn scan(&self) -> Result<Vec<AssetRecord>> {
        let mut entries = fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("failed to read media dir {}", self.dir.display()))?;

        let mut records = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("failed to read media dir entry")?
        {
            let metadata = match entry.metadata().await {
                Ok(m) => m,
                Err(err) => {
                    warn!("skipping unreadable entry {:?}: {}", entry.file_name(), err);
                    continue;
                }
            };

            if !metadata.is_file() {
                continue;
            }

            let created = metadata
                .modified()
                .unwrap_or_else(|_| SystemTime::now());

            records.push(AssetRecord {
                filename: entry.file_name().to_string_lossy().into_owned(),
                size_bytes: metadata.len(),
                created_at: DateTime::<Utc>::from(created),
            });
        }

        Ok(records)
    }

    /// Aggregate size of everything currently stored
    pub async fn total_bytes(&self) -> Result<u64> {
        Ok(self.scan().await?.iter().map(|r| r.size_bytes).sum())
    }

    /// Delete one asset by name
    pub async fn delete(&self, filename: &str) -> Result<()> {
        let name = sanitize(filename)?;
        match fs::remove_file(self.dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(filename.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Storage name for an upload: millisecond timestamp + the original
    /// name. Admissions are single-flight, so this is collision-free.
    pub fn unique_name(&self, original: &str) -> Result<String> {
        let original = sanitize(original)?;
        Ok(format!("{}-{}", Utc::now().timestamp_millis(), original))
    }
}

/// Reject names that escape the media directory
fn sanitize(name: &str) -> Result<&str> {
    let candidate = Path::new(name);
    match candidate.file_name() {
        Some(base) if base.to_str() == Some(name) && !name.starts_with('.') => Ok(name),
        _ => Err(Error::Validation(format!("invalid asset name: {name:?}"))),
    }
}
