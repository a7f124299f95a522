use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// On-disk storage for uploaded assets.
///
/// Files live at `{root}/{room_id}/{asset_id}{ext}`. The path stored in the
/// database is the part relative to `root`.
#[derive(Debug, Clone)]
pub struct AssetStorage {
    root: PathBuf,
}

impl AssetStorage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating uploads dir {}", root.display()))?;
        info!("Asset storage directory: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative storage path for a new asset.
    pub fn relative_path(room_id: Uuid, asset_id: Uuid, ext: &str) -> String {
        format!("{room_id}/{asset_id}{ext}")
    }

    /// Write an asset's bytes, creating the room directory on first use.
    pub async fn write(&self, relative: &str, data: &[u8]) -> Result<()> {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Delete an asset file. A file that is already gone is not an error.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.root.join(relative);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Asset file {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a room's files and its directory, if empty.
    pub async fn delete_all(&self, room_id: Uuid, relative_paths: &[String]) -> Result<()> {
        for relative in relative_paths {
            self.delete(relative).await?;
        }
        // Leftover files mean something else wrote there; keep the dir then.
        fs::remove_dir(self.root.join(room_id.to_string())).await.ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tabletop-storage-{}", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn write_then_delete() {
        let root = scratch_dir();
        let storage = AssetStorage::new(root.clone()).await.unwrap();
        let room = Uuid::new_v4();
        let rel = AssetStorage::relative_path(room, Uuid::new_v4(), ".png");

        storage.write(&rel, b"\x89PNG").await.unwrap();
        assert_eq!(fs::read(root.join(&rel)).await.unwrap(), b"\x89PNG");

        storage.delete_all(room, &[rel.clone()]).await.unwrap();
        assert!(!root.join(&rel).exists());
        assert!(!root.join(room.to_string()).exists());

        // second delete is fine
        storage.delete(&rel).await.unwrap();
        fs::remove_dir_all(root).await.ok();
    }
}
