use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{ArtifactError, ArtifactStore};

/// Filesystem-backed artifact store: one directory tree per project under
/// `root/<project_id>/<path>`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full_path(&self, project_id: &str, path: &str) -> PathBuf {
        self.root.join(project_id).join(path)
    }

    fn io_err(project_id: &str, path: &str, source: std::io::Error) -> ArtifactError {
        ArtifactError::Io {
            project_id: project_id.to_string(),
            path: path.to_string(),
            source,
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, project_id: &str, path: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        let full = self.full_path(project_id, path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Self::io_err(project_id, path, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| Self::io_err(project_id, path, e))
    }

    async fn get(&self, project_id: &str, path: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        let full = self.full_path(project_id, path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err(project_id, path, e)),
        }
    }

    async fn list(&self, project_id: &str, prefix: &str) -> Result<Vec<String>, ArtifactError> {
        let base = self.root.join(project_id);
        let walk_root = base.join(prefix);
        let mut out = Vec::new();
        walk(&walk_root, &base, &mut out)
            .await
            .map_err(|e| Self::io_err(project_id, prefix, e))?;
        out.sort();
        Ok(out)
    }

    async fn remove(&self, project_id: &str, path: &str) -> Result<(), ArtifactError> {
        let full = self.full_path(project_id, path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(project_id, path, e)),
        }
    }
}

fn walk<'a>(
    dir: &'a Path,
    base: &'a Path,
    out: &'a mut Vec<String>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, base, out).await?;
            } else if let Ok(rel) = path.strip_prefix(base) {
                out.push(rel.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(dir.path());

        store
            .put("p1", "deploy/dev/rendered.yaml", b"a: 1".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get("p1", "deploy/dev/rendered.yaml").await.unwrap(),
            Some(b"a: 1".to_vec())
        );

        let listed = store.list("p1", "deploy").await.unwrap();
        assert_eq!(listed, vec!["deploy/dev/rendered.yaml".to_string()]);

        store.remove("p1", "deploy/dev/rendered.yaml").await.unwrap();
        assert_eq!(store.get("p1", "deploy/dev/rendered.yaml").await.unwrap(), None);
    }
}
