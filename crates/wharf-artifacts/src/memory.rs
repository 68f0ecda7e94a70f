use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{ArtifactError, ArtifactStore};

#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, project_id: &str, path: &str, bytes: Vec<u8>) -> Result<(), ArtifactError> {
        self.blobs
            .write()
            .insert((project_id.to_string(), path.to_string()), bytes);
        Ok(())
    }

    async fn get(&self, project_id: &str, path: &str) -> Result<Option<Vec<u8>>, ArtifactError> {
        Ok(self
            .blobs
            .read()
            .get(&(project_id.to_string(), path.to_string()))
            .cloned())
    }

    async fn list(&self, project_id: &str, prefix: &str) -> Result<Vec<String>, ArtifactError> {
        let mut paths: Vec<String> = self
            .blobs
            .read()
            .keys()
            .filter(|(pid, path)| pid == project_id && path.starts_with(prefix))
            .map(|(_, path)| path.clone())
            .collect();
        paths.sort();
        Ok(paths)
    }

    async fn remove(&self, project_id: &str, path: &str) -> Result<(), ArtifactError> {
        self.blobs
            .write()
            .remove(&(project_id.to_string(), path.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_list_remove_round_trip() {
        let store = InMemoryArtifactStore::new();
        store
            .put("p1", "deploy/dev/rendered.yaml", b"a: 1".to_vec())
            .await
            .unwrap();
        store
            .put("p1", "deploy/dev/deployment.yaml", b"b: 2".to_vec())
            .await
            .unwrap();
        store
            .put("p1", "deploy/staging/rendered.yaml", b"c: 3".to_vec())
            .await
            .unwrap();

        assert_eq!(
            store.get("p1", "deploy/dev/rendered.yaml").await.unwrap(),
            Some(b"a: 1".to_vec())
        );

        let listed = store.list("p1", "deploy/dev").await.unwrap();
        assert_eq!(
            listed,
            vec![
                "deploy/dev/deployment.yaml".to_string(),
                "deploy/dev/rendered.yaml".to_string()
            ]
        );

        store.remove("p1", "deploy/dev/rendered.yaml").await.unwrap();
        assert_eq!(store.get("p1", "deploy/dev/rendered.yaml").await.unwrap(), None);
    }
}
