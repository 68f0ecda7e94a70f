//! In-memory `KvStore`. Primarily for this repo's own use and tests; keeps
//! the same ordering/append semantics a durable backend must also honor.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use wharf_types::{Operation, Project, ReleaseRecord};

use crate::{KvStore, OpsIndex, ReleaseIndex, StoreError, OPS_INDEX_HISTORY_LIMIT};

#[derive(Default)]
pub struct InMemoryKvStore {
    projects: RwLock<HashMap<String, Project>>,
    ops: RwLock<HashMap<String, Operation>>,
    ops_index: RwLock<HashMap<String, OpsIndex>>,
    releases: RwLock<HashMap<String, ReleaseRecord>>,
    release_index: RwLock<HashMap<(String, String), ReleaseIndex>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn put_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .write()
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().get(id).cloned())
    }

    async fn delete_project(&self, id: &str) -> Result<(), StoreError> {
        self.projects.write().remove(id);
        Ok(())
    }

    async fn put_op(&self, op: &Operation) -> Result<(), StoreError> {
        self.ops.write().insert(op.id.clone(), op.clone());

        let mut index = self.ops_index.write();
        let entry = index.entry(op.project_id.clone()).or_default();
        if !entry.op_ids.contains(&op.id) {
            entry.op_ids.insert(0, op.id.clone());
            if entry.op_ids.len() > OPS_INDEX_HISTORY_LIMIT {
                entry.op_ids.truncate(OPS_INDEX_HISTORY_LIMIT);
            }
        }
        entry.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn get_op(&self, id: &str) -> Result<Option<Operation>, StoreError> {
        Ok(self.ops.read().get(id).cloned())
    }

    async fn list_project_ops(&self, project_id: &str) -> Result<OpsIndex, StoreError> {
        Ok(self
            .ops_index
            .read()
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn put_release(&self, release: &ReleaseRecord) -> Result<(), StoreError> {
        self.releases
            .write()
            .insert(release.id.clone(), release.clone());

        let key = (release.project_id.clone(), release.environment.clone());
        let mut index = self.release_index.write();
        let entry = index.entry(key).or_default();
        entry.release_ids.insert(0, release.id.clone());
        entry.current_release_id = Some(release.id.clone());
        Ok(())
    }

    async fn get_release(&self, id: &str) -> Result<Option<ReleaseRecord>, StoreError> {
        Ok(self.releases.read().get(id).cloned())
    }

    async fn list_releases(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<ReleaseIndex, StoreError> {
        let key = (project_id.to_string(), environment.to_string());
        Ok(self.release_index.read().get(&key).cloned().unwrap_or_default())
    }

    async fn current_release(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<Option<String>, StoreError> {
        let key = (project_id.to_string(), environment.to_string());
        Ok(self
            .release_index
            .read()
            .get(&key)
            .and_then(|idx| idx.current_release_id.clone()))
    }
}
