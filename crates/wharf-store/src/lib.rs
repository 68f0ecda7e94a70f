//! KV store contract for the operation-lifecycle engine (spec §2.2, §6).
//!
//! The core depends only on the [`KvStore`] trait; `InMemoryKvStore` is the
//! implementation carried in this repo (swapping in a durable backend, e.g.
//! an embedded KV with versioned history, is a matter of implementing the
//! same trait).

mod memory;

use async_trait::async_trait;
use wharf_types::{Operation, Project, ReleaseRecord};

pub use memory::InMemoryKvStore;

/// Errors surfaced by a [`KvStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("operation not found: {0}")]
    OperationNotFound(String),

    #[error("release not found: {0}")]
    ReleaseNotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Reverse-chronological index of operation ids for a project, capped at a
/// fixed history length (spec §3 "Per-project ops index").
#[derive(Debug, Clone, Default)]
pub struct OpsIndex {
    pub op_ids: Vec<String>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Reverse-chronological index of release ids for a `(project, environment)`
/// pair, plus the currently-live release id (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ReleaseIndex {
    pub release_ids: Vec<String>,
    pub current_release_id: Option<String>,
}

/// Maximum number of operation ids retained per project in the ops index.
pub const OPS_INDEX_HISTORY_LIMIT: usize = 500;

/// Keyed-bucket contract the orchestrator, bookkeeping, and promoter depend
/// on. Every method is atomic with respect to its own key; there are no
/// cross-key transactions (spec §5 "no cross-component transactions").
#[async_trait]
pub trait KvStore: Send + Sync + 'static {
    /// Insert or overwrite a project record (`project/<id>`).
    async fn put_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn get_project(&self, id: &str) -> Result<Option<Project>, StoreError>;

    /// Remove a project record entirely (only ever called in response to a
    /// terminal `delete` operation, or to roll back a failed `create`).
    async fn delete_project(&self, id: &str) -> Result<(), StoreError>;

    /// Insert or overwrite an operation record (`op/<id>`) and append its id
    /// to the project's ops index (`project-ops/<project_id>`), capped at
    /// [`OPS_INDEX_HISTORY_LIMIT`].
    async fn put_op(&self, op: &Operation) -> Result<(), StoreError>;

    async fn get_op(&self, id: &str) -> Result<Option<Operation>, StoreError>;

    async fn list_project_ops(&self, project_id: &str) -> Result<OpsIndex, StoreError>;

    /// Insert or overwrite a release record (`release/<id>`), append its id
    /// to the `(project, environment)` release index, and make it the
    /// current release pointer for that pair.
    async fn put_release(&self, release: &ReleaseRecord) -> Result<(), StoreError>;

    async fn get_release(&self, id: &str) -> Result<Option<ReleaseRecord>, StoreError>;

    async fn list_releases(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<ReleaseIndex, StoreError>;

    async fn current_release(
        &self,
        project_id: &str,
        environment: &str,
    ) -> Result<Option<String>, StoreError>;
}
