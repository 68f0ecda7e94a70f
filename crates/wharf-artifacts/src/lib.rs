//! Project-scoped artifact storage contract (spec §2.3, §6).
//!
//! Artifacts are byte blobs addressed by a path relative to a project root,
//! e.g. `deploy/dev/rendered.yaml` or `repos/source/.paas/last-ci-commit.txt`.
//! Only the contract is in scope for the core; file-system bootstrap and
//! git plumbing are external collaborators. Two implementations ship here:
//! an in-memory one (used by this repo's own tests and default wiring) and
//! a filesystem-backed one for a real deployment.

mod fs;
mod memory;

use async_trait::async_trait;

pub use fs::FsArtifactStore;
pub use memory::InMemoryArtifactStore;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact not found: {project_id}/{path}")]
    NotFound { project_id: String, path: String },

    #[error("io error on {project_id}/{path}: {source}")]
    Io {
        project_id: String,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait ArtifactStore: Send + Sync + 'static {
    async fn put(&self, project_id: &str, path: &str, bytes: Vec<u8>) -> Result<(), ArtifactError>;

    async fn get(&self, project_id: &str, path: &str) -> Result<Option<Vec<u8>>, ArtifactError>;

    /// List artifact paths under `prefix` (e.g. `"deploy/dev"`).
    async fn list(&self, project_id: &str, prefix: &str) -> Result<Vec<String>, ArtifactError>;

    async fn remove(&self, project_id: &str, path: &str) -> Result<(), ArtifactError>;

    async fn exists(&self, project_id: &str, path: &str) -> Result<bool, ArtifactError> {
        Ok(self.get(project_id, path).await?.is_some())
    }
}
