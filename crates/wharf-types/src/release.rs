use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::op::{DeliveryStage, OpKind, RollbackScope};

/// Immutable evidence that a given image + rendered manifests were
/// delivered to a `(project, environment)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleaseRecord {
    pub id: String,
    pub project_id: String,
    pub environment: String,
    pub operation_id: String,
    pub operation_kind: OpKind,
    pub stage: DeliveryStage,
    pub from_env: Option<String>,
    pub to_env: Option<String>,
    pub image: String,
    pub rendered_manifest_path: String,
    pub config_snapshot_path: Option<String>,
    #[serde(default = "default_true")]
    pub rollback_safe: bool,
    pub rollback_source_release_id: Option<String>,
    pub rollback_scope: Option<RollbackScope>,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl ReleaseRecord {
    /// Normalize environment/to_env mirroring: if only one of
    /// `environment`/`to_env` is meaningfully set, mirror it onto the other.
    pub fn normalize(mut self) -> Self {
        if self.to_env.is_none() {
            self.to_env = Some(self.environment.clone());
        }
        if self.environment.is_empty() {
            if let Some(to) = &self.to_env {
                self.environment = to.clone();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare(env: &str, to_env: Option<&str>) -> ReleaseRecord {
        ReleaseRecord {
            id: "r1".into(),
            project_id: "p1".into(),
            environment: env.into(),
            operation_id: "op1".into(),
            operation_kind: OpKind::Deploy,
            stage: DeliveryStage::Deploy,
            from_env: None,
            to_env: to_env.map(str::to_string),
            image: "img:1".into(),
            rendered_manifest_path: "deploy/dev/rendered.yaml".into(),
            config_snapshot_path: None,
            rollback_safe: true,
            rollback_source_release_id: None,
            rollback_scope: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn mirrors_environment_onto_missing_to_env() {
        let r = bare("dev", None).normalize();
        assert_eq!(r.to_env.as_deref(), Some("dev"));
    }

    #[test]
    fn keeps_explicit_to_env() {
        let r = bare("staging", Some("staging")).normalize();
        assert_eq!(r.to_env.as_deref(), Some("staging"));
    }
}
