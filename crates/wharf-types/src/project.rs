use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::op::OpKind;

/// Per-environment configuration carried on a `Project`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentSpec {
    #[serde(default)]
    pub vars: BTreeMap<String, String>,
}

/// Coarse network policy for the project's environments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NetworkPolicy {
    /// No inbound traffic accepted.
    Isolated,
    /// Inbound traffic accepted only from inside the platform.
    Internal,
    /// Inbound traffic accepted from the public internet.
    Public,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self::Internal
    }
}

/// The declared, user-supplied shape of an application.
///
/// A `ProjectSpec` is always normalized (defaults filled) and validated
/// before it is persisted; see [`normalize`] and [`validate`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSpec {
    pub name: String,
    pub runtime: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSpec>,
    #[serde(default)]
    pub network_policy: NetworkPolicy,
}

/// Error surfaced when a spec fails normalization or validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("{0}")]
pub struct SpecValidationError(pub String);

/// Default environments every project gets if none are declared.
fn default_environments() -> BTreeMap<String, EnvironmentSpec> {
    BTreeMap::from([
        ("dev".to_string(), EnvironmentSpec::default()),
        ("prod".to_string(), EnvironmentSpec::default()),
    ])
}

/// Fill in defaults on a freshly-parsed spec. Idempotent: normalizing an
/// already-normalized spec is a no-op.
pub fn normalize(mut spec: ProjectSpec) -> ProjectSpec {
    if spec.environments.is_empty() {
        spec.environments = default_environments();
    }
    let lowered: BTreeMap<String, EnvironmentSpec> = spec
        .environments
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();
    spec.environments = lowered;
    spec
}

/// Validate a normalized spec. Environment names must be lowercase,
/// DNS-label-like (`[a-z0-9-]`, starting and ending with an alphanumeric).
pub fn validate(spec: &ProjectSpec) -> Result<(), SpecValidationError> {
    if spec.name.trim().is_empty() {
        return Err(SpecValidationError("project name must not be empty".into()));
    }
    if spec.runtime.trim().is_empty() {
        return Err(SpecValidationError("project runtime must not be empty".into()));
    }
    if spec.environments.is_empty() {
        return Err(SpecValidationError("project must declare at least one environment".into()));
    }
    for env in spec.environments.keys() {
        if !is_dns_label(env) {
            return Err(SpecValidationError(format!(
                "environment name '{env}' is not a valid DNS label"
            )));
        }
    }
    Ok(())
}

fn is_dns_label(s: &str) -> bool {
    if s.is_empty() || s.len() > 63 {
        return false;
    }
    let bytes = s.as_bytes();
    let is_alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !is_alnum(bytes[0]) || !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes.iter().all(|&b| is_alnum(b) || b == b'-')
}

/// Lifecycle phase of a `Project`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectPhase {
    Reconciling,
    Ready,
    Deleting,
    Error,
}

/// Denormalized status snapshot kept on the `Project` for fast reads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatus {
    pub phase: ProjectPhase,
    pub last_op_id: Option<String>,
    pub last_op_kind: Option<OpKind>,
    pub updated_at: DateTime<Utc>,
    pub message: String,
}

impl ProjectStatus {
    pub fn queued(op_id: String, kind: OpKind, now: DateTime<Utc>) -> Self {
        Self {
            phase: ProjectPhase::Reconciling,
            last_op_id: Some(op_id),
            last_op_kind: Some(kind),
            updated_at: now,
            message: "queued".to_string(),
        }
    }
}

/// A registered application: identity, normalized spec, and status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub spec: ProjectSpec,
    pub status: ProjectStatus,
}

impl Project {
    pub fn new(id: String, spec: ProjectSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            created_at: now,
            updated_at: now,
            status: ProjectStatus {
                phase: ProjectPhase::Reconciling,
                last_op_id: None,
                last_op_kind: None,
                updated_at: now,
                message: "created".to_string(),
            },
            spec,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_spec() -> ProjectSpec {
        ProjectSpec {
            name: "app".into(),
            runtime: "r1".into(),
            capabilities: vec![],
            environments: BTreeMap::new(),
            network_policy: NetworkPolicy::default(),
        }
    }

    #[test]
    fn normalize_fills_default_environments() {
        let spec = normalize(bare_spec());
        assert!(spec.environments.contains_key("dev"));
        assert!(spec.environments.contains_key("prod"));
    }

    #[test]
    fn normalize_lowercases_environment_names() {
        let mut spec = bare_spec();
        spec.environments.insert("Staging".into(), EnvironmentSpec::default());
        let spec = normalize(spec);
        assert!(spec.environments.contains_key("staging"));
    }

    #[test]
    fn validate_rejects_bad_dns_label() {
        let mut spec = normalize(bare_spec());
        spec.environments.insert("Bad_Env!".into(), EnvironmentSpec::default());
        assert!(validate(&spec).is_err());
    }

    #[test]
    fn validate_accepts_normalized_spec() {
        let spec = normalize(bare_spec());
        assert!(validate(&spec).is_ok());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut spec = bare_spec();
        spec.name = "  ".into();
        let spec = normalize(spec);
        assert!(validate(&spec).is_err());
    }
}
