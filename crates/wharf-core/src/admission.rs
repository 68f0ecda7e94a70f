//! Per-project admission lock (spec §4.1 step 1, §5, §9).
//!
//! A lazily created mutex per project, stored in a process-wide keyed map.
//! Entries are never reclaimed during the process lifetime — bounded by the
//! number of distinct projects touched, which the spec explicitly accepts.

use crate::locks::{KeyedGuard, KeyedLocks};

pub type AdmissionGuard = KeyedGuard;

#[derive(Default)]
pub struct AdmissionLocks {
    inner: KeyedLocks,
}

impl AdmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the per-project lock, creating it on first use. The returned
    /// guard must be held for the entire admission check + mutation
    /// sequence (spec §4.1).
    pub async fn acquire(&self, project_id: &str) -> AdmissionGuard {
        self.inner.acquire(project_id).await
    }

    /// Number of distinct projects that have ever been admitted (test hook).
    pub fn known_projects(&self) -> usize {
        self.inner.known_keys()
    }
}
