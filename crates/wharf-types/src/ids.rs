//! Time-ordered opaque identifiers.
//!
//! UUID v7 is used for every identity in this system so that ids sort by
//! creation time, which keeps KV bucket history and index pages roughly
//! chronological without a separate timestamp key.

use uuid::Uuid;

/// Generate a new time-ordered identifier as its canonical string form.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// A short, filesystem- and log-friendly prefix of an id (used in artifact
/// paths such as `rollbacks/<env>/<short-op-id>/`).
pub fn short(id: &str) -> &str {
    &id[..id.len().min(8)]
}
