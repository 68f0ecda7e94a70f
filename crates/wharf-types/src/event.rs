use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::op::Operation;

/// Name of an event on an operation's event stream (spec §3, §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    Bootstrap,
    Status,
    StepStarted,
    StepEnded,
    Completed,
    Failed,
    Heartbeat,
}

impl EventName {
    pub fn as_sse_event(self) -> &'static str {
        match self {
            EventName::Bootstrap => "op.bootstrap",
            EventName::Status => "op.status",
            EventName::StepStarted => "op.step.started",
            EventName::StepEnded => "op.step.ended",
            EventName::Completed => "op.completed",
            EventName::Failed => "op.failed",
            EventName::Heartbeat => "op.heartbeat",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, EventName::Completed | EventName::Failed)
    }
}

/// One entry on an operation's in-memory, append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub op_id: String,
    pub sequence: u64,
    pub name: EventName,
    pub payload: Operation,
    pub at: DateTime<Utc>,
}
