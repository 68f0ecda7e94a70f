//! Event Hub (spec §2.5, §4.4).
//!
//! Per operation: a monotonically increasing sequence counter, a bounded
//! ring of recent records, and a broadcast fan-out to live SSE subscribers.
//! Replay correctness across the retention window is the one property this
//! module exists to uphold (spec §8 property 6): any `lastEventID` within
//! the window returns exactly the gap-free suffix; outside it, the caller
//! is told to bootstrap the client with a synthetic snapshot instead of
//! silently returning a hole.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use wharf_types::{EventName, EventRecord, Operation};

/// Default number of retained records per operation's event stream.
pub const DEFAULT_HISTORY_LIMIT: usize = 200;
/// Default broadcast channel capacity for live subscribers.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

struct Stream {
    records: VecDeque<EventRecord>,
    next_seq: u64,
    tx: broadcast::Sender<EventRecord>,
    terminal: bool,
}

impl Stream {
    fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Self {
            records: VecDeque::new(),
            next_seq: 1,
            tx,
            terminal: false,
        }
    }

    fn latest_sequence(&self) -> u64 {
        self.next_seq - 1
    }

    fn oldest_retained(&self) -> Option<u64> {
        self.records.front().map(|r| r.sequence)
    }
}

/// Result of [`EventHub::subscribe`].
pub struct Subscription {
    /// Retained records the caller missed, in order, gap-free.
    pub replay: Vec<EventRecord>,
    /// Live channel for records emitted from now on. Drop it to cancel.
    pub live: broadcast::Receiver<EventRecord>,
    /// True when `last_event_id` fell outside the retention window (or the
    /// stream doesn't exist yet): the caller must emit a synthetic snapshot
    /// before resuming normal event delivery.
    pub needs_bootstrap: bool,
}

pub struct EventHub {
    streams: Mutex<HashMap<String, Arc<Mutex<Stream>>>>,
    history_limit: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl EventHub {
    pub fn new(history_limit: usize) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            history_limit,
        }
    }

    fn stream(&self, op_id: &str) -> Arc<Mutex<Stream>> {
        let mut streams = self.streams.lock();
        Arc::clone(
            streams
                .entry(op_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Stream::new()))),
        )
    }

    /// Append an event and broadcast it. Once a stream has emitted a
    /// terminal event, further emits are discarded (state machine in spec
    /// §4.4's table) — this is a second line of defense behind bookkeeping's
    /// own single-terminal check.
    pub fn emit(&self, op_id: &str, name: EventName, payload: Operation) -> u64 {
        let stream = self.stream(op_id);
        let mut stream = stream.lock();
        if stream.terminal {
            return stream.latest_sequence();
        }

        let sequence = stream.next_seq;
        stream.next_seq += 1;
        let record = EventRecord {
            op_id: op_id.to_string(),
            sequence,
            name,
            payload,
            at: chrono::Utc::now(),
        };

        stream.records.push_back(record.clone());
        if stream.records.len() > self.history_limit {
            stream.records.pop_front();
        }
        if name.is_terminal() {
            stream.terminal = true;
        }

        // Broadcast is best-effort: no live subscribers is not an error, and
        // a subscriber too far behind just misses the live tick (it can
        // still reconnect and get replay + bootstrap).
        let _ = stream.tx.send(record);
        sequence
    }

    /// Subscribe from `last_event_id` (0 means "from the start").
    pub fn subscribe(&self, op_id: &str, last_event_id: u64) -> Subscription {
        let stream = self.stream(op_id);
        let stream = stream.lock();
        let live = stream.tx.subscribe();

        if last_event_id == 0 {
            return Subscription {
                replay: stream.records.iter().cloned().collect(),
                live,
                needs_bootstrap: false,
            };
        }

        let oldest = stream.oldest_retained();
        let latest = stream.latest_sequence();
        let within_window = match oldest {
            Some(oldest) => last_event_id + 1 >= oldest && last_event_id <= latest,
            None => false,
        };

        if within_window {
            Subscription {
                replay: stream
                    .records
                    .iter()
                    .filter(|r| r.sequence > last_event_id)
                    .cloned()
                    .collect(),
                live,
                needs_bootstrap: false,
            }
        } else {
            Subscription {
                replay: Vec::new(),
                live,
                needs_bootstrap: true,
            }
        }
    }

    pub fn latest_sequence(&self, op_id: &str) -> u64 {
        self.stream(op_id).lock().latest_sequence()
    }
}
