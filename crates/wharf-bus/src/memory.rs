use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;

use crate::{BusError, Consumer, Delivery, MessageBus};

#[derive(Debug, Clone)]
struct QueuedMessage {
    payload: Vec<u8>,
    delivery_count: u32,
}

struct SubjectQueue {
    queue: Mutex<VecDeque<QueuedMessage>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SubjectQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }
}

/// In-process, FIFO-per-subject implementation of [`MessageBus`]. Good
/// enough to drive the worker pipeline within one process and in tests;
/// see the module docs for what a durable backend would need to preserve.
#[derive(Default)]
pub struct InMemoryBus {
    subjects: RwLock<HashMap<String, Arc<SubjectQueue>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn subject(&self, name: &str) -> Arc<SubjectQueue> {
        if let Some(q) = self.subjects.read().get(name) {
            return Arc::clone(q);
        }
        let mut subjects = self.subjects.write();
        Arc::clone(
            subjects
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(SubjectQueue::new())),
        )
    }

    /// Close a subject: consumers blocked in `recv` wake up and receive
    /// `None`. Used for graceful shutdown of worker run loops.
    pub fn close(&self, subject: &str) {
        let q = self.subject(subject);
        q.closed.store(true, Ordering::Release);
        q.notify.notify_waiters();
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let q = self.subject(subject);
        q.queue.lock().push_back(QueuedMessage {
            payload,
            delivery_count: 0,
        });
        q.notify.notify_one();
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        consumer_name: &str,
        max_deliver: u32,
    ) -> Result<Box<dyn Consumer>, BusError> {
        Ok(Box::new(InMemoryConsumer {
            subject_name: subject.to_string(),
            consumer_name: consumer_name.to_string(),
            max_deliver,
            queue: self.subject(subject),
            in_flight: None,
        }))
    }
}

struct InMemoryConsumer {
    subject_name: String,
    #[allow(dead_code)]
    consumer_name: String,
    #[allow(dead_code)]
    max_deliver: u32,
    queue: Arc<SubjectQueue>,
    in_flight: Option<QueuedMessage>,
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn recv(&mut self) -> Option<Delivery> {
        loop {
            if let Some(mut msg) = self.queue.queue.lock().pop_front() {
                msg.delivery_count += 1;
                let delivery = Delivery {
                    subject: self.subject_name.clone(),
                    payload: msg.payload.clone(),
                    delivery_count: msg.delivery_count,
                };
                self.in_flight = Some(msg);
                return Some(delivery);
            }

            if self.queue.closed.load(Ordering::Acquire) {
                return None;
            }

            self.queue.notify.notified().await;
        }
    }

    async fn ack(&mut self) -> Result<(), BusError> {
        self.in_flight = None;
        Ok(())
    }

    async fn nack(&mut self) -> Result<(), BusError> {
        if let Some(msg) = self.in_flight.take() {
            self.queue.queue.lock().push_back(msg);
            self.queue.notify.notify_one();
        }
        Ok(())
    }
}
