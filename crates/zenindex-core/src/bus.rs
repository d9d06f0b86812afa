//! Event bus — best-effort publish/subscribe for block and transaction events.
//!
//! Delivery must never stall a block commit: every subscriber gets a bounded
//! queue and publishing uses `try_send`, counting (but tolerating) drops on
//! overflow. Per-topic enqueue order is preserved because publishes happen
//! from the single commit task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::types::{BlockHash, Txid};

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

/// Topics a subscriber can follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Block,
    Transaction,
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::Transaction => write!(f, "transaction"),
        }
    }
}

/// An event delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A block was connected to or disconnected from the indexed chain.
    Block { hash: BlockHash, height: u32, connected: bool },
    /// A transaction was observed (mempool publication is flag-gated by the
    /// embedding node).
    Transaction { txid: Txid, raw: Vec<u8> },
}

/// Handle returned by [`EventBus::subscribe`]; dropping the receiver ends
/// the subscription.
pub struct Subscription {
    pub id: u64,
    pub events: mpsc::Receiver<Event>,
}

/// Fan-out hub for indexing events.
pub struct EventBus {
    subscribers: Mutex<HashMap<Topic, Vec<(u64, mpsc::Sender<Event>)>>>,
    next_id: AtomicU64,
    queue_depth: usize,
    dropped: AtomicU64,
}

impl EventBus {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().unwrap().entry(topic).or_default().push((id, tx));
        Subscription { id, events: rx }
    }

    pub fn unsubscribe(&self, topic: Topic, id: u64) {
        if let Some(subs) = self.subscribers.lock().unwrap().get_mut(&topic) {
            subs.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Deliver `event` to every subscriber of `topic`.
    ///
    /// The subscriber list is snapshotted under the lock; delivery happens
    /// after it is released so a slow subscriber cannot block a publisher.
    pub fn publish(&self, topic: Topic, event: Event) {
        let snapshot: Vec<(u64, mpsc::Sender<Event>)> = {
            let subs = self.subscribers.lock().unwrap();
            match subs.get(&topic) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        let mut gone = Vec::new();
        for (id, tx) in &snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(topic = %topic, subscriber = *id, "subscriber queue full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => gone.push(*id),
            }
        }
        if !gone.is_empty() {
            let mut subs = self.subscribers.lock().unwrap();
            if let Some(list) = subs.get_mut(&topic) {
                list.retain(|(id, _)| !gone.contains(id));
            }
        }
    }

    /// Total events dropped because a subscriber queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.lock().unwrap().get(&topic).map_or(0, |l| l.len())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
