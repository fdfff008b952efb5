//! Batch queue: in-memory FIFO of known-human messages awaiting scheduled delivery.
//!
//! Process-local and ephemeral: a restart loses whatever is queued.
//! Every operation holds the lock for its whole duration, so `drain` is
//! atomic with respect to concurrent `enqueue`s.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::pipeline::types::InboundMessage;

/// A known-human message held for batch delivery. Body is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchedMessage {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub body: String,
    pub provider: String,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl BatchedMessage {
    /// Copy the raw inbound fields for a resolved sender.
    pub fn from_inbound(sender: &str, message: &InboundMessage) -> Self {
        Self {
            sender: sender.to_string(),
            sender_name: message.sender_name.clone(),
            body: message.body.clone(),
            provider: message.provider.clone(),
            received_at: message.received_at,
            session_key: message.session_key.clone(),
            reply_channel: message.reply_channel.clone(),
            reply_to: message.reply_to.clone(),
        }
    }
}

/// Insertion-ordered holding area for batched messages.
#[derive(Debug, Default)]
pub struct BatchQueue {
    messages: RwLock<VecDeque<BatchedMessage>>,
    /// Optional cap. When full, the oldest message is evicted.
    capacity_limit: Option<usize>,
}

impl BatchQueue {
    /// Create an unbounded queue.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a queue that evicts its oldest message beyond `limit` entries.
    pub fn with_capacity_limit(limit: usize) -> Arc<Self> {
        Arc::new(Self {
            messages: RwLock::new(VecDeque::new()),
            capacity_limit: Some(limit.max(1)),
        })
    }

    /// Append a message.
    pub async fn enqueue(&self, message: BatchedMessage) {
        let mut messages = self.messages.write().await;

        if let Some(limit) = self.capacity_limit {
            while messages.len() >= limit {
                if let Some(evicted) = messages.pop_front() {
                    warn!(
                        sender = %evicted.sender,
                        limit,
                        "Batch queue full, evicting oldest message"
                    );
                }
            }
        }

        debug!(
            sender = %message.sender,
            provider = %message.provider,
            queued = messages.len() + 1,
            "Message batched"
        );
        messages.push_back(message);
    }

    /// Take everything, in insertion order, leaving the queue empty.
    pub async fn drain(&self) -> Vec<BatchedMessage> {
        let drained: Vec<BatchedMessage> = std::mem::take(&mut *self.messages.write().await).into();
        if !drained.is_empty() {
            info!(count = drained.len(), "Batch queue drained");
        }
        drained
    }

    /// Copy of the current contents. Does not modify the queue.
    pub async fn peek(&self) -> Vec<BatchedMessage> {
        self.messages.read().await.iter().cloned().collect()
    }

    /// Number of queued messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batched(sender: &str, body: &str) -> BatchedMessage {
        BatchedMessage::from_inbound(sender, &InboundMessage::new("sms", sender, body))
    }

    #[tokio::test]
    async fn drain_returns_insertion_order() {
        let queue = BatchQueue::new();
        for i in 0..5 {
            queue.enqueue(batched("bob", &format!("msg {i}"))).await;
        }
        assert_eq!(queue.len().await, 5);

        let drained = queue.drain().await;
        let bodies: Vec<_> = drained.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
        assert_eq!(queue.len().await, 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn second_drain_is_empty() {
        let queue = BatchQueue::new();
        queue.enqueue(batched("bob", "hi")).await;
        assert_eq!(queue.drain().await.len(), 1);
        assert!(queue.drain().await.is_empty());
    }

    #[tokio::test]
    async fn no_deduplication() {
        let queue = BatchQueue::new();
        queue.enqueue(batched("bob", "same")).await;
        queue.enqueue(batched("bob", "same")).await;
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn peek_does_not_mutate() {
        let queue = BatchQueue::new();
        queue.enqueue(batched("amy", "one")).await;
        queue.enqueue(batched("amy", "two")).await;

        let mut snapshot = queue.peek().await;
        assert_eq!(snapshot.len(), 2);
        assert_eq!(queue.len().await, 2);

        // Mutating the snapshot must not leak into the queue.
        snapshot.clear();
        snapshot.push(batched("mallory", "injected"));
        let again = queue.peek().await;
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].body, "one");
    }

    #[tokio::test]
    async fn capacity_limit_evicts_oldest() {
        let queue = BatchQueue::with_capacity_limit(2);
        queue.enqueue(batched("a", "1")).await;
        queue.enqueue(batched("a", "2")).await;
        queue.enqueue(batched("a", "3")).await;

        let bodies: Vec<_> = queue.drain().await.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, ["2", "3"]);
    }

    #[tokio::test]
    async fn concurrent_enqueues_are_all_kept() {
        let queue = BatchQueue::new();
        let mut handles = Vec::new();
        for i in 0..50 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                queue.enqueue(batched("c", &i.to_string())).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(queue.drain().await.len(), 50);
    }

    #[test]
    fn from_inbound_copies_routing_hints() {
        let mut inbound = InboundMessage::new("telegram", "tg:7", "  spaced  body\n");
        inbound.sender_name = Some("Tom".into());
        inbound.session_key = Some("agent:main:telegram:7".into());
        inbound.reply_channel = Some("telegram".into());
        inbound.reply_to = Some("7".into());

        let batched = BatchedMessage::from_inbound("tg:7", &inbound);
        assert_eq!(batched.body, "  spaced  body\n");
        assert_eq!(batched.sender_name.as_deref(), Some("Tom"));
        assert_eq!(batched.reply_to.as_deref(), Some("7"));
        assert_eq!(batched.received_at, inbound.received_at);
    }
}
