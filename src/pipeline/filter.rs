//! Sovereign filter: classifies each inbound message and applies its side effect.
//!
//! | classification  | action        | side effect                                   |
//! |-----------------|---------------|-----------------------------------------------|
//! | priority-human  | `deliver-raw` | touch last-message (detached, best-effort)    |
//! | known-human     | `batch`       | touch last-message (detached), enqueue        |
//! | system-noise    | `archive`     | archive write, awaited; failure aborts        |
//!
//! The filter never delivers anything itself. The dispatch layer acts on the
//! returned [`FilterOutcome`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::FilterError;
use crate::pipeline::batch::{BatchQueue, BatchedMessage};
use crate::pipeline::classifier::classify;
use crate::pipeline::types::{Classification, FilterAction, FilterOutcome, InboundMessage};
use crate::store::model::ArchivedNoiseEntry;
use crate::store::traits::{ArchiveStore, ContactRegistry};

/// Routes inbound messages into deliver / batch / archive.
pub struct SovereignFilter {
    registry: Arc<dyn ContactRegistry>,
    archive: Arc<dyn ArchiveStore>,
    queue: Arc<BatchQueue>,
    /// Handles of detached touches that may still be running.
    touches: Mutex<Vec<JoinHandle<()>>>,
}

impl SovereignFilter {
    pub fn new(
        registry: Arc<dyn ContactRegistry>,
        archive: Arc<dyn ArchiveStore>,
        queue: Arc<BatchQueue>,
    ) -> Self {
        Self {
            registry,
            archive,
            queue,
            touches: Mutex::new(Vec::new()),
        }
    }

    /// The queue batched messages land in.
    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    pub fn registry(&self) -> &Arc<dyn ContactRegistry> {
        &self.registry
    }

    /// Classify `message` and perform the matching side effect.
    ///
    /// Errors only on a registry lookup fault or a failed archive write.
    pub async fn apply(&self, message: &InboundMessage) -> Result<FilterOutcome, FilterError> {
        let sender = message.effective_sender().to_string();
        let result = classify(self.registry.as_ref(), message).await?;

        match result.classification {
            Classification::PriorityHuman => {
                self.spawn_touch(&sender, message.received_at).await;
            }
            Classification::KnownHuman => {
                self.spawn_touch(&sender, message.received_at).await;
                self.queue
                    .enqueue(BatchedMessage::from_inbound(&sender, message))
                    .await;
            }
            Classification::SystemNoise => {
                let entry = archive_entry(&sender, message);
                self.archive
                    .archive_noise(&entry)
                    .await
                    .map_err(|source| FilterError::Archive {
                        message_id: entry.id.clone(),
                        source,
                    })?;
            }
        }

        let outcome = FilterOutcome {
            action: FilterAction::from(result.classification),
            classification: result.classification,
            sender,
            contact: result.contact,
        };

        info!(
            sender = %outcome.sender,
            provider = %message.provider,
            classification = outcome.classification.label(),
            action = outcome.action.label(),
            "Message filtered"
        );
        Ok(outcome)
    }

    /// Wait for every touch spawned so far to finish.
    ///
    /// Call before shutting the runtime down, otherwise pending touches are
    /// cancelled with it. Processing never waits on this.
    pub async fn settle_touches(&self) {
        let pending = std::mem::take(&mut *self.touches.lock().await);
        if pending.is_empty() {
            return;
        }

        debug!(count = pending.len(), "Waiting for pending touches");
        for handle in pending {
            if let Err(e) = handle.await {
                warn!(error = %e, "Touch task did not complete");
            }
        }
    }

    /// Fire-and-forget update of the contact's last-message timestamp.
    ///
    /// Failures are logged and never reach the caller.
    async fn spawn_touch(&self, sender: &str, at: DateTime<Utc>) {
        let registry = Arc::clone(&self.registry);
        let sender = sender.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = registry.touch_last_message(&sender, at).await {
                warn!(sender = %sender, error = %e, "Failed to touch last-message timestamp");
            }
        });

        let mut touches = self.touches.lock().await;
        touches.retain(|h| !h.is_finished());
        touches.push(handle);
    }
}

/// Build the audit record for a suppressed message.
fn archive_entry(sender: &str, message: &InboundMessage) -> ArchivedNoiseEntry {
    let id = message
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("{}-{}", message.provider, Uuid::new_v4()));

    ArchivedNoiseEntry {
        id,
        partition_date: message.received_at.date_naive(),
        provider: message.provider.clone(),
        sender: sender.to_string(),
        sender_name: message.sender_name.clone(),
        body: message.body.clone(),
        received_at: message.received_at,
        session_key: message.session_key.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::RegistryError;
    use crate::store::memory::InMemoryRegistry;
    use crate::store::model::{ContactRecord, ContactUpsert};

    /// Wraps an in-memory registry; touches always fail.
    struct TouchFails(InMemoryRegistry);

    #[async_trait]
    impl ContactRegistry for TouchFails {
        async fn get_contact(&self, id: &str) -> Result<Option<ContactRecord>, RegistryError> {
            self.0.get_contact(id).await
        }
        async fn list_contacts(&self) -> Result<Vec<ContactRecord>, RegistryError> {
            self.0.list_contacts().await
        }
        async fn upsert_contact(&self, u: &ContactUpsert) -> Result<ContactRecord, RegistryError> {
            self.0.upsert_contact(u).await
        }
        async fn touch_last_message(&self, _: &str, _: DateTime<Utc>) -> Result<(), RegistryError> {
            Err(RegistryError::Query("touch rejected".into()))
        }
        async fn list_silent_contacts(
            &self,
            cutoff: DateTime<Utc>,
        ) -> Result<Vec<ContactRecord>, RegistryError> {
            self.0.list_silent_contacts(cutoff).await
        }
    }

    /// Every lookup fails.
    struct LookupFails;

    #[async_trait]
    impl ContactRegistry for LookupFails {
        async fn get_contact(&self, _: &str) -> Result<Option<ContactRecord>, RegistryError> {
            Err(RegistryError::Connection("registry unreachable".into()))
        }
        async fn list_contacts(&self) -> Result<Vec<ContactRecord>, RegistryError> {
            Ok(vec![])
        }
        async fn upsert_contact(&self, u: &ContactUpsert) -> Result<ContactRecord, RegistryError> {
            Ok(u.clone().into_record())
        }
        async fn touch_last_message(&self, _: &str, _: DateTime<Utc>) -> Result<(), RegistryError> {
            Ok(())
        }
        async fn list_silent_contacts(
            &self,
            _: DateTime<Utc>,
        ) -> Result<Vec<ContactRecord>, RegistryError> {
            Ok(vec![])
        }
    }

    /// Archive that counts writes and optionally fails them.
    #[derive(Default)]
    struct CountingArchive {
        writes: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ArchiveStore for CountingArchive {
        async fn archive_noise(&self, _: &ArchivedNoiseEntry) -> Result<(), RegistryError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(RegistryError::Connection("archive offline".into()))
            } else {
                Ok(())
            }
        }
    }

    async fn contacts() -> InMemoryRegistry {
        InMemoryRegistry::with_contacts([
            ContactRecord::new("+15550000001", "Partner").with_priority(true),
            ContactRecord::new("+15550000002", "Cousin"),
        ])
        .await
    }

    async fn setup() -> (SovereignFilter, Arc<InMemoryRegistry>, Arc<BatchQueue>) {
        let registry = Arc::new(contacts().await);
        let queue = BatchQueue::new();
        let filter = SovereignFilter::new(registry.clone(), registry.clone(), queue.clone());
        (filter, registry, queue)
    }

    /// Wait for the detached touch to land.
    async fn wait_for_touch(registry: &InMemoryRegistry, sender: &str) -> Option<DateTime<Utc>> {
        for _ in 0..100 {
            if let Some(at) = registry
                .get_contact(sender)
                .await
                .unwrap()
                .and_then(|c| c.last_message_at)
            {
                return Some(at);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        None
    }

    #[tokio::test]
    async fn priority_contact_is_delivered_raw() {
        let (filter, registry, queue) = setup().await;
        let msg = InboundMessage::new("whatsapp", "+15550000001", "call me");

        let outcome = filter.apply(&msg).await.unwrap();
        assert_eq!(outcome.action, FilterAction::DeliverRaw);
        assert_eq!(outcome.classification, Classification::PriorityHuman);
        assert_eq!(queue.len().await, 0);
        assert!(registry.archived().await.is_empty());

        let touched = wait_for_touch(&registry, "+15550000001").await;
        assert_eq!(touched, Some(msg.received_at));
    }

    #[tokio::test]
    async fn known_contact_is_batched_verbatim() {
        let (filter, registry, queue) = setup().await;
        let body = "Hey!! see   you *tomorrow*\n\n-- sent from phone";
        let mut msg = InboundMessage::new("sms", "+15550000002", body);
        msg.sender_name = Some("Cuz".into());

        let before = queue.len().await;
        let outcome = filter.apply(&msg).await.unwrap();
        assert_eq!(outcome.action, FilterAction::Batch);
        assert_eq!(outcome.classification, Classification::KnownHuman);
        assert_eq!(queue.len().await, before + 1);

        let queued = queue.peek().await;
        assert_eq!(queued[0].body, body);
        assert_eq!(queued[0].sender, "+15550000002");
        assert_eq!(queued[0].sender_name.as_deref(), Some("Cuz"));
        assert!(registry.archived().await.is_empty());
        assert!(wait_for_touch(&registry, "+15550000002").await.is_some());
    }

    #[tokio::test]
    async fn unknown_sender_is_archived_once() {
        let registry = Arc::new(contacts().await);
        let archive = Arc::new(CountingArchive::default());
        let queue = BatchQueue::new();
        let filter = SovereignFilter::new(registry, archive.clone(), queue.clone());

        let outcome = filter
            .apply(&InboundMessage::new("sms", "+18005550199", "Your code is 1234"))
            .await
            .unwrap();
        assert_eq!(outcome.action, FilterAction::Archive);
        assert_eq!(outcome.classification, Classification::SystemNoise);
        assert_eq!(archive.writes.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn archive_entry_carries_message_fields() {
        let (filter, registry, _queue) = setup().await;
        let mut msg = InboundMessage::new("whatsapp", "+18005550199", "PROMO");
        msg.id = Some("wamid.ABC".into());
        msg.sender_name = Some("Shop".into());
        msg.session_key = Some("agent:main:whatsapp:dm".into());

        filter.apply(&msg).await.unwrap();

        let archived = registry.archived().await;
        assert_eq!(archived.len(), 1);
        let entry = &archived[0];
        assert_eq!(entry.id, "wamid.ABC");
        assert_eq!(entry.partition_date, msg.received_at.date_naive());
        assert_eq!(entry.provider, "whatsapp");
        assert_eq!(entry.sender_name.as_deref(), Some("Shop"));
        assert_eq!(entry.body, "PROMO");
        assert_eq!(entry.session_key.as_deref(), Some("agent:main:whatsapp:dm"));
    }

    #[tokio::test]
    async fn missing_message_id_gets_generated_fallback() {
        let (filter, registry, _queue) = setup().await;
        filter
            .apply(&InboundMessage::new("sms", "spam-1", "a"))
            .await
            .unwrap();
        filter
            .apply(&InboundMessage::new("sms", "spam-1", "b"))
            .await
            .unwrap();

        let archived = registry.archived().await;
        assert_eq!(archived.len(), 2);
        assert_ne!(archived[0].id, archived[1].id);
        assert!(archived[0].id.starts_with("sms-"));
    }

    #[tokio::test]
    async fn anonymous_message_is_archived() {
        let (filter, registry, _queue) = setup().await;
        let mut msg = InboundMessage::new("webhook", "", "ping");
        msg.sender_id = None;

        let outcome = filter.apply(&msg).await.unwrap();
        assert_eq!(outcome.classification, Classification::SystemNoise);
        assert_eq!(outcome.sender, "");
        assert_eq!(registry.archived().await[0].sender, "");
    }

    #[tokio::test]
    async fn archive_failure_is_fatal() {
        let registry = Arc::new(contacts().await);
        let archive = Arc::new(CountingArchive {
            fail: true,
            ..Default::default()
        });
        let filter = SovereignFilter::new(registry, archive, BatchQueue::new());

        let mut msg = InboundMessage::new("sms", "+18005550199", "spam");
        msg.id = Some("m-1".into());
        let err = filter.apply(&msg).await.unwrap_err();
        assert!(matches!(err, FilterError::Archive { ref message_id, .. } if message_id == "m-1"));
    }

    #[tokio::test]
    async fn lookup_fault_leaves_no_partial_state() {
        let archive = Arc::new(CountingArchive::default());
        let queue = BatchQueue::new();
        let filter = SovereignFilter::new(Arc::new(LookupFails), archive.clone(), queue.clone());

        for sender in ["+15550000001", "+18005550199"] {
            let err = filter
                .apply(&InboundMessage::new("sms", sender, "hi"))
                .await
                .unwrap_err();
            assert!(matches!(err, FilterError::Lookup { sender: ref s, .. } if s == sender));
        }

        filter.settle_touches().await;
        assert!(queue.is_empty().await);
        assert_eq!(archive.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn settle_waits_for_pending_touches() {
        let (filter, registry, _queue) = setup().await;
        let msg = InboundMessage::new("sms", "+15550000002", "see you");
        filter.apply(&msg).await.unwrap();

        filter.settle_touches().await;
        let cousin = registry.get_contact("+15550000002").await.unwrap().unwrap();
        assert_eq!(cousin.last_message_at, Some(msg.received_at));

        // Nothing left to wait for.
        filter.settle_touches().await;
    }

    #[tokio::test]
    async fn touch_failure_does_not_fail_outcome() {
        let registry: Arc<dyn ContactRegistry> = Arc::new(TouchFails(contacts().await));
        let archive = Arc::new(InMemoryRegistry::new());
        let queue = BatchQueue::new();
        let filter = SovereignFilter::new(registry, archive, queue.clone());

        let delivered = filter
            .apply(&InboundMessage::new("sms", "+15550000001", "urgent"))
            .await
            .unwrap();
        assert_eq!(delivered.action, FilterAction::DeliverRaw);

        let batched = filter
            .apply(&InboundMessage::new("sms", "+15550000002", "later"))
            .await
            .unwrap();
        assert_eq!(batched.action, FilterAction::Batch);
        assert_eq!(queue.len().await, 1);

        // Failed touches are logged, not surfaced.
        filter.settle_touches().await;
    }
}
