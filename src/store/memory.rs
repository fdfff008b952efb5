//! In-process registry and archive, used for tests, embedding, and dry runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RegistryError;
use crate::store::key::normalize_identity;
use crate::store::model::{ArchivedNoiseEntry, ContactRecord, ContactUpsert};
use crate::store::traits::{ArchiveStore, ContactRegistry};

#[derive(Default)]
struct Contacts {
    /// Normalized keys in first-insert order.
    order: Vec<String>,
    by_key: HashMap<String, ContactRecord>,
}

/// Memory-backed [`ContactRegistry`] and [`ArchiveStore`].
///
/// Enumeration follows first-insert order.
#[derive(Default)]
pub struct InMemoryRegistry {
    contacts: RwLock<Contacts>,
    archive: RwLock<Vec<ArchivedNoiseEntry>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry with complete records.
    pub async fn with_contacts(records: impl IntoIterator<Item = ContactRecord>) -> Self {
        let registry = Self::new();
        {
            let mut contacts = registry.contacts.write().await;
            for record in records {
                let key = normalize_identity(&record.identity);
                if !contacts.by_key.contains_key(&key) {
                    contacts.order.push(key.clone());
                }
                contacts.by_key.insert(key, record);
            }
        }
        registry
    }

    /// Snapshot of archived entries in write order (replacements keep their slot).
    pub async fn archived(&self) -> Vec<ArchivedNoiseEntry> {
        self.archive.read().await.clone()
    }
}

#[async_trait]
impl ContactRegistry for InMemoryRegistry {
    async fn get_contact(&self, identity: &str) -> Result<Option<ContactRecord>, RegistryError> {
        let key = normalize_identity(identity);
        Ok(self.contacts.read().await.by_key.get(&key).cloned())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, RegistryError> {
        let contacts = self.contacts.read().await;
        Ok(contacts
            .order
            .iter()
            .filter_map(|key| contacts.by_key.get(key).cloned())
            .collect())
    }

    async fn upsert_contact(&self, upsert: &ContactUpsert) -> Result<ContactRecord, RegistryError> {
        let key = normalize_identity(&upsert.identity);
        let mut contacts = self.contacts.write().await;

        let stored = if let Some(existing) = contacts.by_key.get_mut(&key) {
            existing.merge(upsert);
            existing.clone()
        } else {
            let record = upsert.clone().into_record();
            contacts.order.push(key.clone());
            contacts.by_key.insert(key, record.clone());
            record
        };

        debug!(identity = %stored.identity, priority = stored.priority, "Contact upserted");
        Ok(stored)
    }

    async fn touch_last_message(
        &self,
        identity: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let key = normalize_identity(identity);
        if let Some(record) = self.contacts.write().await.by_key.get_mut(&key)
            && record.last_message_at.is_none_or(|stored| stored < at)
        {
            record.last_message_at = Some(at);
        }
        Ok(())
    }

    async fn list_silent_contacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ContactRecord>, RegistryError> {
        let all = self.list_contacts().await?;
        Ok(all
            .into_iter()
            .filter(|c| c.is_silent_since(cutoff))
            .collect())
    }
}

#[async_trait]
impl ArchiveStore for InMemoryRegistry {
    async fn archive_noise(&self, entry: &ArchivedNoiseEntry) -> Result<(), RegistryError> {
        let mut archive = self.archive.write().await;
        match archive.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry.clone(),
            None => archive.push(entry.clone()),
        }
        Ok(())
    }
}
