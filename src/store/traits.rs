//! Storage traits consumed by the filter: the contact registry and the noise archive.
//!
//! Implementations receive raw identities and normalize them internally
//! (see [`crate::store::key`]). A missing contact is `Ok(None)`, never an error.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::store::model::{ArchivedNoiseEntry, ContactRecord, ContactUpsert};

/// Durable source of truth for who is human and how urgent.
#[async_trait]
pub trait ContactRegistry: Send + Sync {
    /// Point lookup by identity.
    async fn get_contact(&self, identity: &str) -> Result<Option<ContactRecord>, RegistryError>;

    /// All contacts, in backend enumeration order.
    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, RegistryError>;

    /// Insert or merge a contact. Returns the stored record.
    async fn upsert_contact(&self, upsert: &ContactUpsert) -> Result<ContactRecord, RegistryError>;

    /// Set only the last-message timestamp.
    ///
    /// Never moves the timestamp backwards: an `at` older than the stored
    /// value is ignored. Must succeed without effect when the contact does
    /// not exist.
    async fn touch_last_message(
        &self,
        identity: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError>;

    /// Contacts that never messaged, or whose last message is older than `cutoff`.
    async fn list_silent_contacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ContactRecord>, RegistryError>;
}

/// Write-only audit sink for suppressed messages.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    /// Store an entry, replacing any previous entry with the same id.
    async fn archive_noise(&self, entry: &ArchivedNoiseEntry) -> Result<(), RegistryError>;
}
