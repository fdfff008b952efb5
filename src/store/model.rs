//! Registry records: contacts and archived noise.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A known sender in the urgency registry.
///
/// Presence of a record is what makes a sender human; `priority` alone
/// decides between immediate delivery and batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
    /// Raw sender identity as seen on the wire (phone number, handle, address).
    pub identity: String,
    /// Human-readable name.
    pub display_name: String,
    /// Priority humans bypass batching.
    pub priority: bool,
    /// Last inbound message from this contact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Last time we replied. Preserved, never used for routing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_replied_at: Option<DateTime<Utc>>,
    /// Free-text notes from onboarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContactRecord {
    /// Build a fresh, non-priority record with no history.
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            priority: false,
            last_message_at: None,
            last_replied_at: None,
            notes: None,
        }
    }

    /// Mark as priority.
    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    /// Attach notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    /// Set the last-message timestamp.
    pub fn with_last_message_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_message_at = Some(at);
        self
    }

    /// Apply an upsert on top of this record. `None` fields are preserved.
    pub fn merge(&mut self, upsert: &ContactUpsert) {
        if let Some(ref name) = upsert.display_name {
            self.display_name = name.clone();
        }
        if let Some(priority) = upsert.priority {
            self.priority = priority;
        }
        if let Some(at) = upsert.last_message_at {
            self.last_message_at = Some(at);
        }
        if let Some(at) = upsert.last_replied_at {
            self.last_replied_at = Some(at);
        }
        if let Some(ref notes) = upsert.notes {
            self.notes = Some(notes.clone());
        }
    }

    /// True when the contact has never messaged or last did so before `cutoff`.
    pub fn is_silent_since(&self, cutoff: DateTime<Utc>) -> bool {
        match self.last_message_at {
            Some(at) => at < cutoff,
            None => true,
        }
    }
}

/// Partial contact write with merge semantics.
///
/// Only `identity` is required. For a new contact, a missing display name
/// falls back to the identity and a missing priority flag to `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpsert {
    pub identity: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub priority: Option<bool>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_replied_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ContactUpsert {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            ..Default::default()
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn priority(mut self, priority: bool) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn last_message_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_message_at = Some(at);
        self
    }

    /// Materialize a brand-new record from this upsert.
    pub fn into_record(self) -> ContactRecord {
        let display_name = self
            .display_name
            .unwrap_or_else(|| self.identity.clone());
        ContactRecord {
            identity: self.identity,
            display_name,
            priority: self.priority.unwrap_or(false),
            last_message_at: self.last_message_at,
            last_replied_at: self.last_replied_at,
            notes: self.notes,
        }
    }
}

/// Audit record for a suppressed non-human/unknown message. Write-once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedNoiseEntry {
    /// Origin message id, or a generated fallback.
    pub id: String,
    /// Calendar date of receipt, used to bound scans.
    pub partition_date: NaiveDate,
    pub provider: String,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub body: String,
    pub received_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
}
