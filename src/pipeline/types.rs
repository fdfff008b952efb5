//! Shared types for the sovereign filter pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::model::ContactRecord;

// ── Inbound message ─────────────────────────────────────────────────

/// Unified inbound message from any provider.
///
/// Provider adapters convert their native payloads into this struct before
/// handing it to the filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// Provider-native message id, if the provider supplies one.
    #[serde(default)]
    pub id: Option<String>,
    /// Source provider: "whatsapp", "telegram", "sms", ...
    pub provider: String,
    /// Primary sender identity.
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Secondary identity, used when `sender_id` is missing.
    #[serde(default)]
    pub from: Option<String>,
    /// Human-readable sender name, if the provider knows it.
    #[serde(default)]
    pub sender_name: Option<String>,
    /// Raw body. Never rewritten by the filter.
    pub body: String,
    /// When the message was received.
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
    /// Session/routing key of the conversation.
    #[serde(default)]
    pub session_key: Option<String>,
    /// Channel to answer on, when it differs from `provider`.
    #[serde(default)]
    pub reply_channel: Option<String>,
    /// Destination to answer to.
    #[serde(default)]
    pub reply_to: Option<String>,
}

impl InboundMessage {
    /// Minimal message with a primary sender id, received now.
    pub fn new(
        provider: impl Into<String>,
        sender_id: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            provider: provider.into(),
            sender_id: Some(sender_id.into()),
            from: None,
            sender_name: None,
            body: body.into(),
            received_at: Utc::now(),
            session_key: None,
            reply_channel: None,
            reply_to: None,
        }
    }

    /// Primary identity, else secondary, else empty. Empty strings count as absent.
    pub fn effective_sender(&self) -> &str {
        [self.sender_id.as_deref(), self.from.as_deref()]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty())
            .unwrap_or("")
    }
}

// ── Classification ──────────────────────────────────────────────────

/// Who sent a message, as far as routing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Classification {
    /// Registered and flagged priority.
    PriorityHuman,
    /// Registered, not priority.
    KnownHuman,
    /// Not in the registry, or no identity at all.
    SystemNoise,
}

impl Classification {
    /// Wire label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PriorityHuman => "priority-human",
            Self::KnownHuman => "known-human",
            Self::SystemNoise => "system-noise",
        }
    }
}

/// Classification plus the matched contact, when there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactRecord>,
}

impl ClassificationResult {
    pub fn noise() -> Self {
        Self {
            classification: Classification::SystemNoise,
            contact: None,
        }
    }

    pub fn matched(contact: ContactRecord) -> Self {
        let classification = if contact.priority {
            Classification::PriorityHuman
        } else {
            Classification::KnownHuman
        };
        Self {
            classification,
            contact: Some(contact),
        }
    }
}

// ── Filter outcome ──────────────────────────────────────────────────

/// What the filter did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterAction {
    /// Deliver now, unmodified.
    DeliverRaw,
    /// Held in the batch queue.
    Batch,
    /// Written to the noise archive, never delivered.
    Archive,
}

impl FilterAction {
    pub fn label(&self) -> &'static str {
        match self {
            Self::DeliverRaw => "deliver-raw",
            Self::Batch => "batch",
            Self::Archive => "archive",
        }
    }
}

impl From<Classification> for FilterAction {
    fn from(classification: Classification) -> Self {
        match classification {
            Classification::PriorityHuman => Self::DeliverRaw,
            Classification::KnownHuman => Self::Batch,
            Classification::SystemNoise => Self::Archive,
        }
    }
}

/// Routing outcome handed back to the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterOutcome {
    pub action: FilterAction,
    pub classification: Classification,
    /// Effective sender id the decision was made for (may be empty).
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<ContactRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_sender_prefers_primary() {
        let mut msg = InboundMessage::new("whatsapp", "+15551112222", "hi");
        msg.from = Some("+15553334444".into());
        assert_eq!(msg.effective_sender(), "+15551112222");
    }

    #[test]
    fn effective_sender_falls_back_to_secondary() {
        let mut msg = InboundMessage::new("telegram", "", "hi");
        msg.from = Some("tg:42".into());
        assert_eq!(msg.effective_sender(), "tg:42");

        msg.sender_id = None;
        assert_eq!(msg.effective_sender(), "tg:42");
    }

    #[test]
    fn effective_sender_empty_when_both_missing() {
        let mut msg = InboundMessage::new("sms", "", "hi");
        msg.from = Some(String::new());
        assert_eq!(msg.effective_sender(), "");
        msg.sender_id = None;
        msg.from = None;
        assert_eq!(msg.effective_sender(), "");
    }

    #[test]
    fn matched_result_follows_priority_flag() {
        let vip = ContactRecord::new("a", "A").with_priority(true);
        let friend = ContactRecord::new("b", "B");
        assert_eq!(
            ClassificationResult::matched(vip).classification,
            Classification::PriorityHuman
        );
        assert_eq!(
            ClassificationResult::matched(friend).classification,
            Classification::KnownHuman
        );
    }

    #[test]
    fn action_per_classification() {
        assert_eq!(FilterAction::from(Classification::PriorityHuman), FilterAction::DeliverRaw);
        assert_eq!(FilterAction::from(Classification::KnownHuman), FilterAction::Batch);
        assert_eq!(FilterAction::from(Classification::SystemNoise), FilterAction::Archive);
    }

    #[test]
    fn labels_match_serialization() {
        for c in [
            Classification::PriorityHuman,
            Classification::KnownHuman,
            Classification::SystemNoise,
        ] {
            assert_eq!(serde_json::to_value(c).unwrap(), c.label());
        }
        for a in [FilterAction::DeliverRaw, FilterAction::Batch, FilterAction::Archive] {
            assert_eq!(serde_json::to_value(a).unwrap(), a.label());
        }
    }

    #[test]
    fn outcome_serialization() {
        let outcome = FilterOutcome {
            action: FilterAction::DeliverRaw,
            classification: Classification::PriorityHuman,
            sender: "+1".into(),
            contact: None,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["action"], "deliver-raw");
        assert_eq!(json["classification"], "priority-human");
        assert!(json.get("contact").is_none());
    }

    #[test]
    fn inbound_message_from_minimal_json() {
        let msg: InboundMessage = serde_json::from_value(serde_json::json!({
            "provider": "sms",
            "from": "+15550001111",
            "body": "running late"
        }))
        .unwrap();
        assert_eq!(msg.effective_sender(), "+15550001111");
        assert!(msg.id.is_none());
    }
}
