//! Sender classification against the urgency registry.
//!
//! Total and deterministic:
//! - no sender identity → system noise (registry not consulted)
//! - registry miss → system noise
//! - registry hit → priority or known human, by the contact's priority flag
//!
//! A registry fault is not a miss and is returned as an error.

use tracing::debug;

use crate::error::FilterError;
use crate::pipeline::types::{ClassificationResult, InboundMessage};
use crate::store::traits::ContactRegistry;

/// Classify a message's sender.
pub async fn classify(
    registry: &dyn ContactRegistry,
    message: &InboundMessage,
) -> Result<ClassificationResult, FilterError> {
    classify_sender(registry, message.effective_sender()).await
}

/// Classify a resolved sender id.
pub async fn classify_sender(
    registry: &dyn ContactRegistry,
    sender: &str,
) -> Result<ClassificationResult, FilterError> {
    if sender.is_empty() {
        debug!("No sender identity, classifying as noise");
        return Ok(ClassificationResult::noise());
    }

    let contact = registry
        .get_contact(sender)
        .await
        .map_err(|source| FilterError::Lookup {
            sender: sender.to_string(),
            source,
        })?;

    let result = match contact {
        Some(contact) => ClassificationResult::matched(contact),
        None => ClassificationResult::noise(),
    };

    debug!(
        sender = %sender,
        classification = result.classification.label(),
        "Sender classified"
    );
    Ok(result)
}
