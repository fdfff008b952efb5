//! Relationship nudges: reconnect suggestions for contacts gone quiet.
//!
//! Derived on every call from the registry, never persisted.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::RegistryError;
use crate::store::model::ContactRecord;
use crate::store::traits::ContactRegistry;

/// A suggestion to re-engage one contact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipNudge {
    pub display_name: String,
    pub identity: String,
    /// Hours since the last message, or the threshold itself if there never was one.
    pub silent_hours: i64,
    pub suggestion: String,
}

/// Nudges for every contact silent longer than `threshold_hours`, as of now.
pub async fn generate_nudges(
    registry: &dyn ContactRegistry,
    threshold_hours: u32,
) -> Result<Vec<RelationshipNudge>, RegistryError> {
    generate_nudges_at(registry, threshold_hours, Utc::now()).await
}

/// Same as [`generate_nudges`] with an explicit clock.
///
/// Output follows registry enumeration order.
pub async fn generate_nudges_at(
    registry: &dyn ContactRegistry,
    threshold_hours: u32,
    now: DateTime<Utc>,
) -> Result<Vec<RelationshipNudge>, RegistryError> {
    // Thresholds reaching past chrono's range leave only never-contacted records.
    let cutoff = now
        .checked_sub_signed(Duration::hours(i64::from(threshold_hours)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let silent = registry.list_silent_contacts(cutoff).await?;

    let nudges: Vec<_> = silent
        .iter()
        .map(|contact| nudge_for(contact, threshold_hours, now))
        .collect();

    info!(
        threshold_hours,
        count = nudges.len(),
        "Generated relationship nudges"
    );
    Ok(nudges)
}

fn nudge_for(contact: &ContactRecord, threshold_hours: u32, now: DateTime<Utc>) -> RelationshipNudge {
    let silent_hours = match contact.last_message_at {
        Some(at) => hours_between(at, now),
        None => i64::from(threshold_hours),
    };

    let suggestion = match contact.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        Some(notes) => format!(
            "It's been a while since you heard from {}. You noted: \"{notes}\". Maybe check in?",
            contact.display_name
        ),
        None => format!(
            "Reach out to {}: {silent_hours} hours since last contact.",
            contact.display_name
        ),
    };

    RelationshipNudge {
        display_name: contact.display_name.clone(),
        identity: contact.identity.clone(),
        silent_hours,
        suggestion,
    }
}

/// Whole hours from `from` to `to`, rounded to nearest.
fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = (to - from).num_milliseconds() as f64;
    (millis / 3_600_000.0).round() as i64
}
