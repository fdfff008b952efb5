//! Dispatch integration: the hook an outer delivery pipeline calls per message.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::FilterConfig;
use crate::error::FilterError;
use crate::pipeline::filter::SovereignFilter;
use crate::pipeline::types::{FilterAction, FilterOutcome, InboundMessage};

/// What the dispatcher should do with a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchDecision {
    /// True when the filter consumed the message (batched or archived).
    /// False means deliver normally.
    pub intercepted: bool,
    /// Filter outcome. `None` when the filter is disabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<FilterOutcome>,
}

impl DispatchDecision {
    fn bypass() -> Self {
        Self {
            intercepted: false,
            outcome: None,
        }
    }
}

/// Run `message` through the filter, unless it is disabled.
///
/// A disabled filter touches neither the registry nor the queue.
pub async fn dispatch_with_sovereign_filter(
    config: &FilterConfig,
    filter: &SovereignFilter,
    message: &InboundMessage,
) -> Result<DispatchDecision, FilterError> {
    if !config.enabled {
        debug!(provider = %message.provider, "Sovereign filter disabled, delivering normally");
        return Ok(DispatchDecision::bypass());
    }

    let outcome = filter.apply(message).await?;
    let intercepted = match outcome.action {
        FilterAction::DeliverRaw => false,
        FilterAction::Batch | FilterAction::Archive => true,
    };

    Ok(DispatchDecision {
        intercepted,
        outcome: Some(outcome),
    })
}
