//! Inbound message pipeline.
//!
//! Every inbound message flows through:
//! 1. `classify()`: registry lookup, three-way classification
//! 2. `SovereignFilter::apply()`: touch / enqueue / archive
//! 3. `dispatch_with_sovereign_filter()`: tells the dispatcher whether to deliver
//!
//! Batched messages leave through `BatchQueue::drain()` and `render_digest()`
//! whenever the host's batch schedule fires.

pub mod batch;
pub mod classifier;
pub mod digest;
pub mod dispatch;
pub mod filter;
pub mod types;

pub use batch::{BatchQueue, BatchedMessage};
pub use classifier::classify;
pub use digest::render_digest;
pub use dispatch::{DispatchDecision, dispatch_with_sovereign_filter};
pub use filter::SovereignFilter;
pub use types::{
    Classification, ClassificationResult, FilterAction, FilterOutcome, InboundMessage,
};
