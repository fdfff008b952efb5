//! Sovereign filter: dual-track inbound message router.
//!
//! Priority humans are delivered immediately, known humans are held for
//! scheduled batch delivery, and everyone else is archived silently.

pub mod config;
pub mod error;
pub mod nudge;
pub mod pipeline;
pub mod store;
