//! Persistence layer: the urgency registry and the noise archive.

pub mod key;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod model;
pub mod traits;

pub use key::normalize_identity;
pub use libsql_backend::LibSqlRegistry;
pub use memory::InMemoryRegistry;
pub use model::{ArchivedNoiseEntry, ContactRecord, ContactUpsert};
pub use traits::{ArchiveStore, ContactRegistry};
