//! Business logic services.
//!
//! - [`search`] - Section search with freshness annotation
//! - [`sync`] - File events, manual indexing, rebuild, startup sync, status
//! - [`indexer`] - The split-and-store path shared by all of the above

pub mod error;
pub mod indexer;
pub mod search;
pub mod sync;

#[cfg(test)]
pub(crate) mod __tests__;

pub use error::ServiceError;
pub use indexer::SectionIndexer;
pub use search::SearchService;
pub use sync::{IndexOutcome, RebuildReport, StatusReport, SyncReport, SyncService};
