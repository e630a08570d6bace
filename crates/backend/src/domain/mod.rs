pub mod config;
pub mod document;
pub mod request;
pub mod search;
pub mod section;
pub mod timestamp;

pub use document::{Document, DocumentMetadata, content_hash};
pub use request::{BulkRequestFilter, IndexRequest, IndexRequestStatus, RequestFilter, RequestOrder, RequestUpdate};
pub use search::{
  DepthFilter, Freshness, IndexStatus, IndexStatusFilter, SearchOptions, SearchResponse, SearchResult, SortBy,
};
pub use section::Section;
