//! Document understanding: discovery, splitting and token estimates.

pub mod discovery;
pub mod splitter;
pub mod tokens;

pub use discovery::{DiscoveryError, FileDiscovery, PathFilter, relative_path};
pub use splitter::{MarkdownSplitter, ROOT_HEADING, SplitError, SplitterConfig};
pub use tokens::count_tokens;
