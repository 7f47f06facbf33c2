//! Service layer for the fetcher.
//!
//! - Link discovery on source pages (`LinkDiscoverer`)
//! - File download, comparison and persistence (`FileRetriever`)

mod files;
mod links;

pub use files::{FileRetriever, RetrieveOutcome};
pub use links::{LinkDiscoverer, extract_links, is_data_file_link};
