//! User list parsing and record extraction

pub mod document;
pub mod extractor;
pub mod tree;

pub use document::{AliasNode, DocumentNode, UserListDocument, UserNode};
pub use extractor::{Extraction, ExtractionStats, RecordExtractor, Skip, SkipReason};
pub use tree::XmlElement;
