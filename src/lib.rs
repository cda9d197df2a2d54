//! # Pelta
//!
//! Segment storage and codec core for full-text and vector search.
//!
//! ## Features
//!
//! - Pure Rust implementation
//! - Per-segment pluggable codecs (postings, doc values, term vectors,
//!   dense vectors) behind one manifest
//! - Sorted term dictionaries with seek/ceil semantics
//! - Five columnar doc-values shapes
//! - HNSW approximate nearest-neighbor search with a visited-node budget
//! - Copy-on-write deletions and background segment merging

pub mod docvalues;
pub mod document;
pub mod error;
pub mod field;
pub mod index;
pub mod merge;
pub mod postings;
pub mod segment;
pub mod storage;
pub mod termvectors;
pub mod util;
pub mod vector;

pub mod prelude {
    //! Commonly used types, re-exported.
    pub use crate::document::{Document, Token};
    pub use crate::error::{PeltaError, Result};
    pub use crate::field::{DocValuesType, IndexOptions, TermVectorOptions, VectorShape};
    pub use crate::index::{IndexReader, IndexWriter, IndexWriterConfig};
    pub use crate::postings::{DocId, DocIdSetIterator, NO_MORE_DOCS};
    pub use crate::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
    pub use crate::vector::{VectorEncoding, VectorSimilarity};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
