//! Term vector store.
//!
//! A per-document, per-field miniature term dictionary, independent of the
//! main posting store: terms ordered, one posting list per term, doc count
//! always 1. Random access by document id; flag-tolerance and illegal-state
//! rules mirror the posting store exactly.

pub mod reader;
pub mod writer;

pub use reader::*;
pub use writer::*;
