//! Term dictionary and posting store.
//!
//! The inverted index core: an ordered mapping from term bytes to posting
//! lists, written once per segment at flush time and read back through the
//! [`Terms`]/[`TermsEnum`]/[`PostingsIterator`] contracts that the query
//! layer consumes.

pub mod reader;
pub mod terms;
pub mod writer;

pub use reader::*;
pub use terms::*;
pub use writer::*;

use crate::error::{PeltaError, Result};

/// Segment-local document id.
///
/// Iterators position themselves at `-1` before the first call to
/// [`DocIdSetIterator::next_doc`] and at [`NO_MORE_DOCS`] once exhausted.
pub type DocId = i32;

/// Sentinel returned by `next_doc`/`advance` when no more documents exist.
pub const NO_MORE_DOCS: DocId = i32::MAX;

/// Posting feature flags, OR-ed together when requesting a postings iterator.
pub mod flags {
    /// Doc ids only.
    pub const NONE: u32 = 0;
    /// Term frequencies.
    pub const FREQS: u32 = 1 << 0;
    /// Term positions (implies frequencies).
    pub const POSITIONS: u32 = 1 << 1;
    /// Character offsets (implies positions).
    pub const OFFSETS: u32 = 1 << 2;
    /// Per-position payloads (implies positions).
    pub const PAYLOADS: u32 = 1 << 3;
    /// Everything.
    pub const ALL: u32 = FREQS | POSITIONS | OFFSETS | PAYLOADS;

    /// Whether the requested flags want positional data at all.
    pub fn wants_positions(requested: u32) -> bool {
        requested & (POSITIONS | OFFSETS | PAYLOADS) != 0
    }
}

/// The shared forward-iteration contract over sorted document ids.
///
/// `doc_id()` reports `-1` until the first `next_doc`/`advance` call and
/// [`NO_MORE_DOCS`] afterwards; both stepping calls are monotonic, and the
/// exhausted sentinel is reached exactly once.
pub trait DocIdSetIterator {
    /// The current document id.
    fn doc_id(&self) -> DocId;

    /// Advance to the next document, returning its id or [`NO_MORE_DOCS`].
    fn next_doc(&mut self) -> Result<DocId>;

    /// Advance to the first document with id >= `target`, which must be
    /// greater than the current position.
    fn advance(&mut self, target: DocId) -> Result<DocId>;

    /// An estimate of the number of documents this iterator will visit.
    fn cost(&self) -> u64;
}

/// Iterator over one term's postings.
///
/// Accessor behavior depends on which features were stored and requested:
/// features the format never stored yield defined fallbacks (`freq() == 1`,
/// offsets `-1`, payload `None`) rather than errors. Reading positional data
/// before the first [`PostingsIterator::next_position`] call, or advancing
/// positions past the current document's frequency, is a caller bug and is
/// signaled with [`PeltaError::IllegalState`].
pub trait PostingsIterator: DocIdSetIterator + Send {
    /// Term frequency within the current document.
    fn freq(&self) -> Result<u32>;

    /// Advance to the next position within the current document.
    fn next_position(&mut self) -> Result<i32>;

    /// Start offset of the current position, or `-1` when offsets were not
    /// stored.
    fn start_offset(&self) -> Result<i32>;

    /// End offset of the current position, or `-1` when offsets were not
    /// stored.
    fn end_offset(&self) -> Result<i32>;

    /// Payload at the current position, or `None` when absent.
    fn payload(&self) -> Result<Option<&[u8]>>;

    /// Support for downcast-based iterator reuse.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Helper producing the error for positional reads before `next_position`.
pub(crate) fn position_not_read() -> PeltaError {
    PeltaError::illegal_state("position accessors called before next_position")
}

/// Helper producing the error for stepping positions past the frequency.
pub(crate) fn positions_exhausted(freq: u32) -> PeltaError {
    PeltaError::illegal_state(format!(
        "next_position called more than freq={freq} times for the current doc"
    ))
}
