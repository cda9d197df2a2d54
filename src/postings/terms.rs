//! Term dictionary contracts.
//!
//! [`Terms`] is the per-field view over a sorted term space;
//! [`TermsEnum`] walks it. Both are what the query layer programs against,
//! independent of which codec produced the segment.

use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::postings::PostingsIterator;

/// Outcome of [`TermsEnum::seek_ceil`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekStatus {
    /// The exact term exists; the enum is positioned on it.
    Found,
    /// The enum is positioned on the smallest term greater than the target.
    NotFound,
    /// No term >= target exists; the enum is exhausted.
    End,
}

/// A field's sorted term dictionary with aggregate statistics.
pub trait Terms: Send + Sync {
    /// A fresh enumerator positioned before the first term.
    ///
    /// Every call returns an independent enum; iterating one never disturbs
    /// another, so the same view can be walked twice (stats pass + write
    /// pass) without state corruption.
    fn iterator(&self) -> Result<Box<dyn TermsEnum>>;

    /// Number of unique terms.
    fn size(&self) -> Result<i64>;

    /// Number of documents with at least one term in this field.
    fn doc_count(&self) -> Result<u32>;

    /// Sum of doc frequencies over all terms.
    fn sum_doc_freq(&self) -> Result<u64>;

    /// Sum of total term frequencies over all terms.
    fn sum_total_term_freq(&self) -> Result<u64>;

    /// Whether frequencies were recorded.
    fn has_freqs(&self) -> bool;

    /// Whether positions were recorded.
    fn has_positions(&self) -> bool;

    /// Whether offsets were recorded.
    fn has_offsets(&self) -> bool;

    /// Whether payloads were recorded.
    fn has_payloads(&self) -> bool;
}

/// Ordered enumerator over a field's terms.
///
/// Starts positioned before the first term; [`TermsEnum::next`] steps
/// forward, the seek methods jump. Term-level accessors require a positioned
/// enum and signal [`PeltaError::IllegalState`] otherwise.
pub trait TermsEnum: Send {
    /// Step to the next term, returning its bytes or `None` at the end.
    fn next(&mut self) -> Result<Option<&[u8]>>;

    /// Position exactly on `term`, returning whether it exists.
    fn seek_exact(&mut self, term: &[u8]) -> Result<bool>;

    /// Position on `term` or the smallest term greater than it.
    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus>;

    /// The current term's bytes.
    fn term(&self) -> Result<&[u8]>;

    /// The current term's ordinal in the sorted term space.
    ///
    /// Formats without ordinal support may return an illegal-state error.
    fn ord(&self) -> Result<i64>;

    /// Number of documents containing the current term.
    fn doc_freq(&self) -> Result<u32>;

    /// Total occurrences of the current term across documents.
    fn total_term_freq(&self) -> Result<u64>;

    /// A postings iterator for the current term.
    ///
    /// `reuse` is a best-effort optimization: an iterator previously obtained
    /// from this format with the same flags is generally reset in place and
    /// handed back, but formats are free to allocate instead. Callers must
    /// not assume identity.
    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsIterator>>,
        flags: u32,
    ) -> Result<Box<dyn PostingsIterator>>;
}

/// Reader-side access to the per-field term dictionaries of one segment.
pub trait FieldsProducer: Send + Sync {
    /// Names of fields with postings, in no particular order.
    fn fields(&self) -> Vec<String>;

    /// The term dictionary for `field`, or `None` when the field has no
    /// postings in this segment (including ghost fields).
    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>>;
}

pub(crate) fn enum_not_positioned() -> PeltaError {
    PeltaError::illegal_state("terms enum is not positioned on a term")
}

/// A terms enum over an empty dictionary.
///
/// Ghost fields (all owning documents deleted and merged away) answer through
/// this: `seek_exact` is false, `seek_ceil` is `End`, iteration yields
/// nothing, and nothing errors.
#[derive(Debug, Default)]
pub struct EmptyTermsEnum;

impl TermsEnum for EmptyTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        Ok(None)
    }

    fn seek_exact(&mut self, _term: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn seek_ceil(&mut self, _term: &[u8]) -> Result<SeekStatus> {
        Ok(SeekStatus::End)
    }

    fn term(&self) -> Result<&[u8]> {
        Err(enum_not_positioned())
    }

    fn ord(&self) -> Result<i64> {
        Err(enum_not_positioned())
    }

    fn doc_freq(&self) -> Result<u32> {
        Err(enum_not_positioned())
    }

    fn total_term_freq(&self) -> Result<u64> {
        Err(enum_not_positioned())
    }

    fn postings(
        &mut self,
        _reuse: Option<Box<dyn PostingsIterator>>,
        _flags: u32,
    ) -> Result<Box<dyn PostingsIterator>> {
        Err(enum_not_positioned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_terms_enum_never_throws_on_seeks() {
        let mut te = EmptyTermsEnum;

        assert!(!te.seek_exact(b"anything").unwrap());
        assert_eq!(te.seek_ceil(b"anything").unwrap(), SeekStatus::End);
        assert!(te.next().unwrap().is_none());
    }

    #[test]
    fn test_empty_terms_enum_accessors_are_illegal_state() {
        let te = EmptyTermsEnum;
        assert!(matches!(te.term(), Err(PeltaError::IllegalState(_))));
        assert!(matches!(te.doc_freq(), Err(PeltaError::IllegalState(_))));
    }
}
