//! Columnar value store.
//!
//! Per-document values stored outside the inverted index, in five shapes:
//! single numeric, single binary, single sorted ordinal, sorted-set ordinals
//! and sorted-numeric multisets. All five iterate with the same sentinel and
//! monotonicity rules as postings, plus `advance_exact` for random probes.
//! Values are sparse over documents: missing entries are skippable, never an
//! error.

pub mod reader;
pub mod writer;

pub use reader::*;
pub use writer::*;

use crate::error::Result;
use crate::postings::terms::TermsEnum;
use crate::postings::{DocId, DocIdSetIterator};

/// Sentinel returned by [`SortedSetDocValues::next_ord`] once the current
/// document's ordinals are exhausted.
pub const NO_MORE_ORDS: i64 = -1;

/// Common iteration surface of every doc-values shape.
pub trait DocValuesIterator: DocIdSetIterator + Send {
    /// Position on exactly `target`, returning whether it has a value.
    ///
    /// `target` must be beyond the current position. Afterwards `doc_id()`
    /// reports `target` whether or not a value exists there.
    fn advance_exact(&mut self, target: DocId) -> Result<bool>;
}

/// Single i64 per document.
pub trait NumericDocValues: DocValuesIterator {
    /// The current document's value.
    fn long_value(&self) -> Result<i64>;
}

/// Single byte string per document.
pub trait BinaryDocValues: DocValuesIterator {
    /// The current document's value.
    fn binary_value(&self) -> Result<&[u8]>;
}

/// Single ordinal into a sorted dictionary per document.
pub trait SortedDocValues: DocValuesIterator {
    /// The current document's ordinal.
    fn ord_value(&self) -> Result<i64>;

    /// The dictionary entry for `ord`.
    fn lookup_ord(&self, ord: i64) -> Result<&[u8]>;

    /// Number of unique values in the dictionary.
    fn value_count(&self) -> u64;

    /// The ordinal of `key`, or a negative value when absent.
    fn lookup_term(&self, key: &[u8]) -> Result<i64>;

    /// A terms-enum view over the dictionary.
    fn terms_enum(&self) -> Result<Box<dyn TermsEnum>>;
}

/// Zero-or-more ascending, deduplicated ordinals per document.
pub trait SortedSetDocValues: DocValuesIterator {
    /// Number of ordinals for the current document.
    fn doc_value_count(&self) -> Result<usize>;

    /// The next ordinal for the current document, ascending, or
    /// [`NO_MORE_ORDS`] when exhausted.
    fn next_ord(&mut self) -> Result<i64>;

    /// The dictionary entry for `ord`.
    fn lookup_ord(&self, ord: i64) -> Result<&[u8]>;

    /// Number of unique values in the dictionary.
    fn value_count(&self) -> u64;

    /// The ordinal of `key`, or a negative value when absent.
    fn lookup_term(&self, key: &[u8]) -> Result<i64>;

    /// A terms-enum view over the dictionary.
    fn terms_enum(&self) -> Result<Box<dyn TermsEnum>>;
}

/// Zero-or-more ascending i64s per document, duplicates preserved.
pub trait SortedNumericDocValues: DocValuesIterator {
    /// Number of values for the current document.
    fn doc_value_count(&self) -> Result<usize>;

    /// The next value for the current document, ascending. Calling past
    /// `doc_value_count` is a protocol error.
    fn next_value(&mut self) -> Result<i64>;
}

/// Reader-side access to the doc-values of one segment.
pub trait DocValuesProducer: Send + Sync {
    /// Names of fields with doc values.
    fn fields(&self) -> Vec<String>;

    /// A fresh numeric iterator for `field`, or `None` when absent.
    fn numeric(&self, field: &str) -> Result<Option<Box<dyn NumericDocValues>>>;

    /// A fresh binary iterator for `field`, or `None` when absent.
    fn binary(&self, field: &str) -> Result<Option<Box<dyn BinaryDocValues>>>;

    /// A fresh sorted iterator for `field`, or `None` when absent.
    fn sorted(&self, field: &str) -> Result<Option<Box<dyn SortedDocValues>>>;

    /// A fresh sorted-set iterator for `field`, or `None` when absent.
    fn sorted_set(&self, field: &str) -> Result<Option<Box<dyn SortedSetDocValues>>>;

    /// A fresh sorted-numeric iterator for `field`, or `None` when absent.
    fn sorted_numeric(&self, field: &str) -> Result<Option<Box<dyn SortedNumericDocValues>>>;
}
