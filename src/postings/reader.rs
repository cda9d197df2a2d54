//! Posting store reader.
//!
//! Opens the `.pst` file of a segment, decodes the per-field term
//! dictionaries into memory, and exposes them through the [`Terms`] /
//! [`TermsEnum`] / [`PostingsIterator`] contracts. Seeks binary-search the
//! sorted term array; postings iterate over the decoded lists.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::field::IndexOptions;
use crate::postings::terms::{enum_not_positioned, FieldsProducer, SeekStatus, Terms, TermsEnum};
use crate::postings::writer::{index_options_from_code, POSTINGS_EXTENSION, POSTINGS_MAGIC, POSTINGS_VERSION};
use crate::postings::{
    flags, position_not_read, positions_exhausted, DocId, DocIdSetIterator, PostingsIterator,
    NO_MORE_DOCS,
};
use crate::storage::{Storage, StructReader};

/// One decoded posting: everything stored for a (term, doc) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostingData {
    /// Document id.
    pub doc: DocId,
    /// Term frequency in the document.
    pub freq: u32,
    /// Positions, present when the field stored them.
    pub positions: Vec<i32>,
    /// (start, end) offsets parallel to positions, when stored.
    pub offsets: Vec<(i32, i32)>,
    /// Per-position payloads parallel to positions, when stored.
    pub payloads: Vec<Option<Vec<u8>>>,
}

/// One term with its statistics and postings.
#[derive(Debug, Clone)]
pub struct TermEntry {
    /// Term bytes.
    pub term: Vec<u8>,
    /// Number of documents containing the term.
    pub doc_freq: u32,
    /// Total occurrences across documents.
    pub total_term_freq: u64,
    /// The postings, in increasing doc order.
    pub postings: Arc<Vec<PostingData>>,
}

/// A field's decoded term dictionary. Implements [`Terms`].
#[derive(Debug)]
pub struct FieldTerms {
    pub(crate) options: IndexOptions,
    pub(crate) has_payloads: bool,
    pub(crate) doc_count: u32,
    pub(crate) sum_doc_freq: u64,
    pub(crate) sum_total_term_freq: u64,
    pub(crate) terms: Arc<Vec<TermEntry>>,
}

impl FieldTerms {
    /// The index options the field was written with.
    pub fn index_options(&self) -> IndexOptions {
        self.options
    }

    /// Direct access to the decoded term entries, in sorted order.
    pub fn entries(&self) -> &[TermEntry] {
        &self.terms
    }
}

impl Terms for FieldTerms {
    fn iterator(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(SegmentTermsEnum {
            terms: Arc::clone(&self.terms),
            options: self.options,
            has_payloads: self.has_payloads,
            pos: -1,
        }))
    }

    fn size(&self) -> Result<i64> {
        Ok(self.terms.len() as i64)
    }

    fn doc_count(&self) -> Result<u32> {
        Ok(self.doc_count)
    }

    fn sum_doc_freq(&self) -> Result<u64> {
        Ok(self.sum_doc_freq)
    }

    fn sum_total_term_freq(&self) -> Result<u64> {
        Ok(self.sum_total_term_freq)
    }

    fn has_freqs(&self) -> bool {
        self.options.has_freqs()
    }

    fn has_positions(&self) -> bool {
        self.options.has_positions()
    }

    fn has_offsets(&self) -> bool {
        self.options.has_offsets()
    }

    fn has_payloads(&self) -> bool {
        self.has_payloads
    }
}

/// Terms enumerator over one field's sorted dictionary.
#[derive(Debug)]
pub struct SegmentTermsEnum {
    terms: Arc<Vec<TermEntry>>,
    options: IndexOptions,
    has_payloads: bool,
    /// -1 before the first term, terms.len() when exhausted.
    pos: i64,
}

impl SegmentTermsEnum {
    fn current(&self) -> Result<&TermEntry> {
        if self.pos < 0 || self.pos as usize >= self.terms.len() {
            return Err(enum_not_positioned());
        }
        Ok(&self.terms[self.pos as usize])
    }

    fn search(&self, term: &[u8]) -> std::result::Result<usize, usize> {
        self.terms.binary_search_by(|entry| entry.term.as_slice().cmp(term))
    }
}

impl TermsEnum for SegmentTermsEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        let len = self.terms.len() as i64;
        if self.pos >= len {
            return Ok(None);
        }
        self.pos += 1;
        if self.pos >= len {
            Ok(None)
        } else {
            Ok(Some(&self.terms[self.pos as usize].term))
        }
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        match self.search(term) {
            Ok(idx) => {
                self.pos = idx as i64;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        match self.search(term) {
            Ok(idx) => {
                self.pos = idx as i64;
                Ok(SeekStatus::Found)
            }
            Err(insertion) => {
                if insertion >= self.terms.len() {
                    self.pos = self.terms.len() as i64;
                    Ok(SeekStatus::End)
                } else {
                    self.pos = insertion as i64;
                    Ok(SeekStatus::NotFound)
                }
            }
        }
    }

    fn term(&self) -> Result<&[u8]> {
        Ok(&self.current()?.term)
    }

    fn ord(&self) -> Result<i64> {
        self.current()?;
        Ok(self.pos)
    }

    fn doc_freq(&self) -> Result<u32> {
        Ok(self.current()?.doc_freq)
    }

    fn total_term_freq(&self) -> Result<u64> {
        Ok(self.current()?.total_term_freq)
    }

    fn postings(
        &mut self,
        reuse: Option<Box<dyn PostingsIterator>>,
        requested_flags: u32,
    ) -> Result<Box<dyn PostingsIterator>> {
        let entry = self.current()?;
        let postings = Arc::clone(&entry.postings);

        if let Some(mut boxed) = reuse {
            if let Some(existing) = boxed
                .as_any_mut()
                .downcast_mut::<SegmentPostingsIterator>()
            {
                if existing.flags == requested_flags {
                    existing.reset(postings, self.options, self.has_payloads);
                    return Ok(boxed);
                }
            }
        }

        Ok(Box::new(SegmentPostingsIterator::new(
            postings,
            self.options,
            self.has_payloads,
            requested_flags,
        )))
    }
}

/// Postings iterator over one decoded posting list.
#[derive(Debug)]
pub struct SegmentPostingsIterator {
    postings: Arc<Vec<PostingData>>,
    options: IndexOptions,
    has_payloads: bool,
    flags: u32,
    /// -1 before the first doc, postings.len() when exhausted.
    idx: i64,
    /// Number of next_position calls made for the current doc.
    pos_upto: u32,
}

impl SegmentPostingsIterator {
    fn new(
        postings: Arc<Vec<PostingData>>,
        options: IndexOptions,
        has_payloads: bool,
        flags: u32,
    ) -> Self {
        SegmentPostingsIterator {
            postings,
            options,
            has_payloads,
            flags,
            idx: -1,
            pos_upto: 0,
        }
    }

    fn reset(&mut self, postings: Arc<Vec<PostingData>>, options: IndexOptions, has_payloads: bool) {
        self.postings = postings;
        self.options = options;
        self.has_payloads = has_payloads;
        self.idx = -1;
        self.pos_upto = 0;
    }

    fn current(&self) -> Result<&PostingData> {
        if self.idx < 0 || self.idx as usize >= self.postings.len() {
            return Err(PeltaError::illegal_state(
                "postings iterator is not positioned on a document",
            ));
        }
        Ok(&self.postings[self.idx as usize])
    }

    /// Positions are readable only when stored and requested.
    fn positions_available(&self) -> bool {
        self.options.has_positions() && flags::wants_positions(self.flags)
    }

    fn offsets_available(&self) -> bool {
        self.positions_available()
            && self.options.has_offsets()
            && self.flags & flags::OFFSETS != 0
    }

    fn payloads_available(&self) -> bool {
        self.positions_available() && self.has_payloads && self.flags & flags::PAYLOADS != 0
    }
}

impl DocIdSetIterator for SegmentPostingsIterator {
    fn doc_id(&self) -> DocId {
        if self.idx < 0 {
            -1
        } else if self.idx as usize >= self.postings.len() {
            NO_MORE_DOCS
        } else {
            self.postings[self.idx as usize].doc
        }
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.idx < self.postings.len() as i64 {
            self.idx += 1;
        }
        self.pos_upto = 0;
        Ok(self.doc_id())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let start = ((self.idx + 1).max(0) as usize).min(self.postings.len());
        let offset = self.postings[start..]
            .binary_search_by(|p| {
                if p.doc < target {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            })
            .unwrap_err();
        self.idx = (start + offset) as i64;
        self.pos_upto = 0;
        Ok(self.doc_id())
    }

    fn cost(&self) -> u64 {
        self.postings.len() as u64
    }
}

impl PostingsIterator for SegmentPostingsIterator {
    fn freq(&self) -> Result<u32> {
        let posting = self.current()?;
        if self.options.has_freqs() {
            Ok(posting.freq)
        } else {
            // Frequencies were never stored; a defined fallback, not an error.
            Ok(1)
        }
    }

    fn next_position(&mut self) -> Result<i32> {
        if !self.positions_available() {
            return Ok(-1);
        }
        let freq = {
            let posting = self.current()?;
            posting.freq
        };
        if self.pos_upto >= freq {
            return Err(positions_exhausted(freq));
        }
        let position = self.postings[self.idx as usize].positions[self.pos_upto as usize];
        self.pos_upto += 1;
        Ok(position)
    }

    fn start_offset(&self) -> Result<i32> {
        if !self.offsets_available() {
            return Ok(-1);
        }
        if self.pos_upto == 0 {
            return Err(position_not_read());
        }
        Ok(self.current()?.offsets[self.pos_upto as usize - 1].0)
    }

    fn end_offset(&self) -> Result<i32> {
        if !self.offsets_available() {
            return Ok(-1);
        }
        if self.pos_upto == 0 {
            return Err(position_not_read());
        }
        Ok(self.current()?.offsets[self.pos_upto as usize - 1].1)
    }

    fn payload(&self) -> Result<Option<&[u8]>> {
        if !self.payloads_available() {
            return Ok(None);
        }
        if self.pos_upto == 0 {
            return Err(position_not_read());
        }
        Ok(self
            .current()?
            .payloads
            .get(self.pos_upto as usize - 1)
            .and_then(|p| p.as_deref()))
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Decoded posting store of one segment. Implements [`FieldsProducer`].
#[derive(Debug, Default)]
pub struct PostingsReader {
    fields: HashMap<String, Arc<FieldTerms>>,
}

impl PostingsReader {
    /// An empty reader, for segments with no inverted fields.
    pub fn empty() -> Self {
        PostingsReader::default()
    }

    /// Open and decode `<segment>.pst`.
    pub fn open(storage: &Arc<dyn Storage>, segment_name: &str) -> Result<Self> {
        let file_name = format!("{segment_name}.{POSTINGS_EXTENSION}");
        if !storage.file_exists(&file_name) {
            return Ok(PostingsReader::empty());
        }

        let input = storage.open_input(&file_name)?;
        let mut reader = StructReader::new(input)?;

        if reader.read_u32()? != POSTINGS_MAGIC {
            return Err(PeltaError::index(format!("{file_name}: bad magic")));
        }
        let version = reader.read_u16()?;
        if version != POSTINGS_VERSION {
            return Err(PeltaError::index(format!(
                "{file_name}: unsupported version {version}"
            )));
        }

        let num_fields = reader.read_varint()? as usize;
        let mut fields = HashMap::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = reader.read_string()?;
            let options = index_options_from_code(reader.read_u8()?)?;
            let has_payloads = reader.read_u8()? != 0;
            let doc_count = reader.read_varint()? as u32;
            let sum_doc_freq = reader.read_varint()?;
            let sum_total_term_freq = reader.read_varint()?;
            let num_terms = reader.read_varint()? as usize;

            let mut terms = Vec::with_capacity(num_terms);
            for _ in 0..num_terms {
                let term = reader.read_bytes()?;
                let doc_freq = reader.read_varint()? as u32;
                let total_term_freq = reader.read_varint()?;

                let mut postings = Vec::with_capacity(doc_freq as usize);
                let mut prev_doc = 0i64;
                for _ in 0..doc_freq {
                    let doc = prev_doc + reader.read_varint()? as i64;
                    prev_doc = doc;

                    let freq = if options.has_freqs() {
                        reader.read_varint()? as u32
                    } else {
                        1
                    };

                    let mut positions = Vec::new();
                    let mut offsets = Vec::new();
                    let mut payloads = Vec::new();
                    if options.has_positions() {
                        positions.reserve(freq as usize);
                        let mut prev_pos = 0i64;
                        for _ in 0..freq {
                            let pos = prev_pos + reader.read_varint()? as i64;
                            prev_pos = pos;
                            positions.push(pos as i32);

                            if options.has_offsets() {
                                let start = reader.read_zigzag()?;
                                let len = reader.read_zigzag()?;
                                offsets.push((start as i32, (start + len) as i32));
                            }

                            if has_payloads {
                                if reader.read_u8()? != 0 {
                                    payloads.push(Some(reader.read_bytes()?));
                                } else {
                                    payloads.push(None);
                                }
                            }
                        }
                    }

                    postings.push(PostingData {
                        doc: doc as DocId,
                        freq,
                        positions,
                        offsets,
                        payloads,
                    });
                }

                terms.push(TermEntry {
                    term,
                    doc_freq,
                    total_term_freq,
                    postings: Arc::new(postings),
                });
            }

            fields.insert(
                name,
                Arc::new(FieldTerms {
                    options,
                    has_payloads,
                    doc_count,
                    sum_doc_freq,
                    sum_total_term_freq,
                    terms: Arc::new(terms),
                }),
            );
        }

        if !reader.verify_checksum()? {
            return Err(PeltaError::index(format!("{file_name}: checksum mismatch")));
        }

        Ok(PostingsReader { fields })
    }

    /// Typed access to one field's dictionary.
    pub fn field_terms(&self, field: &str) -> Option<&Arc<FieldTerms>> {
        self.fields.get(field)
    }
}

impl FieldsProducer for PostingsReader {
    fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        Ok(self
            .fields
            .get(field)
            .map(|ft| Arc::clone(ft) as Arc<dyn Terms>))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{tokens_from_terms, Token};
    use crate::postings::writer::PostingsWriter;
    use crate::storage::{IoContext, MemoryStorage, StorageConfig};

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    fn build_segment(storage: &Arc<dyn Storage>) -> PostingsReader {
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
                &tokens_from_terms(&["apple", "banana", "apple"]),
            )
            .unwrap();
        writer
            .add_token_stream(
                1,
                "body",
                IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
                &tokens_from_terms(&["banana", "cherry"]),
            )
            .unwrap();
        writer
            .add_token_stream(
                2,
                "body",
                IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
                &tokens_from_terms(&["apple"]),
            )
            .unwrap();
        writer.flush(storage, "seg_0", IoContext::Flush).unwrap();

        PostingsReader::open(storage, "seg_0").unwrap()
    }

    #[test]
    fn test_round_trip_stats() {
        let storage = storage();
        let reader = build_segment(&storage);

        let terms = reader.terms("body").unwrap().unwrap();
        assert_eq!(terms.size().unwrap(), 3);
        assert_eq!(terms.doc_count().unwrap(), 3);
        // apple(2 docs) + banana(2 docs) + cherry(1 doc)
        assert_eq!(terms.sum_doc_freq().unwrap(), 5);
        // apple appears 3 times, banana 2, cherry 1
        assert_eq!(terms.sum_total_term_freq().unwrap(), 6);
    }

    #[test]
    fn test_terms_iterate_in_order() {
        let storage = storage();
        let reader = build_segment(&storage);

        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();

        let mut seen = Vec::new();
        while let Some(term) = te.next().unwrap() {
            seen.push(term.to_vec());
        }
        assert_eq!(
            seen,
            vec![b"apple".to_vec(), b"banana".to_vec(), b"cherry".to_vec()]
        );
    }

    #[test]
    fn test_two_independent_iterators() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();

        let mut first = terms.iterator().unwrap();
        let mut second = terms.iterator().unwrap();

        first.next().unwrap();
        first.next().unwrap();

        // The second iterator is unaffected by the first
        assert_eq!(second.next().unwrap().unwrap(), b"apple");
    }

    #[test]
    fn test_seek_exact_and_ord() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();

        assert!(te.seek_exact(b"banana").unwrap());
        assert_eq!(te.term().unwrap(), b"banana");
        assert_eq!(te.ord().unwrap(), 1);
        assert_eq!(te.doc_freq().unwrap(), 2);
        assert_eq!(te.total_term_freq().unwrap(), 2);

        assert!(!te.seek_exact(b"durian").unwrap());
    }

    #[test]
    fn test_seek_ceil() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();

        assert_eq!(te.seek_ceil(b"banana").unwrap(), SeekStatus::Found);
        assert_eq!(te.seek_ceil(b"axe").unwrap(), SeekStatus::NotFound);
        assert_eq!(te.term().unwrap(), b"banana");
        assert_eq!(te.seek_ceil(b"zzz").unwrap(), SeekStatus::End);
    }

    #[test]
    fn test_postings_iteration_and_monotonicity() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"apple").unwrap();

        let mut it = te.postings(None, flags::FREQS).unwrap();
        assert_eq!(it.doc_id(), -1);
        assert_eq!(it.next_doc().unwrap(), 0);
        assert_eq!(it.freq().unwrap(), 2);
        assert_eq!(it.next_doc().unwrap(), 2);
        assert_eq!(it.freq().unwrap(), 1);
        assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
        assert_eq!(it.doc_id(), NO_MORE_DOCS);
    }

    #[test]
    fn test_advance() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"apple").unwrap();

        let mut it = te.postings(None, flags::NONE).unwrap();
        assert_eq!(it.advance(1).unwrap(), 2);
        assert_eq!(it.advance(3).unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_positions_offsets_payload_protocol() {
        let storage = storage();
        let mut writer = PostingsWriter::new();
        let tokens = vec![
            Token::new(b"x".to_vec())
                .with_offsets(0, 1)
                .with_payload(vec![7]),
            Token::new(b"x".to_vec()).with_offsets(2, 3),
        ];
        writer
            .add_token_stream(
                0,
                "body",
                IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
                &tokens,
            )
            .unwrap();
        writer.flush(&storage, "seg_p", IoContext::Flush).unwrap();
        let reader = PostingsReader::open(&storage, "seg_p").unwrap();

        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"x").unwrap();
        let mut it = te.postings(None, flags::ALL).unwrap();
        it.next_doc().unwrap();

        // Reading offsets before the first position is a protocol error
        assert!(matches!(
            it.start_offset(),
            Err(PeltaError::IllegalState(_))
        ));

        assert_eq!(it.next_position().unwrap(), 0);
        assert_eq!(it.start_offset().unwrap(), 0);
        assert_eq!(it.end_offset().unwrap(), 1);
        assert_eq!(it.payload().unwrap(), Some(&[7u8][..]));

        assert_eq!(it.next_position().unwrap(), 1);
        assert_eq!(it.start_offset().unwrap(), 2);
        assert_eq!(it.payload().unwrap(), None);

        // Stepping past freq is a protocol error
        assert!(matches!(
            it.next_position(),
            Err(PeltaError::IllegalState(_))
        ));
    }

    #[test]
    fn test_flag_tolerance_freq_only_field() {
        let storage = storage();
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(
                0,
                "foo",
                IndexOptions::DocsAndFreqs,
                &tokens_from_terms(&["a", "a", "b"]),
            )
            .unwrap();
        writer.flush(&storage, "seg_f", IoContext::Flush).unwrap();
        let reader = PostingsReader::open(&storage, "seg_f").unwrap();

        let terms = reader.terms("foo").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"a").unwrap();

        // Requesting positions on a freq-only field must not throw
        let mut it = te.postings(None, flags::POSITIONS).unwrap();
        assert_eq!(it.next_doc().unwrap(), 0);
        assert_eq!(it.freq().unwrap(), 2);
        assert_eq!(it.next_position().unwrap(), -1);
        assert_eq!(it.start_offset().unwrap(), -1);
        assert_eq!(it.payload().unwrap(), None);
        assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_docs_only_field_freq_fallback() {
        let storage = storage();
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(
                0,
                "tag",
                IndexOptions::Docs,
                &tokens_from_terms(&["t", "t", "t"]),
            )
            .unwrap();
        writer.flush(&storage, "seg_d", IoContext::Flush).unwrap();
        let reader = PostingsReader::open(&storage, "seg_d").unwrap();

        let terms = reader.terms("tag").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"t").unwrap();
        let mut it = te.postings(None, flags::FREQS).unwrap();
        it.next_doc().unwrap();
        assert_eq!(it.freq().unwrap(), 1);
    }

    #[test]
    fn test_reuse_same_flags() {
        let storage = storage();
        let reader = build_segment(&storage);
        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();

        te.seek_exact(b"apple").unwrap();
        let mut it = te.postings(None, flags::FREQS).unwrap();
        while it.next_doc().unwrap() != NO_MORE_DOCS {}

        // Hand the exhausted iterator back for the next term
        te.seek_exact(b"cherry").unwrap();
        let mut it = te.postings(Some(it), flags::FREQS).unwrap();
        assert_eq!(it.doc_id(), -1);
        assert_eq!(it.next_doc().unwrap(), 1);
    }

    #[test]
    fn test_missing_field_is_none() {
        let storage = storage();
        let reader = build_segment(&storage);
        assert!(reader.terms("missing").unwrap().is_none());
    }

    #[test]
    fn test_missing_file_is_empty_reader() {
        let storage = storage();
        let reader = PostingsReader::open(&storage, "no_such_segment").unwrap();
        assert!(reader.fields().is_empty());
        assert!(reader.terms("anything").unwrap().is_none());
    }
}
