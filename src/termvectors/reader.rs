//! Term vector reader.
//!
//! Opens the `.tvf` file and serves per-document mini term dictionaries.
//! Each field view is a real [`Terms`] instance with a doc count of 1, so
//! seeking, flag tolerance and the position protocol behave exactly like the
//! main posting store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::field::IndexOptions;
use crate::postings::reader::{FieldTerms, PostingData, TermEntry};
use crate::postings::terms::Terms;
use crate::postings::DocId;
use crate::storage::{Storage, StructReader};
use crate::termvectors::writer::{
    TERM_VECTORS_EXTENSION, TERM_VECTORS_MAGIC, TERM_VECTORS_VERSION,
};

/// The term dictionaries of one document, keyed by field name.
#[derive(Default)]
pub struct TermVectorFields {
    fields: BTreeMap<String, Arc<dyn Terms>>,
}

impl std::fmt::Debug for TermVectorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermVectorFields")
            .field("fields", &self.fields())
            .finish()
    }
}

impl TermVectorFields {
    /// Assemble a per-document view from already-built term dictionaries.
    pub fn new(fields: BTreeMap<String, Arc<dyn Terms>>) -> Self {
        TermVectorFields { fields }
    }

    /// Field names with term vectors for this document, sorted.
    pub fn fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// The mini term dictionary of one field.
    pub fn terms(&self, field: &str) -> Option<Arc<dyn Terms>> {
        self.fields.get(field).map(Arc::clone)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the document stored no term vectors.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Decoded term vector store of one segment.
#[derive(Debug, Default)]
pub struct TermVectorsReader {
    docs: HashMap<DocId, Arc<TermVectorFields>>,
}

impl TermVectorsReader {
    /// An empty reader, for segments without term vectors.
    pub fn empty() -> Self {
        TermVectorsReader::default()
    }

    /// Open and decode `<segment>.tvf`.
    pub fn open(storage: &Arc<dyn Storage>, segment_name: &str) -> Result<Self> {
        let file_name = format!("{segment_name}.{TERM_VECTORS_EXTENSION}");
        if !storage.file_exists(&file_name) {
            return Ok(TermVectorsReader::empty());
        }

        let input = storage.open_input(&file_name)?;
        let mut reader = StructReader::new(input)?;

        if reader.read_u32()? != TERM_VECTORS_MAGIC {
            return Err(PeltaError::index(format!("{file_name}: bad magic")));
        }
        let version = reader.read_u16()?;
        if version != TERM_VECTORS_VERSION {
            return Err(PeltaError::index(format!(
                "{file_name}: unsupported version {version}"
            )));
        }

        let num_docs = reader.read_varint()? as usize;
        let mut docs = HashMap::with_capacity(num_docs);

        let mut prev_doc = 0i64;
        for _ in 0..num_docs {
            let doc = prev_doc + reader.read_varint()? as i64;
            prev_doc = doc;
            let num_fields = reader.read_varint()? as usize;

            let mut fields = BTreeMap::new();
            for _ in 0..num_fields {
                let name = reader.read_string()?;
                let feature_bits = reader.read_u8()?;
                let with_positions = feature_bits != 0;
                let has_offsets = feature_bits & 2 != 0;
                let has_payload_flag = feature_bits & 4 != 0;
                let num_terms = reader.read_varint()? as usize;

                let mut entries = Vec::with_capacity(num_terms);
                let mut sum_ttf = 0u64;
                for _ in 0..num_terms {
                    let term = reader.read_bytes()?;
                    let freq = reader.read_varint()? as u32;
                    sum_ttf += freq as u64;

                    let mut positions = Vec::new();
                    let mut offsets = Vec::new();
                    let mut payloads = Vec::new();
                    if with_positions {
                        let mut prev_pos = 0i64;
                        for _ in 0..freq {
                            let pos = prev_pos + reader.read_varint()? as i64;
                            prev_pos = pos;
                            positions.push(pos as i32);

                            let start = reader.read_zigzag()?;
                            let len = reader.read_zigzag()?;
                            offsets.push((start as i32, (start + len) as i32));

                            if reader.read_u8()? != 0 {
                                payloads.push(Some(reader.read_bytes()?));
                            } else {
                                payloads.push(None);
                            }
                        }
                    }

                    entries.push(TermEntry {
                        term,
                        doc_freq: 1,
                        total_term_freq: freq as u64,
                        postings: Arc::new(vec![PostingData {
                            // The mini index addresses its one document as 0
                            doc: 0,
                            freq,
                            positions,
                            offsets,
                            payloads,
                        }]),
                    });
                }

                let options = if !with_positions {
                    IndexOptions::DocsAndFreqs
                } else if has_offsets {
                    IndexOptions::DocsAndFreqsAndPositionsAndOffsets
                } else {
                    IndexOptions::DocsAndFreqsAndPositions
                };

                let sum_doc_freq = entries.len() as u64;
                fields.insert(
                    name,
                    Arc::new(FieldTerms {
                        options,
                        has_payloads: has_payload_flag,
                        doc_count: 1,
                        sum_doc_freq,
                        sum_total_term_freq: sum_ttf,
                        terms: Arc::new(entries),
                    }) as Arc<dyn Terms>,
                );
            }

            docs.insert(doc as DocId, Arc::new(TermVectorFields { fields }));
        }

        if !reader.verify_checksum()? {
            return Err(PeltaError::index(format!("{file_name}: checksum mismatch")));
        }

        Ok(TermVectorsReader { docs })
    }

    /// All term vectors of one document, or `None` when it stored none.
    pub fn get(&self, doc: DocId) -> Option<Arc<TermVectorFields>> {
        self.docs.get(&doc).cloned()
    }

    /// One field's term vector of one document.
    pub fn get_field(&self, doc: DocId, field: &str) -> Option<Arc<dyn Terms>> {
        self.docs.get(&doc).and_then(|fields| fields.terms(field))
    }

    /// Documents with term vectors, in increasing order.
    pub fn doc_ids(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.docs.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Number of documents with term vectors.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// True when no documents stored term vectors.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tokens_from_terms;
    use crate::field::TermVectorOptions;
    use crate::postings::terms::TermsEnum;
    use crate::postings::{flags, DocIdSetIterator, PostingsIterator, NO_MORE_DOCS};
    use crate::storage::{IoContext, MemoryStorage, StorageConfig};
    use crate::termvectors::TermVectorsWriter;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    fn build(storage: &Arc<dyn Storage>) -> TermVectorsReader {
        let mut writer = TermVectorsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                TermVectorOptions::full(),
                &tokens_from_terms(&["cherry", "apple", "cherry"]),
            )
            .unwrap();
        writer
            .add_token_stream(
                0,
                "title",
                TermVectorOptions::basic(),
                &tokens_from_terms(&["apple"]),
            )
            .unwrap();
        writer
            .add_token_stream(
                2,
                "body",
                TermVectorOptions::full(),
                &tokens_from_terms(&["banana"]),
            )
            .unwrap();
        writer.flush(storage, "seg_tv", IoContext::Flush).unwrap();

        TermVectorsReader::open(storage, "seg_tv").unwrap()
    }

    #[test]
    fn test_random_access_by_doc() {
        let storage = storage();
        let reader = build(&storage);

        assert!(reader.get(0).is_some());
        assert!(reader.get(1).is_none());
        assert!(reader.get(2).is_some());
        assert_eq!(reader.doc_ids(), vec![0, 2]);
    }

    #[test]
    fn test_doc_fields_sorted() {
        let storage = storage();
        let reader = build(&storage);

        let fields = reader.get(0).unwrap();
        assert_eq!(fields.fields(), vec!["body".to_string(), "title".to_string()]);
    }

    #[test]
    fn test_mini_dictionary_behaves_like_postings() {
        let storage = storage();
        let reader = build(&storage);

        let terms = reader.get_field(0, "body").unwrap();
        assert_eq!(terms.size().unwrap(), 2);
        assert_eq!(terms.doc_count().unwrap(), 1);

        let mut te = terms.iterator().unwrap();
        assert!(te.seek_exact(b"cherry").unwrap());
        assert_eq!(te.doc_freq().unwrap(), 1);
        assert_eq!(te.total_term_freq().unwrap(), 2);

        let mut it = te.postings(None, flags::ALL).unwrap();
        assert_eq!(it.next_doc().unwrap(), 0);
        assert_eq!(it.freq().unwrap(), 2);
        assert_eq!(it.next_position().unwrap(), 0);
        assert_eq!(it.next_position().unwrap(), 2);
        assert!(matches!(
            it.next_position(),
            Err(PeltaError::IllegalState(_))
        ));
        assert_eq!(it.next_doc().unwrap(), NO_MORE_DOCS);
    }

    #[test]
    fn test_basic_options_tolerate_position_requests() {
        let storage = storage();
        let reader = build(&storage);

        // "title" stored terms and freqs only
        let terms = reader.get_field(0, "title").unwrap();
        assert!(!terms.has_positions());

        let mut te = terms.iterator().unwrap();
        te.seek_exact(b"apple").unwrap();
        let mut it = te.postings(None, flags::POSITIONS).unwrap();
        it.next_doc().unwrap();
        assert_eq!(it.next_position().unwrap(), -1);
        assert_eq!(it.start_offset().unwrap(), -1);
        assert_eq!(it.payload().unwrap(), None);
    }

    #[test]
    fn test_missing_field_is_none() {
        let storage = storage();
        let reader = build(&storage);
        assert!(reader.get_field(0, "missing").is_none());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let storage = storage();
        let reader = TermVectorsReader::open(&storage, "nope").unwrap();
        assert!(reader.is_empty());
        assert!(reader.get(0).is_none());
    }
}
