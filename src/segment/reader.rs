//! Segment reader: a point-in-time snapshot of one sealed segment.
//!
//! Opening a segment resolves its codec from the manifest, opens every
//! component reader, and pins the liveness generation recorded in the
//! metadata. The snapshot never changes afterwards: deletions made later
//! land in a new generation that only newly opened readers observe.
//! A reader is shareable across threads; iterators and scorers obtained
//! from it are per-caller.

use std::sync::Arc;

use crate::docvalues::DocValuesProducer;
use crate::error::Result;
use crate::field::FieldInfos;
use crate::postings::terms::{FieldsProducer, Terms};
use crate::postings::DocId;
use crate::segment::codec::{codec_for_name, TermVectorsFormat, VectorsFormat};
use crate::segment::SegmentMeta;
use crate::storage::Storage;
use crate::termvectors::TermVectorFields;
use crate::util::bitset::LiveDocs;
use crate::vector::TopDocs;

/// An immutable view over one segment's stores.
pub struct SegmentReader {
    meta: SegmentMeta,
    live_docs: Option<LiveDocs>,
    postings: Arc<dyn FieldsProducer>,
    doc_values: Arc<dyn DocValuesProducer>,
    term_vectors: Arc<dyn TermVectorsFormat>,
    vectors: Arc<dyn VectorsFormat>,
}

impl std::fmt::Debug for SegmentReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentReader")
            .field("name", &self.meta.name)
            .field("max_doc", &self.meta.max_doc)
            .field("num_docs", &self.num_docs())
            .finish()
    }
}

impl SegmentReader {
    /// Open the segment described by `meta`.
    pub fn open(storage: &Arc<dyn Storage>, meta: SegmentMeta) -> Result<Arc<SegmentReader>> {
        let codec = codec_for_name(&meta.codec)?;

        let live_docs = match meta.current_live_docs_file() {
            Some(file) => Some(LiveDocs::load(storage, &file)?),
            None => None,
        };

        Ok(Arc::new(SegmentReader {
            postings: codec.open_postings(storage, &meta.name)?,
            doc_values: codec.open_doc_values(storage, &meta.name)?,
            term_vectors: codec.open_term_vectors(storage, &meta.name)?,
            vectors: codec.open_vectors(storage, &meta.name)?,
            live_docs,
            meta,
        }))
    }

    /// Open a segment by name, loading its metadata first.
    pub fn open_by_name(
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<SegmentReader>> {
        let meta = SegmentMeta::load(storage, segment_name)?;
        Self::open(storage, meta)
    }

    /// The segment's metadata.
    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    /// Number of documents, live or deleted.
    pub fn max_doc(&self) -> u32 {
        self.meta.max_doc
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u32 {
        match &self.live_docs {
            Some(live) => live.live_count(),
            None => self.meta.max_doc,
        }
    }

    /// The liveness bitset, or `None` when every document is live.
    pub fn live_docs(&self) -> Option<&LiveDocs> {
        self.live_docs.as_ref()
    }

    /// Whether `doc` is live in this snapshot.
    pub fn is_live(&self, doc: DocId) -> bool {
        if doc < 0 || doc as u32 >= self.meta.max_doc {
            return false;
        }
        match &self.live_docs {
            Some(live) => live.is_live(doc as u32),
            None => true,
        }
    }

    /// The sealed field descriptors.
    pub fn field_infos(&self) -> &FieldInfos {
        &self.meta.field_infos
    }

    /// The posting store.
    pub fn postings(&self) -> &Arc<dyn FieldsProducer> {
        &self.postings
    }

    /// The term dictionary of `field`, or `None` for ghost/unknown fields.
    pub fn terms(&self, field: &str) -> Result<Option<Arc<dyn Terms>>> {
        self.postings.terms(field)
    }

    /// The doc-values store.
    pub fn doc_values(&self) -> &Arc<dyn DocValuesProducer> {
        &self.doc_values
    }

    /// The term vector store.
    pub fn term_vectors(&self) -> &Arc<dyn TermVectorsFormat> {
        &self.term_vectors
    }

    /// All term vectors of one document.
    pub fn term_vector(&self, doc: DocId) -> Result<Option<Arc<TermVectorFields>>> {
        self.term_vectors.get(doc)
    }

    /// The vector store.
    pub fn vectors(&self) -> &Arc<dyn VectorsFormat> {
        &self.vectors
    }

    /// Budgeted nearest-neighbor search over `field`, filtered to this
    /// snapshot's live documents.
    pub fn search_nearest(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        visited_limit: usize,
    ) -> Result<TopDocs> {
        let accept = |doc: DocId| self.is_live(doc);
        self.vectors
            .search_nearest(field, query, k, Some(&accept), visited_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docvalues::{DocValuesProducer, NumericDocValues};
    use crate::document::{tokens_from_terms, Document};
    use crate::field::{IndexOptions, TermVectorOptions};
    use crate::postings::terms::TermsEnum;
    use crate::postings::DocIdSetIterator;
    use crate::segment::writer::SegmentWriter;
    use crate::storage::{IoContext, MemoryStorage, StorageConfig};
    use crate::vector::hnsw::HnswConfig;
    use crate::vector::VectorSimilarity;

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    fn flush_segment(storage: &Arc<dyn Storage>) -> SegmentMeta {
        let mut writer = SegmentWriter::new(storage.clone(), "seg_0", HnswConfig::default());
        for i in 0..4 {
            let mut doc = Document::new();
            doc.add_tokens(
                "body",
                tokens_from_terms(&["common", &format!("term{i}")]),
                IndexOptions::DocsAndFreqs,
                TermVectorOptions::default(),
            )
            .unwrap();
            doc.add_numeric("id", i as i64).unwrap();
            doc.add_float_vector("emb", vec![i as f32, 1.0], VectorSimilarity::Euclidean)
                .unwrap();
            writer.add_document(&doc).unwrap();
        }
        writer.flush(IoContext::Flush).unwrap()
    }

    #[test]
    fn test_open_and_read() {
        let storage = storage();
        let meta = flush_segment(&storage);
        let reader = SegmentReader::open(&storage, meta).unwrap();

        assert_eq!(reader.max_doc(), 4);
        assert_eq!(reader.num_docs(), 4);
        assert!(reader.live_docs().is_none());

        let terms = reader.terms("body").unwrap().unwrap();
        let mut te = terms.iterator().unwrap();
        assert!(te.seek_exact(b"common").unwrap());
        assert_eq!(te.doc_freq().unwrap(), 4);

        let mut dv = reader.doc_values().numeric("id").unwrap().unwrap();
        assert_eq!(dv.next_doc().unwrap(), 0);
        assert_eq!(dv.long_value().unwrap(), 0);
    }

    #[test]
    fn test_liveness_snapshot_pinning() {
        let storage = storage();
        let mut meta = flush_segment(&storage);

        // First generation: doc 1 deleted
        let live = LiveDocs::all_live(4).with_deleted(1).unwrap();
        live.write(&storage, &SegmentMeta::live_docs_file_name("seg_0", 1))
            .unwrap();
        meta.del_gen = 1;
        meta.write(&storage).unwrap();

        let old_reader = SegmentReader::open_by_name(&storage, "seg_0").unwrap();
        assert_eq!(old_reader.num_docs(), 3);
        assert!(!old_reader.is_live(1));

        // Second generation: doc 2 deleted as well; the open reader
        // keeps observing generation 1
        let live2 = live.with_deleted(2).unwrap();
        live2
            .write(&storage, &SegmentMeta::live_docs_file_name("seg_0", 2))
            .unwrap();
        let mut meta2 = SegmentMeta::load(&storage, "seg_0").unwrap();
        meta2.del_gen = 2;
        meta2.write(&storage).unwrap();

        assert!(old_reader.is_live(2));

        let new_reader = SegmentReader::open_by_name(&storage, "seg_0").unwrap();
        assert!(!new_reader.is_live(2));
        assert_eq!(new_reader.num_docs(), 2);
    }

    #[test]
    fn test_search_nearest_filters_deleted() {
        let storage = storage();
        let mut meta = flush_segment(&storage);

        let live = LiveDocs::all_live(4).with_deleted(0).unwrap();
        live.write(&storage, &SegmentMeta::live_docs_file_name("seg_0", 1))
            .unwrap();
        meta.del_gen = 1;
        meta.write(&storage).unwrap();

        let reader = SegmentReader::open_by_name(&storage, "seg_0").unwrap();
        let top = reader
            .search_nearest("emb", &[0.0, 1.0], 4, usize::MAX)
            .unwrap();

        assert!(!top.score_docs.is_empty());
        assert!(top.score_docs.iter().all(|sd| sd.doc != 0));
    }

    #[test]
    fn test_unknown_field_is_none() {
        let storage = storage();
        let meta = flush_segment(&storage);
        let reader = SegmentReader::open(&storage, meta).unwrap();

        assert!(reader.terms("ghost").unwrap().is_none());
        assert!(reader.doc_values().numeric("ghost").unwrap().is_none());
        assert!(reader.term_vector(0).unwrap().is_none());
    }
}
