//! Codec selection.
//!
//! A segment's metadata carries the name of the codec that wrote its files;
//! at open time the name is resolved through [`codec_for_name`] and the
//! codec's per-component open methods produce the reader contracts. The
//! merge coordinator only ever consumes those contracts, so segments written
//! by different codecs merge together as long as each satisfies them.

use std::sync::Arc;

use crate::docvalues::{DocValuesProducer, DocValuesReader};
use crate::error::{PeltaError, Result};
use crate::postings::terms::FieldsProducer;
use crate::postings::{DocId, PostingsReader};
use crate::storage::Storage;
use crate::termvectors::{TermVectorFields, TermVectorsReader};
use crate::vector::{FieldVectors, TopDocs, VectorScorer, VectorsReader};

/// Name of the default codec.
pub const DEFAULT_CODEC: &str = "pelta90";

/// Per-document term vector access, the reader contract of that component.
pub trait TermVectorsFormat: Send + Sync {
    /// All term vectors of one document, or `None` when it stored none.
    fn get(&self, doc: DocId) -> Result<Option<Arc<TermVectorFields>>>;

    /// Documents with term vectors, in increasing order.
    fn doc_ids(&self) -> Vec<DocId>;
}

/// Dense vector access and search, the reader contract of that component.
pub trait VectorsFormat: Send + Sync {
    /// Names of fields with vectors, sorted.
    fn field_names(&self) -> Vec<String>;

    /// The vector data of one field.
    fn vectors(&self, field: &str) -> Option<Arc<FieldVectors>>;

    /// A fresh scorer over f32 vectors, `None` when the store is empty.
    fn scorer(&self, field: &str, query: &[f32]) -> Result<Option<VectorScorer>>;

    /// Budgeted approximate top-k search over f32 vectors.
    fn search_nearest(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs>;

    /// Budgeted approximate top-k search over byte vectors.
    fn search_nearest_bytes(
        &self,
        field: &str,
        query: &[u8],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs>;
}

impl TermVectorsFormat for TermVectorsReader {
    fn get(&self, doc: DocId) -> Result<Option<Arc<TermVectorFields>>> {
        Ok(TermVectorsReader::get(self, doc))
    }

    fn doc_ids(&self) -> Vec<DocId> {
        TermVectorsReader::doc_ids(self)
    }
}

impl VectorsFormat for VectorsReader {
    fn field_names(&self) -> Vec<String> {
        VectorsReader::field_names(self)
    }

    fn vectors(&self, field: &str) -> Option<Arc<FieldVectors>> {
        VectorsReader::vectors(self, field)
    }

    fn scorer(&self, field: &str, query: &[f32]) -> Result<Option<VectorScorer>> {
        VectorsReader::scorer(self, field, query)
    }

    fn search_nearest(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs> {
        VectorsReader::search_nearest(self, field, query, k, accept_docs, visited_limit)
    }

    fn search_nearest_bytes(
        &self,
        field: &str,
        query: &[u8],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs> {
        VectorsReader::search_nearest_bytes(self, field, query, k, accept_docs, visited_limit)
    }
}

/// A pluggable on-disk format: one open method per component.
pub trait Codec: Send + Sync + std::fmt::Debug {
    /// The codec's stable name, stored in each segment's manifest.
    fn name(&self) -> &'static str;

    /// Open the posting store of a segment.
    fn open_postings(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn FieldsProducer>>;

    /// Open the doc-values store of a segment.
    fn open_doc_values(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn DocValuesProducer>>;

    /// Open the term vector store of a segment.
    fn open_term_vectors(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn TermVectorsFormat>>;

    /// Open the vector store of a segment.
    fn open_vectors(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn VectorsFormat>>;
}

/// The default codec.
#[derive(Debug, Default)]
pub struct Pelta90Codec;

impl Codec for Pelta90Codec {
    fn name(&self) -> &'static str {
        DEFAULT_CODEC
    }

    fn open_postings(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn FieldsProducer>> {
        Ok(Arc::new(PostingsReader::open(storage, segment_name)?))
    }

    fn open_doc_values(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn DocValuesProducer>> {
        Ok(Arc::new(DocValuesReader::open(storage, segment_name)?))
    }

    fn open_term_vectors(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn TermVectorsFormat>> {
        Ok(Arc::new(TermVectorsReader::open(storage, segment_name)?))
    }

    fn open_vectors(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
    ) -> Result<Arc<dyn VectorsFormat>> {
        Ok(Arc::new(VectorsReader::open(storage, segment_name)?))
    }
}

/// Resolve a codec by its manifest name at segment-open time.
pub fn codec_for_name(name: &str) -> Result<Arc<dyn Codec>> {
    match name {
        DEFAULT_CODEC => Ok(Arc::new(Pelta90Codec)),
        other => Err(PeltaError::index(format!(
            "unknown codec \"{other}\"; this build supports: {DEFAULT_CODEC}"
        ))),
    }
}
