//! Vector store reader.
//!
//! Opens the flat `.vec` file and the `.hnsw` graph file of a segment and
//! serves vector values by ordinal, document-indexed iteration, per-query
//! scorers, and budgeted approximate nearest-neighbor search.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::field::VectorShape;
use crate::postings::{DocId, DocIdSetIterator, NO_MORE_DOCS};
use crate::storage::{Storage, StructReader};
use crate::vector::hnsw::HnswGraph;
use crate::vector::writer::{
    similarity_from_code, GRAPH_MAGIC, VECTORS_EXTENSION, VECTORS_MAGIC, VECTORS_VERSION,
    VECTOR_GRAPH_EXTENSION,
};
use crate::vector::{
    ScoreDoc, TopDocs, TotalHits, TotalHitsRelation, VectorEncoding,
};

/// The decoded vectors of one field: ordinal-indexed values plus the ANN
/// graph built at flush time.
#[derive(Debug)]
pub struct FieldVectors {
    shape: VectorShape,
    /// ordinal -> document id, in increasing doc order.
    docs: Arc<Vec<DocId>>,
    floats: Arc<Vec<f32>>,
    bytes: Arc<Vec<u8>>,
    graph: Option<Arc<HnswGraph>>,
}

impl FieldVectors {
    /// Assemble a field's vector data from raw parts. The flat values must
    /// be `docs.len() * shape.dimension` elements in ordinal order.
    pub fn from_parts(
        shape: VectorShape,
        docs: Vec<DocId>,
        floats: Vec<f32>,
        bytes: Vec<u8>,
        graph: Option<HnswGraph>,
    ) -> Self {
        FieldVectors {
            shape,
            docs: Arc::new(docs),
            floats: Arc::new(floats),
            bytes: Arc::new(bytes),
            graph: graph.map(Arc::new),
        }
    }

    /// The field's vector shape.
    pub fn shape(&self) -> VectorShape {
        self.shape
    }

    /// Number of vectors stored.
    pub fn size(&self) -> usize {
        self.docs.len()
    }

    /// The field's dimension.
    pub fn dimension(&self) -> usize {
        self.shape.dimension
    }

    /// The document owning `ordinal`.
    pub fn doc_for_ordinal(&self, ordinal: usize) -> Result<DocId> {
        self.docs
            .get(ordinal)
            .copied()
            .ok_or_else(|| ordinal_out_of_range(ordinal, self.docs.len()))
    }

    /// The f32 vector at `ordinal`.
    pub fn vector_value(&self, ordinal: usize) -> Result<&[f32]> {
        if self.shape.encoding != VectorEncoding::Float32 {
            return Err(PeltaError::invalid_operation(
                "field stores byte vectors, not float32",
            ));
        }
        if ordinal >= self.docs.len() {
            return Err(ordinal_out_of_range(ordinal, self.docs.len()));
        }
        let dim = self.shape.dimension;
        Ok(&self.floats[ordinal * dim..(ordinal + 1) * dim])
    }

    /// The byte vector at `ordinal`.
    pub fn byte_vector_value(&self, ordinal: usize) -> Result<&[u8]> {
        if self.shape.encoding != VectorEncoding::Byte {
            return Err(PeltaError::invalid_operation(
                "field stores float32 vectors, not bytes",
            ));
        }
        if ordinal >= self.docs.len() {
            return Err(ordinal_out_of_range(ordinal, self.docs.len()));
        }
        let dim = self.shape.dimension;
        Ok(&self.bytes[ordinal * dim..(ordinal + 1) * dim])
    }

    /// A fresh iterator over (document, ordinal) pairs.
    pub fn iterator(&self) -> DocIndexIterator {
        DocIndexIterator {
            docs: Arc::clone(&self.docs),
            idx: -1,
        }
    }

    fn score_ordinal_f32(&self, query: &[f32], ord: u32) -> Result<f32> {
        self.shape
            .similarity
            .score_f32(query, self.vector_value(ord as usize)?)
    }

    fn score_ordinal_u8(&self, query: &[u8], ord: u32) -> Result<f32> {
        self.shape
            .similarity
            .score_u8(query, self.byte_vector_value(ord as usize)?)
    }
}

fn ordinal_out_of_range(ordinal: usize, size: usize) -> PeltaError {
    PeltaError::invalid_operation(format!(
        "vector ordinal {ordinal} out of range for store of {size} vectors"
    ))
}

/// Monotonic iterator over the documents of a vector field, exposing the
/// storage ordinal of the current document.
#[derive(Debug)]
pub struct DocIndexIterator {
    docs: Arc<Vec<DocId>>,
    /// -1 before the first doc, docs.len() when exhausted.
    idx: i64,
}

impl DocIndexIterator {
    /// The ordinal of the current document.
    pub fn index(&self) -> Result<usize> {
        if self.idx < 0 || self.idx as usize >= self.docs.len() {
            return Err(PeltaError::illegal_state(
                "vector iterator is not positioned on a document",
            ));
        }
        Ok(self.idx as usize)
    }
}

impl DocIdSetIterator for DocIndexIterator {
    fn doc_id(&self) -> DocId {
        if self.idx < 0 {
            -1
        } else if self.idx as usize >= self.docs.len() {
            NO_MORE_DOCS
        } else {
            self.docs[self.idx as usize]
        }
    }

    fn next_doc(&mut self) -> Result<DocId> {
        if self.idx < self.docs.len() as i64 {
            self.idx += 1;
        }
        Ok(self.doc_id())
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        let start = ((self.idx + 1).max(0) as usize).min(self.docs.len());
        let offset = self.docs[start..]
            .binary_search_by(|doc| {
                if *doc < target {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            })
            .unwrap_err();
        self.idx = (start + offset) as i64;
        Ok(self.doc_id())
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

#[derive(Debug)]
enum QueryVector {
    F32(Vec<f32>),
    U8(Vec<u8>),
}

/// A per-query scorer over one field's vectors: a document iterator plus
/// `score()` for the current document.
///
/// Each call to [`VectorsReader::scorer`] yields an independent instance;
/// iterating one never affects another.
#[derive(Debug)]
pub struct VectorScorer {
    field: Arc<FieldVectors>,
    query: QueryVector,
    iter: DocIndexIterator,
}

impl VectorScorer {
    /// The similarity of the query to the current document's vector.
    pub fn score(&self) -> Result<f32> {
        let ord = self.iter.index()? as u32;
        match &self.query {
            QueryVector::F32(q) => self.field.score_ordinal_f32(q, ord),
            QueryVector::U8(q) => self.field.score_ordinal_u8(q, ord),
        }
    }
}

impl DocIdSetIterator for VectorScorer {
    fn doc_id(&self) -> DocId {
        self.iter.doc_id()
    }

    fn next_doc(&mut self) -> Result<DocId> {
        self.iter.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Result<DocId> {
        self.iter.advance(target)
    }

    fn cost(&self) -> u64 {
        self.iter.cost()
    }
}

/// Decoded vector store of one segment.
#[derive(Debug, Default)]
pub struct VectorsReader {
    fields: HashMap<String, Arc<FieldVectors>>,
}

impl VectorsReader {
    /// An empty reader, for segments without vectors.
    pub fn empty() -> Self {
        VectorsReader::default()
    }

    /// Open and decode `<segment>.vec` plus its `.hnsw` graph file.
    pub fn open(storage: &Arc<dyn Storage>, segment_name: &str) -> Result<Self> {
        let vec_name = format!("{segment_name}.{VECTORS_EXTENSION}");
        if !storage.file_exists(&vec_name) {
            return Ok(VectorsReader::empty());
        }

        let input = storage.open_input(&vec_name)?;
        let mut reader = StructReader::new(input)?;

        if reader.read_u32()? != VECTORS_MAGIC {
            return Err(PeltaError::index(format!("{vec_name}: bad magic")));
        }
        let version = reader.read_u16()?;
        if version != VECTORS_VERSION {
            return Err(PeltaError::index(format!(
                "{vec_name}: unsupported version {version}"
            )));
        }

        let num_fields = reader.read_varint()? as usize;
        let mut fields: HashMap<String, FieldVectors> = HashMap::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = reader.read_string()?;
            let dimension = reader.read_varint()? as usize;
            let encoding = match reader.read_u8()? {
                0 => VectorEncoding::Byte,
                1 => VectorEncoding::Float32,
                other => {
                    return Err(PeltaError::index(format!(
                        "{vec_name}: unknown encoding code {other}"
                    )));
                }
            };
            let similarity = similarity_from_code(reader.read_u8()?)?;
            let count = reader.read_varint()? as usize;

            let mut docs = Vec::with_capacity(count);
            let mut prev_doc = 0i64;
            for _ in 0..count {
                let doc = prev_doc + reader.read_varint()? as i64;
                prev_doc = doc;
                docs.push(doc as DocId);
            }

            let mut floats = Vec::new();
            let mut bytes = Vec::new();
            match encoding {
                VectorEncoding::Float32 => {
                    floats.reserve(count * dimension);
                    for _ in 0..count * dimension {
                        floats.push(reader.read_f32()?);
                    }
                }
                VectorEncoding::Byte => {
                    bytes = reader.read_raw(count * dimension)?;
                }
            }

            fields.insert(
                name,
                FieldVectors {
                    shape: VectorShape {
                        dimension,
                        encoding,
                        similarity,
                    },
                    docs: Arc::new(docs),
                    floats: Arc::new(floats),
                    bytes: Arc::new(bytes),
                    graph: None,
                },
            );
        }

        if !reader.verify_checksum()? {
            return Err(PeltaError::index(format!("{vec_name}: checksum mismatch")));
        }

        // Attach the ANN graphs when the graph file is present
        let graph_name = format!("{segment_name}.{VECTOR_GRAPH_EXTENSION}");
        if storage.file_exists(&graph_name) {
            let input = storage.open_input(&graph_name)?;
            let mut reader = StructReader::new(input)?;
            if reader.read_u32()? != GRAPH_MAGIC {
                return Err(PeltaError::index(format!("{graph_name}: bad magic")));
            }
            let _version = reader.read_u16()?;
            let num_graphs = reader.read_varint()? as usize;
            for _ in 0..num_graphs {
                let name = reader.read_string()?;
                let encoded = reader.read_bytes()?;
                let (graph, _): (HnswGraph, _) =
                    bincode::serde::decode_from_slice(&encoded, bincode::config::standard())
                        .map_err(|e| {
                            PeltaError::index(format!(
                                "{graph_name}: failed to decode vector graph: {e}"
                            ))
                        })?;

                if let Some(field) = fields.get_mut(&name) {
                    field.graph = Some(Arc::new(graph));
                }
            }
            if !reader.verify_checksum()? {
                return Err(PeltaError::index(format!(
                    "{graph_name}: checksum mismatch"
                )));
            }
        }

        Ok(VectorsReader {
            fields: fields
                .into_iter()
                .map(|(name, field)| (name, Arc::new(field)))
                .collect(),
        })
    }

    /// Names of fields with vectors, sorted.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    /// The vector data of one field.
    pub fn vectors(&self, field: &str) -> Option<Arc<FieldVectors>> {
        self.fields.get(field).cloned()
    }

    /// A fresh scorer of `query` against `field`'s f32 vectors, or `None`
    /// when the store is empty for this segment.
    pub fn scorer(&self, field: &str, query: &[f32]) -> Result<Option<VectorScorer>> {
        let Some(vectors) = self.fields.get(field) else {
            return Ok(None);
        };
        if vectors.size() == 0 {
            return Ok(None);
        }
        if vectors.shape.encoding != VectorEncoding::Float32 {
            return Err(PeltaError::invalid_operation(
                "field stores byte vectors; use scorer_bytes",
            ));
        }
        check_query_dimension(field, query.len(), vectors.dimension())?;

        Ok(Some(VectorScorer {
            field: Arc::clone(vectors),
            query: QueryVector::F32(query.to_vec()),
            iter: vectors.iterator(),
        }))
    }

    /// Byte-vector counterpart of [`VectorsReader::scorer`].
    pub fn scorer_bytes(&self, field: &str, query: &[u8]) -> Result<Option<VectorScorer>> {
        let Some(vectors) = self.fields.get(field) else {
            return Ok(None);
        };
        if vectors.size() == 0 {
            return Ok(None);
        }
        if vectors.shape.encoding != VectorEncoding::Byte {
            return Err(PeltaError::invalid_operation(
                "field stores float32 vectors; use scorer",
            ));
        }
        check_query_dimension(field, query.len(), vectors.dimension())?;

        Ok(Some(VectorScorer {
            field: Arc::clone(vectors),
            query: QueryVector::U8(query.to_vec()),
            iter: vectors.iterator(),
        }))
    }

    /// Approximate top-`k` search over `field`'s f32 vectors.
    ///
    /// `accept_docs` filters results by document (liveness); `visited_limit`
    /// bounds the work. Hitting the budget yields a lower-bound
    /// ([`TotalHitsRelation::GreaterThanOrEqualTo`]) result; when fewer than
    /// `k` accepted vectors exist, the result is exact and exactly sized.
    pub fn search_nearest(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs> {
        let Some(vectors) = self.fields.get(field) else {
            return Ok(TopDocs::empty());
        };
        if vectors.shape.encoding != VectorEncoding::Float32 {
            return Err(PeltaError::invalid_operation(
                "field stores byte vectors; use search_nearest_bytes",
            ));
        }
        check_query_dimension(field, query.len(), vectors.dimension())?;

        let score = |ord: u32| -> Result<f32> { vectors.score_ordinal_f32(query, ord) };
        search_impl(vectors, score, k, accept_docs, visited_limit)
    }

    /// Byte-vector counterpart of [`VectorsReader::search_nearest`].
    pub fn search_nearest_bytes(
        &self,
        field: &str,
        query: &[u8],
        k: usize,
        accept_docs: Option<&dyn Fn(DocId) -> bool>,
        visited_limit: usize,
    ) -> Result<TopDocs> {
        let Some(vectors) = self.fields.get(field) else {
            return Ok(TopDocs::empty());
        };
        if vectors.shape.encoding != VectorEncoding::Byte {
            return Err(PeltaError::invalid_operation(
                "field stores float32 vectors; use search_nearest",
            ));
        }
        check_query_dimension(field, query.len(), vectors.dimension())?;

        let score = |ord: u32| -> Result<f32> { vectors.score_ordinal_u8(query, ord) };
        search_impl(vectors, score, k, accept_docs, visited_limit)
    }
}

fn search_impl(
    vectors: &Arc<FieldVectors>,
    score: impl Fn(u32) -> Result<f32>,
    k: usize,
    accept_docs: Option<&dyn Fn(DocId) -> bool>,
    visited_limit: usize,
) -> Result<TopDocs> {
    if k == 0 || vectors.size() == 0 {
        return Ok(TopDocs::empty());
    }

        let docs = Arc::clone(&vectors.docs);
        let accept_ord = |ord: u32| {
            accept_docs
                .map(|accept| accept(docs[ord as usize]))
                .unwrap_or(true)
        };

        let live_ords: Vec<u32> = (0..vectors.size() as u32).filter(|&o| accept_ord(o)).collect();
        if live_ords.is_empty() {
            return Ok(TopDocs::empty());
        }

        // Full coverage: brute force is exact and exactly sized
        if live_ords.len() <= k {
            let mut hits = Vec::with_capacity(live_ords.len());
            for &ord in &live_ords {
                hits.push(ScoreDoc {
                    doc: docs[ord as usize],
                    score: score(ord)?,
                });
            }
            hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            return Ok(TopDocs {
                total_hits: TotalHits {
                    value: live_ords.len() as u64,
                    relation: TotalHitsRelation::EqualTo,
                },
                score_docs: hits,
            });
        }

        match &vectors.graph {
            Some(graph) => {
                let result = graph.search(
                    score,
                    k,
                    k.max(50),
                    Some(&accept_ord),
                    visited_limit,
                )?;
                let score_docs = result
                    .neighbors
                    .into_iter()
                    .map(|(ord, s)| ScoreDoc {
                        doc: docs[ord as usize],
                        score: s,
                    })
                    .collect();
                Ok(TopDocs {
                    total_hits: TotalHits {
                        value: result.visited as u64,
                        relation: if result.incomplete {
                            TotalHitsRelation::GreaterThanOrEqualTo
                        } else {
                            TotalHitsRelation::EqualTo
                        },
                    },
                    score_docs,
                })
            }
            None => {
                // No graph (foreign codec): scan within the same budget
                let truncated = live_ords.len() > visited_limit;
                let mut hits = Vec::new();
                for &ord in live_ords.iter().take(visited_limit) {
                    hits.push(ScoreDoc {
                        doc: docs[ord as usize],
                        score: score(ord)?,
                    });
                }
                hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                hits.truncate(k);
                Ok(TopDocs {
                    total_hits: TotalHits {
                        value: live_ords.len().min(visited_limit) as u64,
                        relation: if truncated {
                            TotalHitsRelation::GreaterThanOrEqualTo
                        } else {
                            TotalHitsRelation::EqualTo
                        },
                    },
                    score_docs: hits,
                })
            }
        }
    }

fn check_query_dimension(field: &str, got: usize, want: usize) -> Result<()> {
    if got != want {
        return Err(PeltaError::invalid_operation(format!(
            "field \"{field}\": query dimension {got} does not match stored dimension {want}"
        )));
    }
    Ok(())
}
