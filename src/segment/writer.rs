//! Segment writer: the flush path.
//!
//! Consumes [`Document`]s, converges field descriptors as it goes, and
//! buffers every component in memory. `flush` seals the segment: component
//! files first, metadata last, and any failure deletes the partial output
//! before the error propagates so readers never see a half-written segment.
//!
//! Schema validation runs against the whole document before any buffer is
//! touched, so a rejected document leaves the writer fully usable for
//! unrelated documents.

use ahash::AHashMap;
use chrono::Utc;
use uuid::Uuid;

use crate::docvalues::DocValuesWriter;
use crate::document::{Document, FieldContent};
use crate::error::{PeltaError, Result};
use crate::field::{
    DocValuesType, FieldInfosBuilder, IndexOptions, TermVectorOptions, VectorShape,
};
use crate::postings::{DocId, PostingsWriter};
use crate::segment::codec::DEFAULT_CODEC;
use crate::segment::SegmentMeta;
use crate::storage::{IoContext, Storage};
use crate::termvectors::TermVectorsWriter;
use crate::vector::hnsw::HnswConfig;
use crate::vector::{VectorEncoding, VectorValuesWriter, MAX_DIMENSION};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
struct PendingShape {
    index_options: Option<IndexOptions>,
    doc_values: Option<DocValuesType>,
    term_vectors: Option<TermVectorOptions>,
    vector: Option<VectorShape>,
}

/// Writes one in-flight segment.
pub struct SegmentWriter {
    storage: Arc<dyn Storage>,
    name: String,
    field_infos: FieldInfosBuilder,
    postings: PostingsWriter,
    doc_values: DocValuesWriter,
    term_vectors: TermVectorsWriter,
    vectors: VectorValuesWriter,
    next_doc: DocId,
}

impl SegmentWriter {
    /// Create a writer for segment `name`.
    pub fn new(
        storage: Arc<dyn Storage>,
        name: impl Into<String>,
        hnsw_config: HnswConfig,
    ) -> Self {
        SegmentWriter {
            storage,
            name: name.into(),
            field_infos: FieldInfosBuilder::new(),
            postings: PostingsWriter::new(),
            doc_values: DocValuesWriter::new(),
            term_vectors: TermVectorsWriter::new(),
            vectors: VectorValuesWriter::new(hnsw_config),
            next_doc: 0,
        }
    }

    /// The segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents added so far.
    pub fn doc_count(&self) -> u32 {
        self.next_doc as u32
    }

    /// Validate the whole document against the established field shapes
    /// without touching any buffer.
    fn validate(&self, doc: &Document) -> Result<()> {
        let mut pending: AHashMap<&str, PendingShape> = AHashMap::new();

        for (name, content) in doc.fields() {
            let entry = pending.entry(name).or_insert_with(|| {
                let existing = self.field_infos.get(name);
                PendingShape {
                    index_options: existing
                        .map(|fi| fi.index_options)
                        .filter(|o| *o != IndexOptions::None),
                    doc_values: existing
                        .map(|fi| fi.doc_values_type)
                        .filter(|t| *t != DocValuesType::None),
                    term_vectors: existing
                        .map(|fi| fi.term_vectors)
                        .filter(|tv| tv.stored),
                    vector: existing.and_then(|fi| fi.vector_shape),
                }
            });

            match content {
                FieldContent::Tokens {
                    options,
                    term_vectors,
                    ..
                } => {
                    if let Some(existing) = entry.index_options {
                        if existing != *options {
                            return Err(PeltaError::schema_conflict(format!(
                                "cannot change field \"{name}\" from index options={} to inconsistent index options={}",
                                existing.name(),
                                options.name()
                            )));
                        }
                    }
                    entry.index_options = Some(*options);

                    if term_vectors.stored {
                        if let Some(existing) = entry.term_vectors {
                            if existing != *term_vectors {
                                return Err(PeltaError::schema_conflict(format!(
                                    "cannot change field \"{name}\" from term vectors={existing:?} to inconsistent term vectors={term_vectors:?}"
                                )));
                            }
                        }
                        entry.term_vectors = Some(*term_vectors);
                    }
                }
                FieldContent::Numeric(_)
                | FieldContent::Binary(_)
                | FieldContent::Sorted(_)
                | FieldContent::SortedSet(_)
                | FieldContent::SortedNumeric(_) => {
                    let wanted = match content {
                        FieldContent::Numeric(_) => DocValuesType::Numeric,
                        FieldContent::Binary(_) => DocValuesType::Binary,
                        FieldContent::Sorted(_) => DocValuesType::Sorted,
                        FieldContent::SortedSet(_) => DocValuesType::SortedSet,
                        _ => DocValuesType::SortedNumeric,
                    };
                    if let Some(existing) = entry.doc_values {
                        if existing != wanted {
                            return Err(PeltaError::schema_conflict(format!(
                                "cannot change field \"{name}\" from doc values type={} to inconsistent doc values type={}",
                                existing.name(),
                                wanted.name()
                            )));
                        }
                    }
                    entry.doc_values = Some(wanted);
                }
                FieldContent::FloatVector { values, similarity } => {
                    let shape = VectorShape {
                        dimension: values.len(),
                        encoding: VectorEncoding::Float32,
                        similarity: *similarity,
                    };
                    Self::validate_vector_shape(name, entry, shape)?;
                }
                FieldContent::ByteVector { values, similarity } => {
                    let shape = VectorShape {
                        dimension: values.len(),
                        encoding: VectorEncoding::Byte,
                        similarity: *similarity,
                    };
                    Self::validate_vector_shape(name, entry, shape)?;
                }
            }
        }

        Ok(())
    }

    fn validate_vector_shape(
        name: &str,
        entry: &mut PendingShape,
        shape: VectorShape,
    ) -> Result<()> {
        if shape.dimension == 0 {
            return Err(PeltaError::malformed(format!(
                "field \"{name}\": vector must have dimension >= 1"
            )));
        }
        if shape.dimension > MAX_DIMENSION {
            return Err(PeltaError::malformed(format!(
                "field \"{name}\": vector dimension {} exceeds the maximum of {MAX_DIMENSION}",
                shape.dimension
            )));
        }
        if let Some(existing) = entry.vector {
            if existing != shape {
                return Err(PeltaError::schema_conflict(format!(
                    "cannot change field \"{name}\" from {existing} to inconsistent {shape}"
                )));
            }
        }
        entry.vector = Some(shape);
        Ok(())
    }

    /// Add one document, returning its segment-local id.
    ///
    /// Schema conflicts and malformed input fail synchronously, before any
    /// state changes; the writer stays usable for subsequent documents.
    pub fn add_document(&mut self, doc: &Document) -> Result<DocId> {
        self.validate(doc)?;

        let doc_id = self.next_doc;
        for (name, content) in doc.fields() {
            match content {
                FieldContent::Tokens {
                    tokens,
                    options,
                    term_vectors,
                } => {
                    self.field_infos.add_indexed(name, *options)?;
                    self.postings
                        .add_token_stream(doc_id, name, *options, tokens)?;
                    if term_vectors.stored {
                        self.field_infos.add_term_vectors(name, *term_vectors)?;
                        self.term_vectors
                            .add_token_stream(doc_id, name, *term_vectors, tokens)?;
                    }
                }
                FieldContent::Numeric(value) => {
                    self.field_infos.add_doc_values(name, DocValuesType::Numeric)?;
                    self.doc_values.add_numeric(doc_id, name, *value)?;
                }
                FieldContent::Binary(value) => {
                    self.field_infos.add_doc_values(name, DocValuesType::Binary)?;
                    self.doc_values.add_binary(doc_id, name, value.clone())?;
                }
                FieldContent::Sorted(value) => {
                    self.field_infos.add_doc_values(name, DocValuesType::Sorted)?;
                    self.doc_values.add_sorted(doc_id, name, value.clone())?;
                }
                FieldContent::SortedSet(values) => {
                    self.field_infos
                        .add_doc_values(name, DocValuesType::SortedSet)?;
                    self.doc_values
                        .add_sorted_set(doc_id, name, values.clone())?;
                }
                FieldContent::SortedNumeric(values) => {
                    self.field_infos
                        .add_doc_values(name, DocValuesType::SortedNumeric)?;
                    self.doc_values
                        .add_sorted_numeric(doc_id, name, values.clone())?;
                }
                FieldContent::FloatVector { values, similarity } => {
                    self.field_infos.add_vector(
                        name,
                        VectorShape {
                            dimension: values.len(),
                            encoding: VectorEncoding::Float32,
                            similarity: *similarity,
                        },
                    )?;
                    self.vectors
                        .add_float_vector(doc_id, name, values, *similarity)?;
                }
                FieldContent::ByteVector { values, similarity } => {
                    self.field_infos.add_vector(
                        name,
                        VectorShape {
                            dimension: values.len(),
                            encoding: VectorEncoding::Byte,
                            similarity: *similarity,
                        },
                    )?;
                    self.vectors
                        .add_byte_vector(doc_id, name, values, *similarity)?;
                }
            }
        }

        self.next_doc += 1;
        Ok(doc_id)
    }

    /// Direct access to the component writers, used by the merge coordinator
    /// to replay other segments through the normal write path.
    pub fn components(
        &mut self,
    ) -> (
        &mut FieldInfosBuilder,
        &mut PostingsWriter,
        &mut DocValuesWriter,
        &mut TermVectorsWriter,
        &mut VectorValuesWriter,
    ) {
        (
            &mut self.field_infos,
            &mut self.postings,
            &mut self.doc_values,
            &mut self.term_vectors,
            &mut self.vectors,
        )
    }

    /// Record the number of documents written through the component writers
    /// on the merge path, where `add_document` is bypassed.
    pub fn set_doc_count(&mut self, max_doc: u32) {
        self.next_doc = max_doc as DocId;
    }

    /// Seal the segment under the given I/O context.
    ///
    /// Writes every component file, then the metadata last. On failure all
    /// partially written files are deleted before the error is returned.
    pub fn flush(self, context: IoContext) -> Result<SegmentMeta> {
        let mut files: Vec<String> = Vec::new();
        match self.try_flush(context, &mut files) {
            Ok(meta) => Ok(meta),
            Err(e) => {
                for file in &files {
                    let _ = self.storage.delete_file(file);
                }
                Err(e)
            }
        }
    }

    fn try_flush(&self, context: IoContext, files: &mut Vec<String>) -> Result<SegmentMeta> {
        if !self.postings.is_empty() {
            files.push(self.postings.flush(&self.storage, &self.name, context)?);
        }
        if !self.doc_values.is_empty() {
            files.push(self.doc_values.flush(&self.storage, &self.name, context)?);
        }
        if !self.term_vectors.is_empty() {
            files.push(self.term_vectors.flush(&self.storage, &self.name, context)?);
        }
        if !self.vectors.is_empty() {
            files.extend(self.vectors.flush(&self.storage, &self.name, context)?);
        }

        let meta = SegmentMeta {
            id: Uuid::new_v4().to_string(),
            name: self.name.clone(),
            max_doc: self.next_doc as u32,
            codec: DEFAULT_CODEC.to_string(),
            created_at: Utc::now(),
            files: files.clone(),
            del_gen: 0,
            field_infos: self.field_infos.snapshot(),
        };
        meta.write(&self.storage)?;
        Ok(meta)
    }
}
