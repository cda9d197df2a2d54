//! Vector store writer.
//!
//! Buffers dense vectors per field while documents are added, policing the
//! field's shape (dimension, encoding, similarity) at add time, then flushes
//! a flat `.vec` file plus a `.hnsw` graph file per segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::field::VectorShape;
use crate::postings::DocId;
use crate::storage::{IoContext, Storage, StructWriter};
use crate::vector::hnsw::{HnswConfig, HnswGraph};
use crate::vector::{VectorEncoding, VectorSimilarity, MAX_DIMENSION};

/// File extension of the flat vector store.
pub const VECTORS_EXTENSION: &str = "vec";
/// File extension of the ANN graph store.
pub const VECTOR_GRAPH_EXTENSION: &str = "hnsw";

pub(crate) const VECTORS_MAGIC: u32 = 0x5056_4543; // "PVEC"
pub(crate) const VECTORS_VERSION: u16 = 1;
pub(crate) const GRAPH_MAGIC: u32 = 0x5048_4E57; // "PHNW"

#[derive(Debug)]
struct FieldVectorsBuilder {
    shape: VectorShape,
    docs: Vec<DocId>,
    floats: Vec<f32>,
    bytes: Vec<u8>,
}

impl FieldVectorsBuilder {
    fn new(shape: VectorShape) -> Self {
        FieldVectorsBuilder {
            shape,
            docs: Vec::new(),
            floats: Vec::new(),
            bytes: Vec::new(),
        }
    }

    fn float_vector(&self, ord: usize) -> &[f32] {
        let dim = self.shape.dimension;
        &self.floats[ord * dim..(ord + 1) * dim]
    }

    fn byte_vector(&self, ord: usize) -> &[u8] {
        let dim = self.shape.dimension;
        &self.bytes[ord * dim..(ord + 1) * dim]
    }
}

/// Buffers vector values for one in-flight segment.
#[derive(Debug)]
pub struct VectorValuesWriter {
    fields: BTreeMap<String, FieldVectorsBuilder>,
    hnsw_config: HnswConfig,
}

impl VectorValuesWriter {
    /// Create an empty writer with the given graph configuration.
    pub fn new(hnsw_config: HnswConfig) -> Self {
        VectorValuesWriter {
            fields: BTreeMap::new(),
            hnsw_config,
        }
    }

    fn field_builder(
        &mut self,
        field: &str,
        shape: VectorShape,
        doc: DocId,
    ) -> Result<&mut FieldVectorsBuilder> {
        if shape.dimension == 0 {
            return Err(PeltaError::malformed(format!(
                "field \"{field}\": vector must have dimension >= 1"
            )));
        }
        if shape.dimension > MAX_DIMENSION {
            return Err(PeltaError::malformed(format!(
                "field \"{field}\": vector dimension {} exceeds the maximum of {MAX_DIMENSION}",
                shape.dimension
            )));
        }

        if !self.fields.contains_key(field) {
            self.fields
                .insert(field.to_string(), FieldVectorsBuilder::new(shape));
        }
        let builder = self.fields.get_mut(field).unwrap();

        if builder.shape != shape {
            return Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{field}\" from {} to inconsistent {shape}",
                builder.shape
            )));
        }

        if builder.docs.last() == Some(&doc) {
            return Err(PeltaError::malformed(format!(
                "field \"{field}\": only one vector value per document is allowed"
            )));
        }
        if let Some(&last) = builder.docs.last() {
            if doc < last {
                return Err(PeltaError::invalid_operation(format!(
                    "field \"{field}\": vectors must be added in increasing doc order \
                     (got {doc} after {last})"
                )));
            }
        }

        Ok(builder)
    }

    /// Add one f32 vector for (`doc`, `field`).
    pub fn add_float_vector(
        &mut self,
        doc: DocId,
        field: &str,
        values: &[f32],
        similarity: VectorSimilarity,
    ) -> Result<()> {
        let shape = VectorShape {
            dimension: values.len(),
            encoding: VectorEncoding::Float32,
            similarity,
        };
        let builder = self.field_builder(field, shape, doc)?;
        builder.docs.push(doc);
        builder.floats.extend_from_slice(values);
        Ok(())
    }

    /// Add one byte vector for (`doc`, `field`).
    pub fn add_byte_vector(
        &mut self,
        doc: DocId,
        field: &str,
        values: &[u8],
        similarity: VectorSimilarity,
    ) -> Result<()> {
        let shape = VectorShape {
            dimension: values.len(),
            encoding: VectorEncoding::Byte,
            similarity,
        };
        let builder = self.field_builder(field, shape, doc)?;
        builder.docs.push(doc);
        builder.bytes.extend_from_slice(values);
        Ok(())
    }

    /// The established shape of `field`, if any vectors were added.
    pub fn shape(&self, field: &str) -> Option<VectorShape> {
        self.fields.get(field).map(|b| b.shape)
    }

    /// Whether any vectors were buffered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flush buffered vectors to `<segment>.vec` and `<segment>.hnsw`,
    /// returning both file names.
    pub fn flush(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
        context: IoContext,
    ) -> Result<Vec<String>> {
        let vec_name = format!("{segment_name}.{VECTORS_EXTENSION}");
        let graph_name = format!("{segment_name}.{VECTOR_GRAPH_EXTENSION}");

        // Flat values
        {
            let output = storage.create_output_with_context(&vec_name, context)?;
            let mut writer = StructWriter::new(output);
            writer.write_u32(VECTORS_MAGIC)?;
            writer.write_u16(VECTORS_VERSION)?;
            writer.write_varint(self.fields.len() as u64)?;

            for (name, builder) in &self.fields {
                writer.write_string(name)?;
                writer.write_varint(builder.shape.dimension as u64)?;
                writer.write_u8(match builder.shape.encoding {
                    VectorEncoding::Byte => 0,
                    VectorEncoding::Float32 => 1,
                })?;
                writer.write_u8(similarity_code(builder.shape.similarity))?;
                writer.write_varint(builder.docs.len() as u64)?;

                let mut prev_doc = 0i64;
                for &doc in &builder.docs {
                    writer.write_varint((doc as i64 - prev_doc) as u64)?;
                    prev_doc = doc as i64;
                }

                match builder.shape.encoding {
                    VectorEncoding::Float32 => {
                        for &value in &builder.floats {
                            writer.write_f32(value)?;
                        }
                    }
                    VectorEncoding::Byte => {
                        writer.write_raw(&builder.bytes)?;
                    }
                }
            }

            writer.close()?;
        }

        // ANN graphs, one per field, serialized with bincode
        let build_result: Result<Vec<(String, HnswGraph)>> = self
            .fields
            .iter()
            .map(|(name, builder)| {
                let graph = match builder.shape.encoding {
                    VectorEncoding::Float32 => HnswGraph::build(
                        builder.docs.len() as u32,
                        &self.hnsw_config,
                        |a, b| {
                            builder.shape.similarity.score_f32(
                                builder.float_vector(a as usize),
                                builder.float_vector(b as usize),
                            )
                        },
                    )?,
                    VectorEncoding::Byte => HnswGraph::build(
                        builder.docs.len() as u32,
                        &self.hnsw_config,
                        |a, b| {
                            builder.shape.similarity.score_u8(
                                builder.byte_vector(a as usize),
                                builder.byte_vector(b as usize),
                            )
                        },
                    )?,
                };
                Ok((name.clone(), graph))
            })
            .collect();
        let graphs = build_result?;

        {
            let output = storage.create_output_with_context(&graph_name, context)?;
            let mut writer = StructWriter::new(output);
            writer.write_u32(GRAPH_MAGIC)?;
            writer.write_u16(VECTORS_VERSION)?;
            writer.write_varint(graphs.len() as u64)?;
            for (name, graph) in &graphs {
                writer.write_string(name)?;
                let encoded = bincode::serde::encode_to_vec(graph, bincode::config::standard())
                    .map_err(|e| {
                        PeltaError::index(format!("failed to serialize vector graph: {e}"))
                    })?;
                writer.write_bytes(&encoded)?;
            }
            writer.close()?;
        }

        Ok(vec![vec_name, graph_name])
    }
}

pub(crate) fn similarity_code(similarity: VectorSimilarity) -> u8 {
    match similarity {
        VectorSimilarity::Euclidean => 0,
        VectorSimilarity::DotProduct => 1,
        VectorSimilarity::Cosine => 2,
        VectorSimilarity::MaximumInnerProduct => 3,
    }
}

pub(crate) fn similarity_from_code(code: u8) -> Result<VectorSimilarity> {
    Ok(match code {
        0 => VectorSimilarity::Euclidean,
        1 => VectorSimilarity::DotProduct,
        2 => VectorSimilarity::Cosine,
        3 => VectorSimilarity::MaximumInnerProduct,
        other => {
            return Err(PeltaError::index(format!(
                "unknown similarity code {other}"
            )));
        }
    })
}
