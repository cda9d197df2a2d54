//! Segment merger.
//!
//! Combines N segment readers into one fresh segment: verifies cross-input
//! field shapes before writing a single byte, renumbers live documents
//! contiguously in input order, and replays every component through the same
//! writers a flush uses. Only reader contracts are consumed, so inputs
//! written by other codecs merge the same way.

use std::sync::Arc;

use crate::docvalues::{
    BinaryDocValues, DocValuesProducer, NumericDocValues, SortedDocValues,
    SortedNumericDocValues, SortedSetDocValues, NO_MORE_ORDS,
};
use crate::error::{PeltaError, Result};
use crate::field::{FieldInfosBuilder, TermVectorOptions};
use crate::postings::terms::{FieldsProducer, Terms, TermsEnum};
use crate::postings::{flags, DocId, DocIdSetIterator, PostingsIterator, NO_MORE_DOCS};
use crate::segment::codec::{TermVectorsFormat, VectorsFormat};
use crate::segment::{SegmentMeta, SegmentReader, SegmentWriter};
use crate::storage::{IoContext, Storage};
use crate::vector::hnsw::HnswConfig;
use crate::vector::VectorEncoding;

/// Per-input mapping from old doc ids to merged doc ids (`None` = deleted).
#[derive(Debug)]
pub struct DocMap {
    map: Vec<Option<DocId>>,
}

impl DocMap {
    /// The merged id of `old_doc`, or `None` when it was deleted.
    pub fn new_doc(&self, old_doc: DocId) -> Option<DocId> {
        self.map.get(old_doc as usize).copied().flatten()
    }
}

/// Merges segments by re-driving readers through the writer path.
pub struct SegmentMerger {
    storage: Arc<dyn Storage>,
    hnsw_config: HnswConfig,
}

impl SegmentMerger {
    /// Create a merger writing through `storage`.
    pub fn new(storage: Arc<dyn Storage>, hnsw_config: HnswConfig) -> Self {
        SegmentMerger {
            storage,
            hnsw_config,
        }
    }

    /// Merge `inputs` into a new segment called `target_name`.
    pub fn merge(
        &self,
        inputs: &[Arc<SegmentReader>],
        target_name: &str,
    ) -> Result<SegmentMeta> {
        if inputs.is_empty() {
            return Err(PeltaError::merge("no input segments to merge"));
        }

        // Fail fast on any cross-input field shape mismatch, before any
        // bytes are written.
        let merged_infos = verify_field_shapes(inputs)?;

        let doc_maps = build_doc_maps(inputs);
        let total_live: u32 = inputs.iter().map(|r| r.num_docs()).sum();

        let mut writer =
            SegmentWriter::new(Arc::clone(&self.storage), target_name, self.hnsw_config.clone());

        {
            let (field_infos, postings, doc_values, term_vectors, vectors) = writer.components();

            // Seed the merged descriptors so numbering and shapes are stable
            *field_infos = FieldInfosBuilder::from_existing(&merged_infos);

            for (input, doc_map) in inputs.iter().zip(doc_maps.iter()) {
                merge_postings(input, doc_map, postings)?;
                merge_doc_values(input, doc_map, doc_values)?;
                merge_term_vectors(input, doc_map, term_vectors)?;
                merge_vectors(input, doc_map, vectors)?;
            }
        }

        writer.set_doc_count(total_live);
        writer.flush(IoContext::Merge)
    }
}

/// Verify that every field has one consistent shape across the inputs,
/// returning the merged descriptors. Conflicts carry both shapes.
fn verify_field_shapes(
    inputs: &[Arc<SegmentReader>],
) -> Result<crate::field::FieldInfos> {
    let mut builder = FieldInfosBuilder::new();
    for input in inputs {
        for fi in input.field_infos().iter() {
            if fi.is_indexed() {
                builder.add_indexed(&fi.name, fi.index_options)?;
            }
            if fi.has_doc_values() {
                builder.add_doc_values(&fi.name, fi.doc_values_type)?;
            }
            if fi.has_term_vectors() {
                builder.add_term_vectors(&fi.name, fi.term_vectors)?;
            }
            if let Some(shape) = fi.vector_shape {
                builder.add_vector(&fi.name, shape)?;
            }
        }
    }
    Ok(builder.snapshot())
}

fn build_doc_maps(inputs: &[Arc<SegmentReader>]) -> Vec<DocMap> {
    let mut next_doc: DocId = 0;
    inputs
        .iter()
        .map(|input| {
            let mut map = Vec::with_capacity(input.max_doc() as usize);
            for doc in 0..input.max_doc() as DocId {
                if input.is_live(doc) {
                    map.push(Some(next_doc));
                    next_doc += 1;
                } else {
                    map.push(None);
                }
            }
            DocMap { map }
        })
        .collect()
}

fn merge_postings(
    input: &SegmentReader,
    doc_map: &DocMap,
    writer: &mut crate::postings::PostingsWriter,
) -> Result<()> {
    for field in input.postings().fields() {
        let Some(terms) = input.postings().terms(&field)? else {
            continue;
        };
        let options = field_index_options(&terms);
        let with_positions = terms.has_positions();

        let mut te = terms.iterator()?;
        let mut postings_reuse = None;
        while let Some(term) = te.next()? {
            let term = term.to_vec();
            let mut postings = te.postings(postings_reuse.take(), flags::ALL)?;

            loop {
                let doc = postings.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                let Some(new_doc) = doc_map.new_doc(doc) else {
                    continue;
                };

                let freq = postings.freq()?;
                let mut positions = Vec::new();
                let mut offsets = Vec::new();
                let mut payloads = Vec::new();
                if with_positions {
                    for _ in 0..freq {
                        positions.push(postings.next_position()?);
                        if terms.has_offsets() {
                            offsets.push((postings.start_offset()?, postings.end_offset()?));
                        }
                        payloads.push(postings.payload()?.map(|p| p.to_vec()));
                    }
                }

                writer.add_posting(
                    &field, options, &term, new_doc, freq, &positions, &offsets, &payloads,
                )?;
            }

            postings_reuse = Some(postings);
        }
    }
    Ok(())
}

fn field_index_options(terms: &Arc<dyn Terms>) -> crate::field::IndexOptions {
    use crate::field::IndexOptions;
    if terms.has_offsets() {
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    } else if terms.has_positions() {
        IndexOptions::DocsAndFreqsAndPositions
    } else if terms.has_freqs() {
        IndexOptions::DocsAndFreqs
    } else {
        IndexOptions::Docs
    }
}

fn merge_doc_values(
    input: &SegmentReader,
    doc_map: &DocMap,
    writer: &mut crate::docvalues::DocValuesWriter,
) -> Result<()> {
    let producer = input.doc_values();
    for field in producer.fields() {
        if let Some(mut it) = producer.numeric(&field).unwrap_or(None) {
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if let Some(new_doc) = doc_map.new_doc(doc) {
                    writer.add_numeric(new_doc, &field, it.long_value()?)?;
                }
            }
        } else if let Some(mut it) = producer.binary(&field).unwrap_or(None) {
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if let Some(new_doc) = doc_map.new_doc(doc) {
                    writer.add_binary(new_doc, &field, it.binary_value()?.to_vec())?;
                }
            }
        } else if let Some(mut it) = producer.sorted(&field).unwrap_or(None) {
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if let Some(new_doc) = doc_map.new_doc(doc) {
                    let ord = it.ord_value()?;
                    let value = it.lookup_ord(ord)?.to_vec();
                    writer.add_sorted(new_doc, &field, value)?;
                }
            }
        } else if let Some(mut it) = producer.sorted_set(&field).unwrap_or(None) {
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                let keep = doc_map.new_doc(doc);
                let mut values = Vec::new();
                loop {
                    let ord = it.next_ord()?;
                    if ord == NO_MORE_ORDS {
                        break;
                    }
                    if keep.is_some() {
                        values.push(it.lookup_ord(ord)?.to_vec());
                    }
                }
                if let Some(new_doc) = keep {
                    writer.add_sorted_set(new_doc, &field, values)?;
                }
            }
        } else if let Some(mut it) = producer.sorted_numeric(&field).unwrap_or(None) {
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                let keep = doc_map.new_doc(doc);
                let count = it.doc_value_count()?;
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(it.next_value()?);
                }
                if let Some(new_doc) = keep {
                    writer.add_sorted_numeric(new_doc, &field, values)?;
                }
            }
        }
    }
    Ok(())
}

fn merge_term_vectors(
    input: &SegmentReader,
    doc_map: &DocMap,
    writer: &mut crate::termvectors::TermVectorsWriter,
) -> Result<()> {
    for doc in input.term_vectors().doc_ids() {
        let Some(new_doc) = doc_map.new_doc(doc) else {
            continue;
        };
        let Some(fields) = input.term_vectors().get(doc)? else {
            continue;
        };

        for field in fields.fields() {
            let Some(terms) = fields.terms(&field) else {
                continue;
            };
            let options = TermVectorOptions {
                stored: true,
                positions: terms.has_positions(),
                offsets: terms.has_offsets(),
                payloads: terms.has_payloads(),
            };
            let with_positions = terms.has_positions();

            let mut te = terms.iterator()?;
            while let Some(term) = te.next()? {
                let term = term.to_vec();
                let mut postings = te.postings(None, flags::ALL)?;
                if postings.next_doc()? == NO_MORE_DOCS {
                    continue;
                }

                let freq = postings.freq()?;
                let mut positions = Vec::new();
                let mut offsets = Vec::new();
                let mut payloads = Vec::new();
                if with_positions {
                    for _ in 0..freq {
                        positions.push(postings.next_position()?);
                        offsets.push((postings.start_offset()?, postings.end_offset()?));
                        payloads.push(postings.payload()?.map(|p| p.to_vec()));
                    }
                }

                writer.add_term(
                    new_doc, &field, options, &term, freq, &positions, &offsets, &payloads,
                )?;
            }
        }
    }
    Ok(())
}

fn merge_vectors(
    input: &SegmentReader,
    doc_map: &DocMap,
    writer: &mut crate::vector::VectorValuesWriter,
) -> Result<()> {
    for field in input.vectors().field_names() {
        let Some(vectors) = input.vectors().vectors(&field) else {
            continue;
        };
        let shape = vectors.shape();

        let mut it = vectors.iterator();
        loop {
            let doc = it.next_doc()?;
            if doc == NO_MORE_DOCS {
                break;
            }
            let Some(new_doc) = doc_map.new_doc(doc) else {
                continue;
            };
            let ordinal = it.index()?;

            match shape.encoding {
                VectorEncoding::Float32 => {
                    let values = vectors.vector_value(ordinal)?;
                    writer.add_float_vector(new_doc, &field, values, shape.similarity)?;
                }
                VectorEncoding::Byte => {
                    let values = vectors.byte_vector_value(ordinal)?;
                    writer.add_byte_vector(new_doc, &field, values, shape.similarity)?;
                }
            }
        }
    }
    Ok(())
}
