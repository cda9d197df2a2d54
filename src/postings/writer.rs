//! Posting store writer.
//!
//! Buffers per-field inverted postings in memory while documents are added,
//! then flushes one `.pst` file per segment. Terms are kept in sorted byte
//! order throughout, so the flush is a single ordered walk. The same writer
//! is re-driven by the merge coordinator through [`PostingsWriter::add_posting`],
//! so merging needs no format-specific logic of its own.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::Token;
use crate::error::{PeltaError, Result};
use crate::field::IndexOptions;
use crate::postings::DocId;
use crate::storage::{IoContext, Storage, StructWriter};

/// File extension of the posting store.
pub const POSTINGS_EXTENSION: &str = "pst";

/// Magic prefix of a posting store file.
pub(crate) const POSTINGS_MAGIC: u32 = 0x5050_5354; // "PPST"
pub(crate) const POSTINGS_VERSION: u16 = 1;

#[derive(Debug, Clone, Default)]
pub(crate) struct PostingMut {
    pub doc: DocId,
    pub freq: u32,
    pub positions: Vec<i32>,
    pub offsets: Vec<(i32, i32)>,
    pub payloads: Vec<Option<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct TermBuilder {
    postings: Vec<PostingMut>,
    total_term_freq: u64,
}

#[derive(Debug)]
struct FieldPostingsBuilder {
    options: IndexOptions,
    terms: BTreeMap<Vec<u8>, TermBuilder>,
    has_payloads: bool,
    doc_count: u32,
    last_doc: DocId,
    // position chaining across multiple token streams of one document
    position_doc: DocId,
    next_position: i32,
}

impl FieldPostingsBuilder {
    fn new(options: IndexOptions) -> Self {
        FieldPostingsBuilder {
            options,
            terms: BTreeMap::new(),
            has_payloads: false,
            doc_count: 0,
            last_doc: -1,
            position_doc: -1,
            next_position: -1,
        }
    }

    fn note_doc(&mut self, doc: DocId) {
        if doc != self.last_doc {
            self.doc_count += 1;
            self.last_doc = doc;
        }
    }
}

/// Buffers inverted postings for one in-flight segment.
#[derive(Debug, Default)]
pub struct PostingsWriter {
    fields: BTreeMap<String, FieldPostingsBuilder>,
}

impl PostingsWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        PostingsWriter::default()
    }

    fn field_builder(
        &mut self,
        field: &str,
        options: IndexOptions,
    ) -> Result<&mut FieldPostingsBuilder> {
        if !self.fields.contains_key(field) {
            self.fields
                .insert(field.to_string(), FieldPostingsBuilder::new(options));
        }
        let builder = self.fields.get_mut(field).unwrap();
        if builder.options != options {
            return Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{field}\" from index options={} to inconsistent index options={}",
                builder.options.name(),
                options.name()
            )));
        }
        Ok(builder)
    }

    /// Invert one token stream of `field` for `doc`.
    ///
    /// Documents must arrive in increasing id order. A second stream for the
    /// same (doc, field) continues the position chain of the first.
    pub fn add_token_stream(
        &mut self,
        doc: DocId,
        field: &str,
        options: IndexOptions,
        tokens: &[Token],
    ) -> Result<()> {
        let builder = self.field_builder(field, options)?;
        if doc < builder.last_doc {
            return Err(PeltaError::invalid_operation(format!(
                "documents must be added in increasing order: got {doc} after {}",
                builder.last_doc
            )));
        }

        if builder.position_doc != doc {
            builder.position_doc = doc;
            builder.next_position = -1;
        }

        builder.note_doc(doc);

        for token in tokens {
            let position = builder.next_position + token.position_increment as i32;
            if position < 0 {
                return Err(PeltaError::malformed(format!(
                    "field \"{field}\": first token must have position increment >= 1"
                )));
            }
            builder.next_position = position;

            if token.payload.is_some() {
                builder.has_payloads = true;
            }

            let term = builder.terms.entry(token.bytes.clone()).or_default();
            term.total_term_freq += 1;

            let needs_new = term
                .postings
                .last()
                .map(|p| p.doc != doc)
                .unwrap_or(true);
            if needs_new {
                term.postings.push(PostingMut {
                    doc,
                    ..Default::default()
                });
            }

            let posting = term.postings.last_mut().unwrap();
            posting.freq += 1;
            if options.has_positions() {
                posting.positions.push(position);
                if options.has_offsets() {
                    posting.offsets.push((token.start_offset, token.end_offset));
                }
                posting
                    .payloads
                    .push(token.payload.clone());
            }
        }

        Ok(())
    }

    /// Add one complete posting for (`term`, `doc`), used by the merge path
    /// to replay another segment's postings through the normal writer.
    #[allow(clippy::too_many_arguments)]
    pub fn add_posting(
        &mut self,
        field: &str,
        options: IndexOptions,
        term: &[u8],
        doc: DocId,
        freq: u32,
        positions: &[i32],
        offsets: &[(i32, i32)],
        payloads: &[Option<Vec<u8>>],
    ) -> Result<()> {
        let builder = self.field_builder(field, options)?;
        builder.note_doc(doc);
        if payloads.iter().any(|p| p.is_some()) {
            builder.has_payloads = true;
        }

        let term_builder = builder.terms.entry(term.to_vec()).or_default();
        if let Some(last) = term_builder.postings.last() {
            if last.doc >= doc {
                return Err(PeltaError::invalid_operation(format!(
                    "postings for term must arrive in increasing doc order: got {doc} after {}",
                    last.doc
                )));
            }
        }

        term_builder.total_term_freq += freq as u64;
        term_builder.postings.push(PostingMut {
            doc,
            freq,
            positions: positions.to_vec(),
            offsets: offsets.to_vec(),
            payloads: payloads.to_vec(),
        });
        Ok(())
    }

    /// Whether any postings were buffered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of unique terms across all fields.
    pub fn unique_terms(&self) -> usize {
        self.fields.values().map(|f| f.terms.len()).sum()
    }

    /// Flush buffered postings to `<segment>.pst`, returning the file name.
    pub fn flush(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
        context: IoContext,
    ) -> Result<String> {
        let file_name = format!("{segment_name}.{POSTINGS_EXTENSION}");
        let output = storage.create_output_with_context(&file_name, context)?;
        let mut writer = StructWriter::new(output);

        writer.write_u32(POSTINGS_MAGIC)?;
        writer.write_u16(POSTINGS_VERSION)?;
        writer.write_varint(self.fields.len() as u64)?;

        for (name, field) in &self.fields {
            writer.write_string(name)?;
            writer.write_u8(index_options_code(field.options))?;
            writer.write_u8(field.has_payloads as u8)?;
            writer.write_varint(field.doc_count as u64)?;

            // Without stored frequencies a term's total frequency collapses
            // to its doc frequency, keeping flush and merge stats identical.
            let term_ttf = |t: &TermBuilder| {
                if field.options.has_freqs() {
                    t.total_term_freq
                } else {
                    t.postings.len() as u64
                }
            };

            let sum_doc_freq: u64 = field
                .terms
                .values()
                .map(|t| t.postings.len() as u64)
                .sum();
            let sum_ttf: u64 = field.terms.values().map(term_ttf).sum();
            writer.write_varint(sum_doc_freq)?;
            writer.write_varint(sum_ttf)?;
            writer.write_varint(field.terms.len() as u64)?;

            for (term, term_builder) in &field.terms {
                writer.write_bytes(term)?;
                writer.write_varint(term_builder.postings.len() as u64)?;
                writer.write_varint(term_ttf(term_builder))?;

                let mut prev_doc = 0i64;
                for posting in &term_builder.postings {
                    writer.write_varint((posting.doc as i64 - prev_doc) as u64)?;
                    prev_doc = posting.doc as i64;

                    if field.options.has_freqs() {
                        writer.write_varint(posting.freq as u64)?;
                    }

                    if field.options.has_positions() {
                        let mut prev_pos = 0i64;
                        for (i, &pos) in posting.positions.iter().enumerate() {
                            writer.write_varint((pos as i64 - prev_pos) as u64)?;
                            prev_pos = pos as i64;

                            if field.options.has_offsets() {
                                let (start, end) = posting.offsets[i];
                                writer.write_zigzag(start as i64)?;
                                writer.write_zigzag(end as i64 - start as i64)?;
                            }

                            if field.has_payloads {
                                match posting.payloads.get(i).and_then(|p| p.as_ref()) {
                                    Some(payload) => {
                                        writer.write_u8(1)?;
                                        writer.write_bytes(payload)?;
                                    }
                                    None => writer.write_u8(0)?,
                                }
                            }
                        }
                    }
                }
            }
        }

        writer.close()?;
        Ok(file_name)
    }
}

pub(crate) fn index_options_code(options: IndexOptions) -> u8 {
    match options {
        IndexOptions::None => 0,
        IndexOptions::Docs => 1,
        IndexOptions::DocsAndFreqs => 2,
        IndexOptions::DocsAndFreqsAndPositions => 3,
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets => 4,
    }
}

pub(crate) fn index_options_from_code(code: u8) -> Result<IndexOptions> {
    Ok(match code {
        0 => IndexOptions::None,
        1 => IndexOptions::Docs,
        2 => IndexOptions::DocsAndFreqs,
        3 => IndexOptions::DocsAndFreqsAndPositions,
        4 => IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
        other => {
            return Err(PeltaError::index(format!(
                "unknown index options code {other}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tokens_from_terms;
    use crate::storage::{MemoryStorage, StorageConfig};

    fn memory_storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    #[test]
    fn test_add_token_stream_accumulates() {
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                IndexOptions::DocsAndFreqs,
                &tokens_from_terms(&["b", "a", "b"]),
            )
            .unwrap();

        assert_eq!(writer.unique_terms(), 2);
        assert!(!writer.is_empty());
    }

    #[test]
    fn test_docs_must_increase() {
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(5, "body", IndexOptions::Docs, &tokens_from_terms(&["x"]))
            .unwrap();
        assert!(
            writer
                .add_token_stream(3, "body", IndexOptions::Docs, &tokens_from_terms(&["y"]))
                .is_err()
        );
    }

    #[test]
    fn test_index_options_conflict_detected() {
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(0, "body", IndexOptions::Docs, &tokens_from_terms(&["x"]))
            .unwrap();

        let err = writer
            .add_token_stream(
                1,
                "body",
                IndexOptions::DocsAndFreqs,
                &tokens_from_terms(&["y"]),
            )
            .unwrap_err();
        assert!(matches!(err, PeltaError::SchemaConflict(_)));
    }

    #[test]
    fn test_flush_writes_file() {
        let storage = memory_storage();
        let mut writer = PostingsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                IndexOptions::DocsAndFreqsAndPositions,
                &tokens_from_terms(&["hello", "world"]),
            )
            .unwrap();

        let file = writer.flush(&storage, "seg_0", IoContext::Flush).unwrap();
        assert_eq!(file, "seg_0.pst");
        assert!(storage.file_exists("seg_0.pst"));
    }

    #[test]
    fn test_merge_path_requires_increasing_docs_per_term() {
        let mut writer = PostingsWriter::new();
        writer
            .add_posting("body", IndexOptions::Docs, b"t", 3, 1, &[], &[], &[])
            .unwrap();
        assert!(
            writer
                .add_posting("body", IndexOptions::Docs, b"t", 3, 1, &[], &[], &[])
                .is_err()
        );
    }

    #[test]
    fn test_index_options_codes_round_trip() {
        for options in [
            IndexOptions::None,
            IndexOptions::Docs,
            IndexOptions::DocsAndFreqs,
            IndexOptions::DocsAndFreqsAndPositions,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
        ] {
            assert_eq!(
                index_options_from_code(index_options_code(options)).unwrap(),
                options
            );
        }
        assert!(index_options_from_code(9).is_err());
    }
}
