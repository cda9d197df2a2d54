//! Term vector writer.
//!
//! Buffers per-document mini term dictionaries and flushes one `.tvf` file
//! per segment. Positions are chained per (doc, field) the same way the
//! posting store does it, so a field's term vector agrees with its postings.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::document::Token;
use crate::error::{PeltaError, Result};
use crate::field::TermVectorOptions;
use crate::postings::DocId;
use crate::storage::{IoContext, Storage, StructWriter};

/// File extension of the term vector store.
pub const TERM_VECTORS_EXTENSION: &str = "tvf";

pub(crate) const TERM_VECTORS_MAGIC: u32 = 0x5054_5646; // "PTVF"
pub(crate) const TERM_VECTORS_VERSION: u16 = 1;

#[derive(Debug, Default)]
struct TvTerm {
    freq: u32,
    positions: Vec<i32>,
    offsets: Vec<(i32, i32)>,
    payloads: Vec<Option<Vec<u8>>>,
}

#[derive(Debug)]
struct TvField {
    options: TermVectorOptions,
    terms: BTreeMap<Vec<u8>, TvTerm>,
    next_position: i32,
}

/// Buffers term vectors for one in-flight segment.
#[derive(Debug, Default)]
pub struct TermVectorsWriter {
    docs: BTreeMap<DocId, BTreeMap<String, TvField>>,
}

impl TermVectorsWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        TermVectorsWriter::default()
    }

    /// Record one token stream of `field` for `doc`'s term vector.
    pub fn add_token_stream(
        &mut self,
        doc: DocId,
        field: &str,
        options: TermVectorOptions,
        tokens: &[Token],
    ) -> Result<()> {
        if !options.stored {
            return Ok(());
        }

        let doc_fields = self.docs.entry(doc).or_default();
        if !doc_fields.contains_key(field) {
            doc_fields.insert(
                field.to_string(),
                TvField {
                    options,
                    terms: BTreeMap::new(),
                    next_position: -1,
                },
            );
        }
        let tv_field = doc_fields.get_mut(field).unwrap();
        if tv_field.options != options {
            return Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{field}\" from term vectors={:?} to inconsistent term vectors={:?}",
                tv_field.options, options
            )));
        }

        for token in tokens {
            let position = tv_field.next_position + token.position_increment as i32;
            if position < 0 {
                return Err(PeltaError::malformed(format!(
                    "field \"{field}\": first token must have position increment >= 1"
                )));
            }
            tv_field.next_position = position;

            let term = tv_field.terms.entry(token.bytes.clone()).or_default();
            term.freq += 1;
            if options.positions || options.offsets || options.payloads {
                term.positions.push(position);
                term.offsets.push((token.start_offset, token.end_offset));
                term.payloads.push(token.payload.clone());
            }
        }

        Ok(())
    }

    /// Replay one complete term of another segment's term vector, used by
    /// the merge coordinator.
    #[allow(clippy::too_many_arguments)]
    pub fn add_term(
        &mut self,
        doc: DocId,
        field: &str,
        options: TermVectorOptions,
        term: &[u8],
        freq: u32,
        positions: &[i32],
        offsets: &[(i32, i32)],
        payloads: &[Option<Vec<u8>>],
    ) -> Result<()> {
        let doc_fields = self.docs.entry(doc).or_default();
        let tv_field = doc_fields.entry(field.to_string()).or_insert_with(|| TvField {
            options,
            terms: BTreeMap::new(),
            next_position: -1,
        });

        let entry = tv_field.terms.entry(term.to_vec()).or_default();
        entry.freq += freq;
        entry.positions.extend_from_slice(positions);
        entry.offsets.extend_from_slice(offsets);
        entry.payloads.extend_from_slice(payloads);
        Ok(())
    }

    /// Whether any term vectors were buffered.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Flush buffered term vectors to `<segment>.tvf`.
    pub fn flush(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
        context: IoContext,
    ) -> Result<String> {
        let file_name = format!("{segment_name}.{TERM_VECTORS_EXTENSION}");
        let output = storage.create_output_with_context(&file_name, context)?;
        let mut writer = StructWriter::new(output);

        writer.write_u32(TERM_VECTORS_MAGIC)?;
        writer.write_u16(TERM_VECTORS_VERSION)?;
        writer.write_varint(self.docs.len() as u64)?;

        let mut prev_doc = 0i64;
        for (doc, fields) in &self.docs {
            writer.write_varint((*doc as i64 - prev_doc) as u64)?;
            prev_doc = *doc as i64;
            writer.write_varint(fields.len() as u64)?;

            for (name, tv_field) in fields {
                writer.write_string(name)?;
                let mut feature_bits = 0u8;
                if tv_field.options.positions {
                    feature_bits |= 1;
                }
                if tv_field.options.offsets {
                    feature_bits |= 2;
                }
                if tv_field.options.payloads {
                    feature_bits |= 4;
                }
                writer.write_u8(feature_bits)?;
                writer.write_varint(tv_field.terms.len() as u64)?;

                let with_positions = feature_bits != 0;
                for (term, data) in &tv_field.terms {
                    writer.write_bytes(term)?;
                    writer.write_varint(data.freq as u64)?;

                    if with_positions {
                        let mut prev_pos = 0i64;
                        for (i, &pos) in data.positions.iter().enumerate() {
                            writer.write_varint((pos as i64 - prev_pos) as u64)?;
                            prev_pos = pos as i64;

                            let (start, end) = data.offsets[i];
                            writer.write_zigzag(start as i64)?;
                            writer.write_zigzag(end as i64 - start as i64)?;

                            match data.payloads.get(i).and_then(|p| p.as_ref()) {
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

        writer.close()?;
        Ok(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::tokens_from_terms;
    use crate::storage::{MemoryStorage, StorageConfig};

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    #[test]
    fn test_unstored_options_are_skipped() {
        let mut writer = TermVectorsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                TermVectorOptions::default(),
                &tokens_from_terms(&["a"]),
            )
            .unwrap();
        assert!(writer.is_empty());
    }

    #[test]
    fn test_flush_writes_file() {
        let storage = storage();
        let mut writer = TermVectorsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                TermVectorOptions::full(),
                &tokens_from_terms(&["b", "a", "b"]),
            )
            .unwrap();

        let file = writer.flush(&storage, "seg_tv", IoContext::Flush).unwrap();
        assert_eq!(file, "seg_tv.tvf");
        assert!(storage.file_exists(&file));
    }

    #[test]
    fn test_options_conflict() {
        let mut writer = TermVectorsWriter::new();
        writer
            .add_token_stream(
                0,
                "body",
                TermVectorOptions::full(),
                &tokens_from_terms(&["a"]),
            )
            .unwrap();

        let err = writer
            .add_token_stream(
                0,
                "body",
                TermVectorOptions::basic(),
                &tokens_from_terms(&["b"]),
            )
            .unwrap_err();
        assert!(matches!(err, PeltaError::SchemaConflict(_)));
    }
}
