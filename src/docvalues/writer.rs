//! Doc-values writer.
//!
//! Buffers per-field columnar values while documents are added, builds the
//! sorted dictionaries for SORTED/SORTED_SET fields at flush time, and writes
//! one `.dvd` file per segment.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{PeltaError, Result};
use crate::field::DocValuesType;
use crate::postings::DocId;
use crate::storage::{IoContext, Storage, StructWriter};

/// File extension of the doc-values store.
pub const DOC_VALUES_EXTENSION: &str = "dvd";

pub(crate) const DOC_VALUES_MAGIC: u32 = 0x5044_5644; // "PDVD"
pub(crate) const DOC_VALUES_VERSION: u16 = 1;

#[derive(Debug)]
enum DocValuesBuffer {
    Numeric(Vec<(DocId, i64)>),
    Binary(Vec<(DocId, Vec<u8>)>),
    Sorted(Vec<(DocId, Vec<u8>)>),
    SortedSet(Vec<(DocId, Vec<Vec<u8>>)>),
    SortedNumeric(Vec<(DocId, Vec<i64>)>),
}

impl DocValuesBuffer {
    fn dv_type(&self) -> DocValuesType {
        match self {
            DocValuesBuffer::Numeric(_) => DocValuesType::Numeric,
            DocValuesBuffer::Binary(_) => DocValuesType::Binary,
            DocValuesBuffer::Sorted(_) => DocValuesType::Sorted,
            DocValuesBuffer::SortedSet(_) => DocValuesType::SortedSet,
            DocValuesBuffer::SortedNumeric(_) => DocValuesType::SortedNumeric,
        }
    }

    fn last_doc(&self) -> Option<DocId> {
        match self {
            DocValuesBuffer::Numeric(v) => v.last().map(|(d, _)| *d),
            DocValuesBuffer::Binary(v) => v.last().map(|(d, _)| *d),
            DocValuesBuffer::Sorted(v) => v.last().map(|(d, _)| *d),
            DocValuesBuffer::SortedSet(v) => v.last().map(|(d, _)| *d),
            DocValuesBuffer::SortedNumeric(v) => v.last().map(|(d, _)| *d),
        }
    }
}

/// Buffers doc values for one in-flight segment.
#[derive(Debug, Default)]
pub struct DocValuesWriter {
    fields: BTreeMap<String, DocValuesBuffer>,
}

impl DocValuesWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        DocValuesWriter::default()
    }

    fn check_order(buffer: &DocValuesBuffer, field: &str, doc: DocId) -> Result<()> {
        if let Some(last) = buffer.last_doc() {
            if doc <= last {
                return Err(PeltaError::invalid_operation(format!(
                    "field \"{field}\": doc values must be added in increasing doc order \
                     (got {doc} after {last})"
                )));
            }
        }
        Ok(())
    }

    fn buffer(
        &mut self,
        field: &str,
        wanted: DocValuesType,
        make: impl FnOnce() -> DocValuesBuffer,
    ) -> Result<&mut DocValuesBuffer> {
        if !self.fields.contains_key(field) {
            self.fields.insert(field.to_string(), make());
        }
        let buffer = self.fields.get_mut(field).unwrap();
        if buffer.dv_type() != wanted {
            return Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{field}\" from doc values type={} to inconsistent doc values type={}",
                buffer.dv_type().name(),
                wanted.name()
            )));
        }
        Ok(buffer)
    }

    /// Add a numeric value for `doc`.
    pub fn add_numeric(&mut self, doc: DocId, field: &str, value: i64) -> Result<()> {
        let buffer = self.buffer(field, DocValuesType::Numeric, || {
            DocValuesBuffer::Numeric(Vec::new())
        })?;
        Self::check_order(buffer, field, doc)?;
        if let DocValuesBuffer::Numeric(values) = buffer {
            values.push((doc, value));
        }
        Ok(())
    }

    /// Add a binary value for `doc`.
    pub fn add_binary(&mut self, doc: DocId, field: &str, value: Vec<u8>) -> Result<()> {
        let buffer = self.buffer(field, DocValuesType::Binary, || {
            DocValuesBuffer::Binary(Vec::new())
        })?;
        Self::check_order(buffer, field, doc)?;
        if let DocValuesBuffer::Binary(values) = buffer {
            values.push((doc, value));
        }
        Ok(())
    }

    /// Add a sorted (dictionary) value for `doc`.
    pub fn add_sorted(&mut self, doc: DocId, field: &str, value: Vec<u8>) -> Result<()> {
        let buffer = self.buffer(field, DocValuesType::Sorted, || {
            DocValuesBuffer::Sorted(Vec::new())
        })?;
        Self::check_order(buffer, field, doc)?;
        if let DocValuesBuffer::Sorted(values) = buffer {
            values.push((doc, value));
        }
        Ok(())
    }

    /// Add a sorted-set value for `doc`. Values are deduplicated and sorted.
    pub fn add_sorted_set(&mut self, doc: DocId, field: &str, values: Vec<Vec<u8>>) -> Result<()> {
        let buffer = self.buffer(field, DocValuesType::SortedSet, || {
            DocValuesBuffer::SortedSet(Vec::new())
        })?;
        Self::check_order(buffer, field, doc)?;
        if let DocValuesBuffer::SortedSet(entries) = buffer {
            let mut values = values;
            values.sort();
            values.dedup();
            entries.push((doc, values));
        }
        Ok(())
    }

    /// Add a sorted-numeric value for `doc`. Values are sorted ascending,
    /// duplicates preserved.
    pub fn add_sorted_numeric(&mut self, doc: DocId, field: &str, values: Vec<i64>) -> Result<()> {
        let buffer = self.buffer(field, DocValuesType::SortedNumeric, || {
            DocValuesBuffer::SortedNumeric(Vec::new())
        })?;
        Self::check_order(buffer, field, doc)?;
        if let DocValuesBuffer::SortedNumeric(entries) = buffer {
            let mut values = values;
            values.sort();
            entries.push((doc, values));
        }
        Ok(())
    }

    /// Whether any values were buffered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flush buffered values to `<segment>.dvd`, returning the file name.
    pub fn flush(
        &self,
        storage: &Arc<dyn Storage>,
        segment_name: &str,
        context: IoContext,
    ) -> Result<String> {
        let file_name = format!("{segment_name}.{DOC_VALUES_EXTENSION}");
        let output = storage.create_output_with_context(&file_name, context)?;
        let mut writer = StructWriter::new(output);

        writer.write_u32(DOC_VALUES_MAGIC)?;
        writer.write_u16(DOC_VALUES_VERSION)?;

        // Skip fields that ended up with zero values so they read back as
        // absent rather than as empty stores.
        let live_fields: Vec<(&String, &DocValuesBuffer)> = self
            .fields
            .iter()
            .filter(|(_, buf)| buf.last_doc().is_some())
            .collect();

        writer.write_varint(live_fields.len() as u64)?;

        for (name, buffer) in live_fields {
            writer.write_string(name)?;
            match buffer {
                DocValuesBuffer::Numeric(values) => {
                    writer.write_u8(1)?;
                    writer.write_varint(values.len() as u64)?;
                    let mut prev_doc = 0i64;
                    for (doc, value) in values {
                        writer.write_varint((*doc as i64 - prev_doc) as u64)?;
                        prev_doc = *doc as i64;
                        writer.write_zigzag(*value)?;
                    }
                }
                DocValuesBuffer::Binary(values) => {
                    writer.write_u8(2)?;
                    writer.write_varint(values.len() as u64)?;
                    let mut prev_doc = 0i64;
                    for (doc, value) in values {
                        writer.write_varint((*doc as i64 - prev_doc) as u64)?;
                        prev_doc = *doc as i64;
                        writer.write_bytes(value)?;
                    }
                }
                DocValuesBuffer::Sorted(values) => {
                    writer.write_u8(3)?;
                    let dict = build_dictionary(values.iter().map(|(_, v)| v.as_slice()));
                    write_dictionary(&mut writer, &dict)?;

                    writer.write_varint(values.len() as u64)?;
                    let mut prev_doc = 0i64;
                    for (doc, value) in values {
                        writer.write_varint((*doc as i64 - prev_doc) as u64)?;
                        prev_doc = *doc as i64;
                        let ord = dict.binary_search_by(|d| d.as_slice().cmp(value)).unwrap();
                        writer.write_varint(ord as u64)?;
                    }
                }
                DocValuesBuffer::SortedSet(entries) => {
                    writer.write_u8(4)?;
                    let dict = build_dictionary(
                        entries
                            .iter()
                            .flat_map(|(_, vs)| vs.iter().map(|v| v.as_slice())),
                    );
                    write_dictionary(&mut writer, &dict)?;

                    writer.write_varint(entries.len() as u64)?;
                    let mut prev_doc = 0i64;
                    for (doc, values) in entries {
                        writer.write_varint((*doc as i64 - prev_doc) as u64)?;
                        prev_doc = *doc as i64;
                        writer.write_varint(values.len() as u64)?;
                        let mut prev_ord = 0u64;
                        for value in values {
                            let ord = dict
                                .binary_search_by(|d| d.as_slice().cmp(value))
                                .unwrap() as u64;
                            writer.write_varint(ord - prev_ord)?;
                            prev_ord = ord;
                        }
                    }
                }
                DocValuesBuffer::SortedNumeric(entries) => {
                    writer.write_u8(5)?;
                    writer.write_varint(entries.len() as u64)?;
                    let mut prev_doc = 0i64;
                    for (doc, values) in entries {
                        writer.write_varint((*doc as i64 - prev_doc) as u64)?;
                        prev_doc = *doc as i64;
                        writer.write_varint(values.len() as u64)?;
                        for value in values {
                            writer.write_zigzag(*value)?;
                        }
                    }
                }
            }
        }

        writer.close()?;
        Ok(file_name)
    }
}

fn build_dictionary<'a>(values: impl Iterator<Item = &'a [u8]>) -> Vec<Vec<u8>> {
    let mut dict: Vec<Vec<u8>> = values.map(|v| v.to_vec()).collect();
    dict.sort();
    dict.dedup();
    dict
}

fn write_dictionary<W: crate::storage::StorageOutput>(
    writer: &mut StructWriter<W>,
    dict: &[Vec<u8>],
) -> Result<()> {
    writer.write_varint(dict.len() as u64)?;
    for entry in dict {
        writer.write_bytes(entry)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageConfig};

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    #[test]
    fn test_type_conflict() {
        let mut writer = DocValuesWriter::new();
        writer.add_numeric(0, "price", 10).unwrap();

        let err = writer.add_sorted(1, "price", b"cheap".to_vec()).unwrap_err();
        assert!(matches!(err, PeltaError::SchemaConflict(_)));
        assert!(err.to_string().contains("NUMERIC"));
        assert!(err.to_string().contains("SORTED"));
    }

    #[test]
    fn test_docs_must_increase() {
        let mut writer = DocValuesWriter::new();
        writer.add_numeric(3, "n", 1).unwrap();
        assert!(writer.add_numeric(3, "n", 2).is_err());
        assert!(writer.add_numeric(1, "n", 2).is_err());
        writer.add_numeric(4, "n", 2).unwrap();
    }

    #[test]
    fn test_flush_writes_file() {
        let storage = storage();
        let mut writer = DocValuesWriter::new();
        writer.add_numeric(0, "year", 2024).unwrap();
        writer.add_sorted(0, "color", b"red".to_vec()).unwrap();
        writer
            .add_sorted_set(0, "tags", vec![b"b".to_vec(), b"a".to_vec(), b"a".to_vec()])
            .unwrap();
        writer.add_sorted_numeric(0, "sizes", vec![3, 1, 1]).unwrap();

        let file = writer.flush(&storage, "seg_0", IoContext::Flush).unwrap();
        assert_eq!(file, "seg_0.dvd");
        assert!(storage.file_exists("seg_0.dvd"));
    }

    #[test]
    fn test_empty_value_list_still_records_the_doc() {
        let storage = storage();
        let mut writer = DocValuesWriter::new();
        writer.add_sorted_set(0, "tags", vec![]).unwrap();
        writer.flush(&storage, "seg_z", IoContext::Flush).unwrap();

        let reader = crate::docvalues::DocValuesReader::open(&storage, "seg_z").unwrap();
        assert_eq!(
            crate::docvalues::DocValuesProducer::fields(&reader),
            vec!["tags".to_string()]
        );
    }
}
