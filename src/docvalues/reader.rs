//! Doc-values reader.
//!
//! Opens the `.dvd` file of a segment and serves the five doc-values shapes
//! through fresh, independent iterators. Sparse storage: each field holds
//! only the documents that have values, and iteration skips the gaps.

use std::collections::HashMap;
use std::sync::Arc;

use crate::docvalues::writer::{DOC_VALUES_EXTENSION, DOC_VALUES_MAGIC, DOC_VALUES_VERSION};
use crate::docvalues::{
    BinaryDocValues, DocValuesIterator, DocValuesProducer, NumericDocValues, SortedDocValues,
    SortedNumericDocValues, SortedSetDocValues, NO_MORE_ORDS,
};
use crate::error::{PeltaError, Result};
use crate::field::DocValuesType;
use crate::postings::terms::{enum_not_positioned, SeekStatus, TermsEnum};
use crate::postings::{DocId, DocIdSetIterator, PostingsIterator, NO_MORE_DOCS};
use crate::storage::{Storage, StructReader};

/// Sparse (doc, value) cursor shared by all five shapes.
#[derive(Debug)]
struct SparseCursor<T> {
    entries: Arc<Vec<(DocId, T)>>,
    /// -1 before the first doc, entries.len() when exhausted.
    idx: i64,
    /// Set when advance_exact landed on a doc without a value.
    exact_miss: Option<DocId>,
}

impl<T> SparseCursor<T> {
    fn new(entries: Arc<Vec<(DocId, T)>>) -> Self {
        SparseCursor {
            entries,
            idx: -1,
            exact_miss: None,
        }
    }

    fn doc_id(&self) -> DocId {
        if let Some(doc) = self.exact_miss {
            return doc;
        }
        if self.idx < 0 {
            -1
        } else if self.idx as usize >= self.entries.len() {
            NO_MORE_DOCS
        } else {
            self.entries[self.idx as usize].0
        }
    }

    fn next_doc(&mut self) -> DocId {
        self.exact_miss = None;
        if self.idx < self.entries.len() as i64 {
            self.idx += 1;
        }
        self.doc_id()
    }

    fn advance(&mut self, target: DocId) -> DocId {
        self.exact_miss = None;
        let start = ((self.idx + 1).max(0) as usize).min(self.entries.len());
        let offset = self.entries[start..]
            .binary_search_by(|(doc, _)| {
                if *doc < target {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            })
            .unwrap_err();
        self.idx = (start + offset) as i64;
        self.doc_id()
    }

    fn advance_exact(&mut self, target: DocId) -> bool {
        self.exact_miss = None;
        let start = ((self.idx + 1).max(0) as usize).min(self.entries.len());
        let offset = self.entries[start..]
            .binary_search_by(|(doc, _)| {
                if *doc < target {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Greater
                }
            })
            .unwrap_err();
        let landing = start + offset;
        if landing < self.entries.len() && self.entries[landing].0 == target {
            self.idx = landing as i64;
            true
        } else {
            // Park just before the landing spot so next_doc moves past target
            self.idx = landing as i64 - 1;
            self.exact_miss = Some(target);
            false
        }
    }

    fn current(&self) -> Result<&(DocId, T)> {
        if self.exact_miss.is_some() {
            return Err(PeltaError::illegal_state(
                "current document has no value for this field",
            ));
        }
        if self.idx < 0 || self.idx as usize >= self.entries.len() {
            return Err(PeltaError::illegal_state(
                "doc values iterator is not positioned on a document",
            ));
        }
        Ok(&self.entries[self.idx as usize])
    }

    fn cost(&self) -> u64 {
        self.entries.len() as u64
    }
}

macro_rules! delegate_doc_iter {
    ($ty:ty) => {
        impl DocIdSetIterator for $ty {
            fn doc_id(&self) -> DocId {
                self.cursor.doc_id()
            }

            fn next_doc(&mut self) -> Result<DocId> {
                self.reset_doc_state();
                Ok(self.cursor.next_doc())
            }

            fn advance(&mut self, target: DocId) -> Result<DocId> {
                self.reset_doc_state();
                Ok(self.cursor.advance(target))
            }

            fn cost(&self) -> u64 {
                self.cursor.cost()
            }
        }

        impl DocValuesIterator for $ty {
            fn advance_exact(&mut self, target: DocId) -> Result<bool> {
                self.reset_doc_state();
                Ok(self.cursor.advance_exact(target))
            }
        }
    };
}

/// Numeric shape iterator.
#[derive(Debug)]
pub struct NumericReader {
    cursor: SparseCursor<i64>,
}

impl NumericReader {
    fn new(entries: Arc<Vec<(DocId, i64)>>) -> Self {
        NumericReader {
            cursor: SparseCursor::new(entries),
        }
    }

    fn reset_doc_state(&mut self) {}
}

delegate_doc_iter!(NumericReader);

impl NumericDocValues for NumericReader {
    fn long_value(&self) -> Result<i64> {
        Ok(self.cursor.current()?.1)
    }
}

/// Binary shape iterator.
#[derive(Debug)]
pub struct BinaryReader {
    cursor: SparseCursor<Vec<u8>>,
}

impl BinaryReader {
    fn new(entries: Arc<Vec<(DocId, Vec<u8>)>>) -> Self {
        BinaryReader {
            cursor: SparseCursor::new(entries),
        }
    }

    fn reset_doc_state(&mut self) {}
}

delegate_doc_iter!(BinaryReader);

impl BinaryDocValues for BinaryReader {
    fn binary_value(&self) -> Result<&[u8]> {
        Ok(&self.cursor.current()?.1)
    }
}

/// Sorted shape iterator.
#[derive(Debug)]
pub struct SortedReader {
    cursor: SparseCursor<i64>,
    dict: Arc<Vec<Vec<u8>>>,
}

impl SortedReader {
    fn new(docs: Arc<Vec<(DocId, i64)>>, dict: Arc<Vec<Vec<u8>>>) -> Self {
        SortedReader {
            cursor: SparseCursor::new(docs),
            dict,
        }
    }

    fn reset_doc_state(&mut self) {}
}

delegate_doc_iter!(SortedReader);

impl SortedDocValues for SortedReader {
    fn ord_value(&self) -> Result<i64> {
        Ok(self.cursor.current()?.1)
    }

    fn lookup_ord(&self, ord: i64) -> Result<&[u8]> {
        lookup_in_dict(&self.dict, ord)
    }

    fn value_count(&self) -> u64 {
        self.dict.len() as u64
    }

    fn lookup_term(&self, key: &[u8]) -> Result<i64> {
        Ok(dict_lookup_term(&self.dict, key))
    }

    fn terms_enum(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(SortedDictEnum::new(Arc::clone(&self.dict))))
    }
}

/// Sorted-set shape iterator.
#[derive(Debug)]
pub struct SortedSetReader {
    cursor: SparseCursor<Vec<i64>>,
    dict: Arc<Vec<Vec<u8>>>,
    ord_upto: usize,
}

impl SortedSetReader {
    fn new(docs: Arc<Vec<(DocId, Vec<i64>)>>, dict: Arc<Vec<Vec<u8>>>) -> Self {
        SortedSetReader {
            cursor: SparseCursor::new(docs),
            dict,
            ord_upto: 0,
        }
    }

    fn reset_doc_state(&mut self) {
        self.ord_upto = 0;
    }
}

delegate_doc_iter!(SortedSetReader);

impl SortedSetDocValues for SortedSetReader {
    fn doc_value_count(&self) -> Result<usize> {
        Ok(self.cursor.current()?.1.len())
    }

    fn next_ord(&mut self) -> Result<i64> {
        let ords = &self.cursor.current()?.1;
        if self.ord_upto >= ords.len() {
            return Ok(NO_MORE_ORDS);
        }
        let ord = ords[self.ord_upto];
        self.ord_upto += 1;
        Ok(ord)
    }

    fn lookup_ord(&self, ord: i64) -> Result<&[u8]> {
        lookup_in_dict(&self.dict, ord)
    }

    fn value_count(&self) -> u64 {
        self.dict.len() as u64
    }

    fn lookup_term(&self, key: &[u8]) -> Result<i64> {
        Ok(dict_lookup_term(&self.dict, key))
    }

    fn terms_enum(&self) -> Result<Box<dyn TermsEnum>> {
        Ok(Box::new(SortedDictEnum::new(Arc::clone(&self.dict))))
    }
}

/// Sorted-numeric shape iterator.
#[derive(Debug)]
pub struct SortedNumericReader {
    cursor: SparseCursor<Vec<i64>>,
    value_upto: usize,
}

impl SortedNumericReader {
    fn new(docs: Arc<Vec<(DocId, Vec<i64>)>>) -> Self {
        SortedNumericReader {
            cursor: SparseCursor::new(docs),
            value_upto: 0,
        }
    }

    fn reset_doc_state(&mut self) {
        self.value_upto = 0;
    }
}

delegate_doc_iter!(SortedNumericReader);

impl SortedNumericDocValues for SortedNumericReader {
    fn doc_value_count(&self) -> Result<usize> {
        Ok(self.cursor.current()?.1.len())
    }

    fn next_value(&mut self) -> Result<i64> {
        let values = &self.cursor.current()?.1;
        if self.value_upto >= values.len() {
            return Err(PeltaError::illegal_state(format!(
                "next_value called more than doc_value_count={} times",
                values.len()
            )));
        }
        let value = values[self.value_upto];
        self.value_upto += 1;
        Ok(value)
    }
}

fn lookup_in_dict(dict: &[Vec<u8>], ord: i64) -> Result<&[u8]> {
    if ord < 0 || ord as usize >= dict.len() {
        return Err(PeltaError::invalid_operation(format!(
            "ordinal {ord} out of range for dictionary of {} entries",
            dict.len()
        )));
    }
    Ok(&dict[ord as usize])
}

fn dict_lookup_term(dict: &[Vec<u8>], key: &[u8]) -> i64 {
    match dict.binary_search_by(|entry| entry.as_slice().cmp(key)) {
        Ok(ord) => ord as i64,
        Err(insertion) => -(insertion as i64) - 1,
    }
}

/// Terms-enum view over a doc-values dictionary.
///
/// Supports ordered iteration and seeking; posting-level accessors are not
/// meaningful here and answer with an illegal-state error.
#[derive(Debug)]
pub struct SortedDictEnum {
    dict: Arc<Vec<Vec<u8>>>,
    pos: i64,
}

impl SortedDictEnum {
    fn new(dict: Arc<Vec<Vec<u8>>>) -> Self {
        SortedDictEnum { dict, pos: -1 }
    }

    fn current(&self) -> Result<&[u8]> {
        if self.pos < 0 || self.pos as usize >= self.dict.len() {
            return Err(enum_not_positioned());
        }
        Ok(&self.dict[self.pos as usize])
    }
}

impl TermsEnum for SortedDictEnum {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        let len = self.dict.len() as i64;
        if self.pos >= len {
            return Ok(None);
        }
        self.pos += 1;
        if self.pos >= len {
            Ok(None)
        } else {
            Ok(Some(&self.dict[self.pos as usize]))
        }
    }

    fn seek_exact(&mut self, term: &[u8]) -> Result<bool> {
        match self.dict.binary_search_by(|e| e.as_slice().cmp(term)) {
            Ok(idx) => {
                self.pos = idx as i64;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    fn seek_ceil(&mut self, term: &[u8]) -> Result<SeekStatus> {
        match self.dict.binary_search_by(|e| e.as_slice().cmp(term)) {
            Ok(idx) => {
                self.pos = idx as i64;
                Ok(SeekStatus::Found)
            }
            Err(insertion) => {
                if insertion >= self.dict.len() {
                    self.pos = self.dict.len() as i64;
                    Ok(SeekStatus::End)
                } else {
                    self.pos = insertion as i64;
                    Ok(SeekStatus::NotFound)
                }
            }
        }
    }

    fn term(&self) -> Result<&[u8]> {
        self.current()
    }

    fn ord(&self) -> Result<i64> {
        self.current()?;
        Ok(self.pos)
    }

    fn doc_freq(&self) -> Result<u32> {
        Err(PeltaError::illegal_state(
            "doc values terms enum does not track doc frequencies",
        ))
    }

    fn total_term_freq(&self) -> Result<u64> {
        Err(PeltaError::illegal_state(
            "doc values terms enum does not track term frequencies",
        ))
    }

    fn postings(
        &mut self,
        _reuse: Option<Box<dyn PostingsIterator>>,
        _flags: u32,
    ) -> Result<Box<dyn PostingsIterator>> {
        Err(PeltaError::illegal_state(
            "doc values terms enum does not expose postings",
        ))
    }
}

#[derive(Debug)]
enum FieldData {
    Numeric(Arc<Vec<(DocId, i64)>>),
    Binary(Arc<Vec<(DocId, Vec<u8>)>>),
    Sorted {
        dict: Arc<Vec<Vec<u8>>>,
        docs: Arc<Vec<(DocId, i64)>>,
    },
    SortedSet {
        dict: Arc<Vec<Vec<u8>>>,
        docs: Arc<Vec<(DocId, Vec<i64>)>>,
    },
    SortedNumeric(Arc<Vec<(DocId, Vec<i64>)>>),
}

impl FieldData {
    fn dv_type(&self) -> DocValuesType {
        match self {
            FieldData::Numeric(_) => DocValuesType::Numeric,
            FieldData::Binary(_) => DocValuesType::Binary,
            FieldData::Sorted { .. } => DocValuesType::Sorted,
            FieldData::SortedSet { .. } => DocValuesType::SortedSet,
            FieldData::SortedNumeric(_) => DocValuesType::SortedNumeric,
        }
    }
}

/// Decoded doc-values store of one segment. Implements [`DocValuesProducer`].
#[derive(Debug, Default)]
pub struct DocValuesReader {
    fields: HashMap<String, FieldData>,
}

impl DocValuesReader {
    /// An empty reader, for segments with no doc values.
    pub fn empty() -> Self {
        DocValuesReader::default()
    }

    /// Open and decode `<segment>.dvd`.
    pub fn open(storage: &Arc<dyn Storage>, segment_name: &str) -> Result<Self> {
        let file_name = format!("{segment_name}.{DOC_VALUES_EXTENSION}");
        if !storage.file_exists(&file_name) {
            return Ok(DocValuesReader::empty());
        }

        let input = storage.open_input(&file_name)?;
        let mut reader = StructReader::new(input)?;

        if reader.read_u32()? != DOC_VALUES_MAGIC {
            return Err(PeltaError::index(format!("{file_name}: bad magic")));
        }
        let version = reader.read_u16()?;
        if version != DOC_VALUES_VERSION {
            return Err(PeltaError::index(format!(
                "{file_name}: unsupported version {version}"
            )));
        }

        let num_fields = reader.read_varint()? as usize;
        let mut fields = HashMap::with_capacity(num_fields);

        for _ in 0..num_fields {
            let name = reader.read_string()?;
            let type_code = reader.read_u8()?;
            let data = match type_code {
                1 => {
                    let count = reader.read_varint()? as usize;
                    let mut entries = Vec::with_capacity(count);
                    let mut prev_doc = 0i64;
                    for _ in 0..count {
                        let doc = prev_doc + reader.read_varint()? as i64;
                        prev_doc = doc;
                        entries.push((doc as DocId, reader.read_zigzag()?));
                    }
                    FieldData::Numeric(Arc::new(entries))
                }
                2 => {
                    let count = reader.read_varint()? as usize;
                    let mut entries = Vec::with_capacity(count);
                    let mut prev_doc = 0i64;
                    for _ in 0..count {
                        let doc = prev_doc + reader.read_varint()? as i64;
                        prev_doc = doc;
                        entries.push((doc as DocId, reader.read_bytes()?));
                    }
                    FieldData::Binary(Arc::new(entries))
                }
                3 => {
                    let dict = read_dictionary(&mut reader)?;
                    let count = reader.read_varint()? as usize;
                    let mut docs = Vec::with_capacity(count);
                    let mut prev_doc = 0i64;
                    for _ in 0..count {
                        let doc = prev_doc + reader.read_varint()? as i64;
                        prev_doc = doc;
                        docs.push((doc as DocId, reader.read_varint()? as i64));
                    }
                    FieldData::Sorted {
                        dict: Arc::new(dict),
                        docs: Arc::new(docs),
                    }
                }
                4 => {
                    let dict = read_dictionary(&mut reader)?;
                    let count = reader.read_varint()? as usize;
                    let mut docs = Vec::with_capacity(count);
                    let mut prev_doc = 0i64;
                    for _ in 0..count {
                        let doc = prev_doc + reader.read_varint()? as i64;
                        prev_doc = doc;
                        let num_ords = reader.read_varint()? as usize;
                        let mut ords = Vec::with_capacity(num_ords);
                        let mut prev_ord = 0i64;
                        for _ in 0..num_ords {
                            let ord = prev_ord + reader.read_varint()? as i64;
                            prev_ord = ord;
                            ords.push(ord);
                        }
                        docs.push((doc as DocId, ords));
                    }
                    FieldData::SortedSet {
                        dict: Arc::new(dict),
                        docs: Arc::new(docs),
                    }
                }
                5 => {
                    let count = reader.read_varint()? as usize;
                    let mut docs = Vec::with_capacity(count);
                    let mut prev_doc = 0i64;
                    for _ in 0..count {
                        let doc = prev_doc + reader.read_varint()? as i64;
                        prev_doc = doc;
                        let num_values = reader.read_varint()? as usize;
                        let mut values = Vec::with_capacity(num_values);
                        for _ in 0..num_values {
                            values.push(reader.read_zigzag()?);
                        }
                        docs.push((doc as DocId, values));
                    }
                    FieldData::SortedNumeric(Arc::new(docs))
                }
                other => {
                    return Err(PeltaError::index(format!(
                        "{file_name}: unknown doc values type code {other}"
                    )));
                }
            };
            fields.insert(name, data);
        }

        if !reader.verify_checksum()? {
            return Err(PeltaError::index(format!("{file_name}: checksum mismatch")));
        }

        Ok(DocValuesReader { fields })
    }

    /// The stored shape of `field`, when present.
    pub fn dv_type(&self, field: &str) -> Option<DocValuesType> {
        self.fields.get(field).map(|d| d.dv_type())
    }

    fn wrong_type(field: &str, want: DocValuesType, have: DocValuesType) -> PeltaError {
        PeltaError::invalid_operation(format!(
            "field \"{field}\" stores doc values type={} but type={} was requested",
            have.name(),
            want.name()
        ))
    }
}

fn read_dictionary<R: crate::storage::StorageInput>(
    reader: &mut StructReader<R>,
) -> Result<Vec<Vec<u8>>> {
    let len = reader.read_varint()? as usize;
    let mut dict = Vec::with_capacity(len);
    for _ in 0..len {
        dict.push(reader.read_bytes()?);
    }
    Ok(dict)
}

impl DocValuesProducer for DocValuesReader {
    fn fields(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        names.sort();
        names
    }

    fn numeric(&self, field: &str) -> Result<Option<Box<dyn NumericDocValues>>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(FieldData::Numeric(entries)) => {
                Ok(Some(Box::new(NumericReader::new(Arc::clone(entries)))))
            }
            Some(other) => Err(Self::wrong_type(field, DocValuesType::Numeric, other.dv_type())),
        }
    }

    fn binary(&self, field: &str) -> Result<Option<Box<dyn BinaryDocValues>>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(FieldData::Binary(entries)) => {
                Ok(Some(Box::new(BinaryReader::new(Arc::clone(entries)))))
            }
            Some(other) => Err(Self::wrong_type(field, DocValuesType::Binary, other.dv_type())),
        }
    }

    fn sorted(&self, field: &str) -> Result<Option<Box<dyn SortedDocValues>>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(FieldData::Sorted { dict, docs }) => Ok(Some(Box::new(SortedReader::new(
                Arc::clone(docs),
                Arc::clone(dict),
            )))),
            Some(other) => Err(Self::wrong_type(field, DocValuesType::Sorted, other.dv_type())),
        }
    }

    fn sorted_set(&self, field: &str) -> Result<Option<Box<dyn SortedSetDocValues>>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(FieldData::SortedSet { dict, docs }) => Ok(Some(Box::new(
                SortedSetReader::new(Arc::clone(docs), Arc::clone(dict)),
            ))),
            Some(other) => Err(Self::wrong_type(
                field,
                DocValuesType::SortedSet,
                other.dv_type(),
            )),
        }
    }

    fn sorted_numeric(&self, field: &str) -> Result<Option<Box<dyn SortedNumericDocValues>>> {
        match self.fields.get(field) {
            None => Ok(None),
            Some(FieldData::SortedNumeric(docs)) => Ok(Some(Box::new(
                SortedNumericReader::new(Arc::clone(docs)),
            ))),
            Some(other) => Err(Self::wrong_type(
                field,
                DocValuesType::SortedNumeric,
                other.dv_type(),
            )),
        }
    }
}
