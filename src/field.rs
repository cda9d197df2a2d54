//! Field descriptors.
//!
//! A [`FieldInfo`] pins down everything the codecs need to know about one
//! field: how it is inverted, which doc-values shape it carries, whether term
//! vectors are stored, and the vector shape (dimension, encoding, similarity)
//! if any. Descriptors are built incrementally while documents are added and
//! must converge to one consistent definition per field name within a
//! segment; an incompatible redefinition is a hard write-time error carrying
//! both the established and the conflicting shape.

use std::collections::BTreeMap;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{PeltaError, Result};
use crate::vector::{VectorEncoding, VectorSimilarity};

/// How (and whether) a field is inverted into the posting store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum IndexOptions {
    /// Not inverted.
    #[default]
    None,
    /// Doc ids only.
    Docs,
    /// Doc ids and term frequencies.
    DocsAndFreqs,
    /// Doc ids, frequencies and positions.
    DocsAndFreqsAndPositions,
    /// Doc ids, frequencies, positions and character offsets.
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    /// Whether term frequencies are recorded.
    pub fn has_freqs(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqs
    }

    /// Whether positions are recorded.
    pub fn has_positions(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqsAndPositions
    }

    /// Whether character offsets are recorded.
    pub fn has_offsets(&self) -> bool {
        *self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }

    /// Short stable name used in conflict messages.
    pub fn name(&self) -> &'static str {
        match self {
            IndexOptions::None => "NONE",
            IndexOptions::Docs => "DOCS",
            IndexOptions::DocsAndFreqs => "DOCS_AND_FREQS",
            IndexOptions::DocsAndFreqsAndPositions => "DOCS_AND_FREQS_AND_POSITIONS",
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets => {
                "DOCS_AND_FREQS_AND_POSITIONS_AND_OFFSETS"
            }
        }
    }
}

/// Which columnar value shape a field stores, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DocValuesType {
    /// No doc values.
    #[default]
    None,
    /// One i64 per document.
    Numeric,
    /// One byte string per document.
    Binary,
    /// One ordinal into a sorted byte-string dictionary per document.
    Sorted,
    /// A sorted, deduplicated set of ordinals per document.
    SortedSet,
    /// A sorted multiset of i64s per document (duplicates preserved).
    SortedNumeric,
}

impl DocValuesType {
    /// Short stable name used in conflict messages.
    pub fn name(&self) -> &'static str {
        match self {
            DocValuesType::None => "NONE",
            DocValuesType::Numeric => "NUMERIC",
            DocValuesType::Binary => "BINARY",
            DocValuesType::Sorted => "SORTED",
            DocValuesType::SortedSet => "SORTED_SET",
            DocValuesType::SortedNumeric => "SORTED_NUMERIC",
        }
    }
}

/// Term-vector storage flags for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TermVectorOptions {
    /// Store per-document term vectors at all.
    pub stored: bool,
    /// Record positions in the term vector.
    pub positions: bool,
    /// Record character offsets in the term vector.
    pub offsets: bool,
    /// Record payloads in the term vector.
    pub payloads: bool,
}

impl TermVectorOptions {
    /// Term vectors with terms and frequencies only.
    pub fn basic() -> Self {
        TermVectorOptions {
            stored: true,
            ..Default::default()
        }
    }

    /// Term vectors with positions, offsets and payloads.
    pub fn full() -> Self {
        TermVectorOptions {
            stored: true,
            positions: true,
            offsets: true,
            payloads: true,
        }
    }
}

/// The vector shape of a field: dimension, element encoding, similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorShape {
    /// Number of dimensions, >= 1.
    pub dimension: usize,
    /// Element encoding.
    pub encoding: VectorEncoding,
    /// Similarity function used at search time.
    pub similarity: VectorSimilarity,
}

impl std::fmt::Display for VectorShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "vector dimension={}, encoding={:?}, similarity={}",
            self.dimension,
            self.encoding,
            self.similarity.name()
        )
    }
}

/// Immutable description of one field within a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    /// Field name, unique within the segment.
    pub name: String,
    /// Dense per-segment field number.
    pub number: u32,
    /// Inversion options.
    pub index_options: IndexOptions,
    /// Doc-values shape.
    pub doc_values_type: DocValuesType,
    /// Whether the doc values carry a skip index.
    #[serde(default)]
    pub doc_values_skip_index: bool,
    /// Term-vector flags.
    pub term_vectors: TermVectorOptions,
    /// Dense vector shape, if the field stores vectors.
    pub vector_shape: Option<VectorShape>,
    /// Dimensions of point data, 0 when the field stores none.
    #[serde(default)]
    pub point_dimensions: u32,
    /// Marks the index's soft-deletes field.
    #[serde(default)]
    pub soft_deletes: bool,
    /// Marks the index's parent-document field.
    #[serde(default)]
    pub parent: bool,
    /// Free-form attributes.
    pub attributes: BTreeMap<String, String>,
}

impl FieldInfo {
    /// Create a descriptor with nothing enabled.
    pub fn new(name: impl Into<String>, number: u32) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options: IndexOptions::None,
            doc_values_type: DocValuesType::None,
            doc_values_skip_index: false,
            term_vectors: TermVectorOptions::default(),
            vector_shape: None,
            point_dimensions: 0,
            soft_deletes: false,
            parent: false,
            attributes: BTreeMap::new(),
        }
    }

    /// Whether the field is inverted.
    pub fn is_indexed(&self) -> bool {
        self.index_options != IndexOptions::None
    }

    /// Whether the field stores doc values.
    pub fn has_doc_values(&self) -> bool {
        self.doc_values_type != DocValuesType::None
    }

    /// Whether the field stores term vectors.
    pub fn has_term_vectors(&self) -> bool {
        self.term_vectors.stored
    }

    /// Whether the field stores dense vectors.
    pub fn has_vectors(&self) -> bool {
        self.vector_shape.is_some()
    }
}

/// The sealed collection of field descriptors for one segment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
}

impl FieldInfos {
    /// Build from descriptors already numbered densely.
    pub fn new(mut infos: Vec<FieldInfo>) -> Self {
        infos.sort_by_key(|fi| fi.number);
        FieldInfos { by_number: infos }
    }

    /// Look up a descriptor by name.
    pub fn field_info(&self, name: &str) -> Option<&FieldInfo> {
        self.by_number.iter().find(|fi| fi.name == name)
    }

    /// Look up a descriptor by number.
    pub fn field_info_by_number(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.iter().find(|fi| fi.number == number)
    }

    /// Iterate descriptors in field-number order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    /// True when no fields are defined.
    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Whether any field stores term vectors.
    pub fn has_term_vectors(&self) -> bool {
        self.by_number.iter().any(|fi| fi.has_term_vectors())
    }

    /// Whether any field stores doc values.
    pub fn has_doc_values(&self) -> bool {
        self.by_number.iter().any(|fi| fi.has_doc_values())
    }

    /// Whether any field stores dense vectors.
    pub fn has_vectors(&self) -> bool {
        self.by_number.iter().any(|fi| fi.has_vectors())
    }
}

/// Incremental builder that converges per-name definitions across documents.
#[derive(Debug, Default)]
pub struct FieldInfosBuilder {
    by_name: AHashMap<String, FieldInfo>,
    next_number: u32,
}

impl FieldInfosBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of descriptors (merge path).
    pub fn from_existing(infos: &FieldInfos) -> Self {
        let mut builder = FieldInfosBuilder::new();
        for fi in infos.iter() {
            builder.by_name.insert(fi.name.clone(), fi.clone());
            builder.next_number = builder.next_number.max(fi.number + 1);
        }
        builder
    }

    fn get_or_create(&mut self, name: &str) -> &mut FieldInfo {
        if !self.by_name.contains_key(name) {
            let number = self.next_number;
            self.next_number += 1;
            self.by_name
                .insert(name.to_string(), FieldInfo::new(name, number));
        }
        self.by_name.get_mut(name).unwrap()
    }

    /// Record that `name` is inverted with the given options.
    ///
    /// A later document may only repeat the same options; anything else is a
    /// schema conflict.
    pub fn add_indexed(&mut self, name: &str, options: IndexOptions) -> Result<()> {
        let fi = self.get_or_create(name);
        if fi.index_options == IndexOptions::None {
            fi.index_options = options;
            Ok(())
        } else if fi.index_options == options {
            Ok(())
        } else {
            Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{name}\" from index options={} to inconsistent index options={}",
                fi.index_options.name(),
                options.name()
            )))
        }
    }

    /// Record that `name` carries the given doc-values shape.
    pub fn add_doc_values(&mut self, name: &str, dv_type: DocValuesType) -> Result<()> {
        let fi = self.get_or_create(name);
        if fi.doc_values_type == DocValuesType::None {
            fi.doc_values_type = dv_type;
            Ok(())
        } else if fi.doc_values_type == dv_type {
            Ok(())
        } else {
            Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{name}\" from doc values type={} to inconsistent doc values type={}",
                fi.doc_values_type.name(),
                dv_type.name()
            )))
        }
    }

    /// Record that `name` stores term vectors with the given flags.
    pub fn add_term_vectors(&mut self, name: &str, options: TermVectorOptions) -> Result<()> {
        let fi = self.get_or_create(name);
        if !fi.term_vectors.stored {
            fi.term_vectors = options;
            Ok(())
        } else if fi.term_vectors == options {
            Ok(())
        } else {
            Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{name}\" from term vectors={:?} to inconsistent term vectors={:?}",
                fi.term_vectors, options
            )))
        }
    }

    /// Record that `name` stores dense vectors with the given shape.
    pub fn add_vector(&mut self, name: &str, shape: VectorShape) -> Result<()> {
        let fi = self.get_or_create(name);
        match fi.vector_shape {
            None => {
                fi.vector_shape = Some(shape);
                Ok(())
            }
            Some(existing) if existing == shape => Ok(()),
            Some(existing) => Err(PeltaError::schema_conflict(format!(
                "cannot change field \"{name}\" from {existing} to inconsistent {shape}"
            ))),
        }
    }

    /// Set a free-form attribute on `name`.
    pub fn put_attribute(&mut self, name: &str, key: &str, value: &str) {
        let fi = self.get_or_create(name);
        fi.attributes.insert(key.to_string(), value.to_string());
    }

    /// Look up the descriptor built so far for `name`.
    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name)
    }

    /// Seal a snapshot of the current state without consuming the builder.
    pub fn snapshot(&self) -> FieldInfos {
        FieldInfos::new(self.by_name.values().cloned().collect())
    }

    /// Seal the builder into an immutable set.
    pub fn finish(self) -> FieldInfos {
        FieldInfos::new(self.by_name.into_values().collect())
    }
}
