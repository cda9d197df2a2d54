//! Write-time input model.
//!
//! The storage core does not tokenize anything itself: the analysis layer
//! hands it a per-field stream of [`Token`]s (term bytes, position increment,
//! offsets, optional payload) and a per-document map of field name to typed
//! value. [`Document`] is that map. Malformed input (duplicate single-valued
//! fields, empty vectors) is rejected here, before any write I/O happens.

use crate::error::{PeltaError, Result};
use crate::field::{IndexOptions, TermVectorOptions};
use crate::vector::VectorSimilarity;

/// One token from the analysis layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Term bytes.
    pub bytes: Vec<u8>,
    /// Position increment relative to the previous token (first token's
    /// increment is added to -1).
    pub position_increment: u32,
    /// Start character offset, or -1 when unknown.
    pub start_offset: i32,
    /// End character offset, or -1 when unknown.
    pub end_offset: i32,
    /// Optional payload bytes attached to this position.
    pub payload: Option<Vec<u8>>,
}

impl Token {
    /// A token one position after its predecessor, without offsets.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Token {
            bytes: bytes.into(),
            position_increment: 1,
            start_offset: -1,
            end_offset: -1,
            payload: None,
        }
    }

    /// Set the position increment.
    pub fn with_increment(mut self, increment: u32) -> Self {
        self.position_increment = increment;
        self
    }

    /// Set character offsets.
    pub fn with_offsets(mut self, start: i32, end: i32) -> Self {
        self.start_offset = start;
        self.end_offset = end;
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

/// Typed content of one field in one document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldContent {
    /// A token stream to invert.
    Tokens {
        /// The tokens, in stream order.
        tokens: Vec<Token>,
        /// Which posting features to record.
        options: IndexOptions,
        /// Which term-vector features to record.
        term_vectors: TermVectorOptions,
    },
    /// Single numeric doc value.
    Numeric(i64),
    /// Single binary doc value.
    Binary(Vec<u8>),
    /// Single sorted (ordinal dictionary) doc value.
    Sorted(Vec<u8>),
    /// Multi-valued sorted-set doc value.
    SortedSet(Vec<Vec<u8>>),
    /// Multi-valued sorted-numeric doc value.
    SortedNumeric(Vec<i64>),
    /// Dense f32 vector.
    FloatVector {
        /// The vector values; length is the field's dimension.
        values: Vec<f32>,
        /// Similarity function for this field.
        similarity: VectorSimilarity,
    },
    /// Dense byte vector.
    ByteVector {
        /// The vector values; length is the field's dimension.
        values: Vec<u8>,
        /// Similarity function for this field.
        similarity: VectorSimilarity,
    },
}

impl FieldContent {
    /// Whether at most one entry per (field, document) is legal.
    fn single_valued(&self) -> bool {
        !matches!(self, FieldContent::Tokens { .. })
    }

    fn kind(&self) -> &'static str {
        match self {
            FieldContent::Tokens { .. } => "tokens",
            FieldContent::Numeric(_) => "numeric doc value",
            FieldContent::Binary(_) => "binary doc value",
            FieldContent::Sorted(_) => "sorted doc value",
            FieldContent::SortedSet(_) => "sorted set doc value",
            FieldContent::SortedNumeric(_) => "sorted numeric doc value",
            FieldContent::FloatVector { .. } => "float vector",
            FieldContent::ByteVector { .. } => "byte vector",
        }
    }
}

/// One document to index: an ordered list of (field name, content) pairs.
#[derive(Debug, Clone, Default)]
pub struct Document {
    fields: Vec<(String, FieldContent)>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Document::default()
    }

    fn push(&mut self, name: &str, content: FieldContent) -> Result<()> {
        if content.single_valued() {
            if let Some((_, existing)) = self.fields.iter().find(|(n, c)| {
                n == name && std::mem::discriminant(c) == std::mem::discriminant(&content)
            }) {
                return Err(PeltaError::malformed(format!(
                    "field \"{name}\" already has a {} in this document",
                    existing.kind()
                )));
            }
        }
        self.fields.push((name.to_string(), content));
        Ok(())
    }

    /// Add a token stream for `name`. Multiple streams per name append.
    pub fn add_tokens(
        &mut self,
        name: &str,
        tokens: Vec<Token>,
        options: IndexOptions,
        term_vectors: TermVectorOptions,
    ) -> Result<()> {
        if options == IndexOptions::None {
            return Err(PeltaError::malformed(format!(
                "field \"{name}\": token streams require index options other than NONE"
            )));
        }
        self.push(
            name,
            FieldContent::Tokens {
                tokens,
                options,
                term_vectors,
            },
        )
    }

    /// Add a single numeric doc value.
    pub fn add_numeric(&mut self, name: &str, value: i64) -> Result<()> {
        self.push(name, FieldContent::Numeric(value))
    }

    /// Add a single binary doc value.
    pub fn add_binary(&mut self, name: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.push(name, FieldContent::Binary(value.into()))
    }

    /// Add a single sorted doc value.
    pub fn add_sorted(&mut self, name: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.push(name, FieldContent::Sorted(value.into()))
    }

    /// Add a sorted-set doc value (zero or more byte strings).
    pub fn add_sorted_set(&mut self, name: &str, values: Vec<Vec<u8>>) -> Result<()> {
        self.push(name, FieldContent::SortedSet(values))
    }

    /// Add a sorted-numeric doc value (zero or more i64s, duplicates kept).
    pub fn add_sorted_numeric(&mut self, name: &str, values: Vec<i64>) -> Result<()> {
        self.push(name, FieldContent::SortedNumeric(values))
    }

    /// Add a dense f32 vector.
    pub fn add_float_vector(
        &mut self,
        name: &str,
        values: Vec<f32>,
        similarity: VectorSimilarity,
    ) -> Result<()> {
        if values.is_empty() {
            return Err(PeltaError::malformed(format!(
                "field \"{name}\": vector must have dimension >= 1"
            )));
        }
        self.push(name, FieldContent::FloatVector { values, similarity })
    }

    /// Add a dense byte vector.
    pub fn add_byte_vector(
        &mut self,
        name: &str,
        values: Vec<u8>,
        similarity: VectorSimilarity,
    ) -> Result<()> {
        if values.is_empty() {
            return Err(PeltaError::malformed(format!(
                "field \"{name}\": vector must have dimension >= 1"
            )));
        }
        self.push(name, FieldContent::ByteVector { values, similarity })
    }

    /// Iterate (field name, content) pairs in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldContent)> {
        self.fields.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Number of field entries.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields were added.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Build a position-incrementing token stream from pre-analyzed terms.
///
/// Convenience for callers that already hold analyzed terms; offsets are
/// synthesized as if terms were space-joined.
pub fn tokens_from_terms<S: AsRef<str>>(terms: &[S]) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(terms.len());
    let mut offset = 0i32;
    for term in terms {
        let term = term.as_ref();
        let len = term.len() as i32;
        tokens.push(Token::new(term.as_bytes().to_vec()).with_offsets(offset, offset + len));
        offset += len + 1;
    }
    tokens
}
