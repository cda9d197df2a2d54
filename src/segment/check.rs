//! Whole-index consistency checking.
//!
//! Walks every component of every segment and reports structural errors
//! (stat mismatches, ordering violations, count disagreements) without
//! mutating anything. Segments are checked in parallel.

use rayon::prelude::*;

use crate::docvalues::{
    DocValuesProducer, SortedDocValues, SortedNumericDocValues, SortedSetDocValues,
    NO_MORE_ORDS,
};
use crate::error::Result;
use crate::postings::terms::{FieldsProducer, Terms, TermsEnum};
use crate::postings::{flags, DocIdSetIterator, PostingsIterator, NO_MORE_DOCS};
use crate::segment::codec::{TermVectorsFormat, VectorsFormat};
use crate::segment::reader::SegmentReader;
use std::sync::Arc;

/// Findings for one segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentCheckReport {
    /// Segment name.
    pub segment: String,
    /// Structural errors that make the segment unsafe to use.
    pub errors: Vec<String>,
    /// Suspicious but non-fatal observations.
    pub warnings: Vec<String>,
}

impl SegmentCheckReport {
    /// Whether the segment passed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Findings for a whole index.
#[derive(Debug, Clone, Default)]
pub struct CheckReport {
    /// Per-segment findings.
    pub segments: Vec<SegmentCheckReport>,
}

impl CheckReport {
    /// Whether every segment passed.
    pub fn is_clean(&self) -> bool {
        self.segments.iter().all(|s| s.is_clean())
    }

    /// All errors across segments, prefixed with the segment name.
    pub fn all_errors(&self) -> Vec<String> {
        self.segments
            .iter()
            .flat_map(|s| s.errors.iter().map(move |e| format!("{}: {e}", s.segment)))
            .collect()
    }
}

/// Check several opened segments in parallel.
pub fn check_segments(readers: &[Arc<SegmentReader>]) -> CheckReport {
    let segments = readers
        .par_iter()
        .map(|reader| check_segment(reader))
        .collect();
    CheckReport { segments }
}

/// Check one opened segment.
pub fn check_segment(reader: &SegmentReader) -> SegmentCheckReport {
    let mut report = SegmentCheckReport {
        segment: reader.meta().name.clone(),
        ..Default::default()
    };

    if let Err(e) = check_postings(reader, &mut report) {
        report.errors.push(format!("postings check aborted: {e}"));
    }
    if let Err(e) = check_doc_values(reader, &mut report) {
        report.errors.push(format!("doc values check aborted: {e}"));
    }
    if let Err(e) = check_term_vectors(reader, &mut report) {
        report
            .errors
            .push(format!("term vectors check aborted: {e}"));
    }
    if let Err(e) = check_vectors(reader, &mut report) {
        report.errors.push(format!("vectors check aborted: {e}"));
    }

    report
}

fn check_postings(reader: &SegmentReader, report: &mut SegmentCheckReport) -> Result<()> {
    for field in reader.postings().fields() {
        let Some(terms) = reader.postings().terms(&field)? else {
            continue;
        };

        let mut te = terms.iterator()?;
        let mut term_count = 0i64;
        let mut sum_doc_freq = 0u64;
        let mut sum_ttf = 0u64;
        let mut prev_term: Option<Vec<u8>> = None;

        while let Some(term) = te.next()? {
            let term = term.to_vec();
            if let Some(prev) = &prev_term {
                if *prev >= term {
                    report.errors.push(format!(
                        "field \"{field}\": terms out of order at {:?}",
                        String::from_utf8_lossy(&term)
                    ));
                }
            }
            prev_term = Some(term.clone());
            term_count += 1;

            let stated_doc_freq = te.doc_freq()?;
            let stated_ttf = te.total_term_freq()?;
            sum_doc_freq += stated_doc_freq as u64;
            sum_ttf += stated_ttf;

            let mut postings = te.postings(None, flags::FREQS)?;
            let mut seen_docs = 0u32;
            let mut seen_ttf = 0u64;
            let mut prev_doc = -1;
            loop {
                let doc = postings.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if doc <= prev_doc {
                    report.errors.push(format!(
                        "field \"{field}\" term {:?}: docs out of order ({doc} after {prev_doc})",
                        String::from_utf8_lossy(&term)
                    ));
                }
                if doc as u32 >= reader.max_doc() {
                    report.errors.push(format!(
                        "field \"{field}\" term {:?}: doc {doc} >= max_doc {}",
                        String::from_utf8_lossy(&term),
                        reader.max_doc()
                    ));
                }
                prev_doc = doc;
                seen_docs += 1;
                seen_ttf += postings.freq()? as u64;
            }

            if seen_docs != stated_doc_freq {
                report.errors.push(format!(
                    "field \"{field}\" term {:?}: doc_freq {stated_doc_freq} but {seen_docs} postings",
                    String::from_utf8_lossy(&term)
                ));
            }
            if terms.has_freqs() && seen_ttf != stated_ttf {
                report.errors.push(format!(
                    "field \"{field}\" term {:?}: total_term_freq {stated_ttf} but {seen_ttf} occurrences",
                    String::from_utf8_lossy(&term)
                ));
            }
        }

        if term_count != terms.size()? {
            report.errors.push(format!(
                "field \"{field}\": dictionary size {} but {term_count} terms iterated",
                terms.size()?
            ));
        }
        if sum_doc_freq != terms.sum_doc_freq()? {
            report.errors.push(format!(
                "field \"{field}\": sum_doc_freq {} but {sum_doc_freq} counted",
                terms.sum_doc_freq()?
            ));
        }
        if terms.has_freqs() && sum_ttf != terms.sum_total_term_freq()? {
            report.errors.push(format!(
                "field \"{field}\": sum_total_term_freq {} but {sum_ttf} counted",
                terms.sum_total_term_freq()?
            ));
        }
    }
    Ok(())
}

fn check_doc_values(reader: &SegmentReader, report: &mut SegmentCheckReport) -> Result<()> {
    let producer = reader.doc_values();
    for field in producer.fields() {
        // Probe each shape; exactly one should answer
        if let Some(mut it) = producer.numeric(&field).unwrap_or(None) {
            check_monotonic_docs(&field, &mut *it, reader.max_doc(), report)?;
        } else if let Some(mut it) = producer.binary(&field).unwrap_or(None) {
            check_monotonic_docs(&field, &mut *it, reader.max_doc(), report)?;
        } else if let Some(mut it) = producer.sorted(&field).unwrap_or(None) {
            let value_count = it.value_count() as i64;
            let mut prev_doc = -1;
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if doc <= prev_doc {
                    report
                        .errors
                        .push(format!("field \"{field}\": docs out of order at {doc}"));
                }
                prev_doc = doc;
                let ord = it.ord_value()?;
                if ord < 0 || ord >= value_count {
                    report.errors.push(format!(
                        "field \"{field}\": ordinal {ord} outside dictionary of {value_count}"
                    ));
                }
            }
        } else if let Some(mut it) = producer.sorted_set(&field).unwrap_or(None) {
            let value_count = it.value_count() as i64;
            let mut prev_doc = -1;
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if doc <= prev_doc {
                    report
                        .errors
                        .push(format!("field \"{field}\": docs out of order at {doc}"));
                }
                prev_doc = doc;

                let mut prev_ord = -1i64;
                loop {
                    let ord = it.next_ord()?;
                    if ord == NO_MORE_ORDS {
                        break;
                    }
                    if ord <= prev_ord {
                        report.errors.push(format!(
                            "field \"{field}\" doc {doc}: ordinals not ascending/deduplicated"
                        ));
                    }
                    if ord < 0 || ord >= value_count {
                        report.errors.push(format!(
                            "field \"{field}\" doc {doc}: ordinal {ord} outside dictionary"
                        ));
                    }
                    prev_ord = ord;
                }
            }
        } else if let Some(mut it) = producer.sorted_numeric(&field).unwrap_or(None) {
            let mut prev_doc = -1;
            loop {
                let doc = it.next_doc()?;
                if doc == NO_MORE_DOCS {
                    break;
                }
                if doc <= prev_doc {
                    report
                        .errors
                        .push(format!("field \"{field}\": docs out of order at {doc}"));
                }
                prev_doc = doc;

                let count = it.doc_value_count()?;
                let mut prev_value = i64::MIN;
                for _ in 0..count {
                    let value = it.next_value()?;
                    if value < prev_value {
                        report.errors.push(format!(
                            "field \"{field}\" doc {doc}: values not ascending"
                        ));
                    }
                    prev_value = value;
                }
            }
        } else {
            report
                .warnings
                .push(format!("field \"{field}\": listed but served by no shape"));
        }
    }
    Ok(())
}

fn check_monotonic_docs(
    field: &str,
    it: &mut (impl DocIdSetIterator + ?Sized),
    max_doc: u32,
    report: &mut SegmentCheckReport,
) -> Result<()> {
    let mut prev_doc = -1;
    loop {
        let doc = it.next_doc()?;
        if doc == NO_MORE_DOCS {
            break;
        }
        if doc <= prev_doc {
            report
                .errors
                .push(format!("field \"{field}\": docs out of order at {doc}"));
        }
        if doc as u32 >= max_doc {
            report
                .errors
                .push(format!("field \"{field}\": doc {doc} >= max_doc {max_doc}"));
        }
        prev_doc = doc;
    }
    Ok(())
}

fn check_term_vectors(reader: &SegmentReader, report: &mut SegmentCheckReport) -> Result<()> {
    for doc in reader.term_vectors().doc_ids() {
        if doc as u32 >= reader.max_doc() {
            report
                .errors
                .push(format!("term vectors: doc {doc} >= max_doc {}", reader.max_doc()));
            continue;
        }

        let Some(fields) = reader.term_vectors().get(doc)? else {
            report
                .errors
                .push(format!("term vectors: doc {doc} listed but unreadable"));
            continue;
        };

        for field in fields.fields() {
            let Some(terms) = fields.terms(&field) else {
                continue;
            };
            if terms.doc_count()? != 1 {
                report.errors.push(format!(
                    "term vectors doc {doc} field \"{field}\": doc_count must be 1"
                ));
            }
            let mut te = terms.iterator()?;
            while te.next()?.is_some() {
                let mut postings = te.postings(None, flags::FREQS)?;
                if postings.next_doc()? == NO_MORE_DOCS {
                    report.errors.push(format!(
                        "term vectors doc {doc} field \"{field}\": empty posting list"
                    ));
                }
            }
        }
    }
    Ok(())
}

fn check_vectors(reader: &SegmentReader, report: &mut SegmentCheckReport) -> Result<()> {
    for field in reader.vectors().field_names() {
        let Some(vectors) = reader.vectors().vectors(&field) else {
            continue;
        };

        let declared = reader
            .field_infos()
            .field_info(&field)
            .and_then(|fi| fi.vector_shape);
        if let Some(shape) = declared {
            if shape != vectors.shape() {
                report.errors.push(format!(
                    "field \"{field}\": stored shape {} disagrees with declared {shape}",
                    vectors.shape()
                ));
            }
        }

        let mut it = vectors.iterator();
        let mut seen = 0usize;
        let mut prev_doc = -1;
        loop {
            let doc = it.next_doc()?;
            if doc == NO_MORE_DOCS {
                break;
            }
            if doc <= prev_doc {
                report
                    .errors
                    .push(format!("field \"{field}\": vector docs out of order at {doc}"));
            }
            if doc as u32 >= reader.max_doc() {
                report
                    .errors
                    .push(format!("field \"{field}\": vector doc {doc} >= max_doc"));
            }
            prev_doc = doc;
            seen += 1;
        }

        if seen != vectors.size() {
            report.errors.push(format!(
                "field \"{field}\": store reports {} vectors but {seen} iterated",
                vectors.size()
            ));
        }
    }
    Ok(())
}
