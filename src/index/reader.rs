//! Multi-segment index reader.
//!
//! A point-in-time snapshot over the committed manifest: once opened, its
//! segment set and per-segment content never change. Multiple threads may
//! share one reader; iterators, enums and scorers are per-caller.

use crate::error::Result;
use crate::index::SegmentsManifest;
use crate::segment::{check_segments, CheckReport, SegmentReader};
use crate::storage::Storage;
use crate::vector::TopDocs;
use std::sync::Arc;

/// A snapshot of a whole index.
pub struct IndexReader {
    segments: Vec<Arc<SegmentReader>>,
}

impl std::fmt::Debug for IndexReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexReader")
            .field("segments", &self.segments.len())
            .field("num_docs", &self.num_docs())
            .finish()
    }
}

impl IndexReader {
    /// Open the current committed segment set.
    pub fn open(storage: &Arc<dyn Storage>) -> Result<IndexReader> {
        let manifest = SegmentsManifest::load(storage)?;
        let mut segments = Vec::with_capacity(manifest.segments.len());
        for name in &manifest.segments {
            segments.push(SegmentReader::open_by_name(storage, name)?);
        }
        Ok(IndexReader { segments })
    }

    /// The per-segment readers, in manifest order.
    pub fn leaves(&self) -> &[Arc<SegmentReader>] {
        &self.segments
    }

    /// Documents across segments, live or deleted.
    pub fn max_doc(&self) -> u64 {
        self.segments.iter().map(|s| s.max_doc() as u64).sum()
    }

    /// Live documents across segments.
    pub fn num_docs(&self) -> u64 {
        self.segments.iter().map(|s| s.num_docs() as u64).sum()
    }

    /// Walk every component of every segment and report structural errors
    /// without mutating anything.
    pub fn check(&self) -> CheckReport {
        check_segments(&self.segments)
    }

    /// Budgeted nearest-neighbor search across all segments, each filtered
    /// by its own liveness snapshot. Returns per-segment results paired
    /// with the segment's position in [`IndexReader::leaves`].
    pub fn search_nearest(
        &self,
        field: &str,
        query: &[f32],
        k: usize,
        visited_limit: usize,
    ) -> Result<Vec<(usize, TopDocs)>> {
        let mut results = Vec::with_capacity(self.segments.len());
        for (ord, segment) in self.segments.iter().enumerate() {
            let top = segment.search_nearest(field, query, k, visited_limit)?;
            if !top.score_docs.is_empty() {
                results.push((ord, top));
            }
        }
        Ok(results)
    }
}
