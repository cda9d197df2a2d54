//! Multi-segment index writer.
//!
//! The single logical writer context of an index: buffers documents into an
//! in-flight segment, flushes on a size threshold, applies copy-on-write
//! deletions, and drives background merges through the policy and
//! scheduler. Merge failures are collected, never propagated into the
//! indexing path.

use ahash::AHashSet;
use parking_lot::Mutex;

use crate::document::Document;
use crate::error::{PeltaError, Result};
use crate::index::SegmentsManifest;
use crate::merge::{
    ForceMergePolicy, MergePolicy, MergeScheduler, MergeTask, SegmentMerger, SegmentStats,
    TieredMergePolicy,
};
use crate::postings::DocId;
use crate::segment::{SegmentMeta, SegmentReader, SegmentWriter};
use crate::storage::{IoContext, Storage};
use crate::util::bitset::LiveDocs;
use crate::vector::hnsw::HnswConfig;
use std::sync::Arc;

/// Configuration of the index writer.
#[derive(Debug, Clone)]
pub struct IndexWriterConfig {
    /// Documents buffered before an automatic flush.
    pub max_buffered_docs: usize,
    /// Graph construction/search parameters for vector fields.
    pub hnsw: HnswConfig,
    /// Worker threads for background merges.
    pub merge_workers: usize,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            max_buffered_docs: 1024,
            hnsw: HnswConfig::default(),
            merge_workers: 1,
        }
    }
}

/// A document's address after indexing: which segment, which local id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocAddress {
    /// Segment name the document landed in (fixed at flush time).
    pub segment: String,
    /// Segment-local document id.
    pub doc: DocId,
}

/// The single write path of an index.
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    config: IndexWriterConfig,
    merge_policy: Arc<dyn MergePolicy>,
    manifest: SegmentsManifest,
    metas: Vec<SegmentMeta>,
    current: Option<SegmentWriter>,
    scheduler: MergeScheduler,
    merging: AHashSet<String>,
    merge_failures: Mutex<Vec<String>>,
    closed: bool,
}

impl IndexWriter {
    /// Open (or create) an index in `storage`.
    pub fn open(storage: Arc<dyn Storage>, config: IndexWriterConfig) -> Result<Self> {
        Self::open_with_policy(storage, config, Arc::new(TieredMergePolicy::default()))
    }

    /// Open with a custom merge policy.
    pub fn open_with_policy(
        storage: Arc<dyn Storage>,
        config: IndexWriterConfig,
        merge_policy: Arc<dyn MergePolicy>,
    ) -> Result<Self> {
        let manifest = SegmentsManifest::load(&storage)?;
        let mut metas = Vec::with_capacity(manifest.segments.len());
        for name in &manifest.segments {
            metas.push(SegmentMeta::load(&storage, name)?);
        }

        let scheduler =
            MergeScheduler::new(Arc::clone(&storage), config.hnsw.clone(), config.merge_workers);

        Ok(IndexWriter {
            storage,
            config,
            merge_policy,
            manifest,
            metas,
            current: None,
            scheduler,
            merging: AHashSet::new(),
            merge_failures: Mutex::new(Vec::new()),
            closed: false,
        })
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed {
            Err(PeltaError::invalid_operation("index writer is closed"))
        } else {
            Ok(())
        }
    }

    fn next_segment_name(&mut self) -> String {
        let name = format!("seg_{}", self.manifest.next_segment);
        self.manifest.next_segment += 1;
        name
    }

    /// Add a document, returning its (future) address.
    ///
    /// Schema conflicts and malformed input fail synchronously and leave the
    /// writer usable for subsequent documents.
    pub fn add_document(&mut self, doc: &Document) -> Result<DocAddress> {
        self.check_closed()?;

        if self.current.is_none() {
            let name = self.next_segment_name();
            self.current = Some(SegmentWriter::new(
                Arc::clone(&self.storage),
                name,
                self.config.hnsw.clone(),
            ));
        }

        let writer = self.current.as_mut().unwrap();
        let doc_id = writer.add_document(doc)?;
        let address = DocAddress {
            segment: writer.name().to_string(),
            doc: doc_id,
        };

        if writer.doc_count() as usize >= self.config.max_buffered_docs {
            self.flush()?;
        }

        Ok(address)
    }

    /// Seal the in-flight segment (if it holds documents) and commit the
    /// manifest.
    pub fn flush(&mut self) -> Result<()> {
        self.check_closed()?;
        self.drain_merge_outcomes()?;

        if let Some(writer) = self.current.take() {
            if writer.doc_count() > 0 {
                let meta = writer.flush(IoContext::Flush)?;
                self.manifest.segments.push(meta.name.clone());
                self.metas.push(meta);
            }
        }

        self.commit_manifest()
    }

    fn commit_manifest(&mut self) -> Result<()> {
        self.manifest.generation += 1;
        self.manifest.write(&self.storage)
    }

    /// Mark one document dead: copy-on-write into a new liveness generation.
    /// Open readers keep the generation they pinned.
    pub fn delete_document(&mut self, segment_name: &str, doc: DocId) -> Result<()> {
        self.check_closed()?;

        let meta = self
            .metas
            .iter_mut()
            .find(|m| m.name == segment_name)
            .ok_or_else(|| {
                PeltaError::invalid_operation(format!("unknown segment \"{segment_name}\""))
            })?;

        let live = match meta.current_live_docs_file() {
            Some(file) => LiveDocs::load(&self.storage, &file)?,
            None => LiveDocs::all_live(meta.max_doc),
        };
        let live = live.with_deleted(doc as u32)?;

        let next_gen = meta.del_gen + 1;
        live.write(
            &self.storage,
            &SegmentMeta::live_docs_file_name(segment_name, next_gen),
        )?;
        meta.del_gen = next_gen;
        meta.write(&self.storage)?;
        self.commit_manifest()
    }

    fn segment_stats(&self) -> Result<Vec<SegmentStats>> {
        let mut stats = Vec::with_capacity(self.metas.len());
        for meta in &self.metas {
            let num_docs = match meta.current_live_docs_file() {
                Some(file) => LiveDocs::load(&self.storage, &file)?.live_count(),
                None => meta.max_doc,
            };
            stats.push(SegmentStats {
                name: meta.name.clone(),
                max_doc: meta.max_doc,
                num_docs,
                is_merging: self.merging.contains(&meta.name),
            });
        }
        Ok(stats)
    }

    /// Ask the policy for merges and dispatch them to the background
    /// scheduler. Returns how many merges were started.
    pub fn maybe_merge(&mut self) -> Result<usize> {
        self.check_closed()?;
        self.drain_merge_outcomes()?;

        let stats = self.segment_stats()?;
        let candidates = self.merge_policy.select_merges(&stats);

        let mut started = 0;
        for candidate in candidates {
            if candidate
                .segments
                .iter()
                .any(|name| self.merging.contains(name))
            {
                continue;
            }

            let mut inputs = Vec::with_capacity(candidate.segments.len());
            for name in &candidate.segments {
                inputs.push(SegmentReader::open_by_name(&self.storage, name)?);
            }
            let target_name = self.next_segment_name();
            for name in &candidate.segments {
                self.merging.insert(name.clone());
            }
            self.scheduler.submit(MergeTask {
                inputs,
                target_name,
            })?;
            started += 1;
        }
        Ok(started)
    }

    /// Collect finished background merges and commit their results.
    pub fn drain_merge_outcomes(&mut self) -> Result<()> {
        while let Some(outcome) = self.scheduler.try_poll() {
            self.apply_merge_outcome(outcome)?;
        }
        Ok(())
    }

    fn apply_merge_outcome(&mut self, outcome: crate::merge::MergeOutcome) -> Result<()> {
        for name in &outcome.input_names {
            self.merging.remove(name);
        }

        match outcome.result {
            Ok(merged_meta) => {
                // Swap inputs for the merged segment, then drop their files
                let mut removed = Vec::new();
                self.metas.retain(|m| {
                    if outcome.input_names.contains(&m.name) {
                        removed.push(m.clone());
                        false
                    } else {
                        true
                    }
                });
                self.manifest
                    .segments
                    .retain(|name| !outcome.input_names.contains(name));

                self.manifest.segments.push(merged_meta.name.clone());
                self.metas.push(merged_meta);
                self.commit_manifest()?;

                for meta in removed {
                    meta.delete_files(&self.storage)?;
                }
                Ok(())
            }
            Err(e) => {
                // A failed merge is reported, not propagated; indexing
                // continues unaffected
                self.merge_failures
                    .lock()
                    .push(format!("merge into {} failed: {e}", outcome.target_name));
                Ok(())
            }
        }
    }

    /// Errors collected from failed background merges.
    pub fn merge_failures(&self) -> Vec<String> {
        self.merge_failures.lock().clone()
    }

    /// Synchronously merge down to at most `max_segments` segments.
    pub fn force_merge(&mut self, max_segments: usize) -> Result<()> {
        self.check_closed()?;
        self.flush()?;

        // Wait out in-flight background merges first
        while !self.merging.is_empty() {
            let outcome = self.scheduler.wait_one()?;
            self.apply_merge_outcome(outcome)?;
        }

        let policy = ForceMergePolicy { max_segments };
        let merger = SegmentMerger::new(Arc::clone(&self.storage), self.config.hnsw.clone());

        loop {
            let stats = self.segment_stats()?;
            let Some(candidate) = policy.select_merges(&stats).into_iter().next() else {
                break;
            };

            let mut inputs = Vec::with_capacity(candidate.segments.len());
            for name in &candidate.segments {
                inputs.push(SegmentReader::open_by_name(&self.storage, name)?);
            }
            let target_name = self.next_segment_name();
            let merged_meta = merger.merge(&inputs, &target_name)?;

            let input_names = candidate.segments;
            let mut removed = Vec::new();
            self.metas.retain(|m| {
                if input_names.contains(&m.name) {
                    removed.push(m.clone());
                    false
                } else {
                    true
                }
            });
            self.manifest
                .segments
                .retain(|name| !input_names.contains(name));
            self.manifest.segments.push(merged_meta.name.clone());
            self.metas.push(merged_meta);
            self.commit_manifest()?;

            for meta in removed {
                meta.delete_files(&self.storage)?;
            }
        }

        Ok(())
    }

    /// Names of the committed segments.
    pub fn segment_names(&self) -> Vec<String> {
        self.manifest.segments.clone()
    }

    /// Total live documents across committed segments.
    pub fn num_docs(&self) -> Result<u64> {
        Ok(self
            .segment_stats()?
            .iter()
            .map(|s| s.num_docs as u64)
            .sum())
    }

    /// Flush, finish background merges, and close.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        while !self.merging.is_empty() {
            let outcome = self.scheduler.wait_one()?;
            self.apply_merge_outcome(outcome)?;
        }
        self.closed = true;
        Ok(())
    }
}
