//! Background merge scheduling.
//!
//! Merges run as independent units of work on a small worker pool fed by a
//! channel. Failures never propagate into the indexing path: each merge's
//! outcome, success or error, is reported on a result channel for the
//! caller to collect, and ongoing indexing continues unaffected.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::error::{PeltaError, Result};
use crate::merge::merger::SegmentMerger;
use crate::segment::{SegmentMeta, SegmentReader};
use crate::storage::Storage;
use crate::vector::hnsw::HnswConfig;

/// One merge unit of work.
pub struct MergeTask {
    /// Opened readers over the input segments.
    pub inputs: Vec<Arc<SegmentReader>>,
    /// Name of the merged segment to produce.
    pub target_name: String,
}

/// The reported result of one merge task.
pub struct MergeOutcome {
    /// The merge's target segment name.
    pub target_name: String,
    /// Names of the input segments.
    pub input_names: Vec<String>,
    /// The merged segment's metadata, or the failure.
    pub result: Result<SegmentMeta>,
}

/// Dispatches merge tasks to worker threads.
pub struct MergeScheduler {
    task_tx: Option<Sender<MergeTask>>,
    outcome_rx: Receiver<MergeOutcome>,
    workers: Vec<JoinHandle<()>>,
}

impl MergeScheduler {
    /// Start a scheduler with `num_workers` threads (0 picks a default from
    /// the machine's parallelism).
    pub fn new(storage: Arc<dyn Storage>, hnsw_config: HnswConfig, num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            (num_cpus::get() / 2).max(1)
        } else {
            num_workers
        };

        let (task_tx, task_rx) = unbounded::<MergeTask>();
        let (outcome_tx, outcome_rx) = unbounded::<MergeOutcome>();

        let mut workers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let task_rx = task_rx.clone();
            let outcome_tx = outcome_tx.clone();
            let merger = SegmentMerger::new(Arc::clone(&storage), hnsw_config.clone());

            workers.push(std::thread::spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    let input_names = task
                        .inputs
                        .iter()
                        .map(|r| r.meta().name.clone())
                        .collect();
                    let result = merger.merge(&task.inputs, &task.target_name);
                    let outcome = MergeOutcome {
                        target_name: task.target_name,
                        input_names,
                        result,
                    };
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }

        MergeScheduler {
            task_tx: Some(task_tx),
            outcome_rx,
            workers,
        }
    }

    /// Queue a merge for execution.
    pub fn submit(&self, task: MergeTask) -> Result<()> {
        match &self.task_tx {
            Some(tx) => tx
                .send(task)
                .map_err(|_| PeltaError::merge("merge scheduler is shut down")),
            None => Err(PeltaError::merge("merge scheduler is shut down")),
        }
    }

    /// Collect one finished merge without blocking.
    pub fn try_poll(&self) -> Option<MergeOutcome> {
        self.outcome_rx.try_recv().ok()
    }

    /// Block until one merge finishes.
    pub fn wait_one(&self) -> Result<MergeOutcome> {
        self.outcome_rx
            .recv()
            .map_err(|_| PeltaError::merge("merge scheduler is shut down"))
    }

    /// Stop accepting tasks, finish queued merges, and join the workers.
    /// Returns any outcomes still unreported.
    pub fn shutdown(mut self) -> Vec<MergeOutcome> {
        self.task_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        let mut pending = Vec::new();
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            pending.push(outcome);
        }
        pending
    }
}

impl Drop for MergeScheduler {
    fn drop(&mut self) {
        self.task_tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{tokens_from_terms, Document};
    use crate::field::{IndexOptions, TermVectorOptions};
    use crate::segment::SegmentWriter;
    use crate::storage::{IoContext, MemoryStorage, StorageConfig};

    fn storage() -> Arc<dyn Storage> {
        Arc::new(MemoryStorage::new(StorageConfig::default()))
    }

    fn flush_one(storage: &Arc<dyn Storage>, name: &str, term: &str) -> Arc<SegmentReader> {
        let mut writer = SegmentWriter::new(storage.clone(), name, HnswConfig::default());
        let mut doc = Document::new();
        doc.add_tokens(
            "body",
            tokens_from_terms(&[term]),
            IndexOptions::DocsAndFreqs,
            TermVectorOptions::default(),
        )
        .unwrap();
        writer.add_document(&doc).unwrap();
        let meta = writer.flush(IoContext::Flush).unwrap();
        SegmentReader::open(storage, meta).unwrap()
    }

    #[test]
    fn test_background_merge_succeeds() {
        let storage = storage();
        let scheduler = MergeScheduler::new(storage.clone(), HnswConfig::default(), 1);

        let inputs = vec![
            flush_one(&storage, "seg_a", "alpha"),
            flush_one(&storage, "seg_b", "beta"),
        ];
        scheduler
            .submit(MergeTask {
                inputs,
                target_name: "seg_m".to_string(),
            })
            .unwrap();

        let outcome = scheduler.wait_one().unwrap();
        assert_eq!(outcome.target_name, "seg_m");
        assert_eq!(outcome.input_names, vec!["seg_a", "seg_b"]);
        let meta = outcome.result.unwrap();
        assert_eq!(meta.max_doc, 2);
    }

    #[test]
    fn test_failed_merge_reported_not_propagated() {
        let storage = storage();
        let scheduler = MergeScheduler::new(storage.clone(), HnswConfig::default(), 1);

        // An empty input set is a merge error; it must arrive as an outcome
        scheduler
            .submit(MergeTask {
                inputs: vec![],
                target_name: "seg_bad".to_string(),
            })
            .unwrap();

        let outcome = scheduler.wait_one().unwrap();
        assert!(outcome.result.is_err());

        // The scheduler is still operational afterwards
        let inputs = vec![flush_one(&storage, "seg_a", "alpha")];
        scheduler
            .submit(MergeTask {
                inputs,
                target_name: "seg_ok".to_string(),
            })
            .unwrap();
        let outcome = scheduler.wait_one().unwrap();
        assert!(outcome.result.is_ok());
    }

    #[test]
    fn test_shutdown_drains() {
        let storage = storage();
        let scheduler = MergeScheduler::new(storage.clone(), HnswConfig::default(), 2);

        let inputs = vec![flush_one(&storage, "seg_a", "alpha")];
        scheduler
            .submit(MergeTask {
                inputs,
                target_name: "seg_m".to_string(),
            })
            .unwrap();

        let pending = scheduler.shutdown();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].result.is_ok());
    }
}
