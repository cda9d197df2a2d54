//! Approximate search quality and budget semantics.

use std::sync::Arc;

use pelta::document::Document;
use pelta::index::{IndexReader, IndexWriter, IndexWriterConfig};
use pelta::segment::VectorsFormat;
use pelta::storage::{MemoryStorage, Storage, StorageConfig};
use pelta::vector::{TotalHitsRelation, VectorSimilarity};

fn memory_storage() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new(StorageConfig::default()))
}

/// Deterministic pseudo-embeddings for "lines of text".
fn embedding(line: usize, dim: usize) -> Vec<f32> {
    let mut state = (line as u64)
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    (0..dim)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

fn build_embeddings(storage: &Arc<dyn Storage>, n: usize, dim: usize) {
    let mut writer = IndexWriter::open(storage.clone(), IndexWriterConfig::default()).unwrap();
    for line in 0..n {
        let mut doc = Document::new();
        doc.add_float_vector("emb", embedding(line, dim), VectorSimilarity::Cosine)
            .unwrap();
        writer.add_document(&doc).unwrap();
    }
    writer.close().unwrap();
}

/// Exact brute-force top-k over the stored vectors.
fn brute_force_top_k(
    storage: &Arc<dyn Storage>,
    query: &[f32],
    k: usize,
) -> Vec<i32> {
    let reader = IndexReader::open(storage).unwrap();
    let segment = &reader.leaves()[0];
    let vectors = segment.vectors().vectors("emb").unwrap();

    let mut scored: Vec<(i32, f32)> = (0..vectors.size())
        .map(|ord| {
            let v = vectors.vector_value(ord).unwrap();
            let score = VectorSimilarity::Cosine.score_f32(query, v).unwrap();
            (vectors.doc_for_ordinal(ord).unwrap(), score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.into_iter().take(k).map(|(doc, _)| doc).collect()
}

#[test]
fn recall_stays_within_configured_band() {
    let n = 300;
    let dim = 16;
    let k = 10;
    // Deployment-tunable band, deliberately loose for fast graphs
    let recall_floor = 0.3;

    let storage = memory_storage();
    build_embeddings(&storage, n, dim);
    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];

    let mut total_overlap = 0usize;
    let mut total_expected = 0usize;
    for q in 0..5 {
        let query = embedding(10_000 + q, dim);
        let exact = brute_force_top_k(&storage, &query, k);
        let approx = segment
            .search_nearest("emb", &query, k, usize::MAX)
            .unwrap();

        let overlap = approx
            .score_docs
            .iter()
            .filter(|sd| exact.contains(&sd.doc))
            .count();

        // Never zero for a well-formed query with >= k candidates, and
        // never more than 100% overlap by construction
        assert!(overlap > 0, "query {q}: zero overlap with exact top-k");
        assert!(overlap <= k);

        total_overlap += overlap;
        total_expected += k;
    }

    let recall = total_overlap as f32 / total_expected as f32;
    assert!(
        recall >= recall_floor,
        "recall {recall} fell below the configured floor {recall_floor}"
    );
    assert!(recall <= 1.0);
}

#[test]
fn visited_limit_produces_lower_bound_results() {
    let n = 200;
    let dim = 8;
    let k = 5;

    let storage = memory_storage();
    build_embeddings(&storage, n, dim);
    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];

    let query = embedding(99_999, dim);
    let visited_limit = k + 3;
    let top = segment
        .search_nearest("emb", &query, k, visited_limit)
        .unwrap();

    // More than k live vectors exist, so the tight budget cannot converge:
    // the count is a lower bound and never exceeds the budget
    assert_eq!(
        top.total_hits.relation,
        TotalHitsRelation::GreaterThanOrEqualTo
    );
    assert!(top.total_hits.value <= visited_limit as u64);
    assert!(top.score_docs.len() <= k);
}

#[test]
fn unlimited_budget_converges_exactly() {
    let storage = memory_storage();
    build_embeddings(&storage, 100, 8);
    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];

    let query = embedding(55_555, 8);
    let top = segment.search_nearest("emb", &query, 5, usize::MAX).unwrap();

    assert_eq!(top.total_hits.relation, TotalHitsRelation::EqualTo);
    assert_eq!(top.score_docs.len(), 5);

    // Scores are descending
    for pair in top.score_docs.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[test]
fn fewer_live_vectors_than_k_is_exact_and_exactly_sized() {
    let storage = memory_storage();
    build_embeddings(&storage, 3, 8);
    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];

    let query = embedding(7, 8);
    let top = segment.search_nearest("emb", &query, 10, 4).unwrap();

    assert_eq!(top.total_hits.relation, TotalHitsRelation::EqualTo);
    assert_eq!(top.total_hits.value, 3);
    assert_eq!(top.score_docs.len(), 3);
}

#[test]
fn deleted_vectors_are_filtered_from_results() {
    let storage = memory_storage();
    let mut writer = IndexWriter::open(storage.clone(), IndexWriterConfig::default()).unwrap();
    for line in 0..10 {
        let mut doc = Document::new();
        doc.add_float_vector("emb", embedding(line, 4), VectorSimilarity::Cosine)
            .unwrap();
        writer.add_document(&doc).unwrap();
    }
    writer.flush().unwrap();
    let segment_name = writer.segment_names()[0].clone();
    writer.delete_document(&segment_name, 0).unwrap();
    writer.delete_document(&segment_name, 1).unwrap();
    writer.close().unwrap();

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let top = segment
        .search_nearest("emb", &embedding(0, 4), 10, usize::MAX)
        .unwrap();

    assert_eq!(top.score_docs.len(), 8);
    assert!(top.score_docs.iter().all(|sd| sd.doc != 0 && sd.doc != 1));
}

#[test]
fn byte_vector_search_end_to_end() {
    let storage = memory_storage();
    let mut writer = IndexWriter::open(storage.clone(), IndexWriterConfig::default()).unwrap();
    for i in 0..6u8 {
        let mut doc = Document::new();
        doc.add_byte_vector("bv", vec![i, i.wrapping_mul(2), 1], VectorSimilarity::Euclidean)
            .unwrap();
        writer.add_document(&doc).unwrap();
    }
    writer.close().unwrap();

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let top = segment
        .vectors()
        .search_nearest_bytes("bv", &[2, 4, 1], 3, None, usize::MAX)
        .unwrap();

    assert_eq!(top.score_docs.len(), 3);
    assert_eq!(top.score_docs[0].doc, 2);
}
