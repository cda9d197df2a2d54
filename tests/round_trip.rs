//! Write-then-read round trips across every component.

use std::sync::Arc;

use pelta::docvalues::{
    BinaryDocValues, DocValuesIterator, DocValuesProducer, NumericDocValues, SortedDocValues,
    SortedNumericDocValues,
};
use pelta::document::{tokens_from_terms, Document, Token};
use pelta::field::{DocValuesType, IndexOptions, TermVectorOptions};
use pelta::index::{IndexReader, IndexWriter, IndexWriterConfig};
use pelta::postings::terms::{Terms, TermsEnum};
use pelta::postings::{flags, DocIdSetIterator, PostingsIterator, NO_MORE_DOCS};
use pelta::segment::VectorsFormat;
use pelta::storage::{FileStorage, MemoryStorage, Storage, StorageConfig};
use pelta::vector::VectorSimilarity;

fn memory_storage() -> Arc<dyn Storage> {
    Arc::new(MemoryStorage::new(StorageConfig::default()))
}

fn build_corpus(storage: &Arc<dyn Storage>) {
    let mut writer = IndexWriter::open(storage.clone(), IndexWriterConfig::default()).unwrap();

    let rows: &[(&str, i64, &str, &[&str])] = &[
        ("the quick brown fox", 2019, "red", &["animal", "fast"]),
        ("the lazy dog", 2020, "blue", &["animal"]),
        ("quick quick quick", 2021, "red", &["speech"]),
    ];

    for (i, (text, year, color, tags)) in rows.iter().enumerate() {
        let mut doc = Document::new();
        doc.add_tokens(
            "body",
            tokens_from_terms(&text.split(' ').collect::<Vec<_>>()),
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
            TermVectorOptions::full(),
        )
        .unwrap();
        doc.add_numeric("year", *year).unwrap();
        doc.add_sorted("color", color.as_bytes().to_vec()).unwrap();
        doc.add_sorted_set("tags", tags.iter().map(|t| t.as_bytes().to_vec()).collect())
            .unwrap();
        doc.add_sorted_numeric("scores", vec![3, 1, 3]).unwrap();
        doc.add_binary("raw", vec![i as u8; 4]).unwrap();
        doc.add_float_vector("emb", vec![i as f32, 1.0, 0.0], VectorSimilarity::Cosine)
            .unwrap();
        writer.add_document(&doc).unwrap();
    }

    writer.close().unwrap();
}

#[test]
fn field_descriptors_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let infos = segment.field_infos();

    let body = infos.field_info("body").unwrap();
    assert_eq!(
        body.index_options,
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    );
    assert!(body.term_vectors.stored);
    assert!(body.term_vectors.payloads);

    assert_eq!(
        infos.field_info("year").unwrap().doc_values_type,
        DocValuesType::Numeric
    );
    assert_eq!(
        infos.field_info("tags").unwrap().doc_values_type,
        DocValuesType::SortedSet
    );
    let emb = infos.field_info("emb").unwrap().vector_shape.unwrap();
    assert_eq!(emb.dimension, 3);
    assert_eq!(emb.similarity, VectorSimilarity::Cosine);
}

#[test]
fn term_statistics_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let terms = segment.terms("body").unwrap().unwrap();

    let mut te = terms.iterator().unwrap();
    assert!(te.seek_exact(b"quick").unwrap());
    assert_eq!(te.doc_freq().unwrap(), 2);
    assert_eq!(te.total_term_freq().unwrap(), 4);

    assert!(te.seek_exact(b"the").unwrap());
    assert_eq!(te.doc_freq().unwrap(), 2);
    assert_eq!(te.total_term_freq().unwrap(), 2);

    // Every term comes back, in lexicographic order
    let mut te = terms.iterator().unwrap();
    let mut collected = Vec::new();
    while let Some(term) = te.next().unwrap() {
        collected.push(String::from_utf8(term.to_vec()).unwrap());
    }
    let mut sorted = collected.clone();
    sorted.sort();
    assert_eq!(collected, sorted);
    assert_eq!(collected.len(), terms.size().unwrap() as usize);
}

#[test]
fn positions_and_offsets_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let terms = segment.terms("body").unwrap().unwrap();
    let mut te = terms.iterator().unwrap();
    te.seek_exact(b"brown").unwrap();

    let mut postings = te.postings(None, flags::ALL).unwrap();
    assert_eq!(postings.next_doc().unwrap(), 0);
    assert_eq!(postings.freq().unwrap(), 1);
    assert_eq!(postings.next_position().unwrap(), 2);
    // "the quick brown..." -> brown starts after "the quick "
    assert_eq!(postings.start_offset().unwrap(), 10);
    assert_eq!(postings.end_offset().unwrap(), 15);
}

#[test]
fn doc_values_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let dv = segment.doc_values();

    let mut years = dv.numeric("year").unwrap().unwrap();
    let mut got = Vec::new();
    loop {
        let doc = years.next_doc().unwrap();
        if doc == NO_MORE_DOCS {
            break;
        }
        got.push(years.long_value().unwrap());
    }
    assert_eq!(got, vec![2019, 2020, 2021]);

    let mut colors = dv.sorted("color").unwrap().unwrap();
    colors.next_doc().unwrap();
    let red_ord = colors.ord_value().unwrap();
    assert_eq!(colors.lookup_ord(red_ord).unwrap(), b"red");
    colors.next_doc().unwrap();
    assert_eq!(
        colors.lookup_ord(colors.ord_value().unwrap()).unwrap(),
        b"blue"
    );
    colors.next_doc().unwrap();
    assert_eq!(colors.ord_value().unwrap(), red_ord);

    let mut scores = dv.sorted_numeric("scores").unwrap().unwrap();
    scores.next_doc().unwrap();
    assert_eq!(scores.doc_value_count().unwrap(), 3);
    assert_eq!(scores.next_value().unwrap(), 1);
    assert_eq!(scores.next_value().unwrap(), 3);
    assert_eq!(scores.next_value().unwrap(), 3);

    let mut raw = dv.binary("raw").unwrap().unwrap();
    assert!(raw.advance_exact(2).unwrap());
    assert_eq!(raw.binary_value().unwrap(), &[2u8; 4]);
}

#[test]
fn term_vectors_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];

    let fields = segment.term_vector(2).unwrap().unwrap();
    let terms = fields.terms("body").unwrap();
    assert_eq!(terms.size().unwrap(), 1);
    assert_eq!(terms.doc_count().unwrap(), 1);

    let mut te = terms.iterator().unwrap();
    assert!(te.seek_exact(b"quick").unwrap());
    assert_eq!(te.total_term_freq().unwrap(), 3);

    let mut postings = te.postings(None, flags::ALL).unwrap();
    postings.next_doc().unwrap();
    assert_eq!(postings.freq().unwrap(), 3);
    assert_eq!(postings.next_position().unwrap(), 0);
    assert_eq!(postings.next_position().unwrap(), 1);
    assert_eq!(postings.next_position().unwrap(), 2);
}

#[test]
fn vectors_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let segment = &reader.leaves()[0];
    let vectors = segment.vectors().vectors("emb").unwrap();

    assert_eq!(vectors.size(), 3);
    assert_eq!(vectors.dimension(), 3);
    assert_eq!(vectors.vector_value(1).unwrap(), &[1.0, 1.0, 0.0]);
    assert_eq!(vectors.doc_for_ordinal(2).unwrap(), 2);
}

#[test]
fn payloads_round_trip() {
    let storage = memory_storage();
    let mut writer = IndexWriter::open(storage.clone(), IndexWriterConfig::default()).unwrap();

    let mut doc = Document::new();
    doc.add_tokens(
        "body",
        vec![
            Token::new(b"pay".to_vec())
                .with_offsets(0, 3)
                .with_payload(vec![9, 9]),
        ],
        IndexOptions::DocsAndFreqsAndPositionsAndOffsets,
        TermVectorOptions::default(),
    )
    .unwrap();
    writer.add_document(&doc).unwrap();
    writer.close().unwrap();

    let reader = IndexReader::open(&storage).unwrap();
    let terms = reader.leaves()[0].terms("body").unwrap().unwrap();
    let mut te = terms.iterator().unwrap();
    te.seek_exact(b"pay").unwrap();

    let mut postings = te.postings(None, flags::ALL).unwrap();
    postings.next_doc().unwrap();
    postings.next_position().unwrap();
    assert_eq!(postings.payload().unwrap(), Some(&[9u8, 9u8][..]));
}

#[test]
fn round_trip_survives_file_storage() {
    let dir = tempfile::TempDir::new().unwrap();
    let storage: Arc<dyn Storage> =
        Arc::new(FileStorage::new(dir.path(), StorageConfig::default()).unwrap());

    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    assert_eq!(reader.num_docs(), 3);
    assert!(reader.check().is_clean());

    let terms = reader.leaves()[0].terms("body").unwrap().unwrap();
    let mut te = terms.iterator().unwrap();
    assert!(te.seek_exact(b"fox").unwrap());
}

#[test]
fn consistency_checker_passes_round_trip() {
    let storage = memory_storage();
    build_corpus(&storage);

    let reader = IndexReader::open(&storage).unwrap();
    let report = reader.check();
    assert!(report.is_clean(), "errors: {:?}", report.all_errors());
}
