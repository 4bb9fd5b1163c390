use std::fs;
use std::sync::{Arc, Barrier};

use ragdb_core::chunker::chunk_documents;
use ragdb_core::traits::{Embedder, VectorIndex};
use ragdb_core::types::{Document, IndexEntry, Meta};
use ragdb_core::Error;
use ragdb_embed::HashEmbedder;
use ragdb_vector::{check_embedder, BuildOutcome, FlatIndex, IndexWriter};

fn entry(id: &str, vector: Vec<f32>) -> IndexEntry {
    IndexEntry { id: id.to_string(), vector, text: format!("text of {id}"), metadata: Meta::new() }
}

fn corpus() -> Vec<Document> {
    vec![
        Document::from_text("refunds.txt", "Refunds are issued within 7 days of receiving the returned item."),
        Document::from_text("shipping.txt", "Standard shipping takes 3 to 5 business days."),
        Document::from_text("leave.md", "Employees accrue 25 days of annual leave per year."),
    ]
}

#[test]
fn empty_index_queries_return_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let index = FlatIndex::open(tmp.path(), "empty").unwrap();
    assert_eq!(index.count().unwrap(), 0);
    assert!(index.query(&[1.0, 0.0], 5).unwrap().is_empty());
}

#[test]
fn query_orders_by_distance_and_clamps_k() {
    let tmp = tempfile::tempdir().unwrap();
    let index = FlatIndex::open(tmp.path(), "docs").unwrap();
    index
        .add_batch(vec![entry("far", vec![0.0, 1.0]), entry("near", vec![1.0, 0.1]), entry("exact", vec![1.0, 0.0])])
        .unwrap();

    let hits = index.query(&[1.0, 0.0], 10).unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["exact", "near", "far"]);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    assert_eq!(index.query(&[1.0, 0.0], 1).unwrap().len(), 1);
}

#[test]
fn equal_distances_keep_insertion_order() {
    let tmp = tempfile::tempdir().unwrap();
    let index = FlatIndex::open(tmp.path(), "ties").unwrap();
    index
        .add_batch(vec![entry("a", vec![1.0, 0.0]), entry("b", vec![2.0, 0.0]), entry("c", vec![3.0, 0.0])])
        .unwrap();
    let ids: Vec<String> = index.query(&[1.0, 0.0], 3).unwrap().into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
}

#[test]
fn rejects_dimension_mismatch_and_duplicates_atomically() {
    let tmp = tempfile::tempdir().unwrap();
    let index = FlatIndex::open(tmp.path(), "dims").unwrap();
    index.add_batch(vec![entry("a", vec![1.0, 0.0])]).unwrap();

    assert!(index.add_batch(vec![entry("b", vec![1.0, 0.0]), entry("c", vec![1.0, 0.0, 0.0])]).is_err());
    assert!(index.add_batch(vec![entry("a", vec![0.0, 1.0])]).is_err());
    assert_eq!(index.count().unwrap(), 1, "failed batches leave no partial entries");
    assert!(index.query(&[1.0, 0.0, 0.0], 1).is_err());
}

#[test]
fn content_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let index = FlatIndex::open(tmp.path(), "persisted").unwrap();
        index.add_batch(vec![entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])]).unwrap();
        index.set_meta("embedder_id", "hash-xxh64-2").unwrap();
    }
    let reopened = FlatIndex::open(tmp.path(), "persisted").unwrap();
    assert_eq!(reopened.count().unwrap(), 2);
    assert_eq!(reopened.dim().unwrap(), 2);
    assert_eq!(reopened.get_meta("embedder_id").unwrap().as_deref(), Some("hash-xxh64-2"));
    assert_eq!(reopened.query(&[0.0, 1.0], 1).unwrap()[0].id, "b");

    let other = FlatIndex::open(tmp.path(), "other").unwrap();
    assert_eq!(other.count().unwrap(), 0, "collections are independent");
}

#[test]
fn invalid_collection_name_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(matches!(FlatIndex::open(tmp.path(), "../up"), Err(Error::InvalidConfig(_))));
}

#[test]
fn corrupted_file_is_an_index_error() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("broken")).unwrap();
    fs::write(tmp.path().join("broken").join("index.json"), "{ truncated").unwrap();
    assert!(matches!(FlatIndex::open(tmp.path(), "broken"), Err(Error::Index(_))));
}

#[test]
fn tampered_text_fails_hash_check() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::new(32);
    let chunks = chunk_documents(&corpus(), 1000, 200).unwrap();
    {
        let index = FlatIndex::open(tmp.path(), "tamper").unwrap();
        IndexWriter::new(&index, &embedder).build(&chunks).unwrap();
    }
    let path = tmp.path().join("tamper").join("index.json");
    let raw = fs::read_to_string(&path).unwrap();
    fs::write(&path, raw.replacen("within 7 days", "within 70 days", 1)).unwrap();
    assert!(matches!(FlatIndex::open(tmp.path(), "tamper"), Err(Error::Index(_))));
}

#[test]
fn build_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::new(64);
    let chunks = chunk_documents(&corpus(), 1000, 200).unwrap();
    let index = FlatIndex::open(tmp.path(), "policy_docs").unwrap();

    let first = IndexWriter::new(&index, &embedder).with_batch_size(2).build(&chunks).unwrap();
    assert_eq!(first, BuildOutcome::Built { entries: chunks.len() });
    assert_eq!(index.count().unwrap(), chunks.len());

    let second = IndexWriter::new(&index, &embedder).build(&chunks).unwrap();
    assert_eq!(second, BuildOutcome::Skipped { existing: chunks.len() });
    assert_eq!(index.count().unwrap(), chunks.len());

    let hit = &index.query(&embedder.embed_query("annual leave days").unwrap(), 1).unwrap()[0];
    assert_eq!(hit.metadata.get("source_doc").map(String::as_str), Some("leave.md"));
    assert!(hit.metadata.contains_key("content_hash"));
    assert_eq!(hit.metadata.get("text"), Some(&hit.text));
}

/// Waits on a shared barrier before embedding, so concurrent builds are
/// both past their initial emptiness check before either one writes.
struct GatedEmbedder {
    inner: HashEmbedder,
    gate: Barrier,
}

impl Embedder for GatedEmbedder {
    fn embedder_id(&self) -> &str { self.inner.embedder_id() }
    fn dim(&self) -> usize { self.inner.dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.gate.wait();
        self.inner.embed_batch(texts)
    }
}

#[test]
fn concurrent_builds_commit_once() {
    let tmp = tempfile::tempdir().unwrap();
    let chunks = chunk_documents(&corpus(), 1000, 200).unwrap();
    let index = FlatIndex::open(tmp.path(), "racing").unwrap();
    let embedder = GatedEmbedder { inner: HashEmbedder::new(16), gate: Barrier::new(2) };

    let outcomes: Vec<BuildOutcome> = std::thread::scope(|s| {
        let runs: Vec<_> = (0..2)
            .map(|_| s.spawn(|| IndexWriter::new(&index, &embedder).with_batch_size(chunks.len()).build(&chunks)))
            .collect();
        runs.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
    });

    let n = chunks.len();
    assert!(outcomes.contains(&BuildOutcome::Built { entries: n }));
    assert!(outcomes.contains(&BuildOutcome::Skipped { existing: n }));
    assert_eq!(index.count().unwrap(), n);
}

#[test]
fn failed_initial_batch_records_no_meta() {
    let tmp = tempfile::tempdir().unwrap();
    let index = FlatIndex::open(tmp.path(), "atomic").unwrap();
    let meta = [("embedder_id", "hash-xxh64-2")];

    let dup = vec![entry("a", vec![1.0, 0.0]), entry("a", vec![0.0, 1.0])];
    assert!(index.add_batch_if_empty(dup, &meta).is_err());
    assert_eq!(index.get_meta("embedder_id").unwrap(), None);
    assert!(!index.index_path().exists());

    assert_eq!(index.add_batch_if_empty(vec![entry("a", vec![1.0, 0.0])], &meta).unwrap(), None);
    assert_eq!(index.add_batch_if_empty(vec![entry("b", vec![0.0, 1.0])], &meta).unwrap(), Some(1));

    let reopened = FlatIndex::open(tmp.path(), "atomic").unwrap();
    assert_eq!(reopened.count().unwrap(), 1);
    assert_eq!(reopened.get_meta("embedder_id").unwrap().as_deref(), Some("hash-xxh64-2"));
}

#[test]
fn empty_chunk_list_builds_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let embedder = HashEmbedder::new(8);
    let index = FlatIndex::open(tmp.path(), "none").unwrap();
    assert_eq!(IndexWriter::new(&index, &embedder).build(&[]).unwrap(), BuildOutcome::Built { entries: 0 });
    assert!(!index.index_path().exists());
}

#[test]
fn embedder_mismatch_is_detected() {
    let tmp = tempfile::tempdir().unwrap();
    let chunks = chunk_documents(&corpus(), 1000, 200).unwrap();
    let index = FlatIndex::open(tmp.path(), "mismatch").unwrap();
    let built_with = HashEmbedder::new(16);
    IndexWriter::new(&index, &built_with).build(&chunks).unwrap();

    assert!(check_embedder(&index, &built_with).is_ok());
    let err = check_embedder(&index, &HashEmbedder::new(32)).unwrap_err();
    assert!(matches!(err, Error::EmbedderMismatch { .. }));
}

#[test]
fn concurrent_readers_see_complete_batches() {
    let tmp = tempfile::tempdir().unwrap();
    let index = Arc::new(FlatIndex::open(tmp.path(), "concurrent").unwrap());
    index.add_batch((0..20).map(|i| entry(&format!("seed{i}"), vec![1.0, i as f32])).collect()).unwrap();

    std::thread::scope(|s| {
        let writer = Arc::clone(&index);
        s.spawn(move || {
            writer.add_batch((0..20).map(|i| entry(&format!("more{i}"), vec![0.0, 1.0 + i as f32])).collect()).unwrap();
        });
        for _ in 0..4 {
            let reader = Arc::clone(&index);
            s.spawn(move || {
                for _ in 0..50 {
                    let n = reader.count().unwrap();
                    assert!(n == 20 || n == 40, "observed partial batch: {n}");
                    assert!(!reader.query(&[1.0, 0.0], 5).unwrap().is_empty());
                }
            });
        }
    });
    assert_eq!(index.count().unwrap(), 40);
}
