//! Persisted vector index and the build-or-skip index writer.

pub mod schema;
pub mod store;
pub mod writer;

pub use store::FlatIndex;
pub use writer::{check_embedder, BuildOutcome, IndexWriter, EMBEDDER_ID_KEY};

pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}
