//! Domain types shared by the loader, chunker, index and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// One loaded unit of the corpus (a file, or one page of a paged file).
///
/// - `doc_id`: `"{file_stem}_{page}"`, stable across runs
/// - `source_doc`: file name shown to readers
/// - `file_type`: lower-case extension without the dot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub source_doc: String,
    pub file_path: String,
    pub file_type: String,
    pub page: usize,
    pub content: String,
}

impl Document {
    /// Convenience constructor for in-memory documents.
    pub fn from_text(name: &str, content: impl Into<String>) -> Self {
        let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);
        let file_type = name.rsplit_once('.').map(|(_, e)| e.to_lowercase()).unwrap_or_default();
        Self {
            doc_id: format!("{stem}_0"),
            source_doc: name.to_string(),
            file_path: name.to_string(),
            file_type,
            page: 0,
            content: content.into(),
        }
    }
}

/// A contiguous slice of a [`Document`] that is independently indexed.
///
/// `start`/`end` are character offsets into the document text; `content`
/// is exactly that span. `source_label` is the citation tag ("Source 3")
/// and is unique across one chunking batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub source_label: String,
    pub source_doc: String,
    pub file_path: String,
    pub file_type: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub start: usize,
    pub end: usize,
}

impl Chunk {
    /// Citation metadata persisted next to the vector.
    pub fn to_meta(&self) -> Meta {
        let mut meta = Meta::new();
        meta.insert("doc_id".into(), self.doc_id.clone());
        meta.insert("source_doc".into(), self.source_doc.clone());
        meta.insert("source_id".into(), self.source_label.clone());
        meta.insert("file_path".into(), self.file_path.clone());
        meta.insert("file_type".into(), self.file_type.clone());
        meta.insert("chunk_index".into(), self.chunk_index.to_string());
        meta.insert("total_chunks".into(), self.total_chunks.to_string());
        meta.insert("start".into(), self.start.to_string());
        meta.insert("end".into(), self.end.to_string());
        meta.insert("text".into(), self.content.clone());
        meta
    }
}

/// Stored row of a vector index. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: ChunkId,
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: Meta,
}

/// Stage-1 hit: cosine distance from the query, lower is closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub distance: f32,
}

/// Stage-2 hit. Only the reranker score survives; higher is better and
/// values are comparable only within one retrieval call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub rerank_score: f32,
}

impl RetrievalResult {
    pub fn source_label(&self) -> &str {
        self.metadata.get("source_id").map_or("", String::as_str)
    }

    pub fn source_doc(&self) -> &str {
        self.metadata.get("source_doc").map_or("", String::as_str)
    }

    pub fn doc_id(&self) -> &str {
        self.metadata.get("doc_id").map_or("", String::as_str)
    }
}
