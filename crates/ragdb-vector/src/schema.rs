//! On-disk layout of a collection: `<persist_dir>/<collection>/index.json`.

use serde::{Deserialize, Serialize};

use ragdb_core::types::{IndexEntry, Meta};

pub const FORMAT_VERSION: u32 = 1;
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexFile {
    pub format_version: u32,
    /// 0 while the index holds no entries.
    pub dim: usize,
    /// RFC 3339 time of the last write.
    pub updated_at: String,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}
