//! Exact cosine index persisted as a single JSON file per collection.
//!
//! Writers build the complete next state, persist it through a temp file in
//! the collection directory and rename it over `index.json`, then swap it in
//! memory. Readers therefore see either the old or the new entry set.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::anyhow;
use chrono::Utc;
use tempfile::NamedTempFile;

use ragdb_core::config::is_valid_collection;
use ragdb_core::traits::VectorIndex;
use ragdb_core::types::{Candidate, IndexEntry, Meta};
use ragdb_core::{Error, Result};

use crate::content_hash;
use crate::schema::{IndexFile, FORMAT_VERSION, INDEX_FILE};

#[derive(Debug, Default, Clone)]
struct State {
    dim: usize,
    meta: Meta,
    entries: Vec<IndexEntry>,
}

pub struct FlatIndex {
    dir: PathBuf,
    state: RwLock<State>,
}

impl FlatIndex {
    /// Open (or create) `<persist_dir>/<collection>`. A missing index file is
    /// an empty index; a present one is loaded and verified.
    pub fn open(persist_dir: &Path, collection: &str) -> Result<Self> {
        if !is_valid_collection(collection) {
            return Err(Error::InvalidConfig(format!("invalid collection name '{collection}'")));
        }
        let dir = persist_dir.join(collection);
        fs::create_dir_all(&dir)?;
        let path = dir.join(INDEX_FILE);
        let state = if path.exists() { load_state(&path)? } else { State::default() };
        tracing::info!(path = %dir.display(), entries = state.entries.len(), dim = state.dim, "Opened collection");
        Ok(Self { dir, state: RwLock::new(state) })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    pub fn index_path(&self) -> PathBuf { self.dir.join(INDEX_FILE) }

    /// Vector dimension, 0 while empty.
    pub fn dim(&self) -> anyhow::Result<usize> { Ok(self.read()?.dim) }

    fn read(&self) -> anyhow::Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("index lock poisoned"))
    }

    fn write(&self) -> anyhow::Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("index lock poisoned"))
    }

    fn persist(&self, state: &State) -> anyhow::Result<()> {
        let file = IndexFile {
            format_version: FORMAT_VERSION,
            dim: state.dim,
            updated_at: Utc::now().to_rfc3339(),
            meta: state.meta.clone(),
            entries: state.entries.clone(),
        };
        let bytes = serde_json::to_vec(&file)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.index_path()).map_err(|e| anyhow!("failed to replace index file: {}", e.error))?;
        tracing::debug!(entries = state.entries.len(), bytes = bytes.len(), "Persisted index");
        Ok(())
    }
}

fn load_state(path: &Path) -> Result<State> {
    let raw = fs::read_to_string(path)?;
    let file: IndexFile = serde_json::from_str(&raw)
        .map_err(|e| Error::Index(format!("{} is not a valid index file: {e}", path.display())))?;
    if file.format_version != FORMAT_VERSION {
        return Err(Error::Index(format!(
            "{} has format version {}, expected {FORMAT_VERSION}",
            path.display(),
            file.format_version
        )));
    }
    for entry in &file.entries {
        if entry.vector.len() != file.dim {
            return Err(Error::Index(format!(
                "entry '{}' has dimension {}, index dimension is {}",
                entry.id,
                entry.vector.len(),
                file.dim
            )));
        }
        if let Some(hash) = entry.metadata.get("content_hash") {
            if *hash != content_hash(&entry.text) {
                return Err(Error::Index(format!("entry '{}' failed its content hash check", entry.id)));
            }
        }
    }
    Ok(State { dim: file.dim, meta: file.meta, entries: file.entries })
}

/// `state` plus `entries`, after checking dimensions and id uniqueness.
fn with_entries(state: &State, entries: Vec<IndexEntry>) -> anyhow::Result<State> {
    let dim = if state.entries.is_empty() { entries.first().map_or(0, |e| e.vector.len()) } else { state.dim };
    if dim == 0 {
        return Err(anyhow!("cannot index empty vectors"));
    }
    let mut seen: HashSet<&str> = state.entries.iter().map(|e| e.id.as_str()).collect();
    for entry in &entries {
        if entry.vector.len() != dim {
            return Err(anyhow!("entry '{}' has dimension {}, expected {dim}", entry.id, entry.vector.len()));
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(anyhow!("duplicate entry id '{}'", entry.id));
        }
    }
    let mut next = state.clone();
    next.dim = dim;
    next.entries.extend(entries);
    Ok(next)
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0f32;
    let mut na = 0f32;
    let mut nb = 0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        return 1.0;
    }
    1.0 - dot / denom
}

/// Ascending distance, NaN last, ties by insertion order.
fn by_distance(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    match (a.1.is_nan(), b.1.is_nan()) {
        (false, false) => a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    }
    .then(a.0.cmp(&b.0))
}

impl VectorIndex for FlatIndex {
    fn count(&self) -> anyhow::Result<usize> { Ok(self.read()?.entries.len()) }

    fn add_batch(&self, entries: Vec<IndexEntry>) -> anyhow::Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut state = self.write()?;
        let next = with_entries(&state, entries)?;
        self.persist(&next)?;
        *state = next;
        tracing::info!(entries = state.entries.len(), "Committed batch");
        Ok(())
    }

    fn add_batch_if_empty(&self, entries: Vec<IndexEntry>, meta: &[(&str, &str)]) -> anyhow::Result<Option<usize>> {
        let mut state = self.write()?;
        if !state.entries.is_empty() {
            return Ok(Some(state.entries.len()));
        }
        let mut next = if entries.is_empty() { state.clone() } else { with_entries(&state, entries)? };
        for (key, value) in meta {
            next.meta.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&next)?;
        *state = next;
        tracing::info!(entries = state.entries.len(), "Committed initial batch");
        Ok(None)
    }

    fn query(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<Candidate>> {
        let state = self.read()?;
        if k == 0 || state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query_vec.len() != state.dim {
            return Err(anyhow!("query has dimension {}, index dimension is {}", query_vec.len(), state.dim));
        }
        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_distance(query_vec, &e.vector)))
            .collect();
        scored.sort_by(by_distance);
        scored.truncate(k);
        Ok(scored
            .into_iter()
            .map(|(i, distance)| {
                let e = &state.entries[i];
                Candidate { id: e.id.clone(), text: e.text.clone(), metadata: e.metadata.clone(), distance }
            })
            .collect())
    }

    fn get_meta(&self, key: &str) -> anyhow::Result<Option<String>> { Ok(self.read()?.meta.get(key).cloned()) }

    fn set_meta(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut state = self.write()?;
        let mut next = state.clone();
        next.meta.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_bounds() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[test]
    fn nan_sorts_last_and_ties_keep_order() {
        let mut v = vec![(0, f32::NAN), (1, 0.5), (2, 0.1), (3, 0.5)];
        v.sort_by(by_distance);
        let order: Vec<usize> = v.iter().map(|p| p.0).collect();
        assert_eq!(order, vec![2, 1, 3, 0]);
    }
}
