//! Corpus loader: walk a data directory and turn supported files into
//! [`Document`]s with standardized metadata.
//!
//! PDFs yield one document per page and CSV files one per row. Text files
//! are split into pages on form feeds.
//!
//! A file that cannot be read or parsed is reported in [`LoadReport::failures`]
//! and skipped; the rest of the batch proceeds.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Document;

pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["pdf", "txt", "md", "csv", "json"];

/// Page separator emitted by common PDF-to-text exporters.
const PAGE_BREAK: char = '\x0c';

#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

pub fn load_documents(data_dir: &Path) -> Result<LoadReport> {
    if !data_dir.is_dir() {
        return Err(load_err(data_dir, "not a directory"));
    }
    let files = list_supported_files(data_dir);
    tracing::debug!(dir = %data_dir.display(), files = files.len(), "Found corpus files");

    let mut report = LoadReport::default();
    for path in files {
        match load_file(&path) {
            Ok(docs) => {
                tracing::debug!(path = %path.display(), pages = docs.len(), "Loaded file");
                report.documents.extend(docs);
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "Skipping unreadable file");
                let reason = match err {
                    Error::Load { reason, .. } => reason,
                    other => other.to_string(),
                };
                report.failures.push(LoadFailure { path, reason });
            }
        }
    }
    tracing::info!(documents = report.documents.len(), failed = report.failures.len(), "Loaded corpus");
    Ok(report)
}

/// Load one file into one document per page (or per row for CSV).
pub fn load_file(path: &Path) -> Result<Vec<Document>> {
    let file_type = extension_of(path).ok_or_else(|| load_err(path, "missing file extension"))?;
    let pages = match file_type.as_str() {
        "txt" | "md" => split_pages(&read_file_content(path)?),
        "json" => split_pages(&read_json_text(path)?),
        "pdf" => read_pdf_pages(path)?,
        "csv" => read_csv_rows(path)?,
        other => return Err(load_err(path, format!("unsupported file type '{other}'"))),
    };

    let stem = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let source_doc = path.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
    let docs = pages
        .into_iter()
        .enumerate()
        .map(|(page, content)| Document {
            doc_id: format!("{stem}_{page}"),
            source_doc: source_doc.clone(),
            file_path: path.to_string_lossy().to_string(),
            file_type: file_type.clone(),
            page,
            content,
        })
        .collect();
    Ok(docs)
}

fn load_err(path: &Path, reason: impl Into<String>) -> Error {
    Error::Load { path: path.to_path_buf(), reason: reason.into() }
}

fn split_pages(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK).map(str::to_string).collect()
}

/// Text of every page in page order. A page whose text cannot be extracted
/// is kept as an empty page so later page numbers stay aligned.
fn read_pdf_pages(path: &Path) -> Result<Vec<String>> {
    let doc = lopdf::Document::load(path).map_err(|e| load_err(path, format!("invalid PDF: {e}")))?;
    let pages = doc.get_pages();
    tracing::debug!(path = %path.display(), pages = pages.len(), "Extracting PDF text");

    let mut out = Vec::with_capacity(pages.len());
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => out.push(text),
            Err(e) => {
                tracing::warn!(path = %path.display(), page = page_num, error = %e, "Failed to extract page text");
                out.push(String::new());
            }
        }
    }
    Ok(out)
}

/// One `header: value` line per column for each data row.
fn read_csv_rows(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| load_err(path, e.to_string()))?;
    let headers = reader.headers().map_err(|e| load_err(path, format!("invalid CSV: {e}")))?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| load_err(path, format!("invalid CSV: {e}")))?;
        let lines: Vec<String> = headers
            .iter()
            .zip(record.iter())
            .map(|(name, value)| format!("{}: {}", name.trim(), value.trim()))
            .collect();
        rows.push(lines.join("\n"));
    }
    Ok(rows)
}

fn read_file_content(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| load_err(path, e.to_string()))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => Ok(String::from_utf8_lossy(e.as_bytes()).to_string()),
    }
}

fn read_json_text(path: &Path) -> Result<String> {
    let raw = read_file_content(path)?;
    let value: serde_json::Value =
        serde_json::from_str(&raw).map_err(|e| load_err(path, format!("invalid JSON: {e}")))?;
    let mut lines = Vec::new();
    collect_strings(&value, &mut lines);
    Ok(lines.join("\n"))
}

fn collect_strings(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension().and_then(|s| s.to_str()).map(str::to_lowercase)
}

fn list_supported_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if extension_of(path).is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str())) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}
