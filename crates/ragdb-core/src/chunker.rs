//! Separator-aware recursive chunking with character overlap.
//!
//! Text is cut with the coarsest separator that occurs in it (paragraph, line,
//! word, character), pieces that are still too long are cut again with the
//! finer separators, and the resulting pieces are merged greedily into chunks
//! of at most `chunk_size` characters. Separators stay attached to the piece
//! they terminate, so every chunk is an exact span of its document. Chunks
//! tile the document except for whitespace runs too long to fold into a
//! neighbouring chunk.

use std::collections::VecDeque;
use std::ops::Range;

use crate::config::ChunkingSettings;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunk_overlap ({chunk_overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    /// Chunk a batch of documents. `chunk_id` and `source_label` are numbered
    /// in emission order across the whole batch.
    pub fn chunk(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in documents {
            let spans = self.split_text(&doc.content);
            let offsets = CharOffsets::new(&doc.content);
            let total_chunks = spans.len();
            for (chunk_index, span) in spans.into_iter().enumerate() {
                let seq = chunks.len();
                chunks.push(Chunk {
                    chunk_id: format!("chunk_{seq}"),
                    doc_id: doc.doc_id.clone(),
                    source_label: format!("Source {}", seq + 1),
                    source_doc: doc.source_doc.clone(),
                    file_path: doc.file_path.clone(),
                    file_type: doc.file_type.clone(),
                    content: doc.content[span.clone()].to_string(),
                    chunk_index,
                    total_chunks,
                    start: offsets.char_index(span.start),
                    end: offsets.char_index(span.end),
                });
            }
        }
        tracing::info!(documents = documents.len(), chunks = chunks.len(), "Split documents into chunks");
        chunks
    }

    /// Byte spans of `text` forming its chunks, in order. A blank document
    /// has no chunks.
    pub fn split_text(&self, text: &str) -> Vec<Range<usize>> {
        let spans = self.split_recursive(text, 0..text.len(), &SEPARATORS);
        self.absorb_blank_spans(text, spans)
    }

    /// Drop whitespace-only spans and widen the remaining neighbours over the
    /// whitespace between them, as far as `chunk_size` allows. Any whitespace
    /// that still does not fit is left out of every chunk.
    fn absorb_blank_spans(&self, text: &str, spans: Vec<Range<usize>>) -> Vec<Range<usize>> {
        let mut kept: Vec<Range<usize>> = spans.into_iter().filter(|r| !text[r.clone()].trim().is_empty()).collect();
        if let Some(first) = kept.first_mut() {
            self.widen_start(text, first, 0);
        }
        for i in 0..kept.len() {
            let limit = kept.get(i + 1).map_or(text.len(), |next| next.start);
            self.widen_end(text, &mut kept[i], limit);
            let prev_end = kept[i].end;
            if let Some(next) = kept.get_mut(i + 1) {
                self.widen_start(text, next, prev_end);
            }
        }
        kept
    }

    fn room(&self, text: &str, span: &Range<usize>) -> usize {
        self.chunk_size.saturating_sub(char_len(text, span))
    }

    /// Move `span.end` forward toward `limit` by at most the remaining room.
    fn widen_end(&self, text: &str, span: &mut Range<usize>, limit: usize) {
        if limit <= span.end {
            return;
        }
        let room = self.room(text, span);
        span.end = match text[span.end..limit].char_indices().nth(room) {
            Some((i, _)) => span.end + i,
            None => limit,
        };
    }

    /// Move `span.start` back toward `limit` by at most the remaining room.
    fn widen_start(&self, text: &str, span: &mut Range<usize>, limit: usize) {
        if limit >= span.start {
            return;
        }
        let room = self.room(text, span);
        if let Some((i, _)) = text[limit..span.start].char_indices().rev().take(room).last() {
            span.start = limit + i;
        }
    }

    fn split_recursive(&self, text: &str, range: Range<usize>, separators: &[&str]) -> Vec<Range<usize>> {
        let segment = &text[range.clone()];
        let Some(pos) = separators.iter().position(|s| s.is_empty() || segment.contains(s)) else {
            return vec![range];
        };
        let finer = &separators[pos + 1..];

        let mut out = Vec::new();
        let mut fitting = Vec::new();
        for piece in tile(segment, separators[pos], range.start) {
            if char_len(text, &piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(text, &fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                out.push(piece);
            } else {
                out.extend(self.split_recursive(text, piece, finer));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(text, &fitting));
        }
        out
    }

    /// Greedy merge of consecutive pieces into windows of at most
    /// `chunk_size` characters, carrying up to `chunk_overlap` trailing
    /// characters into the next window.
    fn merge(&self, text: &str, pieces: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(text, piece);
            if total + len > self.chunk_size {
                if let Some(span) = window_span(&window) {
                    out.push(span);
                }
                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((piece.clone(), len));
            total += len;
        }
        if let Some(span) = window_span(&window) {
            out.push(span);
        }
        out
    }
}

/// Convenience wrapper matching the batch chunking contract.
pub fn chunk_documents(documents: &[Document], chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(chunk_size, chunk_overlap)?.chunk(documents))
}

fn window_span(window: &VecDeque<(Range<usize>, usize)>) -> Option<Range<usize>> {
    match (window.front(), window.back()) {
        (Some((first, _)), Some((last, _))) => Some(first.start..last.end),
        _ => None,
    }
}

/// Cut `segment` after every occurrence of `sep` (or into single characters
/// when `sep` is empty). Returned ranges are absolute (shifted by `base`).
fn tile(segment: &str, sep: &str, base: usize) -> Vec<Range<usize>> {
    if sep.is_empty() {
        return segment
            .char_indices()
            .map(|(i, c)| base + i..base + i + c.len_utf8())
            .collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in segment.match_indices(sep) {
        let end = idx + sep.len();
        pieces.push(base + start..base + end);
        start = end;
    }
    if start < segment.len() {
        pieces.push(base + start..base + segment.len());
    }
    pieces
}

fn char_len(text: &str, range: &Range<usize>) -> usize {
    text[range.clone()].chars().count()
}

/// Byte offset to character offset lookup for one document.
struct CharOffsets {
    boundaries: Vec<usize>,
}

impl CharOffsets {
    fn new(text: &str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        boundaries.push(text.len());
        Self { boundaries }
    }

    fn char_index(&self, byte: usize) -> usize {
        match self.boundaries.binary_search(&byte) {
            Ok(i) | Err(i) => i,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_keeps_separators_on_the_left() {
        let pieces = tile("a b  c", " ", 0);
        let text = "a b  c";
        let parts: Vec<&str> = pieces.iter().map(|r| &text[r.clone()]).collect();
        assert_eq!(parts, vec!["a ", "b ", " ", "c"]);
    }

    #[test]
    fn tile_characters_respects_utf8() {
        let text = "héllo";
        let pieces = tile(text, "", 0);
        assert_eq!(pieces.len(), 5);
        assert_eq!(&text[pieces[1].clone()], "é");
    }

    #[test]
    fn rejects_overlap_not_smaller_than_size() {
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn char_offsets_map_multibyte_text() {
        let offsets = CharOffsets::new("aé b");
        assert_eq!(offsets.char_index(0), 0);
        assert_eq!(offsets.char_index(1), 1);
        assert_eq!(offsets.char_index(3), 2);
        assert_eq!(offsets.char_index(5), 4);
    }
}
