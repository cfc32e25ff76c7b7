//! Document chunking.
//!
//! Splits raw text into overlapping windows whose edges prefer paragraph
//! breaks, then sentence ends, then word gaps. Positions are counted in
//! `char`s so multi-byte text is never cut inside a code point.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::config::ChunkingSettings;
use crate::core::errors::RagError;

/// A retrieval unit cut from one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Original document identifier (usually the uploaded file name).
    pub source: String,
    /// Position within `source`, contiguous from 0.
    pub index: usize,
    pub created_at: DateTime<Utc>,
}

impl Chunk {
    pub fn new(content: impl Into<String>, source: impl Into<String>, index: usize) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            index,
            created_at: Utc::now(),
        }
    }

    /// Identifier of the vector stored for this chunk.
    pub fn vector_id(&self) -> String {
        format!("{}_{}", self.source, self.index)
    }
}

const SENTENCE_ENDINGS: [[char; 2]; 6] = [
    ['.', ' '],
    ['!', ' '],
    ['?', ' '],
    ['.', '\n'],
    ['!', '\n'],
    ['?', '\n'],
];

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    target_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(target_size: usize, overlap: usize) -> Result<Self, RagError> {
        if target_size == 0 {
            return Err(RagError::validation("chunk size must be greater than zero"));
        }
        if overlap >= target_size {
            return Err(RagError::validation(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, target_size
            )));
        }
        Ok(Self {
            target_size,
            overlap,
        })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self, RagError> {
        Self::new(settings.chunk_size, settings.chunk_overlap)
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into chunks attributed to `source`.
    pub fn chunk(&self, text: &str, source: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.trim().chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let naive_end = start + self.target_size;
            let end = if naive_end < total {
                self.find_break(&chars, start, naive_end)
            } else {
                total
            };

            let piece: String = chars[start..end].iter().collect();
            let piece = piece.trim();
            if !piece.is_empty() {
                chunks.push(Chunk::new(piece, source, chunks.len()));
            }

            if end >= total {
                break;
            }

            // Never let the cursor stall or move backwards.
            let next = end.saturating_sub(self.overlap);
            start = if next > start { next } else { end };
        }

        chunks
    }

    /// Picks the cut position for a window `[start, naive_end)`. Matches at
    /// or before `start + target_size / 2` are ignored.
    fn find_break(&self, chars: &[char], start: usize, naive_end: usize) -> usize {
        let floor = start + self.target_size / 2;

        if let Some(pos) = rfind_seq(chars, start, naive_end, &['\n', '\n']) {
            if pos > floor {
                return pos;
            }
        }

        let sentence = SENTENCE_ENDINGS
            .iter()
            .filter_map(|ending| rfind_seq(chars, start, naive_end, ending))
            .filter(|pos| *pos > floor)
            .max();
        if let Some(pos) = sentence {
            // Keep the punctuation with the sentence it closes.
            return pos + 1;
        }

        if let Some(pos) = rfind_seq(chars, start, naive_end, &[' ']) {
            if pos > floor {
                return pos;
            }
        }

        naive_end
    }
}

impl Default for Chunker {
    fn default() -> Self {
        let settings = ChunkingSettings::default();
        Self {
            target_size: settings.chunk_size,
            overlap: settings.chunk_overlap,
        }
    }
}

/// Last position `p` in `[start, end)` where `pattern` fits entirely inside
/// the range.
fn rfind_seq(chars: &[char], start: usize, end: usize, pattern: &[char]) -> Option<usize> {
    let end = end.min(chars.len());
    if pattern.is_empty() || end < start + pattern.len() {
        return None;
    }
    (start..=end - pattern.len())
        .rev()
        .find(|&pos| chars[pos..pos + pattern.len()] == *pattern)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuilds the source text by appending each chunk's non-overlapping
    /// suffix.
    fn reassemble(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        for chunk in chunks {
            let content = chunk.content.as_str();
            let skip = (0..=content.len())
                .filter(|idx| content.is_char_boundary(*idx))
                .filter(|idx| out.ends_with(&content[..*idx]))
                .max()
                .unwrap_or(0);
            let rest = &content[skip..];
            let trimmed = rest.trim_start();
            if !out.is_empty() && !trimmed.is_empty() && (skip == 0 || trimmed.len() != rest.len())
            {
                out.push(' ');
            }
            out.push_str(trimmed);
        }
        out
    }

    fn normalize(text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn rejects_nonsensical_configuration() {
        assert!(matches!(Chunker::new(0, 0), Err(RagError::Validation(_))));
        assert!(matches!(Chunker::new(10, 10), Err(RagError::Validation(_))));
        assert!(Chunker::new(10, 9).is_ok());
    }

    #[test]
    fn empty_and_whitespace_input_yield_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("", "a.txt").is_empty());
        assert!(chunker.chunk("  \n\n\t ", "a.txt").is_empty());
    }

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        let chunker = Chunker::new(100, 10).expect("valid chunker");
        let chunks = chunker.chunk("  Total: $500, Vendor: Acme \n", "invoice.txt");

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, "Total: $500, Vendor: Acme");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].vector_id(), "invoice.txt_0");
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let chunker = Chunker::new(40, 0).expect("valid chunker");
        let text = "First paragraph is here. More.\n\nSecond paragraph follows on.";
        let chunks = chunker.chunk(text, "doc");

        assert_eq!(chunks[0].content, "First paragraph is here. More.");
        assert!(chunks[1].content.starts_with("Second paragraph"));
    }

    #[test]
    fn falls_back_to_sentence_then_word_boundaries() {
        let chunker = Chunker::new(30, 0).expect("valid chunker");
        let chunks = chunker.chunk("Alpha beta gamma. Delta epsilon zeta eta theta.", "doc");
        assert_eq!(chunks[0].content, "Alpha beta gamma.");

        let chunks = chunker.chunk("alpha beta gamma delta epsilon zeta eta theta", "doc");
        assert_eq!(chunks[0].content, "alpha beta gamma delta");
        assert!(chunks.iter().all(|c| !c.content.starts_with(' ')));
    }

    #[test]
    fn indices_are_contiguous_from_zero() {
        let chunker = Chunker::new(50, 10).expect("valid chunker");
        let text = "This is a test sentence. ".repeat(40);
        let chunks = chunker.chunk(&text, "doc");

        assert!(chunks.len() > 1);
        for (expected, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, expected);
            assert_eq!(chunk.source, "doc");
            assert!(!chunk.content.trim().is_empty());
        }
    }

    #[test]
    fn chunks_cover_the_whole_text_without_gaps() {
        let chunker = Chunker::new(60, 12).expect("valid chunker");
        let text = "Retrieval works on chunks. Each chunk overlaps its neighbour.\n\n\
                    The overlap keeps context that spans a boundary! Does it hold? \
                    It should, because every cut lands on whitespace or punctuation.";
        let chunks = chunker.chunk(text, "doc");

        assert_eq!(normalize(&reassemble(&chunks)), normalize(text));
    }

    #[test]
    fn terminates_when_no_boundary_exists_and_overlap_is_large() {
        let chunker = Chunker::new(10, 9).expect("valid chunker");
        let text = "a".repeat(1000);
        let chunks = chunker.chunk(&text, "doc");

        // The cursor advances one char per window.
        assert_eq!(chunks.len(), 991);
        assert!(chunks.iter().all(|c| c.content.len() == 10));
    }

    #[test]
    fn forced_advance_when_boundary_cut_is_shorter_than_overlap() {
        let chunker = Chunker::new(10, 9).expect("valid chunker");
        let text = "abcdef ghijklmnopqrstuvwxyz";
        let chunks = chunker.chunk(text, "doc");

        assert_eq!(chunks[0].content, "abcdef");
        assert!(chunks.len() < text.len());
        assert_eq!(chunks.last().map(|c| c.content.ends_with('z')), Some(true));
    }

    #[test]
    fn multibyte_text_is_not_split_inside_code_points() {
        let chunker = Chunker::new(8, 2).expect("valid chunker");
        let text = "日本語のテキストを分割します。次の文です。";
        let chunks = chunker.chunk(text, "jp");

        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.content.chars().count() <= 8));
    }
}
