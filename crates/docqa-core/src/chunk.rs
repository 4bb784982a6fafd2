//! Overlapping, boundary-aware text chunker.
//!
//! Splits extracted document text into [`TextChunk`]s of at most
//! `chunk_size` characters, where each chunk after the first repeats the last
//! `chunk_overlap` characters of its predecessor. Lengths are counted in
//! `char`s, never bytes, so multi-byte text is never cut mid-character.
//!
//! # Algorithm
//!
//! 1. If the remaining text fits in `chunk_size`, it becomes the last chunk.
//! 2. Otherwise look for a break in the window
//!    `[start + max(overlap + 1, size / 2), start + size]`, scanning backwards
//!    from the far end, trying separators in priority order: paragraph
//!    (`\n\n`), line (`\n`), sentence (`. `, `! `, `? `), word (space, tab).
//!    The break lands right after the separator.
//! 3. With no separator in the window, hard-cut at `start + size`.
//! 4. The next chunk starts `overlap` characters before the break.
//!
//! Because the overlap is always exact, dropping the first `chunk_overlap`
//! characters of every chunk but the first and concatenating reconstructs the
//! input.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::Chunker;
//!
//! let chunker = Chunker::new(20, 5).unwrap();
//! let chunks = chunker.split("First sentence here. Second sentence here.");
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.text.chars().count() <= 20));
//! ```

use anyhow::{bail, Result};

use crate::models::TextChunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separator groups, highest priority first.
const SEPARATORS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" ", "\t"]];

/// Splits text into overlapping chunks. Cheap to copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// Creates a chunker. Requires `chunk_size > 0` and
    /// `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if chunk_overlap >= chunk_size {
            bail!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Split `text` into chunks with contiguous indices starting at 0.
    ///
    /// Empty input yields no chunks. No returned chunk is empty.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < total {
            let end = if total - start <= self.chunk_size {
                total
            } else {
                self.find_break(&chars, start)
            };

            chunks.push(TextChunk {
                index: chunks.len(),
                start,
                text: chars[start..end].iter().collect(),
            });

            if end == total {
                break;
            }
            // find_break never returns an end within overlap of start
            start = end - self.chunk_overlap;
        }

        chunks
    }

    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let hard_end = start + self.chunk_size;
        let min_end = start + (self.chunk_overlap + 1).max(self.chunk_size / 2);

        for group in SEPARATORS {
            let mut end = hard_end;
            while end >= min_end {
                if group.iter().any(|sep| ends_with_at(chars, end, sep)) {
                    return end;
                }
                end -= 1;
            }
        }

        hard_end
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

fn ends_with_at(chars: &[char], end: usize, sep: &str) -> bool {
    let sep_len = sep.chars().count();
    end >= sep_len && chars[end - sep_len..end].iter().copied().eq(sep.chars())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(chunks: &[TextChunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, c) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&c.text);
            } else {
                out.extend(c.text.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_text() -> String {
        (0..40)
            .map(|p| {
                let sentences: Vec<String> = (0..(p % 5 + 2))
                    .map(|s| format!("Paragraph {} sentence {} talks about topic {}.", p, s, p * s))
                    .collect();
                sentences.join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn test_empty_text_yields_no_chunks() {
        let chunks = Chunker::default().split("");
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = Chunker::default().split("Hello, world!");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_defaults() {
        let chunker = Chunker::default();
        assert_eq!(chunker.chunk_size(), 1000);
        assert_eq!(chunker.chunk_overlap(), 200);
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(100, 150).is_err());
        assert!(Chunker::new(100, 0).is_ok());
    }

    #[test]
    fn test_lossless_reconstruction() {
        let text = sample_text();
        for (size, overlap) in [(1000, 200), (120, 30), (50, 0), (37, 36), (10, 3)] {
            let chunks = Chunker::new(size, overlap).unwrap().split(&text);
            assert_eq!(
                reconstruct(&chunks, overlap),
                text,
                "reconstruction failed for size={} overlap={}",
                size,
                overlap
            );
        }
    }

    #[test]
    fn test_chunk_length_bounds_and_non_empty() {
        let text = sample_text();
        let chunks = Chunker::new(150, 40).unwrap().split(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            let len = c.text.chars().count();
            assert!(len > 0);
            assert!(len <= 150, "chunk {} has {} chars", c.index, len);
        }
    }

    #[test]
    fn test_consecutive_chunks_share_exact_overlap() {
        let text = sample_text();
        let overlap = 40;
        let chunks = Chunker::new(150, overlap).unwrap().split(&text);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].text.chars().collect();
            let next: Vec<char> = pair[1].text.chars().collect();
            assert_eq!(&prev[prev.len() - overlap..], &next[..overlap]);
            assert_eq!(pair[1].start, pair[0].start + prev.len() - overlap);
        }
    }

    #[test]
    fn test_indices_contiguous() {
        let chunks = Chunker::new(60, 10).unwrap().split(&sample_text());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b b b ".repeat(20));
        let chunks = Chunker::new(100, 10).unwrap().split(&text);
        assert_eq!(chunks[0].text, format!("{}\n\n", "a".repeat(60)));
    }

    #[test]
    fn test_prefers_sentence_over_word_boundary() {
        let text = format!("{}. {}", "word ".repeat(12).trim_end(), "tail ".repeat(30));
        let chunks = Chunker::new(80, 10).unwrap().split(&text);
        assert!(
            chunks[0].text.ends_with(". "),
            "first chunk should end at the sentence: {:?}",
            chunks[0].text
        );
    }

    #[test]
    fn test_word_boundary_before_hard_cut() {
        let text = "lorem ipsum dolor sit amet ".repeat(10);
        let chunks = Chunker::new(50, 5).unwrap().split(&text);
        assert!(chunks[0].text.ends_with(' '));
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(250);
        let chunks = Chunker::new(100, 20).unwrap().split(&text);
        assert_eq!(chunks[0].text.len(), 100);
        assert_eq!(chunks[1].start, 80);
        assert_eq!(reconstruct(&chunks, 20), text);
    }

    #[test]
    fn test_multibyte_text_counted_in_chars() {
        let text = "é漢字ü ".repeat(100);
        let chunks = Chunker::new(64, 16).unwrap().split(&text);
        for c in &chunks {
            assert!(c.text.chars().count() <= 64);
        }
        assert_eq!(reconstruct(&chunks, 16), text);
    }

    #[test]
    fn test_deterministic() {
        let text = sample_text();
        let chunker = Chunker::new(200, 50).unwrap();
        assert_eq!(chunker.split(&text), chunker.split(&text));
    }
}
