//! Overlapping word-window chunker.
//!
//! Splits normalized text into windows of `window` words where consecutive
//! windows share `overlap` words. Windows start at `0, step, 2·step, …` with
//! `step = window - overlap`; the last window may be shorter and is always
//! emitted. Boundaries are purely word-count based.
//!
//! Paragraph breaks survive inside a chunk: a word that opened a paragraph
//! is joined to its predecessor with [`PARAGRAPH_SEPARATOR`] instead of a
//! space.

use crate::error::ConfigError;
use crate::models::Chunk;
use crate::normalize::PARAGRAPH_SEPARATOR;

pub const DEFAULT_WINDOW_WORDS: usize = 500;
pub const DEFAULT_OVERLAP_WORDS: usize = 100;

/// Validated window/overlap pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW_WORDS,
            overlap: DEFAULT_OVERLAP_WORDS,
        }
    }
}

impl Chunker {
    pub fn new(window: usize, overlap: usize) -> Result<Self, ConfigError> {
        if window == 0 {
            return Err(ConfigError::invalid("chunking.window_words must be > 0"));
        }
        if overlap >= window {
            return Err(ConfigError::invalid(format!(
                "chunking.overlap_words ({}) must be < chunking.window_words ({})",
                overlap, window
            )));
        }
        Ok(Self { window, overlap })
    }

    fn step(&self) -> usize {
        self.window - self.overlap
    }

    /// Tokenize `text` once; the returned sequence can be iterated any
    /// number of times.
    pub fn split<'a>(&self, source_key: &'a str, text: &'a str) -> ChunkSequence<'a> {
        ChunkSequence {
            chunker: *self,
            source_key,
            words: tokenize(text),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Word<'a> {
    text: &'a str,
    starts_paragraph: bool,
}

fn tokenize(text: &str) -> Vec<Word<'_>> {
    let mut words = Vec::new();
    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        let mut first = true;
        for word in paragraph.split_whitespace() {
            words.push(Word {
                text: word,
                starts_paragraph: first,
            });
            first = false;
        }
    }
    words
}

/// A document's chunks, computed lazily from its word list.
#[derive(Debug, Clone)]
pub struct ChunkSequence<'a> {
    chunker: Chunker,
    source_key: &'a str,
    words: Vec<Word<'a>>,
}

impl<'a> ChunkSequence<'a> {
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of chunks [`iter`](Self::iter) yields.
    pub fn len(&self) -> usize {
        let words = self.words.len();
        if words == 0 {
            0
        } else if words <= self.chunker.window {
            1
        } else {
            (words - self.chunker.overlap).div_ceil(self.chunker.step())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Start a fresh pass over the chunks.
    pub fn iter(&self) -> Chunks<'_, 'a> {
        Chunks {
            seq: self,
            next_start: if self.words.is_empty() { None } else { Some(0) },
            index: 0,
        }
    }
}

impl<'s, 'a> IntoIterator for &'s ChunkSequence<'a> {
    type Item = Chunk;
    type IntoIter = Chunks<'s, 'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`ChunkSequence`].
#[derive(Debug, Clone)]
pub struct Chunks<'s, 'a> {
    seq: &'s ChunkSequence<'a>,
    next_start: Option<usize>,
    index: usize,
}

impl Iterator for Chunks<'_, '_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_start?;
        let total = self.seq.words.len();
        let end = (start + self.seq.chunker.window).min(total);

        self.next_start = if end == total {
            None
        } else {
            Some(start + self.seq.chunker.step())
        };

        let chunk = Chunk {
            source_key: self.seq.source_key.to_string(),
            index: self.index,
            start_word: start,
            end_word: end,
            text: join_words(&self.seq.words[start..end]),
        };
        self.index += 1;
        Some(chunk)
    }
}

fn join_words(words: &[Word<'_>]) -> String {
    let mut out = String::new();
    for (i, word) in words.iter().enumerate() {
        if i > 0 {
            out.push(if word.starts_paragraph {
                PARAGRAPH_SEPARATOR
            } else {
                ' '
            });
        }
        out.push_str(word.text);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn rejects_overlap_not_below_window() {
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(100, 150).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn twelve_hundred_words_three_windows() {
        let text = numbered_words(1200);
        let seq = Chunker::default().split("doc", &text);
        let spans: Vec<(usize, usize)> = seq.iter().map(|c| (c.start_word, c.end_word)).collect();
        assert_eq!(spans, vec![(0, 500), (400, 900), (800, 1200)]);
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn short_document_single_chunk() {
        let text = numbered_words(42);
        let chunks: Vec<Chunk> = Chunker::default().split("doc", &text).iter().collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].word_count(), 42);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn empty_document_no_chunks() {
        let seq = Chunker::default().split("doc", "  \n ");
        assert_eq!(seq.len(), 0);
        assert!(seq.is_empty());
        assert_eq!(seq.iter().count(), 0);
    }

    #[test]
    fn count_matches_formula_and_overlap_is_exact() {
        for (window, overlap) in [(5, 2), (10, 0), (7, 6), (500, 100)] {
            let chunker = Chunker::new(window, overlap).unwrap();
            for words in 1..60 {
                let text = numbered_words(words);
                let seq = chunker.split("doc", &text);
                let chunks: Vec<Chunk> = seq.iter().collect();

                let expected = if words <= window {
                    1
                } else {
                    (words - overlap).div_ceil(window - overlap)
                };
                assert_eq!(chunks.len(), expected, "W={} O={} L={}", window, overlap, words);
                assert_eq!(seq.len(), expected);

                for pair in chunks.windows(2) {
                    assert_eq!(pair[0].end_word - pair[1].start_word, overlap);
                }
                for c in &chunks {
                    assert!(c.word_count() <= window);
                }
                assert_eq!(chunks.last().unwrap().end_word, words);
            }
        }
    }

    #[test]
    fn indices_contiguous_and_restartable() {
        let text = numbered_words(50);
        let seq = Chunker::new(10, 3).unwrap().split("doc", &text);
        let first: Vec<Chunk> = seq.iter().collect();
        let second: Vec<Chunk> = (&seq).into_iter().collect();
        assert_eq!(first, second);
        for (i, c) in first.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.source_key, "doc");
        }
    }

    #[test]
    fn paragraph_breaks_kept_inside_chunks() {
        let text = "one two\nthree four\nfive";
        let chunks: Vec<Chunk> = Chunker::new(4, 1).unwrap().split("doc", text).iter().collect();
        assert_eq!(chunks[0].text, "one two\nthree four");
        assert_eq!(chunks[1].text, "four\nfive");
    }
}
