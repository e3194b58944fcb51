//! Text chunking with overlap and document offset tracking

use unicode_segmentation::UnicodeSegmentation;

use crate::error::{Error, Result};
use crate::types::{Chunk, PageText};

/// A whitespace-delimited unit of text, never split across chunks
#[derive(Debug, Clone, Copy)]
struct Word {
    byte_start: usize,
    byte_end: usize,
    char_start: usize,
    char_end: usize,
}

/// Text chunker with configurable size and overlap
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Target chunk size in characters
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Overlap in characters
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk every page in order; chunk indices run across pages
    pub fn chunk_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            self.chunk_page_into(page, &mut chunks);
        }
        chunks
    }

    /// Chunk a single text as page 1
    pub fn chunk_text(&self, text: &str) -> Vec<Chunk> {
        let page = PageText {
            page_number: 1,
            content: text.to_string(),
            char_offset: 0,
        };
        self.chunk_pages(std::slice::from_ref(&page))
    }

    fn chunk_page_into(&self, page: &PageText, chunks: &mut Vec<Chunk>) {
        let text = page.content.as_str();
        let words = split_words(text);
        if words.is_empty() {
            return;
        }

        let span = |from: usize, to: usize| words[to].char_end - words[from].char_start;
        let last = words.len() - 1;
        let mut start = 0usize;

        loop {
            // Grow while the chunk stays within size; an oversize word stands alone
            let mut end = start;
            while end < last && span(start, end + 1) <= self.chunk_size {
                end += 1;
            }

            chunks.push(Chunk {
                text: text[words[start].byte_start..words[end].byte_end].to_string(),
                source_offset: page.char_offset + words[start].char_start,
                page_number: page.page_number,
                index: chunks.len() as u32,
            });

            if end == last {
                break;
            }

            // Restart at the earliest word whose tail fits in the overlap and
            // still leaves room for the next word
            start = (start + 1..=end)
                .find(|&j| span(j, end) <= self.overlap && span(j, end + 1) <= self.chunk_size)
                .unwrap_or(end + 1);
        }
    }
}

/// Split text into words using Unicode word boundaries, merging adjacent
/// non-whitespace segments so punctuation stays attached to its word
fn split_words(text: &str) -> Vec<Word> {
    let mut words: Vec<Word> = Vec::new();
    let mut char_pos = 0usize;
    let mut previous_was_word = false;

    for (byte_start, segment) in text.split_word_bound_indices() {
        let char_len = segment.chars().count();
        let is_space = segment.chars().all(char::is_whitespace);

        if !is_space {
            match words.last_mut() {
                Some(word) if previous_was_word => {
                    word.byte_end = byte_start + segment.len();
                    word.char_end = char_pos + char_len;
                }
                _ => words.push(Word {
                    byte_start,
                    byte_end: byte_start + segment.len(),
                    char_start: char_pos,
                    char_end: char_pos + char_len,
                }),
            }
        }

        previous_was_word = !is_space;
        char_pos += char_len;
    }

    words
}
