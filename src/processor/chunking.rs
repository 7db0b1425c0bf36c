//! # Text Chunking Module
//!
//! Greedy word-accumulation chunking. Words are appended to the current chunk
//! until the next one would push it past the target size; that word then starts
//! a new chunk. Words are never split, so a single word longer than the target
//! becomes a chunk of its own.

use crate::processor::ChunkOptions;
use serde::Serialize;
use tracing::{instrument, trace};

/// A chunk of text with its position in the source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// The text of the chunk
    pub text: String,

    /// The position of the chunk in the original document
    pub position: usize,
}

/// Split `text` into word-bounded chunks of roughly `options.target_chunk_size` characters.
#[instrument(skip(text), fields(len = text.len()))]
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Vec<TextChunk> {
    let target = options.target_chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    for word in text.split_whitespace() {
        let word_size = word.chars().count() + 1;
        if current_size + word_size > target && !current.is_empty() {
            chunks.push(current.join(" "));
            current.clear();
            current_size = 0;
        }
        current.push(word);
        current_size += word_size;
    }
    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    trace!(chunks = chunks.len(), "Chunked text");
    chunks
        .into_iter()
        .enumerate()
        .map(|(position, text)| TextChunk { text, position })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(target: usize) -> ChunkOptions {
        ChunkOptions {
            target_chunk_size: target,
        }
    }

    fn rejoin(chunks: &[TextChunk]) -> String {
        chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &options(512)).is_empty());
        assert!(chunk_text("   \n\t ", &options(512)).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("hello   world", &options(512));
        assert_eq!(
            chunks,
            vec![TextChunk {
                text: "hello world".to_string(),
                position: 0
            }]
        );
    }

    #[test]
    fn test_chunks_close_before_exceeding_target() {
        // each word costs 5 characters including its separator
        let chunks = chunk_text("aaaa bbbb cccc dddd eeee", &options(10));
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa bbbb", "cccc dddd", "eeee"]);
        assert_eq!(chunks[2].position, 2);
    }

    #[test]
    fn test_long_word_stands_alone() {
        let long = "x".repeat(40);
        let text = format!("a {} b", long);
        let chunks = chunk_text(&text, &options(10));
        let texts: Vec<_> = chunks.iter().map(|c| c.text.clone()).collect();
        assert_eq!(texts, vec!["a".to_string(), long, "b".to_string()]);
    }

    #[test]
    fn test_rejoining_reproduces_word_sequence() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(60);
        let chunks = chunk_text(&text, &options(512));
        assert!(chunks.len() > 1);

        let original: Vec<_> = text.split_whitespace().collect();
        let rejoined = rejoin(&chunks);
        assert_eq!(rejoined.split_whitespace().collect::<Vec<_>>(), original);
        assert_eq!(rejoined, original.join(" "));

        for chunk in &chunks {
            assert!(chunk.text.chars().count() <= 512);
        }
    }

    #[test]
    fn test_multibyte_words_count_characters() {
        let chunks = chunk_text("ééé ééé ééé", &options(8));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "ééé ééé");
    }
}
