//! Chunking of the final answer for streaming responses

use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};

/// How the arbitrated answer is split before it is written to the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkGranularity {
    /// The whole answer as a single chunk
    Whole,
    /// One chunk per word, each carrying the whitespace that follows it
    #[default]
    Word,
}

/// Split `text` into ordered chunks whose concatenation is exactly `text`
pub fn chunk_text(text: &str, granularity: ChunkGranularity) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    match granularity {
        ChunkGranularity::Whole => vec![text.to_string()],
        ChunkGranularity::Word => {
            let mut chunks = Vec::new();
            let mut current = String::new();
            let mut seen_word = false;
            let mut in_trailing_space = false;

            for ch in text.chars() {
                if ch.is_whitespace() {
                    in_trailing_space = seen_word;
                } else {
                    if in_trailing_space {
                        chunks.push(std::mem::take(&mut current));
                        in_trailing_space = false;
                    }
                    seen_word = true;
                }
                current.push(ch);
            }
            if !current.is_empty() {
                chunks.push(current);
            }
            chunks
        }
    }
}

/// Lazy stream over the chunks of `text`
///
/// Finite and single-use; every chunk is yielded exactly once, in order.
pub fn chunk_stream(text: String, granularity: ChunkGranularity) -> impl Stream<Item = String> {
    stream::iter(chunk_text(&text, granularity))
}
