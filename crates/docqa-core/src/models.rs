//! Core data types shared by the chunker, the index, and the answer engine.

use serde::{Deserialize, Serialize};

/// A bounded-length substring of a document's extracted text.
///
/// `start` is the offset of the first character, measured in `char`s, in the
/// text the chunk was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    pub index: usize,
    pub start: usize,
    pub text: String,
}

/// A chunk returned by similarity search, with its cosine score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub index: usize,
    pub score: f32,
    pub text: String,
}

/// Result of a successful question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// Chunks placed in the prompt, most similar first.
    pub context: Vec<RetrievedChunk>,
}
