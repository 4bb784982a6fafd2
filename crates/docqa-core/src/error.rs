//! Typed failure taxonomy for the indexing and answering pipeline.
//!
//! Every pipeline operation returns a [`QaError`] so the boundary layer
//! (HTTP server, CLI) can tell failure kinds apart programmatically and
//! choose a status code. Providers and stores report `anyhow` errors
//! internally; the pipeline converts them into the matching variant.

/// A pipeline failure, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QaError {
    /// The PDF could not be read, parsed, or yielded no text.
    Extraction(String),
    /// An embedding provider call failed, timed out, or returned bad vectors.
    EmbeddingProvider(String),
    /// A persisted index is corrupt or incompatible with the active model.
    IndexLoad(String),
    /// The generation provider failed to produce an answer.
    AnswerGeneration(String),
    /// The blob store could not persist or read an index.
    Storage(String),
    /// The request itself was malformed (bad document id, empty question).
    InvalidInput(String),
}

impl QaError {
    /// Machine-readable code used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            QaError::Extraction(_) => "extraction_failed",
            QaError::EmbeddingProvider(_) => "embedding_provider",
            QaError::IndexLoad(_) => "index_load",
            QaError::AnswerGeneration(_) => "answer_generation",
            QaError::Storage(_) => "storage",
            QaError::InvalidInput(_) => "invalid_input",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            QaError::Extraction(m)
            | QaError::EmbeddingProvider(m)
            | QaError::IndexLoad(m)
            | QaError::AnswerGeneration(m)
            | QaError::Storage(m)
            | QaError::InvalidInput(m) => m,
        }
    }
}

impl std::fmt::Display for QaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QaError::Extraction(e) => write!(f, "text extraction failed: {}", e),
            QaError::EmbeddingProvider(e) => write!(f, "embedding provider error: {}", e),
            QaError::IndexLoad(e) => write!(f, "index load failed: {}", e),
            QaError::AnswerGeneration(e) => write!(f, "answer generation failed: {}", e),
            QaError::Storage(e) => write!(f, "index storage error: {}", e),
            QaError::InvalidInput(e) => write!(f, "invalid input: {}", e),
        }
    }
}

impl std::error::Error for QaError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = QaError::IndexLoad("dimension mismatch".to_string());
        assert_eq!(err.to_string(), "index load failed: dimension mismatch");
        assert_eq!(err.code(), "index_load");
        assert_eq!(err.message(), "dimension mismatch");
    }
}
