//! Embedding index builder.
//!
//! Turns a PDF on disk into a [`SemanticIndex`]: extract text, split it
//! into overlapping chunks, embed the chunks in batches, and attach the
//! manifest. Persisting the result is the caller's job (see
//! [`crate::pipeline::Pipeline`]), so a build that fails at any step writes
//! nothing.

use chrono::Utc;
use std::path::Path;
use std::time::{Duration, Instant};

use docqa_core::chunk::Chunker;
use docqa_core::embedding::EmbeddingProvider;
use docqa_core::error::QaError;
use docqa_core::index::{IndexManifest, SemanticIndex, FORMAT_VERSION};

use crate::extract;
use crate::pipeline::PipelineSettings;

/// Build the index for `document_id` from the PDF at `file_path`.
pub async fn build_index(
    document_id: &str,
    file_path: &Path,
    settings: &PipelineSettings,
    embedder: &dyn EmbeddingProvider,
) -> Result<SemanticIndex, QaError> {
    let started = Instant::now();

    let extracted = extract::extract_file(file_path).await?;
    if extracted.text.trim().is_empty() {
        return Err(QaError::Extraction(format!(
            "no extractable text in {} ({} pages)",
            file_path.display(),
            extracted.page_count
        )));
    }

    let chunker = Chunker::new(settings.chunk_size, settings.chunk_overlap)
        .map_err(|e| QaError::InvalidInput(e.to_string()))?;
    let chunks = chunker.split(&extracted.text);
    tracing::debug!(
        document_id,
        pages = extracted.page_count,
        chunks = chunks.len(),
        "document chunked"
    );

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embed_batched(
        embedder,
        &texts,
        settings.batch_size,
        settings.embedding_deadline,
    )
    .await?;

    let manifest = IndexManifest {
        format_version: FORMAT_VERSION,
        document_id: document_id.to_string(),
        embedding_model: embedder.model_name().to_string(),
        dims: embedder.dims(),
        chunk_size: chunker.chunk_size(),
        chunk_overlap: chunker.chunk_overlap(),
        chunk_count: chunks.len(),
        source_sha256: extracted.sha256,
        created_at: Utc::now(),
    };
    let index = SemanticIndex::new(manifest, chunks, vectors)
        .map_err(|e| QaError::EmbeddingProvider(e.to_string()))?;

    tracing::info!(
        document_id,
        chunks = index.len(),
        model = embedder.model_name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index built"
    );
    Ok(index)
}

/// Embed `texts` in batches of `batch_size`, validating every batch.
///
/// Each provider call is bounded by `deadline`. A short batch, or a vector
/// whose length differs from `embedder.dims()`, is a provider error.
pub async fn embed_batched(
    embedder: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    deadline: Duration,
) -> Result<Vec<Vec<f32>>, QaError> {
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size.max(1)) {
        let embedded = tokio::time::timeout(deadline, embedder.embed(batch))
            .await
            .map_err(|_| {
                QaError::EmbeddingProvider(format!(
                    "{} did not respond within {}s",
                    embedder.model_name(),
                    deadline.as_secs()
                ))
            })?
            .map_err(|e| QaError::EmbeddingProvider(format!("{:#}", e)))?;

        if embedded.len() != batch.len() {
            return Err(QaError::EmbeddingProvider(format!(
                "{} returned {} vectors for {} inputs",
                embedder.model_name(),
                embedded.len(),
                batch.len()
            )));
        }
        if let Some(v) = embedded.iter().find(|v| v.len() != embedder.dims()) {
            return Err(QaError::EmbeddingProvider(format!(
                "{} returned a {}-dim vector, expected {}",
                embedder.model_name(),
                v.len(),
                embedder.dims()
            )));
        }
        if embedded.iter().flatten().any(|x| !x.is_finite()) {
            return Err(QaError::EmbeddingProvider(format!(
                "{} returned a vector with non-finite values",
                embedder.model_name()
            )));
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}
