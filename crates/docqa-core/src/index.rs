//! Per-document semantic index: chunk texts, their embedding vectors, and
//! the manifest describing how they were produced.
//!
//! # Persisted format
//!
//! An index is persisted as a single blob (all integers little-endian):
//!
//! ```text
//! magic    b"DQIX"
//! version  u32
//! hlen     u32                      length of the JSON header
//! header   JSON { manifest, chunks }
//! vectors  f32 × chunk_count × dims
//! ```
//!
//! [`SemanticIndex::decode`] validates every length and count and reports
//! violations as [`QaError::IndexLoad`], so a truncated or foreign blob is
//! never silently trusted.
//!
//! # Search
//!
//! Search is exact: the query is scored against every chunk vector with
//! cosine similarity, ties broken by chunk order.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::QaError;
use crate::models::{RetrievedChunk, TextChunk};

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const MAGIC: &[u8; 4] = b"DQIX";
const PREAMBLE_LEN: usize = 12;

/// Describes how an index was built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub document_id: String,
    /// Model that produced every vector in the index.
    pub embedding_model: String,
    pub dims: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub chunk_count: usize,
    /// SHA-256 of the source PDF bytes, hex encoded.
    pub source_sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct HeaderRef<'a> {
    manifest: &'a IndexManifest,
    chunks: &'a [TextChunk],
}

#[derive(Deserialize)]
struct Header {
    manifest: IndexManifest,
    chunks: Vec<TextChunk>,
}

/// A loaded, query-ready semantic index.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticIndex {
    manifest: IndexManifest,
    chunks: Vec<TextChunk>,
    vectors: Vec<Vec<f32>>,
}

impl SemanticIndex {
    /// Assemble an index from positional chunks and vectors.
    ///
    /// Requires at least one chunk, exactly one vector per chunk, and every
    /// vector to have `manifest.dims` components. `manifest.chunk_count` is
    /// overwritten with the actual count.
    pub fn new(
        mut manifest: IndexManifest,
        chunks: Vec<TextChunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.is_empty() {
            bail!("an index needs at least one chunk");
        }
        if chunks.len() != vectors.len() {
            bail!(
                "{} chunks but {} embedding vectors",
                chunks.len(),
                vectors.len()
            );
        }
        if manifest.dims == 0 {
            bail!("embedding dimensionality must be > 0");
        }
        if let Some((i, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != manifest.dims)
        {
            bail!(
                "vector {} has {} dims, expected {}",
                i,
                v.len(),
                manifest.dims
            );
        }
        manifest.chunk_count = chunks.len();

        Ok(Self {
            manifest,
            chunks,
            vectors,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn chunks(&self) -> &[TextChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Reject the index unless it was built by `model` with `dims` dimensions.
    pub fn check_compatible(&self, model: &str, dims: usize) -> Result<(), QaError> {
        if self.manifest.embedding_model != model {
            return Err(QaError::IndexLoad(format!(
                "index for '{}' was built with embedding model '{}', but the active model is '{}'",
                self.manifest.document_id, self.manifest.embedding_model, model
            )));
        }
        if self.manifest.dims != dims {
            return Err(QaError::IndexLoad(format!(
                "index for '{}' has {} dims, but the active model produces {}",
                self.manifest.document_id, self.manifest.dims, dims
            )));
        }
        Ok(())
    }

    /// Return the `k` chunks most similar to `query`, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, QaError> {
        if query.len() != self.manifest.dims {
            return Err(QaError::IndexLoad(format!(
                "query embedding has {} dims, index has {}",
                query.len(),
                self.manifest.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let score = cosine_similarity(query, v);
                // NaN ranks last
                (i, if score.is_nan() { f32::NEG_INFINITY } else { score })
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| RetrievedChunk {
                index: self.chunks[i].index,
                score,
                text: self.chunks[i].text.clone(),
            })
            .collect())
    }

    /// Serialize into the persisted blob format.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let header = serde_json::to_vec(&HeaderRef {
            manifest: &self.manifest,
            chunks: &self.chunks,
        })?;

        let mut out = Vec::with_capacity(
            PREAMBLE_LEN + header.len() + self.chunks.len() * self.manifest.dims * 4,
        );
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(header.len() as u32).to_le_bytes());
        out.extend_from_slice(&header);
        for v in &self.vectors {
            out.extend_from_slice(&vec_to_blob(v));
        }
        Ok(out)
    }

    /// Parse and validate a persisted blob.
    pub fn decode(bytes: &[u8]) -> Result<Self, QaError> {
        let corrupt = |msg: String| QaError::IndexLoad(format!("corrupt index: {}", msg));

        if bytes.len() < PREAMBLE_LEN {
            return Err(corrupt(format!("blob is only {} bytes", bytes.len())));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("bad magic".to_string()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(QaError::IndexLoad(format!(
                "unsupported index format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }
        let header_len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let header_end = PREAMBLE_LEN
            .checked_add(header_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| corrupt("header extends past end of blob".to_string()))?;

        let header: Header = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])
            .map_err(|e| corrupt(format!("unreadable header: {}", e)))?;
        let Header { manifest, chunks } = header;

        if manifest.format_version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "manifest declares format version {}",
                manifest.format_version
            )));
        }
        if manifest.chunk_count != chunks.len() {
            return Err(corrupt(format!(
                "manifest declares {} chunks, header holds {}",
                manifest.chunk_count,
                chunks.len()
            )));
        }
        if let Some((i, _)) = chunks.iter().enumerate().find(|(i, c)| c.index != *i) {
            return Err(corrupt(format!("chunk {} is out of order", i)));
        }

        let vector_bytes = &bytes[header_end..];
        let expected = chunks
            .len()
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| corrupt("vector section size overflows".to_string()))?;
        if vector_bytes.len() != expected {
            return Err(corrupt(format!(
                "vector section is {} bytes, expected {} ({} chunks × {} dims)",
                vector_bytes.len(),
                expected,
                chunks.len(),
                manifest.dims
            )));
        }

        let vectors: Vec<Vec<f32>> = if manifest.dims == 0 {
            Vec::new()
        } else {
            vector_bytes
                .chunks_exact(manifest.dims * 4)
                .map(blob_to_vec)
                .collect()
        };
        if let Some(i) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(corrupt(format!("vector {} holds a non-finite value", i)));
        }

        SemanticIndex::new(manifest, chunks, vectors).map_err(|e| corrupt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(dims: usize) -> IndexManifest {
        IndexManifest {
            format_version: FORMAT_VERSION,
            document_id: "doc-1".to_string(),
            embedding_model: "test-model".to_string(),
            dims,
            chunk_size: 1000,
            chunk_overlap: 200,
            chunk_count: 0,
            source_sha256: "abc".to_string(),
            created_at: Utc::now(),
        }
    }

    fn chunk(index: usize, text: &str) -> TextChunk {
        TextChunk {
            index,
            start: index * 10,
            text: text.to_string(),
        }
    }

    fn sample_index() -> SemanticIndex {
        SemanticIndex::new(
            manifest(3),
            vec![chunk(0, "north"), chunk(1, "east"), chunk(2, "north-east")],
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.7, 0.7, 0.0],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_sets_chunk_count() {
        let index = sample_index();
        assert_eq!(index.manifest().chunk_count, 3);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_new_rejects_shape_errors() {
        assert!(SemanticIndex::new(manifest(3), vec![], vec![]).is_err());
        assert!(SemanticIndex::new(manifest(3), vec![chunk(0, "a")], vec![]).is_err());
        assert!(
            SemanticIndex::new(manifest(3), vec![chunk(0, "a")], vec![vec![1.0, 2.0]]).is_err()
        );
    }

    #[test]
    fn test_encode_decode_preserves_index() {
        let index = sample_index();
        let blob = index.encode().unwrap();
        let decoded = SemanticIndex::decode(&blob).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn test_decode_rejects_bad_magic() {
        let mut blob = sample_index().encode().unwrap();
        blob[0] = b'X';
        let err = SemanticIndex::decode(&blob).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(_)));
    }

    #[test]
    fn test_decode_rejects_truncated_vectors() {
        let mut blob = sample_index().encode().unwrap();
        blob.truncate(blob.len() - 4);
        let err = SemanticIndex::decode(&blob).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(ref m) if m.contains("vector section")));
    }

    #[test]
    fn test_decode_rejects_unknown_version() {
        let mut blob = sample_index().encode().unwrap();
        blob[4..8].copy_from_slice(&99u32.to_le_bytes());
        let err = SemanticIndex::decode(&blob).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(ref m) if m.contains("version 99")));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(SemanticIndex::decode(b"short").is_err());
        assert!(SemanticIndex::decode(b"DQIX\x01\x00\x00\x00\xff\xff\x00\x00").is_err());
    }

    #[test]
    fn test_check_compatible() {
        let index = sample_index();
        assert!(index.check_compatible("test-model", 3).is_ok());

        let err = index.check_compatible("other-model", 3).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(ref m) if m.contains("other-model")));

        let err = index.check_compatible("test-model", 768).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(ref m) if m.contains("768")));
    }

    #[test]
    fn test_search_orders_by_similarity() {
        let index = sample_index();
        let results = index.search(&[1.0, 0.1, 0.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "north");
        assert_eq!(results[1].text, "north-east");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample_index();
        let results = index.search(&[0.0, 1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].text, "east");
    }

    #[test]
    fn test_search_ties_broken_by_chunk_order() {
        let index = SemanticIndex::new(
            manifest(2),
            vec![chunk(0, "first"), chunk(1, "second")],
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let results = index.search(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].text, "first");
    }

    #[test]
    fn test_decode_rejects_non_finite_vectors() {
        let mut blob = sample_index().encode().unwrap();
        let at = blob.len() - 4;
        blob[at..].copy_from_slice(&f32::NAN.to_le_bytes());
        let err = SemanticIndex::decode(&blob).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(ref m) if m.contains("non-finite")));

        let mut blob = sample_index().encode().unwrap();
        let at = blob.len() - 12;
        blob[at..at + 4].copy_from_slice(&f32::INFINITY.to_le_bytes());
        assert!(SemanticIndex::decode(&blob).is_err());
    }

    #[test]
    fn test_search_with_nan_vectors_ranks_them_last() {
        let n = 200;
        let chunks: Vec<TextChunk> = (0..n).map(|i| chunk(i, &format!("chunk {}", i))).collect();
        let vectors: Vec<Vec<f32>> = (0..n)
            .map(|i| if i % 3 == 0 { vec![f32::NAN, 1.0] } else { vec![1.0, 0.5] })
            .collect();
        let index = SemanticIndex::new(manifest(2), chunks, vectors).unwrap();

        let results = index.search(&[1.0, 0.5], 4).unwrap();
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.score.is_finite()));
        assert_eq!(results[0].text, "chunk 1");
        assert_eq!(results[1].text, "chunk 2");
    }

    #[test]
    fn test_search_rejects_query_dimension_mismatch() {
        let err = sample_index().search(&[1.0, 0.0], 4).unwrap_err();
        assert!(matches!(err, QaError::IndexLoad(_)));
    }
}
