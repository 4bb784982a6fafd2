//! Indexing and question-answering pipeline.
//!
//! [`Pipeline`] owns the blob store, the two providers, and the settings
//! fixed at startup, and exposes the two operations the rest of the crate
//! calls:
//!
//! - [`Pipeline::index_document`]: make sure a document has a persisted index.
//! - [`Pipeline::answer_question`]: answer a question from that index,
//!   building it first if needed.
//!
//! # Concurrency
//!
//! Builds are serialized per document through an async mutex keyed by
//! document id. A caller that waited on the mutex re-checks the store after
//! acquiring it, so N concurrent requests for a new document produce exactly
//! one build. Loading and searching an existing index takes no lock.

use anyhow::Result;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use docqa_core::embedding::EmbeddingProvider;
use docqa_core::error::QaError;
use docqa_core::generation::GenerationProvider;
use docqa_core::index::SemanticIndex;
use docqa_core::models::Answer;
use docqa_core::store::BlobStore;

use crate::answer::{answer_with_index, validate_question, AnswerRun, AnswerStage};
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::fs_store::FsBlobStore;
use crate::generation::create_generator;
use crate::http::backoff_delay;
use crate::indexer::build_index;

const MAX_DOCUMENT_ID_LEN: usize = 128;

/// Answers are always generated at this temperature.
pub const ANSWER_TEMPERATURE: f32 = 0.0;

/// Tunables fixed at startup.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub batch_size: usize,
    pub temperature: f32,
    /// Upper bound on one embedding provider call, retries included.
    pub embedding_deadline: Duration,
    /// Upper bound on one generation provider call, retries included.
    pub generation_deadline: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_size: docqa_core::chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: docqa_core::chunk::DEFAULT_CHUNK_OVERLAP,
            top_k: 4,
            batch_size: 64,
            temperature: ANSWER_TEMPERATURE,
            embedding_deadline: Duration::from_secs(30),
            generation_deadline: Duration::from_secs(120),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            top_k: config.retrieval.top_k,
            batch_size: config.embedding.batch_size,
            temperature: ANSWER_TEMPERATURE,
            embedding_deadline: call_deadline(
                config.embedding.timeout_secs,
                config.embedding.max_retries,
            ),
            generation_deadline: call_deadline(
                config.generation.timeout_secs,
                config.generation.max_retries,
            ),
        }
    }
}

/// Time for every attempt to hit its request timeout plus every backoff sleep.
fn call_deadline(timeout_secs: u64, max_retries: u32) -> Duration {
    let attempts =
        Duration::from_secs(timeout_secs).saturating_mul(max_retries.saturating_add(1));
    (1..=max_retries)
        .map(backoff_delay)
        .fold(attempts, Duration::saturating_add)
}

/// Document ids double as blob keys: `[A-Za-z0-9_-][A-Za-z0-9._-]*`, at
/// most 128 characters.
pub fn validate_document_id(document_id: &str) -> Result<(), QaError> {
    let valid = !document_id.is_empty()
        && document_id.len() <= MAX_DOCUMENT_ID_LEN
        && !document_id.starts_with('.')
        && document_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(QaError::InvalidInput(format!(
            "invalid document id: '{}'",
            document_id
        )));
    }
    Ok(())
}

fn storage_error(err: anyhow::Error) -> QaError {
    QaError::Storage(format!("{:#}", err))
}

pub struct Pipeline {
    settings: PipelineSettings,
    store: Arc<dyn BlobStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    build_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        store: Arc<dyn BlobStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            embedder,
            generator,
            build_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the filesystem store and the configured providers.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            PipelineSettings::from_config(config),
            Arc::new(FsBlobStore::new(&config.storage.index_root)),
            create_embedder(&config.embedding)?,
            create_generator(&config.generation)?,
        ))
    }

    /// Ensure `document_id` has a persisted index, building it from
    /// `file_path` if absent. Indexing an already indexed document is a
    /// no-op.
    pub async fn index_document(&self, document_id: &str, file_path: &Path) -> Result<(), QaError> {
        self.ensure_index(document_id, file_path).await.map(|_| ())
    }

    /// Build the index unless one exists. Returns `true` if this call built it.
    pub async fn ensure_index(&self, document_id: &str, file_path: &Path) -> Result<bool, QaError> {
        validate_document_id(document_id)?;
        if self
            .store
            .exists(document_id)
            .await
            .map_err(storage_error)?
        {
            tracing::debug!(document_id, "index already present");
            return Ok(false);
        }
        Ok(self.build_guarded(document_id, file_path, false).await?.is_some())
    }

    /// Rebuild the index from `file_path`, replacing any existing one
    /// atomically. A failed rebuild leaves the previous index in place.
    pub async fn rebuild_index(&self, document_id: &str, file_path: &Path) -> Result<(), QaError> {
        validate_document_id(document_id)?;
        self.build_guarded(document_id, file_path, true).await?;
        Ok(())
    }

    /// Load the document's index, building it on demand. The index must
    /// have been built by the active embedding model.
    pub async fn load_index(
        &self,
        document_id: &str,
        file_path: &Path,
    ) -> Result<SemanticIndex, QaError> {
        validate_document_id(document_id)?;

        let index = match self.read_index(document_id).await? {
            Some(index) => index,
            None => match self.build_guarded(document_id, file_path, false).await? {
                Some(built) => built,
                None => self.read_index(document_id).await?.ok_or_else(|| {
                    QaError::IndexLoad(format!("index for '{}' disappeared", document_id))
                })?,
            },
        };

        index.check_compatible(self.embedder.model_name(), self.embedder.dims())?;
        Ok(index)
    }

    /// Answer `question` about the document, building its index first if
    /// it has none.
    pub async fn answer_question(
        &self,
        document_id: &str,
        file_path: &Path,
        question: &str,
    ) -> Result<Answer, QaError> {
        let mut run = AnswerRun::new(document_id);
        validate_document_id(document_id).map_err(|e| run.fail(e))?;
        validate_question(question).map_err(|e| run.fail(e))?;

        run.advance(AnswerStage::IndexLoading);
        let index = self
            .load_index(document_id, file_path)
            .await
            .map_err(|e| run.fail(e))?;

        answer_with_index(
            &mut run,
            &index,
            question,
            &self.settings,
            self.embedder.as_ref(),
            self.generator.as_ref(),
        )
        .await
    }

    async fn read_index(&self, document_id: &str) -> Result<Option<SemanticIndex>, QaError> {
        match self.store.load(document_id).await.map_err(storage_error)? {
            Some(bytes) => Ok(Some(SemanticIndex::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of documents with a build running or waiting on its lock.
    pub fn builds_in_flight(&self) -> usize {
        self.build_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Run one build under the document's lock. Without `force`, returns
    /// `None` when another caller finished a build while this one waited.
    async fn build_guarded(
        &self,
        document_id: &str,
        file_path: &Path,
        force: bool,
    ) -> Result<Option<SemanticIndex>, QaError> {
        let lease = self.build_lock(document_id);
        let _guard = lease.lock.lock().await;
        self.build_locked(document_id, file_path, force).await
    }

    async fn build_locked(
        &self,
        document_id: &str,
        file_path: &Path,
        force: bool,
    ) -> Result<Option<SemanticIndex>, QaError> {
        if !force
            && self
                .store
                .exists(document_id)
                .await
                .map_err(storage_error)?
        {
            tracing::debug!(document_id, "index built by a concurrent request");
            return Ok(None);
        }

        tracing::info!(document_id, path = %file_path.display(), "building index");
        let index = build_index(document_id, file_path, &self.settings, self.embedder.as_ref())
            .await
            .inspect_err(|e| tracing::warn!(document_id, code = e.code(), error = %e, "index build failed"))?;

        let blob = index.encode().map_err(|e| QaError::Storage(e.to_string()))?;
        self.store
            .save(document_id, &blob)
            .await
            .map_err(storage_error)?;
        tracing::info!(document_id, bytes = blob.len(), "index saved");
        Ok(Some(index))
    }

    fn build_lock<'a>(&'a self, document_id: &'a str) -> BuildLockLease<'a> {
        let mut locks = self.build_locks.lock().unwrap_or_else(|e| e.into_inner());
        let lock = locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        BuildLockLease {
            locks: &self.build_locks,
            document_id,
            lock,
        }
    }
}

/// A caller's claim on a document's build lock. Dropping it, including when
/// the caller's future is cancelled, removes the map entry once no other
/// caller holds or waits on it.
struct BuildLockLease<'a> {
    locks: &'a Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    document_id: &'a str,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for BuildLockLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one held here
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(self.document_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_rules() {
        assert!(validate_document_id("3f2b9c0e-1d2a-4c5b-9e8f-0a1b2c3d4e5f").is_ok());
        assert!(validate_document_id("report_2024.v2").is_ok());
        assert!(validate_document_id("").is_err());
        assert!(validate_document_id(".hidden").is_err());
        assert!(validate_document_id("../etc/passwd").is_err());
        assert!(validate_document_id("a b").is_err());
        assert!(validate_document_id(&"x".repeat(129)).is_err());
        assert!(validate_document_id(&"x".repeat(128)).is_ok());
    }

    #[test]
    fn test_call_deadline_covers_retries() {
        assert_eq!(call_deadline(30, 0), Duration::from_secs(30));
        // 3 attempts of 10s plus 1s + 2s of backoff
        assert_eq!(call_deadline(10, 2), Duration::from_secs(33));
    }

    #[test]
    fn test_call_deadline_saturates() {
        assert_eq!(call_deadline(u64::MAX, 3), Duration::MAX);
    }

    #[test]
    fn test_configured_temperature_is_ignored() {
        let config = crate::config::parse_config(
            r#"
[storage]
index_root = "/tmp/docqa/indexes"
upload_dir = "/tmp/docqa/uploads"

[db]
path = "/tmp/docqa/docqa.sqlite"

[generation]
temperature = 0.7
"#,
        )
        .unwrap();
        assert_eq!(PipelineSettings::from_config(&config).temperature, 0.0);
    }
}
