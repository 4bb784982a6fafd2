//! Key-addressed blob storage for persisted indexes.
//!
//! The [`BlobStore`] trait is the only way the pipeline touches durable
//! storage, enabling pluggable backends (the filesystem store in the app
//! crate, the [`memory::InMemoryBlobStore`] for tests).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

/// Abstract durable blob store.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`exists`](BlobStore::exists) | Whether a complete blob is stored under `key` |
/// | [`load`](BlobStore::load) | Read the blob, `None` if absent |
/// | [`save`](BlobStore::save) | Store the blob atomically |
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `blob` under `key`.
    ///
    /// Must be atomic: concurrent readers observe either the previous state
    /// or the complete new blob, and a failed save leaves the previous state
    /// untouched.
    async fn save(&self, key: &str, blob: &[u8]) -> Result<()>;
}
