//! # docqa core
//!
//! Runtime-free logic for docqa: data models, the overlapping text chunker,
//! the persisted semantic index (codec, compatibility checks, top-K search),
//! prompt assembly, provider traits, and the blob store abstraction.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem code. Concrete
//! providers and stores live in the `docqa` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod prompt;
pub mod store;
