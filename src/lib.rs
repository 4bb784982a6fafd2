//! # docqa
//!
//! Upload a PDF, index it for semantic search, and ask natural-language
//! questions answered from the document's own content.
//!
//! ## Architecture
//!
//! ```text
//! upload ──▶ extract ──▶ chunk ──▶ embed ──▶ index blob (one per document)
//!                                                │
//! question ──▶ load index (build if missing) ◀───┘
//!                 │
//!                 ▼
//!           embed question ──▶ top-K search ──▶ prompt ──▶ generate ──▶ answer
//! ```
//!
//! Pure logic (chunker, index codec and search, prompt assembly, provider
//! traits) lives in `docqa-core`. This crate adds the runtime pieces: PDF
//! extraction, HTTP providers, the filesystem blob store, the pipeline, the
//! SQLite document registry, the HTTP server, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | PDF text extraction |
//! | [`embedding`] | Embedding providers (OpenAI, Ollama, Gemini, local) |
//! | [`generation`] | Generation providers (OpenAI, Ollama, Gemini) |
//! | [`fs_store`] | Atomic filesystem blob store |
//! | [`indexer`] | Index builder |
//! | [`answer`] | Answer engine stages |
//! | [`pipeline`] | `index_document` / `answer_question` with per-document build guard |
//! | [`documents`] | Document registry and uploads |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod answer;
pub mod config;
pub mod db;
pub mod documents;
pub mod embedding;
pub mod extract;
pub mod fs_store;
pub mod generation;
mod http;
pub mod indexer;
pub mod migrate;
pub mod pipeline;
pub mod server;

pub use docqa_core::error::QaError;
pub use docqa_core::models::{Answer, RetrievedChunk, TextChunk};
