//! Document registry.
//!
//! Stores uploaded PDFs under `[storage].upload_dir` as `<id>.pdf` and keeps
//! one row per document in SQLite. The pipeline only ever sees
//! `(document_id, path)`; everything else here is bookkeeping for the HTTP
//! and CLI layers.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use docqa_core::error::QaError;

use crate::config::Config;
use crate::pipeline::Pipeline;

/// A registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub upload_date: i64,
    pub processed_at: Option<i64>,
}

impl DocumentRecord {
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// Wire shape of a document for the HTTP API and `--json` CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub document_id: String,
    pub name: String,
    pub upload_date: String,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<String>,
}

impl From<&DocumentRecord> for DocumentResponse {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            document_id: record.id.clone(),
            name: record.name.clone(),
            upload_date: format_ts_iso(record.upload_date),
            processed: record.is_processed(),
            processed_at: record.processed_at.map(format_ts_iso),
        }
    }
}

/// Upload names must end in `.pdf` (any case).
pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Save an uploaded PDF under a fresh id and register it.
pub async fn store_upload(
    config: &Config,
    pool: &SqlitePool,
    file_name: &str,
    bytes: &[u8],
) -> Result<DocumentRecord> {
    if !is_pdf_name(file_name) {
        bail!("only PDF files are supported: {}", file_name);
    }
    // Keep only the final path component of client-supplied names
    let name = Path::new(file_name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let id = uuid::Uuid::new_v4().to_string();
    let upload_dir = &config.storage.upload_dir;
    tokio::fs::create_dir_all(upload_dir)
        .await
        .with_context(|| format!("Failed to create {}", upload_dir.display()))?;

    let path = upload_dir.join(format!("{}.pdf", id));
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let record = DocumentRecord {
        id,
        name,
        path,
        upload_date: chrono::Utc::now().timestamp(),
        processed_at: None,
    };
    insert_document(pool, &record).await?;

    tracing::info!(document_id = %record.id, name = %record.name, bytes = bytes.len(), "document uploaded");
    Ok(record)
}

pub async fn insert_document(pool: &SqlitePool, record: &DocumentRecord) -> Result<()> {
    sqlx::query(
        "INSERT INTO documents (id, name, path, upload_date, processed_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(record.path.to_string_lossy().into_owned())
    .bind(record.upload_date)
    .bind(record.processed_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<DocumentRecord>> {
    let rows = sqlx::query(
        "SELECT id, name, path, upload_date, processed_at FROM documents ORDER BY upload_date DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(record_from_row).collect())
}

pub async fn get_document(pool: &SqlitePool, id: &str) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query(
        "SELECT id, name, path, upload_date, processed_at FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(record_from_row))
}

pub async fn mark_processed(pool: &SqlitePool, id: &str, at: i64) -> Result<()> {
    sqlx::query("UPDATE documents SET processed_at = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> DocumentRecord {
    let path: String = row.get("path");
    DocumentRecord {
        id: row.get("id"),
        name: row.get("name"),
        path: PathBuf::from(path),
        upload_date: row.get("upload_date"),
        processed_at: row.get("processed_at"),
    }
}

/// Index a registered document and record when it finished.
pub async fn process_document(
    pipeline: &Pipeline,
    pool: &SqlitePool,
    record: &DocumentRecord,
) -> Result<(), QaError> {
    pipeline.index_document(&record.id, &record.path).await?;
    mark_processed(pool, &record.id, chrono::Utc::now().timestamp())
        .await
        .map_err(|e| QaError::Storage(format!("{:#}", e)))?;
    Ok(())
}

// ============ CLI output ============

pub async fn run_documents(pool: &SqlitePool) -> Result<()> {
    let records = list_documents(pool).await?;
    if records.is_empty() {
        println!("No documents uploaded.");
        return Ok(());
    }

    println!("{:<38} {:<22} {:<10} NAME", "ID", "UPLOADED", "STATUS");
    for record in &records {
        let status = if record.is_processed() { "indexed" } else { "pending" };
        println!(
            "{:<38} {:<22} {:<10} {}",
            record.id,
            format_ts_iso(record.upload_date),
            status,
            record.name
        );
    }
    Ok(())
}

pub async fn run_get(pool: &SqlitePool, id: &str) -> Result<()> {
    let record = get_document(pool, id)
        .await?
        .with_context(|| format!("document not found: {}", id))?;

    println!("id:           {}", record.id);
    println!("name:         {}", record.name);
    println!("path:         {}", record.path.display());
    println!("uploaded:     {}", format_ts_iso(record.upload_date));
    match record.processed_at {
        Some(ts) => println!("processed:    {}", format_ts_iso(ts)),
        None => println!("processed:    (pending)"),
    }
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
