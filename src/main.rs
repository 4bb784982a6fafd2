//! # docqa CLI
//!
//! ## Usage
//!
//! ```bash
//! docqa --config ./config/docqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa init` | Create the SQLite registry and storage directories |
//! | `docqa upload <file>` | Register a PDF and index it |
//! | `docqa index <id>` | Build (or with `--force`, rebuild) a document's index |
//! | `docqa ask <id> "<question>"` | Answer a question from a document |
//! | `docqa documents` | List uploaded documents |
//! | `docqa get <id>` | Show one document |
//! | `docqa serve` | Start the HTTP API |
//! | `docqa completions <shell>` | Print shell completions |

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docqa::config::{self, Config};
use docqa::documents;
use docqa::pipeline::Pipeline;
use docqa::{db, migrate, server};

/// docqa: ask questions about a PDF, answered from its own content.
///
/// All commands except `completions` read a TOML configuration file given
/// by `--config`. See `config/docqa.example.toml`.
#[derive(Parser)]
#[command(
    name = "docqa",
    about = "Upload a PDF, index it for semantic search, and ask questions about it",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the document registry.
    ///
    /// Creates the SQLite database, the documents table, and the upload and
    /// index directories. Running it again is harmless.
    Init,

    /// Upload a PDF and build its index.
    Upload {
        /// Path to the PDF.
        file: PathBuf,

        /// Register the file without indexing it now.
        #[arg(long)]
        no_index: bool,
    },

    /// Build the index for an uploaded document.
    Index {
        /// Document id (as printed by `upload` or `documents`).
        id: String,

        /// Rebuild even if an index exists. The old index stays in place
        /// until the new one is complete.
        #[arg(long)]
        force: bool,
    },

    /// Ask a question about an uploaded document.
    Ask {
        /// Document id.
        id: String,

        /// The question.
        question: String,

        /// Print the retrieved context chunks after the answer.
        #[arg(long)]
        show_context: bool,
    },

    /// List uploaded documents.
    Documents,

    /// Show one document's registry entry.
    Get {
        /// Document id.
        id: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        // The only command that doesn't require config
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "docqa", &mut std::io::stdout());
        }
        command => {
            let cfg = config::load_config(&cli.config)?;
            run_command(&cfg, command).await?;
        }
    }

    Ok(())
}

async fn run_command(cfg: &Config, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Init => {
            migrate::run_migrations(cfg).await?;
            std::fs::create_dir_all(&cfg.storage.upload_dir)?;
            std::fs::create_dir_all(&cfg.storage.index_root)?;
            println!("Database initialized successfully.");
        }
        Commands::Upload { file, no_index } => {
            run_upload(cfg, &file, no_index).await?;
        }
        Commands::Index { id, force } => {
            run_index(cfg, &id, force).await?;
        }
        Commands::Ask {
            id,
            question,
            show_context,
        } => {
            run_ask(cfg, &id, &question, show_context).await?;
        }
        Commands::Documents => {
            let pool = db::connect(cfg).await?;
            documents::run_documents(&pool).await?;
            pool.close().await;
        }
        Commands::Get { id } => {
            let pool = db::connect(cfg).await?;
            documents::run_get(&pool, &id).await?;
            pool.close().await;
        }
        Commands::Serve => {
            server::run_server(cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

async fn run_upload(cfg: &Config, file: &std::path::Path, no_index: bool) -> anyhow::Result<()> {
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow::anyhow!("not a file: {}", file.display()))?;
    if !documents::is_pdf_name(&file_name) {
        anyhow::bail!("Only PDF files are supported: {}", file.display());
    }
    // Provider settings are checked before anything is stored
    let pipeline = if no_index {
        None
    } else {
        Some(Pipeline::from_config(cfg)?)
    };

    let bytes = tokio::fs::read(file).await?;
    let pool = db::connect(cfg).await?;
    let record = documents::store_upload(cfg, &pool, &file_name, &bytes).await?;
    println!("Uploaded {} as {}", record.name, record.id);

    if let Some(pipeline) = pipeline {
        documents::process_document(&pipeline, &pool, &record).await?;
        println!("Indexed {}", record.id);
    }
    pool.close().await;
    Ok(())
}

async fn run_index(cfg: &Config, id: &str, force: bool) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    let record = documents::get_document(&pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", id))?;
    let pipeline = Pipeline::from_config(cfg)?;

    if force {
        pipeline.rebuild_index(&record.id, &record.path).await?;
        documents::mark_processed(&pool, &record.id, chrono::Utc::now().timestamp()).await?;
        println!("Rebuilt index for {}", record.id);
    } else {
        documents::process_document(&pipeline, &pool, &record).await?;
        println!("Index ready for {}", record.id);
    }
    pool.close().await;
    Ok(())
}

async fn run_ask(
    cfg: &Config,
    id: &str,
    question: &str,
    show_context: bool,
) -> anyhow::Result<()> {
    let pool = db::connect(cfg).await?;
    let record = documents::get_document(&pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("document not found: {}", id))?;
    let pipeline = Pipeline::from_config(cfg)?;

    let answer = pipeline
        .answer_question(&record.id, &record.path, question)
        .await?;
    if !record.is_processed() {
        documents::mark_processed(&pool, &record.id, chrono::Utc::now().timestamp()).await?;
    }
    pool.close().await;

    println!("{}", answer.text.trim());
    if show_context {
        println!();
        for chunk in &answer.context {
            println!("--- chunk {} (score {:.4}) ---", chunk.index, chunk.score);
            println!("{}", chunk.text);
        }
    }
    Ok(())
}
