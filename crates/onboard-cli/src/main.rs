//! Onboard CLI: operator access to the KYC document storage pipeline.
//!
//! Configuration comes from the environment (or a `.env` file); see `Config::from_env`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use onboard_cli::{decode_iv, init_tracing, print_json, upload_filename, UploadOutput, VerifyOutput};
use onboard_core::{Config, CryptoService, DocumentCategory, DocumentPayload, NewDocument};
use onboard_db::{setup_database, DocumentRepository, PgDocumentRepository};
use onboard_services::{DocumentRetrievalService, DocumentStorage};
use onboard_storage::create_storage;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "onboard", about = "KYC document storage pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Brand, encrypt and store a document; prints the stored object metadata
    Upload {
        /// Path to the file to upload
        file: PathBuf,
        /// Subject (onboarding process) identifier
        #[arg(long)]
        subject: String,
        /// Document category, e.g. CARD_FRONT, ID_PAGE_2, PHOTO
        #[arg(long)]
        category: DocumentCategory,
        /// Store under this filename instead of the file's own name
        #[arg(long)]
        name: Option<String>,
    },
    /// Fetch a stored object by path, decrypting when an IV is given
    Download {
        /// Storage path (<bucket>/<key>)
        path: String,
        /// Base64 IV from the upload metadata; marks the object as encrypted
        #[arg(long)]
        iv: Option<String>,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch the latest verified document for a subject and category
    Retrieve {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        category: String,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Mark a document record as verified (or revoke with --revoke)
    Verify {
        /// Record UUID
        id: Uuid,
        #[arg(long)]
        revoke: bool,
    },
    /// Generate a base64 encryption key
    Keygen {
        /// Key length in bytes (16, 24 or 32)
        #[arg(long, default_value = "32")]
        bytes: usize,
    },
}

async fn build_storage(config: &Config) -> anyhow::Result<Arc<DocumentStorage>> {
    let backend = create_storage(config)
        .await
        .context("Failed to initialize storage backend")?;
    Ok(Arc::new(DocumentStorage::new(backend, config)?))
}

async fn repository(config: &Config) -> anyhow::Result<PgDocumentRepository> {
    let url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for this command")?;
    let pool = setup_database(url, config.db_max_connections).await?;
    Ok(PgDocumentRepository::new(pool))
}

fn write_output(bytes: &[u8], out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), size_bytes = bytes.len(), "Output written");
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Commands::Keygen { bytes } = cli.command {
        println!("{}", CryptoService::generate_key(bytes)?);
        return Ok(());
    }

    let config = Config::from_env().context("Invalid configuration")?;

    match cli.command {
        Commands::Upload {
            file,
            subject,
            category,
            name,
        } => {
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let payload = DocumentPayload::new(data, upload_filename(&file, name.as_deref()))?;

            let storage = build_storage(&config).await?;
            let metadata = storage.upload(&payload, category, &subject).await?;

            let record_id = if config.database_url.is_some() {
                let record = repository(&config)
                    .await?
                    .insert(NewDocument::from_metadata(&subject, category, &metadata))
                    .await?;
                Some(record.id)
            } else {
                None
            };

            print_json(&UploadOutput {
                metadata,
                record_id,
            })?;
        }
        Commands::Download { path, iv, out } => {
            let iv = decode_iv(iv.as_deref())?;
            let storage = build_storage(&config).await?;
            let bytes = storage.download(&path, iv.is_some(), iv.as_deref()).await?;
            write_output(&bytes, out.as_deref())?;
        }
        Commands::Retrieve {
            subject,
            category,
            out,
        } => {
            let storage = build_storage(&config).await?;
            let repository = Arc::new(repository(&config).await?);
            let retrieval = DocumentRetrievalService::new(repository, storage);
            let document = retrieval.retrieve_latest(&subject, &category).await?;
            write_output(&document.content, out.as_deref())?;
        }
        Commands::Verify { id, revoke } => {
            let record = repository(&config).await?.set_verified(id, !revoke).await?;
            print_json(&VerifyOutput::from(&record))?;
        }
        Commands::Keygen { .. } => {}
    }

    Ok(())
}
