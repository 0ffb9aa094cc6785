use anyhow::Context;
use base64::{engine::general_purpose, Engine as _};
use onboard_core::{DocumentRecord, StoredObjectMetadata};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// JSON printed by `onboard upload`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutput {
    #[serde(flatten)]
    pub metadata: StoredObjectMetadata,
    /// Id of the persisted record, when a database is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
}

/// JSON printed by `onboard verify`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOutput {
    pub id: Uuid,
    pub subject_id: String,
    pub category: String,
    pub verified: bool,
}

impl From<&DocumentRecord> for VerifyOutput {
    fn from(record: &DocumentRecord) -> Self {
        Self {
            id: record.id,
            subject_id: record.subject_id.clone(),
            category: record.category.as_str().to_string(),
            verified: record.verified,
        }
    }
}

/// Decode an optional base64 IV argument.
pub fn decode_iv(iv: Option<&str>) -> anyhow::Result<Option<Vec<u8>>> {
    iv.map(|raw| {
        general_purpose::STANDARD
            .decode(raw.trim())
            .context("IV must be valid base64")
    })
    .transpose()
}

/// Filename to store an uploaded file under: the override if given, else the file's own name.
pub fn upload_filename(file: &Path, name_override: Option<&str>) -> String {
    name_override
        .map(str::to_string)
        .or_else(|| {
            file.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_default()
}

pub fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

/// Initialize tracing for CLI binaries. Logs go to stderr so stdout stays machine-readable.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}
