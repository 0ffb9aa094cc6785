//! Configuration module
//!
//! Configuration is read once at process startup from the environment (after loading an optional
//! `.env` file) and validated eagerly: a bad encryption key, an unsupported IV length or a missing
//! backend setting fails startup instead of the first upload.

use base64::{engine::general_purpose, Engine as _};
use std::env;

use crate::models::{BucketGroup, DocumentCategory};
use crate::storage_types::StorageBackend;
use crate::AppError;

const DEFAULT_IV_LENGTH: usize = 12;
const DEFAULT_BRANDING_LABEL: &str = "KYC ONBOARDING";
const DEFAULT_COMPRESSION_MAX_DIMENSION: u32 = 4096;
const DB_MAX_CONNECTIONS: u32 = 5;

/// Key sizes accepted for AES-GCM (AES-128, AES-192, AES-256).
pub const SUPPORTED_KEY_LENGTHS: [usize; 3] = [16, 24, 32];
/// Largest GCM nonce the crypto service is built for. Lengths are clamped to at least 1.
pub const MAX_IV_LENGTH: usize = 32;

/// Encryption settings for stored documents
#[derive(Clone)]
pub struct EncryptionConfig {
    pub enabled: bool,
    /// Base64-encoded key; required when `enabled`.
    pub key: Option<String>,
    pub iv_length: usize,
}

impl std::fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("enabled", &self.enabled)
            .field("key", &self.key.as_ref().map(|_| "<redacted>"))
            .field("iv_length", &self.iv_length)
            .finish()
    }
}

impl EncryptionConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            key: None,
            iv_length: DEFAULT_IV_LENGTH,
        }
    }

    pub fn enabled(key_base64: impl Into<String>, iv_length: usize) -> Self {
        Self {
            enabled: true,
            key: Some(key_base64.into()),
            iv_length: iv_length.max(1),
        }
    }

    /// Decode and length-check the key. Only meaningful when encryption is enabled.
    pub fn decoded_key(&self) -> Result<Vec<u8>, AppError> {
        let encoded = self
            .key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                AppError::Configuration(
                    "ENCRYPTION_KEY must be set when ENCRYPTION_ENABLED=true".to_string(),
                )
            })?;

        let key = general_purpose::STANDARD.decode(encoded).map_err(|e| {
            AppError::Configuration(format!("Failed to decode ENCRYPTION_KEY: {}", e))
        })?;

        if !SUPPORTED_KEY_LENGTHS.contains(&key.len()) {
            return Err(AppError::Configuration(format!(
                "ENCRYPTION_KEY must decode to 16, 24 or 32 bytes, got {}",
                key.len()
            )));
        }

        Ok(key)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.enabled {
            return Ok(());
        }
        self.decoded_key()?;
        let iv_length = self.iv_length.max(1);
        if iv_length > MAX_IV_LENGTH {
            return Err(AppError::Configuration(format!(
                "ENCRYPTION_IV_LENGTH must be between 1 and {}, got {}",
                MAX_IV_LENGTH, iv_length
            )));
        }
        Ok(())
    }
}

/// Physical bucket names per logical bucket group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BucketConfig {
    pub cards: String,
    pub id_documents: String,
    pub biometrics: String,
    pub signatures: String,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            cards: "kyc-cards".to_string(),
            id_documents: "kyc-id-documents".to_string(),
            biometrics: "kyc-biometrics".to_string(),
            signatures: "kyc-signatures".to_string(),
        }
    }
}

impl BucketConfig {
    pub fn name_for(&self, group: BucketGroup) -> &str {
        match group {
            BucketGroup::Cards => &self.cards,
            BucketGroup::IdDocuments => &self.id_documents,
            BucketGroup::Biometrics => &self.biometrics,
            BucketGroup::Signatures => &self.signatures,
        }
    }

    /// Resolve the destination bucket for a category. Never falls back to a default bucket.
    pub fn bucket_for(&self, category: DocumentCategory) -> Result<&str, AppError> {
        let name = self.name_for(category.bucket_group()).trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "No bucket configured for category {}",
                category
            )));
        }
        Ok(name)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for group in [
            BucketGroup::Cards,
            BucketGroup::IdDocuments,
            BucketGroup::Biometrics,
            BucketGroup::Signatures,
        ] {
            let name = self.name_for(group);
            if !is_valid_bucket_name(name) {
                return Err(AppError::Configuration(format!(
                    "Invalid bucket name {:?} for {:?}",
                    name, group
                )));
            }
        }
        Ok(())
    }
}

/// S3 naming rules: 3-63 chars of lowercase letters, digits, dots and dashes,
/// starting and ending with a letter or digit.
fn is_valid_bucket_name(name: &str) -> bool {
    let len_ok = (3..=63).contains(&name.len());
    let chars_ok = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let edges_ok = name
        .chars()
        .next()
        .zip(name.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);
    len_ok && chars_ok && edges_ok && !name.contains("..")
}

/// Parse an optional numeric variable; a present but malformed value is an error.
fn parse_number<T: std::str::FromStr>(
    raw: Option<String>,
    name: &str,
) -> Result<Option<T>, anyhow::Error> {
    raw.map(|v| {
        v.trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got {:?}", name, v))
    })
    .transpose()
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub storage_backend: StorageBackend,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub buckets: BucketConfig,
    pub encryption: EncryptionConfig,
    pub branding_label: String,
    /// Longest edge allowed before images are downscaled; 0 disables compression.
    pub compression_max_dimension: u32,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source (the process environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let flag = |key: &str, default: bool| {
            var(key)
                .map(|v| v.trim().to_lowercase())
                .map(|v| matches!(v.as_str(), "true" | "1" | "yes" | "on"))
                .unwrap_or(default)
        };

        let environment = var("ENVIRONMENT")
            .or_else(|| var("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let storage_backend = match var("STORAGE_BACKEND") {
            Some(raw) => raw.parse::<StorageBackend>()?,
            None => StorageBackend::S3,
        };

        let defaults = BucketConfig::default();
        let buckets = BucketConfig {
            cards: var("BUCKET_CARDS").unwrap_or(defaults.cards),
            id_documents: var("BUCKET_ID_DOCUMENTS").unwrap_or(defaults.id_documents),
            biometrics: var("BUCKET_BIOMETRICS").unwrap_or(defaults.biometrics),
            signatures: var("BUCKET_SIGNATURES").unwrap_or(defaults.signatures),
        };

        let iv_length = parse_number::<i64>(var("ENCRYPTION_IV_LENGTH"), "ENCRYPTION_IV_LENGTH")?
            .unwrap_or(DEFAULT_IV_LENGTH as i64);

        let encryption = EncryptionConfig {
            enabled: flag("ENCRYPTION_ENABLED", false),
            key: var("ENCRYPTION_KEY"),
            iv_length: iv_length.max(1) as usize,
        };

        let config = Config {
            environment,
            storage_backend,
            s3_region: var("S3_REGION").or_else(|| var("AWS_REGION")),
            s3_endpoint: var("S3_ENDPOINT"),
            local_storage_path: var("LOCAL_STORAGE_PATH"),
            buckets,
            encryption,
            branding_label: var("BRANDING_LABEL")
                .unwrap_or_else(|| DEFAULT_BRANDING_LABEL.to_string()),
            compression_max_dimension: parse_number(
                var("COMPRESSION_MAX_DIMENSION"),
                "COMPRESSION_MAX_DIMENSION",
            )?
            .unwrap_or(DEFAULT_COMPRESSION_MAX_DIMENSION),
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_number(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS")?
                .unwrap_or(DB_MAX_CONNECTIONS),
        };

        config.validate()?;
        Ok(config)
    }

    /// Configuration for tests and embedded use: in-memory backend, default buckets,
    /// encryption off.
    pub fn in_memory() -> Self {
        Config {
            environment: "test".to_string(),
            storage_backend: StorageBackend::Memory,
            s3_region: None,
            s3_endpoint: None,
            local_storage_path: None,
            buckets: BucketConfig::default(),
            encryption: EncryptionConfig::disabled(),
            branding_label: DEFAULT_BRANDING_LABEL.to_string(),
            compression_max_dimension: DEFAULT_COMPRESSION_MAX_DIMENSION,
            database_url: None,
            db_max_connections: DB_MAX_CONNECTIONS,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.encryption.validate()?;
        self.buckets.validate()?;

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
            }
            StorageBackend::Memory => {
                if self.is_production() {
                    return Err(anyhow::anyhow!(
                        "The memory storage backend cannot be used in production"
                    ));
                }
            }
        }

        if self.db_max_connections == 0 {
            return Err(anyhow::anyhow!("DB_MAX_CONNECTIONS must be at least 1"));
        }

        if let Some(url) = &self.database_url {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY_32: &str = "MDEyMzQ1Njc4OTAxMjM0NTY3ODkwMTIzNDU2Nzg5MDE=";

    fn load(vars: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_for_local_backend() {
        let config = load(&[
            ("STORAGE_BACKEND", "local"),
            ("LOCAL_STORAGE_PATH", "/tmp/onboard"),
        ])
        .unwrap();
        assert_eq!(config.storage_backend, StorageBackend::Local);
        assert!(!config.encryption.enabled);
        assert_eq!(config.encryption.iv_length, 12);
        assert_eq!(config.buckets, BucketConfig::default());
        assert_eq!(config.branding_label, "KYC ONBOARDING");
        assert_eq!(config.compression_max_dimension, 4096);
    }

    #[test]
    fn s3_backend_requires_region() {
        assert!(load(&[]).is_err());
        let config = load(&[("AWS_REGION", "eu-west-3")]).unwrap();
        assert_eq!(config.s3_region.as_deref(), Some("eu-west-3"));
    }

    #[test]
    fn enabled_encryption_requires_key() {
        let err = load(&[("STORAGE_BACKEND", "memory"), ("ENCRYPTION_ENABLED", "true")])
            .unwrap_err();
        assert!(err.to_string().contains("ENCRYPTION_KEY"));
    }

    #[test]
    fn enabled_encryption_rejects_bad_key_length() {
        // "short" decodes to 5 bytes
        let err = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("ENCRYPTION_ENABLED", "true"),
            ("ENCRYPTION_KEY", "c2hvcnQ="),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("16, 24 or 32"));
    }

    #[test]
    fn enabled_encryption_accepts_valid_key() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("ENCRYPTION_ENABLED", "true"),
            ("ENCRYPTION_KEY", KEY_32),
            ("ENCRYPTION_IV_LENGTH", "16"),
        ])
        .unwrap();
        assert!(config.encryption.enabled);
        assert_eq!(config.encryption.decoded_key().unwrap().len(), 32);
        assert_eq!(config.encryption.iv_length, 16);
    }

    fn with_iv_length(iv_length: &str) -> Result<Config, anyhow::Error> {
        load(&[
            ("STORAGE_BACKEND", "memory"),
            ("ENCRYPTION_ENABLED", "true"),
            ("ENCRYPTION_KEY", KEY_32),
            ("ENCRYPTION_IV_LENGTH", iv_length),
        ])
    }

    #[test]
    fn iv_length_is_clamped_to_one() {
        assert_eq!(with_iv_length("-4").unwrap().encryption.iv_length, 1);
        assert_eq!(with_iv_length("0").unwrap().encryption.iv_length, 1);
    }

    #[test]
    fn non_standard_iv_lengths_are_accepted_up_to_the_cap() {
        assert_eq!(with_iv_length("8").unwrap().encryption.iv_length, 8);
        assert_eq!(with_iv_length("32").unwrap().encryption.iv_length, 32);

        let err = with_iv_length("33").unwrap_err();
        assert!(err.to_string().contains("between 1 and 32"));
        assert!(with_iv_length("twelve").is_err());
    }

    #[test]
    fn malformed_numeric_settings_fail_startup() {
        let err = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("COMPRESSION_MAX_DIMENSION", "big"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("COMPRESSION_MAX_DIMENSION"));

        let err = load(&[("STORAGE_BACKEND", "memory"), ("DB_MAX_CONNECTIONS", "-1")])
            .unwrap_err();
        assert!(err.to_string().contains("DB_MAX_CONNECTIONS"));

        assert!(load(&[("STORAGE_BACKEND", "memory"), ("DB_MAX_CONNECTIONS", "0")]).is_err());

        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("COMPRESSION_MAX_DIMENSION", " 0 "),
            ("DB_MAX_CONNECTIONS", "12"),
        ])
        .unwrap();
        assert_eq!(config.compression_max_dimension, 0);
        assert_eq!(config.db_max_connections, 12);
    }

    #[test]
    fn disabled_encryption_ignores_garbage_key() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("ENCRYPTION_KEY", "not base64 at all"),
        ])
        .unwrap();
        assert!(!config.encryption.enabled);
    }

    #[test]
    fn bucket_overrides_are_validated() {
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("BUCKET_BIOMETRICS", "acme-selfies"),
        ])
        .unwrap();
        assert_eq!(
            config.buckets.bucket_for(DocumentCategory::Video).unwrap(),
            "acme-selfies"
        );

        assert!(load(&[("STORAGE_BACKEND", "memory"), ("BUCKET_CARDS", "Bad_Bucket")]).is_err());
    }

    #[test]
    fn every_category_routes_to_a_configured_bucket() {
        let buckets = BucketConfig::default();
        for category in DocumentCategory::ALL {
            let name = buckets.bucket_for(category).unwrap();
            assert!(!name.is_empty());
        }
        assert_eq!(
            buckets.bucket_for(DocumentCategory::Photo).unwrap(),
            "kyc-biometrics"
        );
    }

    #[test]
    fn blank_bucket_is_a_validation_failure() {
        let buckets = BucketConfig {
            signatures: "  ".to_string(),
            ..BucketConfig::default()
        };
        assert!(matches!(
            buckets.bucket_for(DocumentCategory::Signature),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn memory_backend_is_refused_in_production() {
        assert!(load(&[("STORAGE_BACKEND", "memory"), ("ENVIRONMENT", "production")]).is_err());
    }

    #[test]
    fn database_url_must_be_postgres() {
        assert!(load(&[
            ("STORAGE_BACKEND", "memory"),
            ("DATABASE_URL", "mysql://localhost/db")
        ])
        .is_err());
        let config = load(&[
            ("STORAGE_BACKEND", "memory"),
            ("DATABASE_URL", "postgres://localhost/onboard"),
        ])
        .unwrap();
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/onboard"));
    }

    #[test]
    fn debug_output_redacts_key() {
        let config = EncryptionConfig::enabled(KEY_32, 12);
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains(KEY_32));
        assert!(rendered.contains("redacted"));
    }
}
