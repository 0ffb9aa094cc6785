//! Crypto service for stored documents
//!
//! AES-GCM authenticated encryption with a fresh random IV per call. The IV is returned next to
//! the ciphertext instead of being prefixed to it, because the record keeps it in its own column.

use aes_gcm::aead::consts::{
    U1, U10, U11, U12, U13, U14, U15, U16, U17, U18, U19, U2, U20, U21, U22, U23, U24, U25, U26,
    U27, U28, U29, U3, U30, U31, U32, U4, U5, U6, U7, U8, U9,
};
use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::{Aes128, Aes192, Aes256};
use aes_gcm::AesGcm;

use base64::{engine::general_purpose, Engine as _};

use crate::config::{EncryptionConfig, MAX_IV_LENGTH, SUPPORTED_KEY_LENGTHS};
use crate::AppError;

/// Output of [`CryptoService::encrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionResult {
    payload: Vec<u8>,
    iv: Option<Vec<u8>>,
    encrypted: bool,
}

impl EncryptionResult {
    /// Ciphertext with the authentication tag appended, or the plaintext when disabled.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn iv(&self) -> Option<&[u8]> {
        self.iv.as_deref()
    }

    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn into_parts(self) -> (Vec<u8>, Option<Vec<u8>>, bool) {
        (self.payload, self.iv, self.encrypted)
    }
}

/// Object-safe view over the concrete `AesGcm<_, _>` instantiations.
trait DocumentCipher: Send + Sync {
    fn nonce_len(&self) -> usize;
    fn seal(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error>;
    fn open(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error>;
}

impl<C> DocumentCipher for C
where
    C: Aead + Send + Sync,
{
    fn nonce_len(&self) -> usize {
        C::NonceSize::USIZE
    }

    fn seal(&self, iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        if iv.len() != C::NonceSize::USIZE {
            return Err(aes_gcm::Error);
        }
        self.encrypt(GenericArray::from_slice(iv), plaintext)
    }

    fn open(&self, iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
        if iv.len() != C::NonceSize::USIZE {
            return Err(aes_gcm::Error);
        }
        self.decrypt(GenericArray::from_slice(iv), ciphertext)
    }
}

fn build_cipher(key: &[u8], iv_length: usize) -> Result<Box<dyn DocumentCipher>, AppError> {
    macro_rules! cipher {
        ($aes:ty, $nonce:ty) => {
            AesGcm::<$aes, $nonce>::new_from_slice(key)
                .map(|c| Box::new(c) as Box<dyn DocumentCipher>)
                .map_err(|_| AppError::Configuration("Invalid encryption key length".to_string()))
        };
    }

    macro_rules! for_key {
        ($nonce:ty) => {
            match key.len() {
                16 => cipher!(Aes128, $nonce),
                24 => cipher!(Aes192, $nonce),
                32 => cipher!(Aes256, $nonce),
                other => Err(AppError::Configuration(format!(
                    "Unsupported encryption key length: {} bytes",
                    other
                ))),
            }
        };
    }

    macro_rules! for_nonce {
        ($($len:literal => $nonce:ty),+ $(,)?) => {
            match iv_length {
                $($len => for_key!($nonce),)+
                other => Err(AppError::Configuration(format!(
                    "Unsupported IV length: {} bytes (maximum {})",
                    other, MAX_IV_LENGTH
                ))),
            }
        };
    }

    for_nonce! {
        1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7, 8 => U8,
        9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15, 16 => U16,
        17 => U17, 18 => U18, 19 => U19, 20 => U20, 21 => U21, 22 => U22, 23 => U23, 24 => U24,
        25 => U25, 26 => U26, 27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31, 32 => U32,
    }
}

/// Encrypts document payloads at rest when enabled, passes them through otherwise.
///
/// Built once at startup; the key schedule inside is never exposed.
pub struct CryptoService {
    cipher: Option<Box<dyn DocumentCipher>>,
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl CryptoService {
    /// Build from configuration. A missing or malformed key while enabled is a fatal
    /// configuration error.
    pub fn new(config: &EncryptionConfig) -> Result<Self, AppError> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        config.validate()?;
        let key = config.decoded_key()?;
        Self::from_key_bytes(&key, config.iv_length)
    }

    /// Create a service from raw key bytes (e.g. for tests; avoids env and base64 handling).
    pub fn from_key_bytes(key_bytes: &[u8], iv_length: usize) -> Result<Self, AppError> {
        let cipher = build_cipher(key_bytes, iv_length.max(1))?;
        Ok(Self {
            cipher: Some(cipher),
        })
    }

    pub fn disabled() -> Self {
        Self { cipher: None }
    }

    /// Fresh random key of `length` bytes, base64-encoded for `ENCRYPTION_KEY`.
    pub fn generate_key(length: usize) -> Result<String, AppError> {
        if !SUPPORTED_KEY_LENGTHS.contains(&length) {
            return Err(AppError::InvalidInput(format!(
                "Key length must be one of {:?} bytes, got {}",
                SUPPORTED_KEY_LENGTHS, length
            )));
        }
        let mut key = vec![0u8; length];
        OsRng.fill_bytes(&mut key);
        Ok(general_purpose::STANDARD.encode(key))
    }

    pub fn is_enabled(&self) -> bool {
        self.cipher.is_some()
    }

    /// IV length used for new encryptions, if enabled.
    pub fn iv_length(&self) -> Option<usize> {
        self.cipher.as_ref().map(|c| c.nonce_len())
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptionResult, AppError> {
        let Some(cipher) = &self.cipher else {
            return Ok(EncryptionResult {
                payload: plaintext.to_vec(),
                iv: None,
                encrypted: false,
            });
        };

        let mut iv = vec![0u8; cipher.nonce_len()];
        OsRng.fill_bytes(&mut iv);

        let payload = cipher
            .seal(&iv, plaintext)
            .map_err(|e| AppError::Internal(format!("Encryption failed: {}", e)))?;

        Ok(EncryptionResult {
            payload,
            iv: Some(iv),
            encrypted: true,
        })
    }

    /// Reverse [`encrypt`](Self::encrypt). When the service is disabled the input is returned
    /// unchanged; callers only pass ciphertext they know was produced with encryption on.
    pub fn decrypt(&self, ciphertext: &[u8], iv: Option<&[u8]>) -> Result<Vec<u8>, AppError> {
        let Some(cipher) = &self.cipher else {
            return Ok(ciphertext.to_vec());
        };

        let iv = iv
            .filter(|iv| !iv.is_empty())
            .ok_or_else(|| AppError::Decryption("Missing initialization vector".to_string()))?;

        cipher.open(iv, ciphertext).map_err(|_| {
            AppError::Decryption("Authentication failed for encrypted document".to_string())
        })
    }
}
