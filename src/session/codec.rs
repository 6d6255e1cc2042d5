//! Authenticated cookie value encoding.
//!
//! Wire format, before the outer URL-safe base64:
//!
//! ```text
//! <unix-seconds> "|" <base64(sealed value)> "|" <HMAC-SHA256(name|unix-seconds|base64(sealed value))>
//! ```
//!
//! The value is JSON. With a block key it is sealed with AES-GCM (random
//! 96-bit nonce prepended, cookie name as associated data); without one it is
//! only signed. The MAC binds the cookie name and the timestamp, so values
//! cannot be replayed under another name and age out after `max_age`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, Nonce, OsRng, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Browsers reject cookies much larger than this.
pub const MAX_ENCODED_LEN: usize = 4096;

const NONCE_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("hash key must be 32 or 64 bytes, got {0}")]
    InvalidHashKey(usize),

    #[error("block key must be empty, 16 or 32 bytes, got {0}")]
    InvalidBlockKey(usize),

    #[error("encoded value exceeds {MAX_ENCODED_LEN} bytes")]
    TooLong,

    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("malformed cookie value")]
    Format,

    #[error("cookie signature mismatch")]
    MacMismatch,

    #[error("cookie timestamp expired")]
    Expired,

    #[error("cookie decryption failed")]
    Decrypt,

    #[error("cookie encryption failed")]
    Encrypt,

    #[error("cookie payload: {0}")]
    Json(#[from] serde_json::Error),
}

enum Cipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

impl Cipher {
    fn from_key(key: &[u8]) -> Result<Option<Self>, CodecError> {
        let invalid = |_| CodecError::InvalidBlockKey(key.len());
        match key.len() {
            0 => Ok(None),
            16 => Ok(Some(Self::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?))),
            32 => Ok(Some(Self::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?))),
            other => Err(CodecError::InvalidBlockKey(other)),
        }
    }

    fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Aes128(cipher) => seal_with(cipher, aad, plaintext),
            Self::Aes256(cipher) => seal_with(cipher, aad, plaintext),
        }
    }

    fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        match self {
            Self::Aes128(cipher) => open_with(cipher, aad, sealed),
            Self::Aes256(cipher) => open_with(cipher, aad, sealed),
        }
    }
}

fn seal_with<C: Aead + AeadCore>(cipher: &C, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad })
        .map_err(|_| CodecError::Encrypt)?;

    let mut sealed = nonce.to_vec();
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

fn open_with<C: Aead + AeadCore>(cipher: &C, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
    if sealed.len() < NONCE_LEN {
        return Err(CodecError::Decrypt);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| CodecError::Decrypt)
}

pub struct SecureCodec {
    signer: HmacSha256,
    cipher: Option<Cipher>,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for SecureCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureCodec")
            .field("encrypted", &self.cipher.is_some())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

impl SecureCodec {
    pub fn new(hash_key: &[u8], block_key: &[u8]) -> Result<Self, CodecError> {
        if !matches!(hash_key.len(), 32 | 64) {
            return Err(CodecError::InvalidHashKey(hash_key.len()));
        }
        let signer = <HmacSha256 as Mac>::new_from_slice(hash_key)
            .map_err(|_| CodecError::InvalidHashKey(hash_key.len()))?;
        Ok(Self {
            signer,
            cipher: Cipher::from_key(block_key)?,
            max_age: None,
        })
    }

    /// Reject values whose embedded timestamp is older than `max_age`.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode<T: Serialize>(&self, name: &str, value: &T) -> Result<String, CodecError> {
        self.encode_at(name, value, Utc::now())
    }

    pub fn decode<T: DeserializeOwned>(&self, name: &str, encoded: &str) -> Result<T, CodecError> {
        self.decode_at(name, encoded, Utc::now())
    }

    pub fn encode_at<T: Serialize>(
        &self,
        name: &str,
        value: &T,
        now: DateTime<Utc>,
    ) -> Result<String, CodecError> {
        let plaintext = serde_json::to_vec(value)?;
        let sealed = match &self.cipher {
            Some(cipher) => cipher.seal(name.as_bytes(), &plaintext)?,
            None => plaintext,
        };

        let timestamp = now.timestamp().to_string();
        let body = URL_SAFE_NO_PAD.encode(sealed);
        let mac = self.mac(name, &timestamp, &body).finalize().into_bytes();

        let mut framed = Vec::with_capacity(timestamp.len() + body.len() + mac.len() + 2);
        framed.extend_from_slice(timestamp.as_bytes());
        framed.push(b'|');
        framed.extend_from_slice(body.as_bytes());
        framed.push(b'|');
        framed.extend_from_slice(&mac);

        let encoded = URL_SAFE_NO_PAD.encode(framed);
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(CodecError::TooLong);
        }
        Ok(encoded)
    }

    pub fn decode_at<T: DeserializeOwned>(
        &self,
        name: &str,
        encoded: &str,
        now: DateTime<Utc>,
    ) -> Result<T, CodecError> {
        if encoded.len() > MAX_ENCODED_LEN {
            return Err(CodecError::TooLong);
        }
        let framed = URL_SAFE_NO_PAD.decode(encoded)?;

        // The MAC is raw bytes and may itself contain '|'.
        let mut parts = framed.splitn(3, |b| *b == b'|');
        let (Some(timestamp), Some(body), Some(tag)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CodecError::Format);
        };
        let timestamp = std::str::from_utf8(timestamp).map_err(|_| CodecError::Format)?;
        let body = std::str::from_utf8(body).map_err(|_| CodecError::Format)?;

        self.mac(name, timestamp, body)
            .verify_slice(tag)
            .map_err(|_| CodecError::MacMismatch)?;

        let issued: i64 = timestamp.parse().map_err(|_| CodecError::Format)?;
        if let Some(max_age) = self.max_age {
            if issued < now.timestamp().saturating_sub(max_age.num_seconds()) {
                return Err(CodecError::Expired);
            }
        }

        let sealed = URL_SAFE_NO_PAD.decode(body)?;
        let plaintext = match &self.cipher {
            Some(cipher) => cipher.open(name.as_bytes(), &sealed)?,
            None => sealed,
        };
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn mac(&self, name: &str, timestamp: &str, body: &str) -> HmacSha256 {
        let mut mac = self.signer.clone();
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.as_bytes());
        mac.update(b"|");
        mac.update(body.as_bytes());
        mac
    }
}
