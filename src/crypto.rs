//! Password-based authenticated encryption of text blobs.
//!
//! Tokens have the form `base64(salt).base64(nonce).base64(ciphertext)`. The key is
//! derived per token with PBKDF2-HMAC-SHA256 over a fresh 16-byte salt, and the
//! ciphertext (with its GCM tag) is produced by AES-256-GCM under a fresh 96-bit nonce.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::CryptoError;

pub const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

/// Separator between token parts. Never produced by the standard base64 alphabet.
const DELIMITER: char = '.';

/// Encrypt `plaintext` under `password`.
pub fn encrypt(plaintext: &str, password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);

    let cipher = cipher_for(password, &salt);

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(format!(
        "{}{DELIMITER}{}{DELIMITER}{}",
        BASE64.encode(salt),
        BASE64.encode(nonce_bytes),
        BASE64.encode(ciphertext)
    ))
}

/// Decrypt a token produced by [`encrypt`].
pub fn decrypt(token: &str, password: &str) -> Result<String, CryptoError> {
    let parts: Vec<&str> = token.split(DELIMITER).collect();
    if parts.len() != 3 {
        return Err(CryptoError::MalformedToken(format!(
            "expected 3 parts, found {}",
            parts.len()
        )));
    }

    let salt = decode_part(parts[0], "salt")?;
    let nonce_bytes = decode_part(parts[1], "nonce")?;
    let ciphertext = decode_part(parts[2], "ciphertext")?;

    if salt.len() != SALT_SIZE {
        return Err(CryptoError::MalformedToken(format!(
            "salt must be {SALT_SIZE} bytes, found {}",
            salt.len()
        )));
    }
    if nonce_bytes.len() != NONCE_SIZE {
        return Err(CryptoError::MalformedToken(format!(
            "nonce must be {NONCE_SIZE} bytes, found {}",
            nonce_bytes.len()
        )));
    }

    let cipher = cipher_for(password, &salt);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let plaintext = cipher
        .decrypt(nonce, ciphertext.as_slice())
        .map_err(|_| CryptoError::DecryptionFailed)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}

/// Cheap structural check: does `value` have the shape of a token?
///
/// Used to tell rows written before encryption was enabled apart from ciphertext.
pub fn looks_encrypted(value: &str) -> bool {
    let parts: Vec<&str> = value.split(DELIMITER).collect();
    parts.len() == 3
        && matches!(BASE64.decode(parts[0]), Ok(s) if s.len() == SALT_SIZE)
        && matches!(BASE64.decode(parts[1]), Ok(n) if n.len() == NONCE_SIZE)
        && BASE64.decode(parts[2]).is_ok()
}

fn cipher_for(password: &str, salt: &[u8]) -> Aes256Gcm {
    let mut derived_key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut derived_key);
    let key = Key::<Aes256Gcm>::from_slice(&derived_key);
    Aes256Gcm::new(key)
}

fn decode_part(part: &str, name: &str) -> Result<Vec<u8>, CryptoError> {
    BASE64
        .decode(part)
        .map_err(|e| CryptoError::MalformedToken(format!("{name} is not valid base64: {e}")))
}
