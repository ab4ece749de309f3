use aes_gcm::{
    aead::{consts::U16, generic_array::GenericArray, AeadInPlace, KeyInit, OsRng},
    aes::Aes256,
    AesGcm,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::errors::VaultError;

/// AES-256-GCM with a 128-bit nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;

/// Authenticated encryption of per-account secrets.
///
/// Ciphertexts are stored as `nonce_hex:tag_hex:cipher_hex`, with a fresh
/// random nonce per call.
pub struct SecretCipher {
    key: Zeroizing<[u8; 32]>,
}

impl SecretCipher {
    pub fn new(key_hex: &str) -> Result<Self, VaultError> {
        let key = parse_encryption_key(key_hex)?;
        Ok(Self {
            key: Zeroizing::new(key),
        })
    }

    fn cipher(&self) -> Result<Aes256Gcm16, VaultError> {
        Aes256Gcm16::new_from_slice(&self.key[..])
            .map_err(|e| VaultError::Config(format!("invalid key length: {:?}", e)))
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let cipher = self.cipher()?;
        let nonce = generate_nonce();

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
            .map_err(|_| VaultError::Encryption)?;

        Ok(format!(
            "{}:{}:{}",
            hex::encode(nonce),
            hex::encode(tag),
            hex::encode(&buffer)
        ))
    }

    /// Decrypt a stored ciphertext. The plaintext is wiped when dropped.
    pub fn decrypt(&self, ciphertext: &str) -> Result<Zeroizing<String>, VaultError> {
        let parts = split_ciphertext(ciphertext)?;
        let cipher = self.cipher()?;

        let mut buffer = parts.cipher;
        cipher
            .decrypt_in_place_detached(
                GenericArray::from_slice(&parts.nonce),
                b"",
                &mut buffer,
                GenericArray::from_slice(&parts.tag),
            )
            .map_err(|_| VaultError::Auth)?;

        let plaintext = String::from_utf8(buffer)
            .map_err(|_| VaultError::Format("plaintext is not valid UTF-8".into()))?;
        Ok(Zeroizing::new(plaintext))
    }
}

struct CiphertextParts {
    nonce: Vec<u8>,
    tag: Vec<u8>,
    cipher: Vec<u8>,
}

/// Three hex fields with the expected nonce and tag lengths.
fn split_ciphertext(ciphertext: &str) -> Result<CiphertextParts, VaultError> {
    let fields: Vec<&str> = ciphertext.split(':').collect();
    if fields.len() != 3 {
        return Err(VaultError::Format(format!(
            "expected 3 colon-separated fields, got {}",
            fields.len()
        )));
    }

    let decode = |name: &str, field: &str| {
        hex::decode(field).map_err(|_| VaultError::Format(format!("{} is not valid hex", name)))
    };
    let nonce = decode("nonce", fields[0])?;
    let tag = decode("auth tag", fields[1])?;
    let cipher = decode("cipher text", fields[2])?;

    if nonce.len() != NONCE_LEN {
        return Err(VaultError::Format(format!(
            "nonce must be {} bytes, got {}",
            NONCE_LEN,
            nonce.len()
        )));
    }
    if tag.len() != TAG_LEN {
        return Err(VaultError::Format(format!(
            "auth tag must be {} bytes, got {}",
            TAG_LEN,
            tag.len()
        )));
    }

    Ok(CiphertextParts { nonce, tag, cipher })
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn parse_encryption_key(hex: &str) -> Result<[u8; 32], VaultError> {
    if hex.len() != 64 {
        return Err(VaultError::Config(format!(
            "DIGEST_ENCRYPTION_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        )));
    }
    let bytes = hex::decode(hex)
        .map_err(|_| VaultError::Config("DIGEST_ENCRYPTION_KEY is not valid hex".into()))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
