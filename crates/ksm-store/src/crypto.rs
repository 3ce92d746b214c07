use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use ksm_types::{EncryptedBlob, KdfParams};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::StoreError;

const SALT_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Derive a 256-bit key from a passphrase and salt via PBKDF2-HMAC-SHA256.
/// `params.iterations` must be >= 100_000 outside tests.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, params.iterations, &mut key);
    key
}

pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// A wrapper that holds the derived key and zeroizes it on drop.
pub struct DerivedKey {
    key: [u8; KEY_LEN],
}

impl DerivedKey {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self { key }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Seal `plaintext` under `passphrase`: derive a fresh salt, derive the
/// key, encrypt under AES-256-GCM with a fresh random nonce. The packed
/// `salt||nonce||ciphertext` is returned unpacked as an `EncryptedBlob`.
pub fn seal(
    passphrase: &str,
    plaintext: &[u8],
    params: &KdfParams,
) -> Result<EncryptedBlob, StoreError> {
    let salt = generate_salt();
    let key_bytes = derive_key(passphrase, &salt, params);
    let key = DerivedKey::new(key_bytes);
    seal_with_key(&key, &salt, plaintext)
}

/// Seal with an already-derived key and a caller-chosen salt (used when
/// the salt is re-derived from a stored record rather than freshly
/// generated).
pub fn seal_with_key(
    key: &DerivedKey,
    salt: &[u8],
    plaintext: &[u8],
) -> Result<EncryptedBlob, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::Crypto(format!("cipher init failed: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| StoreError::Crypto(format!("encryption failed: {e}")))?;

    Ok(EncryptedBlob {
        salt: salt.to_vec(),
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Open a sealed blob under `passphrase`, re-deriving the key from the
/// blob's own salt. Any tampering anywhere in `salt||nonce||ciphertext`
/// causes this to fail (AES-GCM authentication).
pub fn open(
    passphrase: &str,
    blob: &EncryptedBlob,
    params: &KdfParams,
) -> Result<Vec<u8>, StoreError> {
    let key_bytes = derive_key(passphrase, &blob.salt, params);
    let key = DerivedKey::new(key_bytes);
    open_with_key(&key, blob)
}

pub fn open_with_key(key: &DerivedKey, blob: &EncryptedBlob) -> Result<Vec<u8>, StoreError> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| StoreError::Crypto(format!("cipher init failed: {e}")))?;
    let nonce = Nonce::from_slice(&blob.nonce);
    cipher
        .decrypt(nonce, blob.ciphertext.as_ref())
        .map_err(|e| StoreError::Crypto(format!("decryption failed: {e}")))
}

/// Pack an `EncryptedBlob` into a single base64 string for JSON transport
/// on disk (`salt||nonce||ciphertext`).
pub fn pack(blob: &EncryptedBlob) -> String {
    let mut packed = Vec::with_capacity(SALT_LEN + NONCE_LEN + blob.ciphertext.len());
    packed.extend_from_slice(&blob.salt);
    packed.extend_from_slice(&blob.nonce);
    packed.extend_from_slice(&blob.ciphertext);
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(packed)
}

pub fn unpack(packed: &str) -> Result<EncryptedBlob, StoreError> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(packed)
        .map_err(|e| StoreError::Crypto(format!("invalid base64: {e}")))?;
    if bytes.len() < SALT_LEN + NONCE_LEN {
        return Err(StoreError::Crypto("packed blob too short".to_string()));
    }
    let (salt, rest) = bytes.split_at(SALT_LEN);
    let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
    Ok(EncryptedBlob {
        salt: salt.to_vec(),
        nonce: nonce.to_vec(),
        ciphertext: ciphertext.to_vec(),
    })
}
