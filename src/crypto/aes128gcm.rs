//! RFC 8291 `aes128gcm` payload encryption (spec §4.4, component C4).
//!
//! Ported by hand from the shape of the teacher's older ring-based
//! `http_ece/aes128gcm.rs` (ECDH → HKDF → AES-128-GCM → framed record), using
//! registry crates (`p256`, `hkdf`, `sha2`, `aes-gcm`) instead of the
//! teacher's git-sourced `ece` dependency.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use rand::RngCore;
use sha2::Sha256;

use crate::error::EngineError;

const RECORD_SIZE: u32 = 4096;
const KEY_ID_LEN: u8 = 65;

/// Encrypts `payload` for a subscriber identified by their `p256dh`
/// (`ua_public`, 65-byte uncompressed point) and `auth` secret (16 bytes),
/// producing the framed `aes128gcm` body ready to POST as-is.
pub fn encrypt(payload: &[u8], ua_public: &[u8], auth_secret: &[u8]) -> Result<Vec<u8>, EngineError> {
    if ua_public.len() != 65 || ua_public[0] != 0x04 {
        return Err(EngineError::InvalidSubscriberKey);
    }
    if auth_secret.len() != 16 {
        return Err(EngineError::InvalidSubscriberKey);
    }

    let ua_public_key = PublicKey::from_sec1_bytes(ua_public).map_err(|_| EngineError::InvalidSubscriberKey)?;

    let as_secret = SecretKey::random(&mut rand::rngs::OsRng);
    let as_public = as_secret.public_key();
    let as_public_bytes = as_public.to_encoded_point(false).as_bytes().to_vec();

    let shared = diffie_hellman(as_secret.to_nonzero_scalar(), ua_public_key.as_affine());
    let ecdh_secret = shared.raw_secret_bytes().to_vec();

    // Step 2: combine identities into IKM.
    let mut key_info = Vec::with_capacity(14 + 1 + 65 + 65);
    key_info.extend_from_slice(b"WebPush: info\0");
    key_info.extend_from_slice(ua_public);
    key_info.extend_from_slice(&as_public_bytes);

    let (_, hk) = Hkdf::<Sha256>::extract(Some(auth_secret), &ecdh_secret);
    let mut ikm = [0u8; 32];
    hk.expand(&key_info, &mut ikm).map_err(|_| EngineError::CryptoFailure)?;

    // Step 3: content encryption key and nonce, salted per-message.
    let mut salt = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut salt);

    let (_, hk) = Hkdf::<Sha256>::extract(Some(&salt), &ikm);
    let mut cek = [0u8; 16];
    hk.expand(b"Content-Encoding: aes128gcm\0", &mut cek)
        .map_err(|_| EngineError::CryptoFailure)?;
    let mut nonce_bytes = [0u8; 12];
    hk.expand(b"Content-Encoding: nonce\0", &mut nonce_bytes)
        .map_err(|_| EngineError::CryptoFailure)?;

    // Step 4: plaintext framing — trailing 0x02 marks the (only) last record.
    let mut plaintext = Vec::with_capacity(payload.len() + 1);
    plaintext.extend_from_slice(payload);
    plaintext.push(0x02);

    // Step 5: seal.
    let cipher = Aes128Gcm::new_from_slice(&cek).map_err(|_| EngineError::CryptoFailure)?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher.encrypt(nonce, plaintext.as_slice()).map_err(|_| EngineError::CryptoFailure)?;

    // Step 6: record header + ciphertext.
    let mut record = Vec::with_capacity(16 + 4 + 1 + 65 + ciphertext.len());
    record.extend_from_slice(&salt);
    record.extend_from_slice(&RECORD_SIZE.to_be_bytes());
    record.push(KEY_ID_LEN);
    record.extend_from_slice(&as_public_bytes);
    record.extend_from_slice(&ciphertext);

    Ok(record)
}
