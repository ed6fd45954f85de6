//! P-256 VAPID keypair generation and validation (spec §4.2, component C2).

use p256::ecdsa::SigningKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;

use crate::{b64, error::EngineError};

/// A P-256 keypair used to sign VAPID JWTs for one website.
#[derive(Clone)]
pub struct VapidKeyPair {
    signing_key: SigningKey,
}

impl VapidKeyPair {
    /// Generates a fresh keypair.
    pub fn generate() -> Self {
        VapidKeyPair {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    /// Rebuilds a keypair from its 32-byte big-endian private scalar.
    pub fn from_private_scalar(scalar: &[u8]) -> Result<Self, EngineError> {
        let signing_key = SigningKey::from_slice(scalar).map_err(|_| EngineError::InvalidVapidKey)?;
        Ok(VapidKeyPair { signing_key })
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The 65-byte uncompressed SEC1 point `0x04 ‖ X(32) ‖ Y(32)`.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// The 32-byte big-endian private scalar.
    pub fn private_scalar_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    pub fn public_key_base64url(&self) -> String {
        b64::encode(&self.public_key_bytes())
    }

    pub fn private_scalar_base64url(&self) -> String {
        b64::encode(&self.private_scalar_bytes())
    }

    /// Validates a base64url-encoded public key per spec §4.2: it must decode
    /// to exactly 65 bytes, start with `0x04`, and its base64url length must
    /// fall in `[85, 90]`.
    pub fn validate_public_base64url(encoded: &str) -> Result<(), EngineError> {
        if !(85..=90).contains(&encoded.len()) {
            return Err(EngineError::InvalidVapidKey);
        }

        let bytes = b64::decode(encoded)?;

        if bytes.len() != 65 || bytes[0] != 0x04 {
            return Err(EngineError::InvalidVapidKey);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_public_key_is_well_formed() {
        for _ in 0..20 {
            let pair = VapidKeyPair::generate();
            let public = pair.public_key_bytes();

            assert_eq!(public.len(), 65);
            assert_eq!(public[0], 0x04);

            let encoded = pair.public_key_base64url();
            assert!((85..=90).contains(&encoded.len()));
            assert!(encoded.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

            VapidKeyPair::validate_public_base64url(&encoded).unwrap();
        }
    }

    #[test]
    fn private_scalar_round_trips() {
        let pair = VapidKeyPair::generate();
        let scalar = pair.private_scalar_bytes();
        assert_eq!(scalar.len(), 32);

        let rebuilt = VapidKeyPair::from_private_scalar(&scalar).unwrap();
        assert_eq!(rebuilt.public_key_bytes(), pair.public_key_bytes());
    }

    #[test]
    fn rejects_malformed_public_keys() {
        assert!(VapidKeyPair::validate_public_base64url("short").is_err());

        let mut bad = vec![0x02u8; 65];
        bad[0] = 0x02;
        let encoded = b64::encode(&bad);
        assert!(VapidKeyPair::validate_public_base64url(&encoded).is_err());
    }
}
