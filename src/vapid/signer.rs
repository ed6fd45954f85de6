//! VAPID JWT construction and signing (spec §4.3, component C3; RFC 8292).

use p256::ecdsa::signature::Signer;
use p256::ecdsa::Signature;
use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::{b64, error::EngineError, vapid::key::VapidKeyPair};

const EXPIRY_SECONDS: u64 = 12 * 60 * 60;

#[derive(Serialize)]
struct Header<'a> {
    typ: &'a str,
    alg: &'a str,
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    exp: u64,
    sub: &'a str,
}

/// Signs a VAPID JWT for `endpoint`, using `subject` as the `sub` claim
/// (either a `mailto:` URI, or an absolute URL from which a
/// `mailto:noreply@<host>` is synthesized).
///
/// Returns the complete three-segment token (`header.claims.signature`, the
/// signature being the raw 64-byte `R‖S` per spec §4.3, base64url encoded).
pub fn sign_vapid_jwt(key: &VapidKeyPair, endpoint: &str, subject: &str) -> Result<String, EngineError> {
    let endpoint: http::Uri = endpoint.parse().map_err(|_| EngineError::InvalidRequest("invalid endpoint URI".into()))?;

    let scheme = endpoint.scheme_str().ok_or_else(|| EngineError::InvalidRequest("endpoint has no scheme".into()))?;
    let authority = endpoint.authority().ok_or_else(|| EngineError::InvalidRequest("endpoint has no host".into()))?;
    let audience = format!("{scheme}://{authority}");

    let sub = synthesize_subject(subject, authority.host());

    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        + EXPIRY_SECONDS;

    let header = Header { typ: "JWT", alg: "ES256" };
    let claims = Claims { aud: &audience, exp, sub: &sub };

    let signing_input = format!(
        "{}.{}",
        b64::encode(serde_json::to_string(&header)?.as_bytes()),
        b64::encode(serde_json::to_string(&claims)?.as_bytes()),
    );

    let signature: Signature = key.signing_key().sign(signing_input.as_bytes());
    let raw = signature.to_bytes();
    debug_assert_eq!(raw.len(), 64);

    Ok(format!("{}.{}", signing_input, b64::encode(&raw)))
}

fn synthesize_subject(subject: &str, endpoint_host: &str) -> String {
    if subject.starts_with("mailto:") {
        subject.to_string()
    } else {
        let host = http::Uri::try_from(subject)
            .ok()
            .and_then(|uri| uri.host().map(str::to_string))
            .unwrap_or_else(|| endpoint_host.to_string());

        format!("mailto:noreply@{host}")
    }
}

/// Parses a DER-encoded ECDSA signature (`SEQUENCE { INTEGER r, INTEGER s }`)
/// into the raw, fixed-length 64-byte `R‖S` form spec §4.3 requires on the
/// wire. Not used by `sign_vapid_jwt` (p256's `ecdsa::Signature` already
/// signs in raw form), but kept as a defensive conversion for signature
/// material that may arrive DER-encoded, e.g. imported from an HSM or a
/// PKCS8 tool.
pub fn raw_signature_from_der(der: &[u8]) -> Result<[u8; 64], EngineError> {
    // SEQUENCE tag + length
    if der.first() != Some(&0x30) {
        return Err(EngineError::CryptoFailure);
    }

    let r_off = 3usize;
    let r_len = *der.get(r_off).ok_or(EngineError::CryptoFailure)? as usize;
    let r_start = r_off + 1;
    let mut r_val = der.get(r_start..r_start + r_len).ok_or(EngineError::CryptoFailure)?;

    let s_off = r_start + r_len + 1;
    let s_len = *der.get(s_off).ok_or(EngineError::CryptoFailure)? as usize;
    let s_start = s_off + 1;
    let mut s_val = der.get(s_start..s_start + s_len).ok_or(EngineError::CryptoFailure)?;

    // DER integers carry a leading zero byte when the high bit would
    // otherwise be mistaken for a sign bit; strip it back down to 32 bytes.
    if r_val.len() == 33 && r_val[0] == 0 {
        r_val = &r_val[1..];
    }
    if s_val.len() == 33 && s_val[0] == 0 {
        s_val = &s_val[1..];
    }

    if r_val.len() > 32 || s_val.len() > 32 {
        return Err(EngineError::CryptoFailure);
    }

    let mut raw = [0u8; 64];
    raw[32 - r_val.len()..32].copy_from_slice(r_val);
    raw[64 - s_val.len()..64].copy_from_slice(s_val);

    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Verifier;
    use p256::ecdsa::VerifyingKey;

    #[test]
    fn jwt_has_three_segments_and_raw_signature() {
        let key = VapidKeyPair::generate();
        let jwt = sign_vapid_jwt(&key, "https://push.example.com/abc", "mailto:ops@example.com").unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        assert_eq!(parts.len(), 3);

        let sig_bytes = b64::decode(parts[2]).unwrap();
        assert_eq!(sig_bytes.len(), 64);
    }

    #[test]
    fn jwt_verifies_under_the_public_key() {
        let key = VapidKeyPair::generate();
        let jwt = sign_vapid_jwt(&key, "https://push.example.com/abc", "https://example.com").unwrap();

        let parts: Vec<&str> = jwt.split('.').collect();
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        let sig_bytes = b64::decode(parts[2]).unwrap();

        let signature = Signature::try_from(sig_bytes.as_slice()).unwrap();
        let verifying_key = VerifyingKey::from(key.signing_key());

        verifying_key.verify(signing_input.as_bytes(), &signature).unwrap();
    }

    #[test]
    fn synthesizes_mailto_subject_from_url() {
        let key = VapidKeyPair::generate();
        let jwt = sign_vapid_jwt(&key, "https://push.example.com/abc", "https://mysite.example").unwrap();
        let claims_b64 = jwt.split('.').nth(1).unwrap();
        let claims_json = String::from_utf8(b64::decode(claims_b64).unwrap()).unwrap();
        assert!(claims_json.contains("mailto:noreply@mysite.example"));
    }

    #[test]
    fn der_to_raw_round_trips_known_signature() {
        let key = VapidKeyPair::generate();
        let signature: Signature = key.signing_key().sign(b"der-roundtrip-test");
        let raw = signature.to_bytes();

        // Hand-build a DER encoding of the same (r, s) pair, including a
        // leading zero pad on r to exercise the sign-bit-stripping branch.
        let r = &raw[..32];
        let s = &raw[32..];
        let mut der = vec![0x30u8];
        let mut body = Vec::new();
        body.push(0x02);
        body.push((r.len() + 1) as u8);
        body.push(0x00);
        body.extend_from_slice(r);
        body.push(0x02);
        body.push(s.len() as u8);
        body.extend_from_slice(s);
        der.push(body.len() as u8);
        der.extend_from_slice(&body);

        let recovered = raw_signature_from_der(&der).unwrap();
        assert_eq!(&recovered[..], &raw[..]);
    }
}
