//! Unpadded base64url encode/decode (spec §4.1, component C1).

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

use crate::error::EngineError;

/// Encodes bytes as unpadded, URL-safe base64.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes unpadded or padded URL-safe base64. Whitespace is stripped before
/// decoding; any remaining character outside `[A-Za-z0-9_-]` (or `=` used as
/// padding) is rejected.
pub fn decode(input: &str) -> Result<Vec<u8>, EngineError> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();

    if !cleaned
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '=')
    {
        return Err(EngineError::InvalidEncoding);
    }

    let trimmed = cleaned.trim_end_matches('=');

    URL_SAFE_NO_PAD
        .decode(trimmed)
        .map_err(|_| EngineError::InvalidEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_bytes() {
        let cases: &[&[u8]] = &[b"", b"\x00", b"hello world", &[0xff; 65], &[1, 2, 3, 4, 5, 250, 251]];

        for case in cases {
            assert_eq!(decode(&encode(case)).unwrap(), *case);
        }
    }

    #[test]
    fn tolerates_padding_and_whitespace() {
        let encoded = encode(b"hi there");
        let padded = format!("{encoded}==\n");
        assert_eq!(decode(&padded).unwrap(), b"hi there");
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(matches!(decode("not*valid!"), Err(EngineError::InvalidEncoding)));
    }
}
