//! Web Push wire format: request building and response classification (spec
//! §4.5 step 4-5, §6 "Wire: Web Push request").
//!
//! Grounded on the teacher's `clients/request_builder.rs` and
//! `services/autopush.rs` (header set, `ErrorInfo` body shape, status code
//! → error mapping), generalized from `http`/isahc bodies to `reqwest`.

use serde::{Deserialize, Serialize};

use crate::{crypto, error::EngineError, vapid};

/// The fixed notification JSON shape of spec §4.5 step 4. Unknown fields in
/// an inbound request are rejected well before this type is built (spec §9,
/// "Dynamic payload shapes"); this is strictly the outbound wire shape.
#[derive(Debug, Serialize)]
pub struct PushPayload<'a> {
    pub title: &'a str,
    pub body: &'a str,
    pub icon: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<&'a str>,
    pub url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<&'a [crate::model::NotificationAction]>,
    #[serde(rename = "notificationId")]
    pub notification_id: &'a str,
    pub timestamp: u64,
}

pub const DEFAULT_ICON: &str = "/icon-192x192.png";
pub const DEFAULT_URL: &str = "/";
const TTL_SECONDS: u32 = 86_400;

/// Everything needed to POST one Web Push request.
pub struct PreparedRequest {
    pub endpoint: String,
    pub body: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

/// Builds the encrypted, VAPID-signed request for one recipient.
pub fn prepare(
    endpoint: &str,
    p256dh_b64: &str,
    auth_b64: &str,
    payload: &PushPayload<'_>,
    vapid_key: &vapid::VapidKeyPair,
    vapid_subject: &str,
) -> Result<PreparedRequest, EngineError> {
    let p256dh = crate::b64::decode(p256dh_b64)?;
    let auth = crate::b64::decode(auth_b64)?;

    let payload_json = serde_json::to_vec(payload)?;
    let body = crypto::encrypt(&payload_json, &p256dh, &auth)?;

    let jwt = vapid::sign_vapid_jwt(vapid_key, endpoint, vapid_subject)?;
    let public_key_b64 = vapid_key.public_key_base64url();

    let headers = vec![
        ("Content-Type", "application/octet-stream".to_string()),
        ("Content-Encoding", "aes128gcm".to_string()),
        ("TTL", TTL_SECONDS.to_string()),
        ("Urgency", "high".to_string()),
        ("Authorization", format!("vapid t={jwt}, k={public_key_b64}")),
    ];

    Ok(PreparedRequest { endpoint: endpoint.to_string(), body, headers })
}

#[derive(Debug, Deserialize, Default)]
struct ErrorInfo {
    #[serde(default)]
    error: Option<String>,
}

/// Classifies a push service's response per spec §4.5 step 5 / §7.
pub fn classify(status: u16, body: &[u8]) -> Result<(), EngineError> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let body_str = String::from_utf8_lossy(body);
    let unregistered = body_str.contains("UNREGISTERED");

    match status {
        404 | 410 => Err(EngineError::SubscriptionExpired),
        _ if unregistered => Err(EngineError::SubscriptionExpired),
        401 | 403 => Err(EngineError::VapidAuthFailed),
        400 => {
            let info: ErrorInfo = serde_json::from_slice(body).unwrap_or_default();
            if info.error.as_deref() == Some("INVALID_ARGUMENT") || body_str.contains("INVALID_ARGUMENT") {
                Err(EngineError::InvalidArgument)
            } else {
                Err(EngineError::Http(status))
            }
        }
        429 => Err(EngineError::Http(status)),
        s if (500..600).contains(&s) => Err(EngineError::Http(status)),
        s => Err(EngineError::Http(s)),
    }
}
