//! FCM HTTP v1 wire format and OAuth2 token cache (spec §4.5, "FCM access
//! token"; §6 "Wire: FCM v1").

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rsa::pkcs1v15::SigningKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::RsaPrivateKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tokio::sync::Mutex;

use crate::{
    b64,
    error::EngineError,
    http::{OutboundRequest, PushTransportClient},
};

const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";
const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// A Google service account, as read from `FCM_SERVICE_ACCOUNT_JSON`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,
}

/// Signs a service-account JWT with RS256. Isolated behind a trait so the
/// RSA backend is swappable without touching the token-cache logic above it.
pub trait ServiceAccountSigner: Send + Sync {
    fn sign(&self, signing_input: &str) -> Result<Vec<u8>, EngineError>;
}

pub struct RsaPkcs1v15Signer {
    key: SigningKey<Sha256>,
}

impl RsaPkcs1v15Signer {
    pub fn from_pem(pem: &str) -> Result<Self, EngineError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem).map_err(|_| EngineError::InvalidRequest("invalid FCM service account key".into()))?;
        Ok(RsaPkcs1v15Signer { key: SigningKey::<Sha256>::new(private_key) })
    }
}

impl ServiceAccountSigner for RsaPkcs1v15Signer {
    fn sign(&self, signing_input: &str) -> Result<Vec<u8>, EngineError> {
        let signature = self.key.sign(signing_input.as_bytes());
        Ok(signature.to_vec())
    }
}

#[derive(Serialize)]
struct JwtHeader<'a> {
    alg: &'a str,
    typ: &'a str,
}

#[derive(Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: SystemTime,
}

/// Process-wide FCM OAuth2 token cache (spec §5: "the only process-wide
/// cell"). A single `Mutex` guards a single slot; overlapping refreshes are
/// functionally safe because the later refresh simply overwrites the
/// earlier one (spec §9, "Global mutable state").
///
/// The token exchange itself goes through the engine's own
/// `PushTransportClient`, the same abstraction `transport/web_push.rs` and
/// the FCM send call use, rather than a private `reqwest::Client` — one
/// outbound seam for all three wire calls, and the one that lets tests
/// substitute a fake transport for the OAuth2 endpoint too.
pub struct FcmTokenCache {
    service_account: ServiceAccount,
    signer: Arc<dyn ServiceAccountSigner>,
    cached: Mutex<Option<CachedToken>>,
}

impl FcmTokenCache {
    pub fn new(service_account: ServiceAccount, signer: Arc<dyn ServiceAccountSigner>) -> Self {
        FcmTokenCache { service_account, signer, cached: Mutex::new(None) }
    }

    pub fn project_id(&self) -> &str {
        &self.service_account.project_id
    }

    /// Returns a valid bearer token, refreshing if missing or within 60s of
    /// expiry.
    pub async fn access_token(&self, transport: &dyn PushTransportClient) -> Result<String, EngineError> {
        {
            let guard = self.cached.lock().await;
            if let Some(token) = guard.as_ref() {
                if token.expires_at > SystemTime::now() + REFRESH_SKEW {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let fresh = self.exchange(transport).await?;
        let mut guard = self.cached.lock().await;
        *guard = Some(CachedToken {
            access_token: fresh.access_token.clone(),
            expires_at: SystemTime::now() + Duration::from_secs(fresh.expires_in),
        });
        Ok(fresh.access_token)
    }

    async fn exchange(&self, transport: &dyn PushTransportClient) -> Result<TokenResponse, EngineError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs();

        let header = JwtHeader { alg: "RS256", typ: "JWT" };
        let claims = JwtClaims {
            iss: &self.service_account.client_email,
            scope: MESSAGING_SCOPE,
            aud: TOKEN_ENDPOINT,
            iat: now,
            exp: now + 3600,
        };

        let signing_input = format!(
            "{}.{}",
            b64::encode(serde_json::to_string(&header)?.as_bytes()),
            b64::encode(serde_json::to_string(&claims)?.as_bytes()),
        );

        let signature = self.signer.sign(&signing_input)?;
        let jwt = format!("{signing_input}.{}", b64::encode(&signature));

        // `jwt` is three base64url segments joined by `.`, already made up
        // entirely of URL-safe characters, so no percent-encoding is needed
        // for this one field.
        let body = format!("grant_type=urn:ietf:params:oauth:grant-type:jwt-bearer&assertion={jwt}").into_bytes();

        let request = OutboundRequest {
            url: TOKEN_ENDPOINT.to_string(),
            headers: Vec::new(),
            body,
            content_type: "application/x-www-form-urlencoded",
        };

        let response = transport.post(request).await?;

        if !(200..300).contains(&response.status) {
            return Err(EngineError::Transient(format!("oauth2 exchange failed: {}", response.status)));
        }

        serde_json::from_slice(&response.body).map_err(EngineError::from)
    }
}

/// The FCM v1 message shape of spec §6: title/body/image folded into the
/// notification block, `url` forwarded via `data`, high priority. `data`
/// also carries the same `notificationId` minted for the recipient's log
/// row, so an Android client's tracking callback can correlate back to it
/// exactly as a Web Push client does via the payload JSON.
#[derive(Debug, Serialize)]
pub struct FcmMessage<'a> {
    pub message: FcmMessageBody<'a>,
}

#[derive(Debug, Serialize)]
pub struct FcmMessageBody<'a> {
    pub token: &'a str,
    pub notification: FcmNotification<'a>,
    pub data: FcmData<'a>,
    pub android: FcmAndroidConfig,
}

#[derive(Debug, Serialize)]
pub struct FcmNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct FcmData<'a> {
    #[serde(rename = "notificationId")]
    pub notification_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct FcmAndroidConfig {
    pub priority: &'static str,
}

impl Default for FcmAndroidConfig {
    fn default() -> Self {
        FcmAndroidConfig { priority: "high" }
    }
}

pub fn send_url(project_id: &str) -> String {
    format!("https://fcm.googleapis.com/v1/projects/{project_id}/messages:send")
}

/// Classifies an FCM v1 response per spec §4.5 step 5 / §7.
pub fn classify(status: u16, body: &[u8]) -> Result<(), EngineError> {
    #[derive(Deserialize, Default)]
    struct Envelope {
        #[serde(default)]
        error: Option<FcmError>,
    }
    #[derive(Deserialize, Default)]
    struct FcmError {
        #[serde(default)]
        status: Option<String>,
    }

    if (200..300).contains(&status) {
        return Ok(());
    }

    let envelope: Envelope = serde_json::from_slice(body).unwrap_or_default();
    let fcm_status = envelope.error.and_then(|e| e.status);

    match fcm_status.as_deref() {
        Some("UNREGISTERED") => Err(EngineError::SubscriptionExpired),
        Some("INVALID_ARGUMENT") | Some("NOT_FOUND") => Err(EngineError::InvalidArgument),
        _ => match status {
            404 => Err(EngineError::SubscriptionExpired),
            429 => Err(EngineError::Http(status)),
            s if (500..600).contains(&s) => Err(EngineError::Http(status)),
            s => Err(EngineError::Http(s)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_unregistered_as_expired() {
        let body = br#"{"error":{"status":"UNREGISTERED"}}"#;
        assert!(matches!(classify(400, body), Err(EngineError::SubscriptionExpired)));
    }

    #[test]
    fn classifies_invalid_argument_as_permanent() {
        let body = br#"{"error":{"status":"INVALID_ARGUMENT"}}"#;
        assert!(matches!(classify(400, body), Err(EngineError::InvalidArgument)));
    }

    #[test]
    fn classifies_server_errors_as_transient() {
        assert!(matches!(classify(503, b"{}"), Err(EngineError::Http(503))));
    }

    #[test]
    fn builds_the_send_url() {
        assert_eq!(send_url("my-project"), "https://fcm.googleapis.com/v1/projects/my-project/messages:send");
    }
}
