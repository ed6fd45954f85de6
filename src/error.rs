use std::time::Duration;
use thiserror::Error;

/// Errors shared by every component of the engine, from byte-level crypto up
/// to the scheduler. String variants carry the taxonomy constants of the
/// spec's error table so callers can match on `to_string()` where the API
/// contract requires the literal code (e.g. `SUBSCRIPTION_EXPIRED`).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Input was not valid base64url.
    #[error("invalid base64url encoding")]
    InvalidEncoding,

    /// A generated or stored VAPID key failed validation.
    #[error("invalid VAPID key material")]
    InvalidVapidKey,

    /// A subscriber's `p256dh`/`auth` pair is not usable for encryption.
    #[error("invalid subscriber encryption key")]
    InvalidSubscriberKey,

    /// Something went wrong inside the crypto primitives themselves.
    #[error("cryptographic operation failed")]
    CryptoFailure,

    /// `website_id`, `subscriber_id` or similar was not found.
    #[error("not found")]
    NotFound,

    /// Caller is not the website's owner, nor a platform owner.
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed request or a validation constraint from the request schema
    /// (title/body length caps, too many target ids, etc).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Subscriber row is missing credentials for its declared platform.
    #[error("MISSING_CREDENTIALS")]
    MissingCredentials,

    /// FCM is not configured for this deployment.
    #[error("FCM_NOT_CONFIGURED")]
    FcmNotConfigured,

    /// Push service rejected the VAPID JWT (401/403).
    #[error("VAPID_AUTH_FAILED")]
    VapidAuthFailed,

    /// 404/410, or an `UNREGISTERED` body: permanent, reclaim the subscriber.
    #[error("SUBSCRIPTION_EXPIRED")]
    SubscriptionExpired,

    /// FCM `INVALID_ARGUMENT` / `NOT_FOUND`: malformed payload or token.
    #[error("INVALID_ARGUMENT")]
    InvalidArgument,

    /// Any other non-2xx status, carried for retry bookkeeping.
    #[error("HTTP_{0}")]
    Http(u16),

    /// Transient network/timeout failure.
    #[error("transient I/O error: {0}")]
    Transient(String),

    /// Unhandled exception / I/O, not tied to a push attempt.
    #[error("server error")]
    ServerError,

    /// `Retry-After` duration, when present on a 5xx/429 response.
    #[error("server error, retry after {0:?}")]
    ServerErrorRetryAfter(Duration),
}

impl EngineError {
    /// Whether this outcome should be retried under the policy of spec.md
    /// §4.5 step 6 (transient) or is terminal (permanent).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Http(_) | EngineError::Transient(_) | EngineError::ServerError | EngineError::ServerErrorRetryAfter(_)
        )
    }

    /// Whether this outcome should flip the subscriber to `inactive`.
    pub fn is_reclaimable(&self) -> bool {
        matches!(self, EngineError::SubscriptionExpired)
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            EngineError::Transient(e.to_string())
        } else {
            EngineError::ServerError
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(_: serde_json::Error) -> Self {
        EngineError::InvalidRequest("malformed JSON".into())
    }
}

/// Parses a `Retry-After` header value, either as delay-seconds or an
/// HTTP-date, into a `Duration` from now.
pub struct RetryAfter;

impl RetryAfter {
    pub fn from_str(header_value: &str) -> Option<Duration> {
        if let Ok(seconds) = header_value.parse::<u64>() {
            return Some(Duration::from_secs(seconds));
        }

        chrono::DateTime::parse_from_rfc2822(header_value).ok().and_then(|date_time| {
            let target = date_time.with_timezone(&chrono::Utc);
            let now = chrono::Utc::now();
            (target - now).to_std().ok()
        })
    }
}
