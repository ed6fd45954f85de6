//! The delivery engine (C5): spec.md §4.5 in full, the largest component of
//! the repo. Grounded on the control flow of `pimeys`'s single `send`, here
//! generalized to a batched multi-recipient fan-out across two transports.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use futures::future::join_all;
use uuid::Uuid;

use crate::{
    error::EngineError,
    http::{OutboundRequest, OutboundResponse, PushTransportClient},
    model::{
        NotificationAction, NotificationContent, NotificationLog, NotificationLogStatus, Platform, Subscriber,
        Transport, Website,
    },
    repository::{CampaignRepository, NotificationLogRepository, SubscriberRepository, WebsiteRepository},
    transport::{fcm, web_push},
    vapid,
};

/// Recipients per concurrent batch (spec.md §5, "up to `BATCH_SIZE = 50`
/// concurrent recipient attempts").
const BATCH_SIZE: usize = 50;

/// Additional attempts for a transient failure (spec.md §4.5 step 6, Open
/// Question 3: `[1s, 2s]`, not the `[1s, 5s, 15s]`/3-retry alternative).
const MAX_RETRIES: u32 = 2;
const RETRY_BACKOFF_SECS: [u64; MAX_RETRIES as usize] = [1, 2];

const DEFAULT_PUSH_TIMEOUT_SECS: u64 = 10;

/// Who is allowed to call `send` on behalf of a website.
pub enum Caller {
    WebsiteOwner(Uuid),
    PlatformOwner,
}

pub struct SendRequest {
    pub website_id: Uuid,
    pub notification: NotificationContent,
    pub campaign_id: Option<Uuid>,
    /// At most 1000 ids (spec.md §4.5).
    pub target_subscriber_ids: Option<Vec<Uuid>>,
    pub caller: Caller,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct Summary {
    pub sent: u64,
    pub failed: u64,
    pub total: u64,
}

struct Outcome {
    subscriber_id: Uuid,
    platform: Platform,
    /// Minted once per recipient in `dispatch_one` and reused verbatim in
    /// the outbound payload (Web Push JSON body, FCM `data` block) and the
    /// log row, so an inbound `/track/{event}` callback can correlate back
    /// to the exact row the client actually received.
    notification_id: String,
    result: Result<(), EngineError>,
}

/// The delivery engine, holding everything needed across a `send` call:
/// the persistence boundary, the outbound transport, and the FCM token
/// cache (spec.md §5, "the only process-wide cell").
pub struct DeliveryEngine {
    websites: Arc<dyn WebsiteRepository>,
    subscribers: Arc<dyn SubscriberRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    logs: Arc<dyn NotificationLogRepository>,
    transport: Arc<dyn PushTransportClient>,
    fcm_tokens: Option<Arc<fcm::FcmTokenCache>>,
    vapid_subject: String,
}

impl DeliveryEngine {
    pub fn new(
        websites: Arc<dyn WebsiteRepository>,
        subscribers: Arc<dyn SubscriberRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        logs: Arc<dyn NotificationLogRepository>,
        transport: Arc<dyn PushTransportClient>,
        fcm_tokens: Option<Arc<fcm::FcmTokenCache>>,
        vapid_subject: String,
    ) -> Self {
        DeliveryEngine { websites, subscribers, campaigns, logs, transport, fcm_tokens, vapid_subject }
    }

    /// Step 1 of spec.md §4.5: resolve the website and check the caller.
    async fn authorize(&self, website_id: Uuid, caller: &Caller) -> Result<Website, EngineError> {
        let website = self.websites.get(website_id).await?;

        match caller {
            Caller::PlatformOwner => {}
            Caller::WebsiteOwner(user_id) if *user_id == website.owner_user_id => {}
            Caller::WebsiteOwner(_) => return Err(EngineError::Unauthorized),
        }

        Ok(website)
    }

    /// `send(request) -> Summary`, spec.md §4.5.
    pub async fn send(&self, request: SendRequest) -> Result<Summary, EngineError> {
        request.notification.validate()?;
        if let Some(ids) = &request.target_subscriber_ids {
            if ids.len() > 1000 {
                return Err(EngineError::InvalidRequest("targetSubscriberIds exceeds 1000".into()));
            }
        }

        let website = self.authorize(request.website_id, &request.caller).await?;
        website.validate_vapid_keys()?;

        let recipients = self
            .subscribers
            .active_subscribers(request.website_id, request.target_subscriber_ids.as_deref())
            .await?;

        if recipients.is_empty() {
            info!("send: website {} has no active subscribers", request.website_id);
            return Ok(Summary { sent: 0, failed: 0, total: 0 });
        }

        let vapid_key = self.load_vapid_key(&website)?;

        let mut all_outcomes = Vec::with_capacity(recipients.len());
        for batch in recipients.chunks(BATCH_SIZE) {
            let futures = batch.iter().map(|subscriber| {
                self.dispatch_one(subscriber, &request.notification, &vapid_key, &website.vapid_public_key)
            });
            all_outcomes.extend(join_all(futures).await);
        }

        self.finish(request.campaign_id, &website, all_outcomes).await
    }

    fn load_vapid_key(&self, website: &Website) -> Result<vapid::VapidKeyPair, EngineError> {
        let scalar = crate::b64::decode(&website.vapid_private_key)?;
        let scalar = if scalar.len() == 32 {
            scalar
        } else {
            use p256::pkcs8::DecodePrivateKey;
            p256::SecretKey::from_pkcs8_der(&scalar).map_err(|_| EngineError::InvalidVapidKey)?.to_bytes().to_vec()
        };
        vapid::VapidKeyPair::from_private_scalar(&scalar)
    }

    /// Steps 3-6: partition, build request, POST, classify, retry.
    async fn dispatch_one(
        &self,
        subscriber: &Subscriber,
        notification: &NotificationContent,
        vapid_key: &vapid::VapidKeyPair,
        vapid_public_b64: &str,
    ) -> Outcome {
        let platform = subscriber.platform;
        let notification_id = synthesize_notification_id();

        let result = match subscriber.transport() {
            None => Err(EngineError::MissingCredentials),
            Some(Transport::Web { endpoint, p256dh, auth }) => {
                self.send_web_push(&endpoint, &p256dh, &auth, notification, vapid_key, vapid_public_b64, &notification_id).await
            }
            Some(Transport::Android { fcm_token }) => self.send_fcm(&fcm_token, notification, &notification_id).await,
        };

        Outcome { subscriber_id: subscriber.id, platform, notification_id, result }
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_web_push(
        &self,
        endpoint: &str,
        p256dh_b64: &str,
        auth_b64: &str,
        notification: &NotificationContent,
        vapid_key: &vapid::VapidKeyPair,
        vapid_public_b64: &str,
        notification_id: &str,
    ) -> Result<(), EngineError> {
        let audience = endpoint_audience(endpoint)?;
        let timestamp = unix_millis();

        let actions: Option<Vec<NotificationAction>> = notification.actions.clone();
        let payload = web_push::PushPayload {
            title: &notification.title,
            body: &notification.body,
            icon: notification.icon_url.as_deref().unwrap_or(web_push::DEFAULT_ICON),
            image: notification.image_url.as_deref(),
            url: notification.click_url.as_deref().unwrap_or(web_push::DEFAULT_URL),
            actions: actions.as_deref(),
            notification_id,
            timestamp,
        };

        let _ = vapid_public_b64;

        self.with_retries(|| async {
            let prepared = web_push::prepare(endpoint, p256dh_b64, auth_b64, &payload, vapid_key, &self.vapid_subject)?;
            let request = OutboundRequest {
                url: prepared.endpoint.clone(),
                headers: prepared.headers.clone(),
                body: prepared.body.clone(),
                content_type: "application/octet-stream",
            };
            let response = self.post_with_audience(&audience, request).await?;
            web_push::classify(response.status, &response.body)
        })
        .await
    }

    async fn send_fcm(&self, fcm_token: &str, notification: &NotificationContent, notification_id: &str) -> Result<(), EngineError> {
        let tokens = self.fcm_tokens.as_ref().ok_or(EngineError::FcmNotConfigured)?;

        self.with_retries(|| async {
            let access_token = tokens.access_token(self.transport.as_ref()).await?;

            let message = fcm::FcmMessage {
                message: fcm::FcmMessageBody {
                    token: fcm_token,
                    notification: fcm::FcmNotification {
                        title: &notification.title,
                        body: &notification.body,
                        image: notification.image_url.as_deref(),
                    },
                    data: fcm::FcmData { notification_id, url: notification.click_url.as_deref() },
                    android: fcm::FcmAndroidConfig::default(),
                },
            };

            let body = serde_json::to_vec(&message)?;
            let request = OutboundRequest {
                url: fcm::send_url(tokens.project_id()),
                headers: vec![("Authorization", format!("Bearer {access_token}"))],
                body,
                content_type: "application/json",
            };

            let response = self.transport.post(request).await?;
            fcm::classify(response.status, &response.body)
        })
        .await
    }

    /// A dispatched HTTP POST, with the per-request timeout spec.md §5
    /// recommends (10s) treated as a transient failure subject to retry.
    async fn post_with_audience(&self, _audience: &str, request: OutboundRequest) -> Result<OutboundResponse, EngineError> {
        match tokio::time::timeout(std::time::Duration::from_secs(DEFAULT_PUSH_TIMEOUT_SECS), self.transport.post(request)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Transient("request timed out".into())),
        }
    }

    /// Applies the backoff schedule of spec.md §4.5 step 6 around one
    /// attempt closure.
    async fn with_retries<F, Fut>(&self, attempt: F) -> Result<(), EngineError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<(), EngineError>>,
    {
        let mut last_err = None;

        for delay_secs in std::iter::once(0).chain(RETRY_BACKOFF_SECS.iter().copied()) {
            if delay_secs > 0 {
                trace!("retrying after {delay_secs}s backoff");
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
            }

            match attempt().await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() => {
                    warn!("transient delivery failure: {err}");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or(EngineError::ServerError))
    }

    /// Steps 7-9: per-recipient log rows, bulk reclamation, aggregate
    /// counters.
    async fn finish(&self, campaign_id: Option<Uuid>, website: &Website, outcomes: Vec<Outcome>) -> Result<Summary, EngineError> {
        let mut sent = 0u64;
        let mut failed = 0u64;
        let mut reclaim = Vec::new();

        for outcome in outcomes {
            let now = Utc::now();

            let log = match &outcome.result {
                Ok(()) => {
                    sent += 1;
                    NotificationLog {
                        id: Uuid::new_v4(),
                        campaign_id,
                        subscriber_id: outcome.subscriber_id,
                        website_id: website.id,
                        notification_id: outcome.notification_id.clone(),
                        status: NotificationLogStatus::Sent,
                        platform: outcome.platform,
                        sent_at: Some(now),
                        delivered_at: None,
                        clicked_at: None,
                        error_message: None,
                    }
                }
                Err(err) => {
                    failed += 1;
                    if err.is_reclaimable() {
                        reclaim.push(outcome.subscriber_id);
                    }
                    error!("permanent delivery failure for subscriber {}: {err}", outcome.subscriber_id);
                    NotificationLog {
                        id: Uuid::new_v4(),
                        campaign_id,
                        subscriber_id: outcome.subscriber_id,
                        website_id: website.id,
                        notification_id: outcome.notification_id.clone(),
                        status: NotificationLogStatus::Failed,
                        platform: outcome.platform,
                        sent_at: None,
                        delivered_at: None,
                        clicked_at: None,
                        error_message: Some(err.to_string()),
                    }
                }
            };

            self.logs.insert(log).await?;
        }

        if !reclaim.is_empty() {
            self.subscribers.mark_inactive_batch(&reclaim).await?;
        }

        // Completion status is the caller's call, not this method's: a
        // scheduled one-shot completes outright (`scheduler.rs`), but a
        // recurring campaign instead advances to its next `next_send_at`
        // and stays `recurring`. `send` only ever adds to the running
        // counters; it never decides terminal status.
        if let Some(campaign_id) = campaign_id {
            self.campaigns.add_counts(campaign_id, sent, failed).await?;
        }

        self.websites.increment_sent(website.id, sent).await?;

        let total = sent + failed;
        info!("send complete: {sent} sent, {failed} failed, {total} total");
        Ok(Summary { sent, failed, total })
    }

    /// Applies an inbound tracking event (spec.md §6, Tracking API) to the
    /// log row and bumps the campaign's `delivered_count`/`clicked_count`.
    pub async fn record_tracking_event(
        &self,
        website_id: Uuid,
        notification_id: &str,
        campaign_id: Option<Uuid>,
        status: NotificationLogStatus,
    ) -> Result<(), EngineError> {
        let at = Utc::now();
        let updated = self.logs.record_event(website_id, notification_id, status, at).await?;

        if updated.is_some() {
            if let Some(campaign_id) = campaign_id {
                let (delivered, clicked) = match status {
                    NotificationLogStatus::Delivered => (1, 0),
                    NotificationLogStatus::Clicked => (0, 1),
                    _ => (0, 0),
                };
                if delivered > 0 || clicked > 0 {
                    self.campaigns.add_tracking_counts(campaign_id, delivered, clicked).await?;
                }
            }
        }

        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

fn synthesize_notification_id() -> String {
    format!("notif-{}", unix_millis())
}

/// `scheme://host[:port]` of a push endpoint, the VAPID JWT audience (spec.md
/// §4.3). Same `http::Uri` parse `vapid::signer` uses for the JWT audience
/// itself, rather than pulling in a dedicated URL crate for one field.
fn endpoint_audience(endpoint: &str) -> Result<String, EngineError> {
    let uri: http::Uri = endpoint.parse().map_err(|_| EngineError::InvalidRequest("malformed push endpoint".into()))?;
    let scheme = uri.scheme_str().ok_or_else(|| EngineError::InvalidRequest("push endpoint has no scheme".into()))?;
    let authority = uri.authority().ok_or_else(|| EngineError::InvalidRequest("push endpoint has no host".into()))?;
    Ok(format!("{scheme}://{authority}"))
}
