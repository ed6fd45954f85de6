//! The §3 data model: Website, Subscriber, Campaign, NotificationLog, PlanLimit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// A tenant: a website that sends push notifications to its visitors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Website {
    pub id: Uuid,
    pub name: String,
    pub origin: String,
    pub owner_user_id: Uuid,
    /// Base64url VAPID public key, 87–88 chars (spec §3 invariant).
    pub vapid_public_key: String,
    /// Base64url VAPID private key: either the raw 32-byte scalar, or a
    /// PKCS8 blob wrapping the same scalar.
    pub vapid_private_key: String,
    pub notifications_sent: u64,
}

impl Website {
    /// Checks the invariant of spec §3: the decoded public key is exactly
    /// 65 bytes with a leading `0x04`, and the decoded private scalar is
    /// exactly 32 bytes.
    pub fn validate_vapid_keys(&self) -> Result<(), EngineError> {
        crate::vapid::VapidKeyPair::validate_public_base64url(&self.vapid_public_key)?;

        let scalar = crate::b64::decode(&self.vapid_private_key)?;
        let scalar = pkcs8_scalar_or_raw(&scalar)?;
        if scalar.len() != 32 {
            return Err(EngineError::InvalidVapidKey);
        }

        Ok(())
    }
}

/// Unwraps a PKCS8-encoded scalar to its raw 32 bytes, or returns the input
/// unchanged if it already looks like a raw scalar. PKCS8 private key blobs
/// for P-256 are always > 32 bytes (ASN.1 envelope overhead), so length is a
/// reliable discriminator here.
fn pkcs8_scalar_or_raw(bytes: &[u8]) -> Result<Vec<u8>, EngineError> {
    if bytes.len() == 32 {
        return Ok(bytes.to_vec());
    }

    use p256::pkcs8::DecodePrivateKey;
    let secret_key = p256::SecretKey::from_pkcs8_der(bytes).map_err(|_| EngineError::InvalidVapidKey)?;
    Ok(secret_key.to_bytes().to_vec())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Web,
    Android,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriberStatus {
    Active,
    Inactive,
}

/// An end-user subscriber of a single website.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscriber {
    pub id: Uuid,
    pub website_id: Uuid,
    pub platform: Platform,
    pub status: SubscriberStatus,
    pub last_active_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p256dh_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_key: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}

/// The sealed transport variant of spec §9 ("Polymorphism across
/// transports"): the engine dispatches on this, not on `platform` directly,
/// so a subscriber with incomplete credentials for its declared platform can
/// never reach a transport-specific code path.
pub enum Transport {
    Web {
        endpoint: String,
        p256dh: String,
        auth: String,
    },
    Android {
        fcm_token: String,
    },
}

impl Subscriber {
    /// Resolves this subscriber into its transport variant, or `None` if the
    /// credentials required for its declared platform are missing (spec
    /// §4.5 step 3: `MISSING_CREDENTIALS`).
    pub fn transport(&self) -> Option<Transport> {
        match self.platform {
            Platform::Web => {
                let endpoint = self.endpoint.clone().filter(|s| !s.is_empty())?;
                let p256dh = self.p256dh_key.clone().filter(|s| !s.is_empty())?;
                let auth = self.auth_key.clone().filter(|s| !s.is_empty())?;
                Some(Transport::Web { endpoint, p256dh, auth })
            }
            Platform::Android => {
                let fcm_token = self.fcm_token.clone().filter(|s| !s.is_empty())?;
                Some(Transport::Android { fcm_token })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Recurring,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrencePattern {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Custom,
}

/// Recurrence configuration for a recurring campaign (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrenceConfig {
    pub pattern: RecurrencePattern,
    pub interval: u32,
    #[serde(default, rename = "daysOfWeek", skip_serializing_if = "Option::is_none")]
    pub days_of_week: Option<Vec<u8>>,
    #[serde(default, rename = "dayOfMonth", skip_serializing_if = "Option::is_none")]
    pub day_of_month: Option<u8>,
    #[serde(default = "default_time")]
    pub time: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default, rename = "endDate", skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, rename = "maxOccurrences", skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
}

fn default_time() -> String {
    "09:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// The notification content carried by a campaign or an ad-hoc send request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    #[serde(default, rename = "iconUrl", skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, rename = "imageUrl", skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, rename = "clickUrl", skip_serializing_if = "Option::is_none")]
    pub click_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<NotificationAction>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationAction {
    pub title: String,
    pub action: String,
}

impl NotificationContent {
    /// Validates the size caps of spec §4.5 step 0: title ≤ 200 chars, body
    /// ≤ 1000, each of icon/image/url ≤ 2000, at most 2 actions.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.title.chars().count() > 200 {
            return Err(EngineError::InvalidRequest("title exceeds 200 characters".into()));
        }
        if self.body.chars().count() > 1000 {
            return Err(EngineError::InvalidRequest("body exceeds 1000 characters".into()));
        }
        for (field, value) in [
            ("iconUrl", &self.icon_url),
            ("imageUrl", &self.image_url),
            ("clickUrl", &self.click_url),
        ] {
            if let Some(v) = value {
                if v.chars().count() > 2000 {
                    return Err(EngineError::InvalidRequest(format!("{field} exceeds 2000 characters")));
                }
            }
        }
        if let Some(actions) = &self.actions {
            if actions.len() > 2 {
                return Err(EngineError::InvalidRequest("at most 2 actions are allowed".into()));
            }
        }

        Ok(())
    }
}

/// A persisted send intent, one-shot or recurring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub website_id: Uuid,
    pub notification: NotificationContent,
    pub status: CampaignStatus,
    pub is_recurring: bool,
    #[serde(default, rename = "scheduledAt", skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "nextSendAt", skip_serializing_if = "Option::is_none")]
    pub next_send_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "recurrenceConfig", skip_serializing_if = "Option::is_none")]
    pub recurrence_config: Option<RecurrenceConfig>,
    pub sent_count: u64,
    pub failed_count: u64,
    pub delivered_count: u64,
    pub clicked_count: u64,
    /// Occurrences fired so far; compared against `recurrence_config.max_occurrences`.
    pub occurrences: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLogStatus {
    Pending,
    Sent,
    Failed,
    Delivered,
    Clicked,
    Dismissed,
}

/// One per-recipient, per-send log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationLog {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    pub subscriber_id: Uuid,
    pub website_id: Uuid,
    /// Either a UUID or the synthetic `notif-<unix-ms>` id minted at send
    /// time (spec §4.5 step 4); tracking callbacks key off this.
    pub notification_id: String,
    pub status: NotificationLogStatus,
    pub platform: Platform,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Starter,
    Growth,
    Custom,
}

/// A user's recurring-campaign plan cap (spec §3).
#[derive(Debug, Clone, Copy)]
pub struct PlanLimit {
    pub plan: Plan,
    /// Only meaningful when `plan == Custom`.
    pub custom_cap: u32,
    pub is_owner: bool,
}

impl PlanLimit {
    pub fn cap(&self) -> u32 {
        match self.plan {
            Plan::Free => 0,
            Plan::Starter => 10,
            Plan::Growth => 30,
            Plan::Custom => self.custom_cap,
        }
    }

    /// `can_create_recurring(user)` of spec §3: owners bypass the cap,
    /// everyone else must be strictly under it.
    pub fn can_create_recurring(&self, current_recurring: u32) -> bool {
        self.is_owner || current_recurring < self.cap()
    }
}
