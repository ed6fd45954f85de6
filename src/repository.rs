//! The persistence boundary. Spec §1 treats the relational store as an
//! external collaborator "named by its interface only" — these traits are
//! that interface. No SQL adapter is implemented here; see `tests/` for
//! in-memory fakes used to exercise the engine and scheduler.
//!
//! Grounded on `cloudillo-push`'s `auth_adapter`/`meta_adapter` traits, the
//! one place in the pack where a web-push sender is already split from its
//! storage layer this way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::EngineError,
    model::{Campaign, NotificationLog, NotificationLogStatus, Subscriber, Website},
};

#[async_trait]
pub trait WebsiteRepository: Send + Sync {
    async fn get(&self, website_id: Uuid) -> Result<Website, EngineError>;
    async fn increment_sent(&self, website_id: Uuid, by: u64) -> Result<(), EngineError>;
}

#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Active subscribers for a website, optionally restricted to an
    /// explicit id set (spec §4.5 step 2).
    async fn active_subscribers(
        &self,
        website_id: Uuid,
        target_ids: Option<&[Uuid]>,
    ) -> Result<Vec<Subscriber>, EngineError>;

    /// Bulk reclamation (spec §4.5 step 8): flips `status` to `inactive` for
    /// every id whose final attempt signalled permanent expiry.
    async fn mark_inactive_batch(&self, ids: &[Uuid]) -> Result<(), EngineError>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, campaign_id: Uuid) -> Result<Campaign, EngineError>;

    /// Campaigns due for a one-shot send (`status = scheduled`).
    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, EngineError>;

    /// Campaigns due for a recurring send (`status = recurring`).
    async fn due_recurring(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, EngineError>;

    /// Atomically adds to `sent_count`/`failed_count` (spec §5: "concurrent
    /// `send` invocations on the same campaign MUST use an atomic add").
    async fn add_counts(&self, campaign_id: Uuid, sent: u64, failed: u64) -> Result<(), EngineError>;

    async fn mark_completed(&self, campaign_id: Uuid) -> Result<(), EngineError>;

    /// Atomically adds to `delivered_count`/`clicked_count` (spec.md §6,
    /// Tracking API).
    async fn add_tracking_counts(&self, campaign_id: Uuid, delivered: u64, clicked: u64) -> Result<(), EngineError>;

    /// Persists the next firing instant for a recurring campaign, or
    /// completes it if the recurrence has run its course.
    async fn advance_recurring(&self, campaign_id: Uuid, next_send_at: Option<DateTime<Utc>>) -> Result<(), EngineError>;
}

#[async_trait]
pub trait NotificationLogRepository: Send + Sync {
    /// Inserts the single terminal-outcome row for one recipient (spec §9,
    /// Open Question 4: one insert at terminal outcome, no `pending` row).
    async fn insert(&self, log: NotificationLog) -> Result<(), EngineError>;

    /// Applies an inbound tracking event (`delivered`/`clicked`/`dismissed`)
    /// to the log row identified by `(website_id, notification_id)`.
    async fn record_event(
        &self,
        website_id: Uuid,
        notification_id: &str,
        status: NotificationLogStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, EngineError>;
}
