//! An in-memory implementation of the `repository` traits.
//!
//! The relational store itself is out of scope (spec.md §1: "a relational
//! store ... treated as an external collaborator named by its interface
//! only"); no SQL adapter is implemented here or anywhere in this crate.
//! This module exists so `src/bin/push-engine.rs` has something concrete to
//! run against, and so `tests/` can exercise the engine and scheduler
//! end-to-end without a database. A production deployment swaps these
//! `Arc<dyn ...Repository>` values for a real SQL adapter; nothing else in
//! the crate needs to change.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::EngineError,
    model::{Campaign, CampaignStatus, NotificationLog, NotificationLogStatus, Subscriber, SubscriberStatus, Website},
    repository::{CampaignRepository, NotificationLogRepository, SubscriberRepository, WebsiteRepository},
};

#[derive(Default)]
pub struct InMemoryWebsites {
    rows: RwLock<HashMap<Uuid, Website>>,
}

impl InMemoryWebsites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, website: Website) {
        self.rows.write().unwrap().insert(website.id, website);
    }
}

#[async_trait]
impl WebsiteRepository for InMemoryWebsites {
    async fn get(&self, website_id: Uuid) -> Result<Website, EngineError> {
        self.rows.read().unwrap().get(&website_id).cloned().ok_or(EngineError::NotFound)
    }

    async fn increment_sent(&self, website_id: Uuid, by: u64) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        let website = rows.get_mut(&website_id).ok_or(EngineError::NotFound)?;
        website.notifications_sent += by;
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemorySubscribers {
    rows: RwLock<HashMap<Uuid, Subscriber>>,
}

impl InMemorySubscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subscriber: Subscriber) {
        self.rows.write().unwrap().insert(subscriber.id, subscriber);
    }
}

#[async_trait]
impl SubscriberRepository for InMemorySubscribers {
    async fn active_subscribers(&self, website_id: Uuid, target_ids: Option<&[Uuid]>) -> Result<Vec<Subscriber>, EngineError> {
        let rows = self.rows.read().unwrap();
        let matches = rows
            .values()
            .filter(|s| s.website_id == website_id && s.status == SubscriberStatus::Active)
            .filter(|s| target_ids.map(|ids| ids.contains(&s.id)).unwrap_or(true))
            .cloned()
            .collect();
        Ok(matches)
    }

    async fn mark_inactive_batch(&self, ids: &[Uuid]) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        for id in ids {
            if let Some(subscriber) = rows.get_mut(id) {
                subscriber.status = SubscriberStatus::Inactive;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCampaigns {
    rows: RwLock<HashMap<Uuid, Campaign>>,
}

impl InMemoryCampaigns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, campaign: Campaign) {
        self.rows.write().unwrap().insert(campaign.id, campaign);
    }
}

#[async_trait]
impl CampaignRepository for InMemoryCampaigns {
    async fn get(&self, campaign_id: Uuid) -> Result<Campaign, EngineError> {
        self.rows.read().unwrap().get(&campaign_id).cloned().ok_or(EngineError::NotFound)
    }

    async fn due_scheduled(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, EngineError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|c| c.status == CampaignStatus::Scheduled && c.scheduled_at.map(|at| at <= now).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn due_recurring(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>, EngineError> {
        let rows = self.rows.read().unwrap();
        Ok(rows
            .values()
            .filter(|c| c.status == CampaignStatus::Recurring && c.is_recurring && c.next_send_at.map(|at| at <= now).unwrap_or(false))
            .cloned()
            .collect())
    }

    async fn add_counts(&self, campaign_id: Uuid, sent: u64, failed: u64) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        let campaign = rows.get_mut(&campaign_id).ok_or(EngineError::NotFound)?;
        campaign.sent_count += sent;
        campaign.failed_count += failed;
        Ok(())
    }

    async fn add_tracking_counts(&self, campaign_id: Uuid, delivered: u64, clicked: u64) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        let campaign = rows.get_mut(&campaign_id).ok_or(EngineError::NotFound)?;
        campaign.delivered_count += delivered;
        campaign.clicked_count += clicked;
        Ok(())
    }

    async fn mark_completed(&self, campaign_id: Uuid) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        let campaign = rows.get_mut(&campaign_id).ok_or(EngineError::NotFound)?;
        campaign.status = CampaignStatus::Completed;
        Ok(())
    }

    async fn advance_recurring(&self, campaign_id: Uuid, next_send_at: Option<DateTime<Utc>>) -> Result<(), EngineError> {
        let mut rows = self.rows.write().unwrap();
        let campaign = rows.get_mut(&campaign_id).ok_or(EngineError::NotFound)?;
        campaign.occurrences += 1;
        match next_send_at {
            Some(next) => campaign.next_send_at = Some(next),
            None => campaign.status = CampaignStatus::Completed,
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryNotificationLogs {
    rows: RwLock<Vec<NotificationLog>>,
}

impl InMemoryNotificationLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<NotificationLog> {
        self.rows.read().unwrap().clone()
    }
}

#[async_trait]
impl NotificationLogRepository for InMemoryNotificationLogs {
    async fn insert(&self, log: NotificationLog) -> Result<(), EngineError> {
        self.rows.write().unwrap().push(log);
        Ok(())
    }

    async fn record_event(
        &self,
        website_id: Uuid,
        notification_id: &str,
        status: NotificationLogStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Uuid>, EngineError> {
        let mut rows = self.rows.write().unwrap();
        let row = rows.iter_mut().find(|r| r.website_id == website_id && r.notification_id == notification_id);

        let Some(row) = row else { return Ok(None) };

        row.status = status;
        match status {
            NotificationLogStatus::Delivered => row.delivered_at = Some(at),
            NotificationLogStatus::Clicked => row.clicked_at = Some(at),
            _ => {}
        }

        Ok(Some(row.id))
    }
}
