//! The scheduling loop (C6): spec.md §4.6. A single testable `tick()` with
//! no sleep inside it; the real periodic timer lives in
//! `src/bin/push-engine.rs`.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    engine::{Caller, DeliveryEngine, SendRequest, Summary},
    error::EngineError,
    model::Campaign,
    recurrence::{self, NextFire},
    repository::CampaignRepository,
};

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct TickReport {
    pub processed: u64,
    pub failed: u64,
    pub total: u64,
}

pub struct Scheduler {
    engine: Arc<DeliveryEngine>,
    campaigns: Arc<dyn CampaignRepository>,
}

impl Scheduler {
    pub fn new(engine: Arc<DeliveryEngine>, campaigns: Arc<dyn CampaignRepository>) -> Self {
        Scheduler { engine, campaigns }
    }

    /// One scheduler tick (spec.md §4.6 steps 1-4).
    pub async fn tick(&self) -> Result<TickReport, EngineError> {
        let now = Utc::now();

        let scheduled = self.campaigns.due_scheduled(now).await?;
        let recurring = self.campaigns.due_recurring(now).await?;

        let mut processed = 0u64;
        let mut failed = 0u64;

        for campaign in scheduled {
            match self.fire(&campaign).await {
                Ok(summary) => {
                    processed += 1;
                    failed += summary.failed;
                    self.campaigns.mark_completed(campaign.id).await?;
                }
                Err(err) => {
                    error!("scheduled campaign {} failed to dispatch: {err}", campaign.id);
                    failed += 1;
                }
            }
        }

        for campaign in recurring {
            match self.fire(&campaign).await {
                Ok(summary) => {
                    processed += 1;
                    failed += summary.failed;
                    self.advance(&campaign, now).await?;
                }
                Err(err) => {
                    error!("recurring campaign {} failed to dispatch: {err}", campaign.id);
                    failed += 1;
                }
            }
        }

        let total = processed + failed;
        info!("scheduler tick: {processed} processed, {failed} failed, {total} total");
        Ok(TickReport { processed, failed, total })
    }

    async fn fire(&self, campaign: &Campaign) -> Result<Summary, EngineError> {
        let request = SendRequest {
            website_id: campaign.website_id,
            notification: campaign.notification.clone(),
            campaign_id: Some(campaign.id),
            target_subscriber_ids: None,
            caller: Caller::PlatformOwner,
        };
        self.engine.send(request).await
    }

    /// Computes and persists the next firing instant, or completes the
    /// campaign if the recurrence has run its course (spec.md §4.6 step 3).
    async fn advance(&self, campaign: &Campaign, now: chrono::DateTime<Utc>) -> Result<(), EngineError> {
        let config = campaign
            .recurrence_config
            .as_ref()
            .ok_or_else(|| EngineError::InvalidRequest("recurring campaign missing recurrenceConfig".into()))?;

        match recurrence::next_fire(config, now, campaign.occurrences)? {
            NextFire::At(next) => {
                self.campaigns.advance_recurring(campaign.id, Some(next)).await?;
            }
            NextFire::Completed => {
                self.campaigns.advance_recurring(campaign.id, None).await?;
                self.campaigns.mark_completed(campaign.id).await?;
            }
        }

        Ok(())
    }
}
