//! End-to-end tests for the scheduler tick (spec.md §4.6 / §8 scenario 6).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use uuid::Uuid;

use push_engine::{
    engine::DeliveryEngine,
    error::EngineError,
    http::{OutboundRequest, OutboundResponse, PushTransportClient},
    memory::{InMemoryCampaigns, InMemoryNotificationLogs, InMemorySubscribers, InMemoryWebsites},
    model::{
        Campaign, CampaignStatus, NotificationContent, Platform, RecurrenceConfig, RecurrencePattern, Subscriber,
        SubscriberStatus, Website,
    },
    scheduler::Scheduler,
    vapid::VapidKeyPair,
};

struct AlwaysAccept;

#[async_trait]
impl PushTransportClient for AlwaysAccept {
    async fn post(&self, _request: OutboundRequest) -> Result<OutboundResponse, EngineError> {
        Ok(OutboundResponse { status: 201, body: Vec::new(), retry_after: None })
    }
}

fn website(id: Uuid, owner_id: Uuid, vapid: &VapidKeyPair) -> Website {
    Website {
        id,
        name: "scheduler-test.example.com".into(),
        origin: "https://scheduler-test.example.com".into(),
        owner_user_id: owner_id,
        vapid_public_key: vapid.public_key_base64url(),
        vapid_private_key: vapid.private_scalar_base64url(),
        notifications_sent: 0,
    }
}

fn subscriber(website_id: Uuid) -> Subscriber {
    let recipient_key = VapidKeyPair::generate();
    Subscriber {
        id: Uuid::new_v4(),
        website_id,
        platform: Platform::Web,
        status: SubscriberStatus::Active,
        last_active_at: Utc::now(),
        endpoint: Some("https://push.example.com/sub/sched".into()),
        p256dh_key: Some(recipient_key.public_key_base64url()),
        auth_key: Some(push_engine::b64::encode(&[5u8; 16])),
        fcm_token: None,
    }
}

#[tokio::test]
async fn tick_fires_a_due_scheduled_campaign_and_completes_it() {
    let vapid = VapidKeyPair::generate();
    let website_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let websites = Arc::new(InMemoryWebsites::new());
    websites.insert(website(website_id, owner_id, &vapid));

    let subscribers = Arc::new(InMemorySubscribers::new());
    subscribers.insert(subscriber(website_id));

    let campaigns = Arc::new(InMemoryCampaigns::new());
    let campaign_id = Uuid::new_v4();
    campaigns.insert(Campaign {
        id: campaign_id,
        website_id,
        notification: NotificationContent {
            title: "Due now".into(),
            body: "fire".into(),
            icon_url: None,
            image_url: None,
            click_url: None,
            actions: None,
        },
        status: CampaignStatus::Scheduled,
        is_recurring: false,
        scheduled_at: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
        next_send_at: None,
        recurrence_config: None,
        sent_count: 0,
        failed_count: 0,
        delivered_count: 0,
        clicked_count: 0,
        occurrences: 0,
    });

    let logs = Arc::new(InMemoryNotificationLogs::new());
    let engine = Arc::new(DeliveryEngine::new(
        websites.clone(),
        subscribers.clone(),
        campaigns.clone(),
        logs.clone(),
        Arc::new(AlwaysAccept),
        None,
        "mailto:ops@example.com".into(),
    ));

    let scheduler = Scheduler::new(engine, campaigns.clone());
    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.processed, 1);
    assert_eq!(report.failed, 0);

    let campaign = campaigns.get(campaign_id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Completed);
    assert_eq!(campaign.sent_count, 1);
}

#[tokio::test]
async fn tick_advances_a_due_recurring_campaign() {
    let vapid = VapidKeyPair::generate();
    let website_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let websites = Arc::new(InMemoryWebsites::new());
    websites.insert(website(website_id, owner_id, &vapid));

    let subscribers = Arc::new(InMemorySubscribers::new());
    subscribers.insert(subscriber(website_id));

    let campaigns = Arc::new(InMemoryCampaigns::new());
    let campaign_id = Uuid::new_v4();
    campaigns.insert(Campaign {
        id: campaign_id,
        website_id,
        notification: NotificationContent {
            title: "Weekly".into(),
            body: "fire".into(),
            icon_url: None,
            image_url: None,
            click_url: None,
            actions: None,
        },
        status: CampaignStatus::Recurring,
        is_recurring: true,
        scheduled_at: None,
        next_send_at: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
        recurrence_config: Some(RecurrenceConfig {
            pattern: RecurrencePattern::Weekly,
            interval: 1,
            days_of_week: Some(vec![1, 3]),
            day_of_month: None,
            time: "09:00".into(),
            timezone: "UTC".into(),
            end_date: None,
            max_occurrences: None,
        }),
        sent_count: 0,
        failed_count: 0,
        delivered_count: 0,
        clicked_count: 0,
        occurrences: 0,
    });

    let logs = Arc::new(InMemoryNotificationLogs::new());
    let engine = Arc::new(DeliveryEngine::new(
        websites.clone(),
        subscribers.clone(),
        campaigns.clone(),
        logs.clone(),
        Arc::new(AlwaysAccept),
        None,
        "mailto:ops@example.com".into(),
    ));

    let scheduler = Scheduler::new(engine, campaigns.clone());
    let report = scheduler.tick().await.unwrap();

    assert_eq!(report.processed, 1);

    let campaign = campaigns.get(campaign_id).await.unwrap();
    assert_eq!(campaign.status, CampaignStatus::Recurring);
    assert_eq!(campaign.occurrences, 1);
    assert!(campaign.next_send_at.unwrap() > Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
}
