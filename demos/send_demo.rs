//! Runnable demo: generates a VAPID keypair, registers a website and a web
//! subscriber in the in-memory repositories, and runs one `send()` against
//! a stub transport that always answers `201 Created`.
//!
//! Run with: `cargo run --example send_demo` once this file is wired into a
//! workspace member's `[[example]]` (kept outside `examples/`, which is the
//! read-only retrieval pack for this exercise).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use push_engine::{
    engine::{Caller, DeliveryEngine, SendRequest},
    error::EngineError,
    http::{OutboundRequest, OutboundResponse, PushTransportClient},
    memory::{InMemoryCampaigns, InMemoryNotificationLogs, InMemorySubscribers, InMemoryWebsites},
    model::{NotificationContent, Platform, Subscriber, SubscriberStatus, Website},
    vapid::VapidKeyPair,
};

/// A stub transport that accepts every request (stands in for a real push
/// service / FCM in this demo).
struct AlwaysAccept;

#[async_trait]
impl PushTransportClient for AlwaysAccept {
    async fn post(&self, _request: OutboundRequest) -> Result<OutboundResponse, EngineError> {
        Ok(OutboundResponse { status: 201, body: Vec::new(), retry_after: None })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let vapid_key = VapidKeyPair::generate();

    let website_id = Uuid::new_v4();
    let owner_id = Uuid::new_v4();

    let websites = Arc::new(InMemoryWebsites::new());
    websites.insert(Website {
        id: website_id,
        name: "demo.example.com".into(),
        origin: "https://demo.example.com".into(),
        owner_user_id: owner_id,
        vapid_public_key: vapid_key.public_key_base64url(),
        vapid_private_key: vapid_key.private_scalar_base64url(),
        notifications_sent: 0,
    });

    let recipient_key = VapidKeyPair::generate();
    let subscribers = Arc::new(InMemorySubscribers::new());
    subscribers.insert(Subscriber {
        id: Uuid::new_v4(),
        website_id,
        platform: Platform::Web,
        status: SubscriberStatus::Active,
        last_active_at: Utc::now(),
        endpoint: Some("https://push.example.com/subscription/abc123".into()),
        p256dh_key: Some(recipient_key.public_key_base64url()),
        auth_key: Some(push_engine::b64::encode(&[7u8; 16])),
        fcm_token: None,
    });

    let campaigns = Arc::new(InMemoryCampaigns::new());
    let logs = Arc::new(InMemoryNotificationLogs::new());

    let engine = DeliveryEngine::new(
        websites.clone(),
        subscribers.clone(),
        campaigns.clone(),
        logs.clone(),
        Arc::new(AlwaysAccept),
        None,
        "mailto:ops@example.com".into(),
    );

    let summary = engine
        .send(SendRequest {
            website_id,
            notification: NotificationContent {
                title: "Hello".into(),
                body: "This is a demo notification.".into(),
                icon_url: None,
                image_url: None,
                click_url: None,
                actions: None,
            },
            campaign_id: None,
            target_subscriber_ids: None,
            caller: Caller::WebsiteOwner(owner_id),
        })
        .await?;

    println!("sent={} failed={} total={}", summary.sent, summary.failed, summary.total);
    for log in logs.snapshot() {
        println!("log: {:?} {:?}", log.status, log.error_message);
    }

    Ok(())
}
