//! The `push-engine` service entry point: loads configuration, assembles
//! the delivery engine and scheduler, and runs the axum server alongside a
//! `tokio::time::interval` scheduler loop (spec.md §4.6: "a periodic task,
//! tick ≤ 60s").
//!
//! Persistence is out of scope (spec.md §1); this binary runs against the
//! in-memory reference adapters in `push_engine::memory` so it is runnable
//! out of the box. A production deployment would inject a real SQL adapter
//! behind the same `repository` traits instead.

#[macro_use]
extern crate log;

use std::sync::Arc;
use std::time::Duration;

use push_engine::{
    api::{self, AppState},
    config::Config,
    engine::DeliveryEngine,
    http::ReqwestTransportClient,
    memory::{InMemoryCampaigns, InMemoryNotificationLogs, InMemorySubscribers, InMemoryWebsites},
    scheduler::Scheduler,
    transport::fcm::{FcmTokenCache, RsaPkcs1v15Signer},
};

const SCHEDULER_TICK: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    env_logger::init();

    let config = Config::from_env()?;

    let websites: Arc<InMemoryWebsites> = Arc::new(InMemoryWebsites::new());
    let subscribers: Arc<InMemorySubscribers> = Arc::new(InMemorySubscribers::new());
    let campaigns: Arc<InMemoryCampaigns> = Arc::new(InMemoryCampaigns::new());
    let logs: Arc<InMemoryNotificationLogs> = Arc::new(InMemoryNotificationLogs::new());

    let transport = Arc::new(ReqwestTransportClient::new());

    let fcm_tokens = match config.fcm_service_account {
        Some(account) => {
            let signer = RsaPkcs1v15Signer::from_pem(&account.private_key)?;
            Some(Arc::new(FcmTokenCache::new(account, Arc::new(signer))))
        }
        None => None,
    };

    let engine = Arc::new(DeliveryEngine::new(
        websites.clone(),
        subscribers.clone(),
        campaigns.clone(),
        logs.clone(),
        transport.clone(),
        fcm_tokens,
        config.vapid_subject.clone(),
    ));

    let scheduler = Arc::new(Scheduler::new(engine.clone(), campaigns.clone()));

    let state = AppState {
        engine: engine.clone(),
        scheduler: scheduler.clone(),
        websites: websites.clone(),
        scheduler_bearer_token: config.scheduler_bearer_token.clone(),
    };

    let scheduler_loop = tokio::spawn(run_scheduler_loop(scheduler));

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
    info!("push-engine listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    scheduler_loop.abort();

    Ok(())
}

async fn run_scheduler_loop(scheduler: Arc<Scheduler>) {
    let mut interval = tokio::time::interval(SCHEDULER_TICK);
    loop {
        interval.tick().await;
        match scheduler.tick().await {
            Ok(report) => debug!("scheduler tick: {report:?}"),
            Err(err) => error!("scheduler tick failed: {err}"),
        }
    }
}
