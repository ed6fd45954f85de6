//! Environment loading (spec.md §6, "Environment variables the core
//! reads"). The teacher is a client library with no config of its own; no
//! single config-loading crate dominates the pack, so this stays direct
//! `std::env` reads rather than importing one for a handful of variables.

use std::env;

use crate::{error::EngineError, transport::fcm::ServiceAccount};

pub struct Config {
    /// Fallback VAPID keypair used when a `Website` row lacks its own.
    pub default_vapid_public_key: Option<String>,
    pub default_vapid_private_key: Option<String>,
    pub fcm_service_account: Option<ServiceAccount>,
    pub database_url: String,
    /// Bearer secret the Scheduler API compares callers against (spec.md
    /// §4.6, "reject any other caller").
    pub scheduler_bearer_token: String,
    pub vapid_subject: String,
}

impl Config {
    /// Loads configuration from the process environment. Absence of Web
    /// Push keys is not fatal here (spec.md §6 says absence is "fatal at
    /// send", i.e. only once a website without its own keys actually tries
    /// to send); absence of `FCM_SERVICE_ACCOUNT_JSON` merely disables the
    /// Android transport.
    pub fn from_env() -> Result<Self, EngineError> {
        let fcm_service_account = match env::var("FCM_SERVICE_ACCOUNT_JSON") {
            Ok(json) if !json.trim().is_empty() => {
                let account: ServiceAccount =
                    serde_json::from_str(&json).map_err(|_| EngineError::InvalidRequest("malformed FCM_SERVICE_ACCOUNT_JSON".into()))?;
                Some(account)
            }
            _ => {
                warn!("FCM_SERVICE_ACCOUNT_JSON not set; Android delivery is disabled");
                None
            }
        };

        Ok(Config {
            default_vapid_public_key: env::var("FIREBASE_VAPID_PUBLIC_KEY").ok(),
            default_vapid_private_key: env::var("FIREBASE_VAPID_PRIVATE_KEY").ok(),
            fcm_service_account,
            database_url: env::var("DATABASE_URL").map_err(|_| EngineError::InvalidRequest("DATABASE_URL is not set".into()))?,
            scheduler_bearer_token: env::var("SCHEDULER_BEARER_TOKEN")
                .map_err(|_| EngineError::InvalidRequest("SCHEDULER_BEARER_TOKEN is not set".into()))?,
            vapid_subject: env::var("VAPID_SUBJECT").unwrap_or_else(|_| "mailto:noreply@example.com".to_string()),
        })
    }
}
