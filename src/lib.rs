//! # push-engine
//!
//! A push-notification delivery engine for a multi-tenant service that lets
//! website operators send browser and Android push notifications to their
//! end-user subscribers: VAPID keys and JWTs (RFC 8292), RFC 8291
//! `aes128gcm` payload encryption, a batched concurrent delivery engine
//! across Web Push and FCM HTTP v1, and a scheduling loop for one-shot and
//! recurring campaigns.
//!
//! # Example
//!
//! ```no_run
//! # use push_engine::vapid::VapidKeyPair;
//! # use push_engine::crypto;
//! let vapid_key = VapidKeyPair::generate();
//! let jwt = push_engine::vapid::sign_vapid_jwt(
//!     &vapid_key,
//!     "https://updates.push.services.mozilla.com",
//!     "mailto:ops@example.com",
//! )?;
//! # Ok::<(), push_engine::error::EngineError>(())
//! ```

#[macro_use]
extern crate log;

pub mod api;
pub mod b64;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod http;
pub mod memory;
pub mod model;
pub mod recurrence;
pub mod repository;
pub mod scheduler;
pub mod transport;
pub mod vapid;

pub use engine::{DeliveryEngine, SendRequest, Summary};
pub use error::EngineError;
pub use scheduler::{Scheduler, TickReport};
