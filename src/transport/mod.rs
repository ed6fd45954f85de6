//! Outbound delivery transports: Web Push (`aes128gcm` + VAPID) and FCM
//! HTTP v1 for Android. `engine.rs` dispatches on `model::Transport`, never
//! on `Platform` directly.

pub mod fcm;
pub mod web_push;
