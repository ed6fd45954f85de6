//! Web Push payload encryption.

pub mod aes128gcm;

pub use aes128gcm::encrypt;
