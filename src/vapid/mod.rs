//! VAPID (RFC 8292) key generation and JWT signing.

pub mod key;
pub mod signer;

pub use key::VapidKeyPair;
pub use signer::sign_vapid_jwt;
