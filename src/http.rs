//! The pluggable outbound HTTP client trait.
//!
//! Grounded on the teacher's `clients/` module, which offered a choice of
//! isahc/hyper/hyper-rustls backends behind a feature flag, all implementing
//! one `WebPushClient` trait (see `clients/isahc_client.rs`). Generalized
//! here to one trait, `PushTransportClient`, because the engine has to speak
//! to three distinct endpoint families from one call site (raw
//! `application/octet-stream` Web Push bodies, JSON FCM sends, JSON OAuth2
//! token exchanges) instead of one uniform push protocol. A single
//! `reqwest`-backed implementation covers all three; the trait exists so
//! tests can substitute a fake transport without a live network.

use async_trait::async_trait;

use crate::error::EngineError;

/// One raw outbound request: a method-less POST, since every caller of this
/// trait posts a body and reads back a status/body pair.
pub struct OutboundRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

pub struct OutboundResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub retry_after: Option<std::time::Duration>,
}

#[async_trait]
pub trait PushTransportClient: Send + Sync {
    async fn post(&self, request: OutboundRequest) -> Result<OutboundResponse, EngineError>;
}

/// The default transport, built on `reqwest` with `rustls-tls` (spec.md §9
/// note that the engine must not depend on a particular TLS stack choice
/// beyond what the teacher's pack already favors).
pub struct ReqwestTransportClient {
    client: reqwest::Client,
}

impl ReqwestTransportClient {
    pub fn new() -> Self {
        ReqwestTransportClient { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestTransportClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransportClient for ReqwestTransportClient {
    async fn post(&self, request: OutboundRequest) -> Result<OutboundResponse, EngineError> {
        trace!("outbound request: {} ({} bytes)", request.url, request.body.len());

        let mut builder = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, request.content_type)
            .body(request.body);

        for (name, value) in &request.headers {
            builder = builder.header(*name, value.as_str());
        }

        let response = builder.send().await?;

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(crate::error::RetryAfter::from_str);

        let status = response.status().as_u16();
        trace!("response status: {status}");

        let body = response.bytes().await?.to_vec();

        Ok(OutboundResponse { status, body, retry_after })
    }
}
