//! Per-client admission control in front of every route.
//!
//! The client is identified by the TCP peer address only; forwarding headers
//! are not trusted. A request whose identity cannot be established is
//! answered with 500, never admitted by default.
//!
//! ```ignore
//! let gate = AdmissionGate::new(registry, config.limiter_enabled);
//! let app = router.layer(axum::middleware::from_fn_with_state(gate, admit));
//! ```

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{
    Json,
    extract::{ConnectInfo, Request, State, rejection::ExtensionRejection},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{
    error::AppError,
    stores::{Admission, ClientRegistry},
};

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("malformed client identity: {0:?}")]
    MalformedIdentity(String),
    #[error("peer address unavailable")]
    MissingPeerAddress,
}

/// Decides whether a request may proceed.
#[derive(Clone)]
pub struct AdmissionGate {
    registry: Arc<ClientRegistry>,
    enabled: bool,
}

impl AdmissionGate {
    pub fn new(registry: Arc<ClientRegistry>, enabled: bool) -> Self {
        Self { registry, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks `identity` (an `ip` or `ip:port`) against its bucket.
    ///
    /// When the gate is disabled this admits without parsing the identity or
    /// touching the registry.
    pub fn check(&self, identity: &str) -> Result<Admission, AdmissionError> {
        if !self.enabled {
            return Ok(Admission::Admit);
        }

        let key = canonical_identity(identity)?;
        Ok(self.registry.check(&key))
    }
}

/// Reduces an address to the registry key: the IP alone, with IPv4-mapped
/// IPv6 addresses folded to IPv4 so one client maps to one bucket.
fn canonical_identity(raw: &str) -> Result<String, AdmissionError> {
    let ip = raw
        .parse::<IpAddr>()
        .or_else(|_| raw.parse::<SocketAddr>().map(|addr| addr.ip()))
        .map_err(|_| AdmissionError::MalformedIdentity(raw.to_owned()))?;

    Ok(ip.to_canonical().to_string())
}

/// Middleware wrapping the router with an [`AdmissionGate`].
pub async fn admit(
    State(gate): State<AdmissionGate>,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    request: Request,
    next: Next,
) -> Response {
    if !gate.is_enabled() {
        return next.run(request).await;
    }

    let Ok(ConnectInfo(addr)) = peer else {
        return AppError::from(AdmissionError::MissingPeerAddress).into_response();
    };

    match gate.check(&addr.to_string()) {
        Ok(Admission::Admit) => next.run(request).await,
        Ok(Admission::Reject { retry_after }) => {
            tracing::debug!(client = %addr.ip(), "request rejected by rate limiter");
            too_many_requests(retry_after)
        }
        Err(err) => AppError::from(err).into_response(),
    }
}

fn too_many_requests(retry_after: Option<Duration>) -> Response {
    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({ "error": "rate limit exceeded" })),
    )
        .into_response();

    if let Some(wait) = retry_after {
        let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(secs.max(1)));
    }

    response
}
