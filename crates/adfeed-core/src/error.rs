//! Error taxonomy for the ad delivery client.
//!
//! Transport failures are kept apart from remote status errors so the
//! proof-of-play engine can classify them before deciding on a retry, and
//! "not in progress" is its own variant so callers can tell an already
//! resolved ad from a failed delivery.

use std::fmt;

use thiserror::Error;

use crate::pop::DeliveryKind;

/// Validation failure for an advertisement, at ingestion or registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdError {
    #[error("advertisement is not a JSON object")]
    NotAnObject,
    #[error("advertisement has no id")]
    MissingId,
    #[error("advertisement {ad_id} is marked for expiry")]
    MarkedForExpiry { ad_id: String },
    #[error("malformed advertisement: {0}")]
    Malformed(String),
}

/// Coarse classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connect or transfer timed out.
    Timeout,
    /// Connection refused/reset, DNS failure, broken transfer.
    Connection,
    /// The URL could not be used at all.
    InvalidUrl,
    Other,
}

/// The HTTP exchange did not produce a response.
#[derive(Debug, Clone, Error)]
#[error("{url}: {message}")]
pub struct TransportError {
    pub url: String,
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(
        url: impl Into<String>,
        kind: TransportErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// A URL curl refuses will be refused again.
    pub fn is_retriable(&self) -> bool {
        self.kind != TransportErrorKind::InvalidUrl
    }
}

/// Failure reported by the injected cache function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CacheError(pub String);

impl CacheError {
    pub fn new(message: impl fmt::Display) -> Self {
        CacheError(message.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError(e.to_string())
    }
}

/// Outcome of a failed proof-of-play or expiration attempt.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The ad carries no URL for this kind of delivery. Never retried.
    #[error("ad {ad_id} has no {kind} url")]
    MissingUrl { ad_id: String, kind: DeliveryKind },
    /// Remote answered 4xx. Never retried.
    #[error("{kind} for ad {ad_id} rejected: HTTP {status}: {body}")]
    Rejected {
        ad_id: String,
        kind: DeliveryKind,
        status: u32,
        body: String,
    },
    /// Remote answered 5xx (or an unexpected status). Retried in the background.
    #[error("{kind} for ad {ad_id} failed: HTTP {status}")]
    ServerError {
        ad_id: String,
        kind: DeliveryKind,
        status: u32,
    },
    /// No response at all. Retried in the background.
    #[error("{kind} for ad {ad_id} failed: {source}")]
    Transport {
        ad_id: String,
        kind: DeliveryKind,
        #[source]
        source: TransportError,
    },
    #[error("proof-of-play engine is stopped")]
    Stopped,
}

impl DeliveryError {
    /// Whether the engine schedules a background retry for this failure.
    pub fn is_retriable(&self) -> bool {
        match self {
            DeliveryError::ServerError { .. } => true,
            DeliveryError::Transport { source, .. } => source.is_retriable(),
            _ => false,
        }
    }
}

/// Errors returned by [`crate::AdDeliveryClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] TransportError),
    #[error("ad server returned an error. url: {url}, code: {status}, body: {body}")]
    Server {
        url: String,
        status: u32,
        body: String,
    },
    #[error("invalid response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not encode request: {0}")]
    Encode(#[source] serde_json::Error),
    /// The ad was already confirmed, expired, or dropped by the lease sweep.
    #[error("ad {ad_id} is not in progress")]
    NotFound { ad_id: String },
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_only_for_server_and_transport_failures() {
        let server = DeliveryError::ServerError {
            ad_id: "1".into(),
            kind: DeliveryKind::ProofOfPlay,
            status: 503,
        };
        let transport = DeliveryError::Transport {
            ad_id: "1".into(),
            kind: DeliveryKind::Expiration,
            source: TransportError::new("http://x", TransportErrorKind::Timeout, "timed out"),
        };
        let rejected = DeliveryError::Rejected {
            ad_id: "1".into(),
            kind: DeliveryKind::ProofOfPlay,
            status: 400,
            body: "bad".into(),
        };
        assert!(server.is_retriable());
        assert!(transport.is_retriable());
        assert!(!rejected.is_retriable());
        assert!(!DeliveryError::Stopped.is_retriable());
    }

    #[test]
    fn invalid_url_is_permanent() {
        let bad_url = DeliveryError::Transport {
            ad_id: "1".into(),
            kind: DeliveryKind::ProofOfPlay,
            source: TransportError::new(
                "invalidhttp://x",
                TransportErrorKind::InvalidUrl,
                "unsupported protocol",
            ),
        };
        assert!(!bad_url.is_retriable());
    }

    #[test]
    fn server_error_message_embeds_status_and_body() {
        let e = ClientError::Server {
            url: "http://ads/decide".into(),
            status: 400,
            body: "bad device".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("400"));
        assert!(msg.contains("bad device"));
    }
}
