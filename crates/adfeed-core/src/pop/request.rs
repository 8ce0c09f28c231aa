//! Delivery requests tracked by the engine.

use std::fmt;

use tokio::time::Instant;

use crate::ad::Advertisement;

/// Which remote notification a request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    ProofOfPlay,
    Expiration,
}

impl DeliveryKind {
    /// Short name used in event names (`ad-pop-failed`, `ad-expire-failed`).
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryKind::ProofOfPlay => "pop",
            DeliveryKind::Expiration => "expire",
        }
    }

    /// Bandwidth stats key for attempts of this kind.
    pub fn endpoint_key(self) -> &'static str {
        match self {
            DeliveryKind::ProofOfPlay => "proof_of_play",
            DeliveryKind::Expiration => "expiration",
        }
    }

    pub(crate) fn event_name(self, suffix: &str) -> String {
        format!("ad-{}-{}", self.as_str(), suffix)
    }
}

impl fmt::Display for DeliveryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Displayed for `display_time` seconds.
    Confirmed { display_time: i64 },
    Expired,
}

#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub ad: Advertisement,
    pub outcome: Outcome,
    /// When the last failed attempt finished; `None` until the first failure.
    pub requested_at: Option<Instant>,
}

impl DeliveryRequest {
    pub fn confirmed(ad: Advertisement, display_time: i64) -> Self {
        Self {
            ad,
            outcome: Outcome::Confirmed { display_time },
            requested_at: None,
        }
    }

    pub fn expired(ad: Advertisement) -> Self {
        Self {
            ad,
            outcome: Outcome::Expired,
            requested_at: None,
        }
    }

    pub fn kind(&self) -> DeliveryKind {
        match self.outcome {
            Outcome::Confirmed { .. } => DeliveryKind::ProofOfPlay,
            Outcome::Expired => DeliveryKind::Expiration,
        }
    }

    pub fn ad_id(&self) -> &str {
        &self.ad.id
    }
}
