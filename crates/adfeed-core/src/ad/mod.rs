//! Advertisement records returned by the decision service.
//!
//! The service sends each ad as a loose JSON object. The keys the client acts
//! on are lifted into typed fields; everything else rides along untouched in
//! `extra` so serializing an ad gives the caller back the same attribute bag.

mod request;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::AdError;

pub use request::{AdRequest, DeviceAttribute, DisplayArea};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_play_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_url: Option<String>,
    /// Epoch seconds after which the service treats the ad as expired.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "de_epoch_secs"
    )]
    pub lease_expiry: Option<i64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub should_expire: bool,
    /// Remote asset URL, kept once `asset_url` points at the local cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_asset_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Advertisement {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Parse and validate one entry of a decision response.
    pub fn from_value(value: Value) -> Result<Self, AdError> {
        if !value.is_object() {
            return Err(AdError::NotAnObject);
        }
        let ad: Advertisement =
            serde_json::from_value(value).map_err(|e| AdError::Malformed(e.to_string()))?;
        ad.validate()?;
        Ok(ad)
    }

    pub fn validate(&self) -> Result<(), AdError> {
        if self.id.trim().is_empty() {
            return Err(AdError::MissingId);
        }
        Ok(())
    }

    /// True once the lease is over at `now` (epoch seconds). An ad without a
    /// lease is treated as already elapsed.
    pub fn lease_elapsed(&self, now: i64) -> bool {
        self.lease_expiry.map_or(true, |expiry| expiry <= now)
    }
}

/// Current wall-clock time in epoch seconds.
pub fn now_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn is_false(b: &bool) -> bool {
    !*b
}

// JSON numbers from the service may be integral or floating point.
fn de_epoch_secs<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let n: Option<serde_json::Number> = Option::deserialize(deserializer)?;
    Ok(n.and_then(|n| n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))))
}
