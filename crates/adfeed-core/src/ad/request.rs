//! Decision request payload.
//!
//! Building this from device configuration is the caller's job; the client
//! only serializes it as the body of decision and asset-endpoint calls.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayArea {
    pub id: String,
    pub width: i64,
    pub height: i64,
    pub allow_audio: bool,
    pub supported_media: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_duration: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceAttribute {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdRequest {
    pub api_key: String,
    pub network_id: String,
    pub device_id: String,
    pub venue_id: String,
    pub required_completion: f64,
    pub direct_connection: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// Epoch seconds at which the ad is expected to play.
    pub display_time: i64,
    pub number_of_screens: i64,
    #[serde(rename = "display_area")]
    pub display_areas: Vec<DisplayArea>,
    #[serde(rename = "device_attribute")]
    pub device_attributes: Vec<DeviceAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<i64>,
}
