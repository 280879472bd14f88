use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Coarse device class derived from the user agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Desktop => "desktop",
            DeviceType::Mobile => "mobile",
            DeviceType::Tablet => "tablet",
            DeviceType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unrecognized device type '{0}'")]
pub struct ParseDeviceTypeError(String);

impl FromStr for DeviceType {
    type Err = ParseDeviceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "desktop" => Ok(DeviceType::Desktop),
            "mobile" => Ok(DeviceType::Mobile),
            "tablet" => Ok(DeviceType::Tablet),
            "unknown" => Ok(DeviceType::Unknown),
            other => Err(ParseDeviceTypeError(other.to_string())),
        }
    }
}

impl TryFrom<String> for DeviceType {
    type Error = ParseDeviceTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A stored visit record
///
/// `visit_time` is Unix epoch milliseconds. Everything except
/// `status_code` and `response_time_ms` is fixed at insert time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VisitEvent {
    pub id: i64,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub url: String,
    pub http_method: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub traffic_source: Option<String>,
    pub page_stay_time_sec: Option<i64>,
    pub session_id: String,
    #[sqlx(try_from = "String")]
    pub device_type: DeviceType,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
    pub is_new_visitor: bool,
    pub visit_time: i64,
}

/// Insert payload for a fully classified visit
#[derive(Debug, Clone)]
pub struct NewVisit {
    pub user_id: Option<String>,
    pub ip_address: String,
    pub url: String,
    pub http_method: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub traffic_source: Option<String>,
    pub page_stay_time_sec: Option<i64>,
    pub session_id: String,
    pub device_type: DeviceType,
    pub operating_system: Option<String>,
    pub browser: Option<String>,
    pub is_new_visitor: bool,
    pub visit_time: i64,
}
