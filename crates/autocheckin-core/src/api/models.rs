//! Response shapes for the attendance service.
//!
//! Only the fields the agent reads are modelled. Ids are kept as strings even
//! when the service sends them as numbers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub user_name: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default, alias = "Header")]
    pub header: Option<LoginHeader>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginHeader {
    #[serde(default, rename = "accessToken", alias = "access_token", alias = "AccessToken")]
    pub access_token: Option<String>,
}

/// `payload` of the current-shift and tracking-policy responses.
#[derive(Debug, Deserialize)]
pub(crate) struct PayloadEnvelope {
    #[serde(default)]
    pub payload: Value,
}

impl PayloadEnvelope {
    /// First entry of the payload array, if it is a non-empty array.
    pub fn first(&self) -> Option<&Value> {
        self.payload.as_array().and_then(|items| items.first())
    }
}

/// The attendance slot to check in against.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttendanceShift {
    #[serde(rename = "id", deserialize_with = "string_or_number")]
    pub attendance_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub employee_id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub shift_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackingPolicy {
    #[serde(deserialize_with = "string_or_number")]
    pub attendance_tracking_policy_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckInResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {}",
            other
        ))),
    }
}
