//! API client for the attendance service.
//!
//! This module provides the `ApiClient` struct for logging in and making the
//! authenticated shift, policy and check-in requests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, multipart, Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::models::{
    AttendanceShift, CheckInResponse, LoginRequest, LoginResponse, PayloadEnvelope, TrackingPolicy,
};
use super::ApiError;
use crate::auth::{Authenticator, LoginResult};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/login";
const CURRENT_SHIFT_PATH: &str = "/employee/current-attendance-shift";
const TRACKING_POLICY_PATH: &str = "/employee/attendance-tracking-policy?meta-key=web";
const CHECK_IN_PATH: &str = "/employee/check-in";

/// Outcome of the current-shift lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftLookup {
    /// The service reported no shift (non-success status)
    NoShift,
    /// A shift response with no attendance entries
    Empty,
    Active(AttendanceShift),
}

/// API client for the attendance service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client rooted at `base_url` (e.g. `https://host/api/v1`)
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = self.token {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidResponse(format!("Unusable token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    /// Exchange identity and secret for an access token.
    pub async fn login(&self, identity: &str, secret: &str) -> Result<LoginResult, ApiError> {
        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&LoginRequest {
                user_name: identity,
                password: secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::LoginRejected {
                status,
                body: ApiError::truncate_body(&body),
            });
        }

        let login: LoginResponse = Self::parse_json(response, "login response").await?;
        let access_token = login
            .header
            .and_then(|h| h.access_token)
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)?;
        Ok(LoginResult { access_token })
    }

    /// The attendance entry for the shift currently running, if any.
    pub async fn current_shift(&self) -> Result<ShiftLookup, ApiError> {
        let url = self.url(CURRENT_SHIFT_PATH);
        let response = self
            .client
            .get(&url)
            .headers(self.auth_headers()?)
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "No current attendance shift");
            return Ok(ShiftLookup::NoShift);
        }

        let envelope: PayloadEnvelope = Self::parse_json(response, "shift response").await?;
        match envelope.first() {
            None => Ok(ShiftLookup::Empty),
            Some(entry) => {
                let shift = serde_json::from_value(entry.clone()).map_err(|e| {
                    ApiError::InvalidResponse(format!("Malformed attendance entry: {}", e))
                })?;
                Ok(ShiftLookup::Active(shift))
            }
        }
    }

    pub async fn tracking_policy(&self) -> Result<TrackingPolicy, ApiError> {
        let response = self
            .client
            .get(self.url(TRACKING_POLICY_PATH))
            .headers(self.auth_headers()?)
            .send()
            .await?;
        let response = Self::check_response(response).await?;

        let envelope: PayloadEnvelope = Self::parse_json(response, "tracking policy").await?;
        let entry = envelope
            .first()
            .ok_or_else(|| ApiError::InvalidResponse("Tracking policy payload is empty".to_string()))?;
        serde_json::from_value(entry.clone())
            .map_err(|e| ApiError::InvalidResponse(format!("Malformed tracking policy: {}", e)))
    }

    /// Submit the check-in form for `attendance_id`.
    ///
    /// `in_time` is local wall-clock time formatted `%Y-%m-%d %H:%M:%S`.
    pub async fn check_in(
        &self,
        attendance_id: &str,
        policy_id: &str,
        in_time: &str,
    ) -> Result<CheckInResponse, ApiError> {
        let form = multipart::Form::new()
            .text("in_time", in_time.to_string())
            .text("attendance_tracking_policy_id", policy_id.to_string())
            .text("is_mobile_device", "false")
            .text("_method", "PUT");

        let url = self.url(&format!("{}/{}", CHECK_IN_PATH, attendance_id));
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()
            .await?;

        // The service answers rejected check-ins with a JSON body too, so the
        // body is read before the status is considered.
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<CheckInResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => Err(ApiError::from_status(status, &body)),
            Err(e) => Err(ApiError::InvalidResponse(format!(
                "Failed to parse check-in response: {}",
                e
            ))),
        }
    }
}

#[async_trait]
impl Authenticator for ApiClient {
    async fn login(&self, identity: &str, secret: &str) -> Result<LoginResult, ApiError> {
        ApiClient::login(self, identity, secret).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:8080/api/v1/").unwrap();
        assert_eq!(client.url(LOGIN_PATH), "http://localhost:8080/api/v1/login");
    }

    #[test]
    fn test_auth_headers() {
        let client = ApiClient::new("http://localhost").unwrap();
        assert!(client.auth_headers().unwrap().is_empty());

        let authed = client.with_token("abc".to_string());
        let headers = authed.auth_headers().unwrap();
        assert_eq!(headers.get(header::AUTHORIZATION).unwrap(), "Bearer abc");

        let bad = client.with_token("line\nbreak".to_string());
        assert!(bad.auth_headers().is_err());
    }
}
