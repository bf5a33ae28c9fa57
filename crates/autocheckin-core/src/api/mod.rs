//! REST API client module for the attendance service.
//!
//! The service uses bearer token authentication obtained through a JSON
//! login endpoint. After login the agent reads the current shift and the
//! tracking policy, then submits a multipart check-in form.

pub mod client;
pub mod error;
pub mod models;

pub use client::{ApiClient, ShiftLookup};
pub use error::ApiError;
pub use models::{AttendanceShift, CheckInResponse, TrackingPolicy};
