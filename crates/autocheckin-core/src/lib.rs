//! Core library for autocheckin.
//!
//! Keeps per-user credentials and cached tokens, talks to the attendance
//! service and runs one check-in cycle over all stored users.

pub mod api;
pub mod attendance;
pub mod auth;
pub mod config;

pub use attendance::{AttendanceRunner, CycleReport, IdentityOutcome, IdentityReport};
pub use config::{Config, SecretBackend};
