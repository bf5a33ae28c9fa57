//! One check-in cycle over every stored identity.
//!
//! Identities are processed in store order, one at a time. A failure for one
//! identity is logged and the cycle moves on; a declined credential recovery
//! halts the cycle.

use anyhow::{Context, Result};
use chrono::Local;
use tracing::{error, info, warn};

use crate::api::{ApiClient, ShiftLookup};
use crate::auth::{CredentialPrompter, TokenManager, TokenOutcome};

/// Format of the `in_time` form field
const IN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityOutcome {
    CheckedIn { message: String },
    /// The service answered `success: false`
    Rejected { message: String },
    NoShift,
    NoAttendanceData,
    /// No usable token this cycle
    Skipped,
    RecoveryDeclined,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityReport {
    pub identity: String,
    pub outcome: IdentityOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub identities: Vec<IdentityReport>,
    /// Set when the operator declined recovery; later identities were not processed
    pub halted: bool,
}

impl CycleReport {
    pub fn checked_in(&self) -> usize {
        self.identities
            .iter()
            .filter(|r| matches!(r.outcome, IdentityOutcome::CheckedIn { .. }))
            .count()
    }

    fn push(&mut self, identity: &str, outcome: IdentityOutcome) {
        self.identities.push(IdentityReport {
            identity: identity.to_string(),
            outcome,
        });
    }
}

pub struct AttendanceRunner<P> {
    api: ApiClient,
    tokens: TokenManager<ApiClient, P>,
}

impl<P: CredentialPrompter> AttendanceRunner<P> {
    pub fn new(api: ApiClient, tokens: TokenManager<ApiClient, P>) -> Self {
        Self { api, tokens }
    }

    pub fn tokens(&self) -> &TokenManager<ApiClient, P> {
        &self.tokens
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.tokens.ensure_credentials_exist()?;
        let records = self.tokens.store().load()?;
        let mut report = CycleReport::default();

        for mut record in records {
            let outcome = match self.tokens.get_token(&mut record).await {
                Ok(TokenOutcome::Token(token)) => {
                    match self.submit(&record.identity, token).await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            let detail = format!("{:#}", e);
                            error!(identity = %record.identity, error = %detail, "Error processing user");
                            IdentityOutcome::Failed(detail)
                        }
                    }
                }
                Ok(TokenOutcome::Skip) => IdentityOutcome::Skipped,
                Ok(TokenOutcome::FatalRecoveryDeclined) => {
                    warn!(identity = %record.identity, "Credential recovery declined, halting cycle");
                    report.push(&record.identity, IdentityOutcome::RecoveryDeclined);
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    let detail = format!("{:#}", e);
                    error!(identity = %record.identity, error = %detail, "Could not obtain token");
                    IdentityOutcome::Failed(detail)
                }
            };
            report.push(&record.identity, outcome);
        }

        Ok(report)
    }

    async fn submit(&self, identity: &str, token: String) -> Result<IdentityOutcome> {
        let api = self.api.with_token(token);

        let shift = match api.current_shift().await.context("Failed to fetch current shift")? {
            ShiftLookup::NoShift => {
                info!(identity = %identity, "No attendance shift");
                return Ok(IdentityOutcome::NoShift);
            }
            ShiftLookup::Empty => {
                warn!(identity = %identity, "No attendance data");
                return Ok(IdentityOutcome::NoAttendanceData);
            }
            ShiftLookup::Active(shift) => shift,
        };

        let policy = api
            .tracking_policy()
            .await
            .context("Failed to fetch attendance tracking policy")?;

        let in_time = Local::now().format(IN_TIME_FORMAT).to_string();
        let response = api
            .check_in(&shift.attendance_id, &policy.attendance_tracking_policy_id, &in_time)
            .await
            .context("Failed to submit check-in")?;

        let message = response.message.unwrap_or_default();
        if response.success {
            info!(
                identity = %identity,
                employee_id = %shift.employee_id,
                shift_id = %shift.shift_id,
                message = %message,
                "Attendance success"
            );
            Ok(IdentityOutcome::CheckedIn { message })
        } else {
            error!(identity = %identity, message = %message, "Attendance failed");
            Ok(IdentityOutcome::Rejected { message })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_in_count() {
        let report = CycleReport {
            identities: vec![
                IdentityReport {
                    identity: "a".to_string(),
                    outcome: IdentityOutcome::CheckedIn {
                        message: "ok".to_string(),
                    },
                },
                IdentityReport {
                    identity: "b".to_string(),
                    outcome: IdentityOutcome::NoShift,
                },
            ],
            halted: false,
        };
        assert_eq!(report.checked_in(), 1);
    }

    #[test]
    fn test_in_time_format() {
        let stamp = chrono::NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(8, 4, 9)
            .unwrap()
            .format(IN_TIME_FORMAT)
            .to_string();
        assert_eq!(stamp, "2024-03-05 08:04:09");
    }
}
