use anyhow::Result;

use super::CredentialRecord;

/// Replacement values entered during recovery. `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialUpdate {
    pub identity: Option<String>,
    pub secret: Option<String>,
}

impl CredentialUpdate {
    /// Apply to `record`; blank or missing fields leave it unchanged.
    pub fn apply_to(&self, record: &CredentialRecord) -> CredentialRecord {
        let pick = |new: &Option<String>, old: &str| match new {
            Some(value) if !value.trim().is_empty() => value.clone(),
            _ => old.to_string(),
        };
        CredentialRecord {
            identity: pick(&self.identity, &record.identity),
            secret: pick(&self.secret, &record.secret),
        }
    }
}

/// Operator interaction needed by the token manager.
///
/// The binary implements this on the console; tests script it.
pub trait CredentialPrompter {
    /// Collect a brand new identity and secret.
    fn prompt_new_credential(&self) -> Result<CredentialRecord>;

    /// Login failed for `identity`: ask whether to update the stored values.
    fn confirm_update(&self, identity: &str, masked_secret: &str) -> Result<bool>;

    /// Ask for replacement values for `current`.
    fn prompt_update(&self, current: &CredentialRecord) -> Result<CredentialUpdate>;
}
