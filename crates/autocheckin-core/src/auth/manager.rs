//! Token issuing and credential recovery.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use tracing::{info, warn};

use super::{CachedToken, CredentialPrompter, CredentialRecord, CredentialStore, TokenCache};
use crate::api::ApiError;
use crate::config::{DEFAULT_MAX_RECOVERY_ATTEMPTS, DEFAULT_TOKEN_TTL_HOURS};

/// Successful login against the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub access_token: String,
}

/// Anything that can exchange an identity and secret for a token.
///
/// A rejected login must be reported as [`ApiError::LoginRejected`]; other
/// errors are treated as transport failures.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn login(&self, identity: &str, secret: &str) -> Result<LoginResult, ApiError>;
}

/// Result of asking for a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    /// A usable bearer token
    Token(String),
    /// Nothing usable this cycle; move on to the next identity
    Skip,
    /// The operator refused to fix a rejected credential
    FatalRecoveryDeclined,
}

pub struct TokenManager<A, P> {
    authenticator: A,
    prompter: P,
    store: Arc<dyn CredentialStore>,
    cache: TokenCache,
    ttl: Duration,
    max_recovery_attempts: u32,
}

impl<A: Authenticator, P: CredentialPrompter> TokenManager<A, P> {
    pub fn new(
        authenticator: A,
        prompter: P,
        store: Arc<dyn CredentialStore>,
        cache: TokenCache,
    ) -> Self {
        Self {
            authenticator,
            prompter,
            store,
            cache,
            ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_recovery_attempts(mut self, attempts: u32) -> Self {
        self.max_recovery_attempts = attempts;
        self
    }

    pub fn store(&self) -> &dyn CredentialStore {
        self.store.as_ref()
    }

    /// Make sure the store holds at least one record, prompting for one if not.
    ///
    /// Returns true when a record was added.
    pub fn ensure_credentials_exist(&self) -> Result<bool> {
        if !self.store.load()?.is_empty() {
            return Ok(false);
        }

        info!("Credential store is empty, asking for a first credential");
        let record = self
            .prompter
            .prompt_new_credential()
            .context("Failed to read new credential")?;
        if record.identity.trim().is_empty() {
            bail!("Username must not be empty");
        }
        self.store.append(&record)?;
        info!(identity = %record.identity, "Credential saved");
        Ok(true)
    }

    /// A usable token for `record`, from cache or a fresh login.
    ///
    /// If the operator corrects the credential during recovery, `record` is
    /// updated in place and persisted.
    pub async fn get_token(&self, record: &mut CredentialRecord) -> Result<TokenOutcome> {
        if let Some(cached) = self.cache.load_valid(&record.identity)? {
            info!(
                identity = %record.identity,
                expires_at = %cached.expires_at,
                minutes_left = cached.minutes_until_expiry(),
                "Using cached token"
            );
            return Ok(TokenOutcome::Token(cached.access_token));
        }

        let mut corrections = 0;
        loop {
            match self.authenticator.login(&record.identity, &record.secret).await {
                Ok(login) => {
                    let token = CachedToken::issue(login.access_token, self.ttl);
                    self.cache.save(&record.identity, &token)?;
                    info!(
                        identity = %record.identity,
                        expires_at = %token.expires_at,
                        "New token saved"
                    );
                    return Ok(TokenOutcome::Token(token.access_token));
                }
                Err(ApiError::MissingToken) => {
                    warn!(identity = %record.identity, "Login succeeded without an access token");
                    return Ok(TokenOutcome::Skip);
                }
                Err(ApiError::LoginRejected { status, .. }) => {
                    warn!(identity = %record.identity, %status, "Login failed");

                    if corrections >= self.max_recovery_attempts {
                        warn!(
                            identity = %record.identity,
                            attempts = corrections,
                            "Giving up on this credential until the next cycle"
                        );
                        return Ok(TokenOutcome::Skip);
                    }

                    let update_wanted = self
                        .prompter
                        .confirm_update(&record.identity, &record.masked_secret())?;
                    if !update_wanted {
                        info!(identity = %record.identity, "Operator declined to update credentials");
                        return Ok(TokenOutcome::FatalRecoveryDeclined);
                    }

                    let updated = self.prompter.prompt_update(record)?.apply_to(record);
                    self.store.update(&record.identity, &updated)?;
                    info!(
                        previous = %record.identity,
                        identity = %updated.identity,
                        "Credential updated, retrying login"
                    );
                    *record = updated;
                    corrections += 1;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Login request failed for {}", record.identity));
                }
            }
        }
    }
}
