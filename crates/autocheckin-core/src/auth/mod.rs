//! Authentication module: stored credentials, cached tokens and recovery.
//!
//! This module provides:
//! - `CredentialStore`: persisted identity/secret records (file or keychain)
//! - `TokenCache`: one token file per identity with a fixed expiry
//! - `TokenManager`: issues tokens, logging in again when the cache is stale
//!   and walking the operator through recovery when a login is rejected

pub mod credentials;
pub mod manager;
pub mod prompter;
pub mod session;

pub use credentials::{
    mask_secret, CredentialRecord, CredentialStore, FileCredentialStore, KeyringCredentialStore,
    OsKeychain, SecretVault,
};
pub use manager::{Authenticator, LoginResult, TokenManager, TokenOutcome};
pub use prompter::{CredentialPrompter, CredentialUpdate};
pub use session::{CachedToken, TokenCache};
