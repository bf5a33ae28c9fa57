use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A bearer token together with the moment it stops being trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedToken {
    #[serde(alias = "AccessToken")]
    pub access_token: String,
    #[serde(alias = "Expiry")]
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// A token issued now and trusted for `ttl`.
    pub fn issue(access_token: String, ttl: Duration) -> Self {
        Self::issued_at(access_token, Utc::now(), ttl)
    }

    pub fn issued_at(access_token: String, issued: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            access_token,
            expires_at: issued + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes().max(0)
    }
}

/// One token file per identity in a shared directory.
#[derive(Debug, Clone)]
pub struct TokenCache {
    dir: PathBuf,
}

impl TokenCache {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn token_path(&self, identity: &str) -> PathBuf {
        self.dir.join(format!("token_{}.json", file_safe(identity)))
    }

    /// The cached token for `identity`, if one exists and can be read.
    ///
    /// Expired tokens are returned as-is; callers check validity.
    pub fn load(&self, identity: &str) -> Result<Option<CachedToken>> {
        let path = self.token_path(identity);
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read token file {}", path.display()))?;
        if contents.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<CachedToken>(&contents) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Ignoring unreadable token file");
                Ok(None)
            }
        }
    }

    /// The cached token only if it is still valid.
    pub fn load_valid(&self, identity: &str) -> Result<Option<CachedToken>> {
        Ok(self.load(identity)?.filter(|token| !token.is_expired()))
    }

    pub fn save(&self, identity: &str, token: &CachedToken) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.token_path(identity);
        let contents = serde_json::to_string(token)?;
        std::fs::write(&path, contents)
            .with_context(|| format!("Failed to write token file {}", path.display()))?;
        debug!(identity = %identity, expires_at = %token.expires_at, "Token cached");
        Ok(())
    }
}

/// Percent-encodes every byte outside `[a-z0-9._@-]`, so distinct identities
/// never share a file name, even on case-insensitive filesystems.
fn file_safe(identity: &str) -> String {
    let mut name = String::with_capacity(identity.len());
    for byte in identity.bytes() {
        if byte.is_ascii_lowercase() || byte.is_ascii_digit() || matches!(byte, b'.' | b'_' | b'@' | b'-') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name
}
