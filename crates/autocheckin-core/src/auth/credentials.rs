use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keychain service name for the keyring backend
const SERVICE_NAME: &str = "autocheckin";

/// One managed user: login name plus secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(rename = "user_name", alias = "User_Name", alias = "identity")]
    pub identity: String,
    #[serde(
        rename = "password",
        alias = "Password",
        alias = "secret",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub secret: String,
}

impl CredentialRecord {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }

    /// The secret rendered as one `*` per character.
    pub fn masked_secret(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("identity", &self.identity)
            .field("secret", &self.masked_secret())
            .finish()
    }
}

pub fn mask_secret(secret: &str) -> String {
    "*".repeat(secret.chars().count())
}

/// Persistence for credential records.
///
/// Implementations decide where secrets live; callers only see records.
pub trait CredentialStore: Send + Sync {
    /// All readable records in store order. Unreadable entries are skipped.
    fn load(&self) -> Result<Vec<CredentialRecord>>;

    /// Add a new record after the existing ones.
    fn append(&self, record: &CredentialRecord) -> Result<()>;

    /// Replace the record whose identity is `identity` with `record`.
    fn update(&self, identity: &str, record: &CredentialRecord) -> Result<()>;
}

/// Newline-delimited JSON file, one record per line.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path).with_context(|| {
            format!("Failed to read credential store {}", self.path.display())
        })?;
        Ok(contents.lines().map(str::to_string).collect())
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Vec<CredentialRecord>> {
        let mut records = Vec::new();
        for (index, line) in self.read_lines()?.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<CredentialRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(
                        line = index + 1,
                        error = %e,
                        "Skipping malformed credential line"
                    );
                }
            }
        }
        debug!(count = records.len(), path = %self.path.display(), "Loaded credentials");
        Ok(records)
    }

    fn append(&self, record: &CredentialRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open credential store {}", self.path.display()))?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line).context("Failed to append credential")?;
        Ok(())
    }

    fn update(&self, identity: &str, record: &CredentialRecord) -> Result<()> {
        let mut found = false;
        let mut lines = Vec::new();
        for line in self.read_lines()? {
            if line.trim().is_empty() {
                continue;
            }
            // Lines that fail to parse are carried over untouched.
            let matches = serde_json::from_str::<CredentialRecord>(&line)
                .map(|existing| existing.identity == identity)
                .unwrap_or(false);
            if matches {
                found = true;
                lines.push(serde_json::to_string(record)?);
            } else {
                lines.push(line);
            }
        }

        if !found {
            bail!("No stored credential for identity '{}'", identity);
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        std::fs::write(&self.path, contents).with_context(|| {
            format!("Failed to rewrite credential store {}", self.path.display())
        })?;
        Ok(())
    }
}

/// Somewhere secrets can be kept by identity.
pub trait SecretVault: Send + Sync {
    /// The secret for `identity`, or `None` if nothing is stored.
    fn get(&self, identity: &str) -> Result<Option<String>>;
    fn set(&self, identity: &str, secret: &str) -> Result<()>;
    /// Removing a missing entry is not an error.
    fn delete(&self, identity: &str) -> Result<()>;
}

/// The platform keychain, under the `autocheckin` service.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsKeychain;

impl OsKeychain {
    fn entry(identity: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, identity).context("Failed to create keyring entry")
    }
}

impl SecretVault for OsKeychain {
    fn get(&self, identity: &str) -> Result<Option<String>> {
        match Self::entry(identity)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve password from keychain"),
        }
    }

    fn set(&self, identity: &str, secret: &str) -> Result<()> {
        Self::entry(identity)?
            .set_password(secret)
            .context("Failed to store password in keychain")
    }

    fn delete(&self, identity: &str) -> Result<()> {
        match Self::entry(identity)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete password from keychain"),
        }
    }
}

/// Identities in the line file, secrets in a [`SecretVault`].
///
/// The line file is always written before the vault, so a failed file write
/// never leaves a secret behind for an identity the file does not know.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStore<V = OsKeychain> {
    identities: FileCredentialStore,
    vault: V,
}

impl KeyringCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self::with_vault(path, OsKeychain)
    }
}

impl<V: SecretVault> KeyringCredentialStore<V> {
    pub fn with_vault(path: PathBuf, vault: V) -> Self {
        Self {
            identities: FileCredentialStore::new(path),
            vault,
        }
    }

    fn identity_only(record: &CredentialRecord) -> CredentialRecord {
        CredentialRecord::new(record.identity.clone(), String::new())
    }
}

impl<V: SecretVault> CredentialStore for KeyringCredentialStore<V> {
    fn load(&self) -> Result<Vec<CredentialRecord>> {
        let mut records = self.identities.load()?;
        for record in &mut records {
            match self.vault.get(&record.identity)? {
                Some(secret) => record.secret = secret,
                None => warn!(identity = %record.identity, "No keychain secret stored"),
            }
        }
        Ok(records)
    }

    fn append(&self, record: &CredentialRecord) -> Result<()> {
        self.identities.append(&Self::identity_only(record))?;
        self.vault.set(&record.identity, &record.secret)
    }

    fn update(&self, identity: &str, record: &CredentialRecord) -> Result<()> {
        self.identities
            .update(identity, &Self::identity_only(record))?;
        self.vault.set(&record.identity, &record.secret)?;
        if record.identity != identity {
            if let Err(e) = self.vault.delete(identity) {
                let detail = format!("{:#}", e);
                warn!(identity = %identity, error = %detail, "Failed to remove old keychain entry");
            }
        }
        Ok(())
    }
}
