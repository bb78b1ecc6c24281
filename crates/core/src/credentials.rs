use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

type HmacSha256 = Hmac<Sha256>;

/// The distinguished principal that owns the admin surface and can never be removed.
pub const ADMIN_USERNAME: &str = "admin";

const FALLBACK_USERS: &[(&str, &str)] = &[(ADMIN_USERNAME, "admin")];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("user {0} already exists")]
    Conflict(String),
    #[error("user {0} not found")]
    NotFound(String),
    #[error("user {0} is protected and cannot be removed")]
    Protected(String),
    #[error("invalid credential entry: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub username: String,
    pub password: String,
}

/// Parse a delimited `user:pass,user:pass` list.
///
/// Whitespace around each token is trimmed. Pairs without a `:`, with an
/// empty username or with an empty password are skipped; the first
/// occurrence of a username wins.
pub fn parse_user_list(raw: &str) -> Vec<CredentialEntry> {
    let mut entries: Vec<CredentialEntry> = Vec::new();

    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }

        let Some((username, password)) = pair.split_once(':') else {
            warn!("skipping malformed user entry without ':'");
            continue;
        };

        let username = username.trim();
        let password = password.trim();
        if username.is_empty() {
            warn!("skipping user entry with empty username");
            continue;
        }
        if password.is_empty() {
            warn!(username, "skipping user entry with empty password");
            continue;
        }

        if entries.iter().any(|entry| entry.username == username) {
            warn!(username, "skipping duplicate user entry");
            continue;
        }

        entries.push(CredentialEntry {
            username: username.to_string(),
            password: password.to_string(),
        });
    }

    entries
}

/// Resolve the startup user list, falling back to the built-in pair when the
/// configured value is unset or yields no usable entry.
pub fn resolve(raw: Option<&str>) -> Vec<CredentialEntry> {
    let parsed = raw.map(parse_user_list).unwrap_or_default();
    if !parsed.is_empty() {
        return parsed;
    }

    warn!("DEMO_USERS is unset or empty, falling back to the built-in admin account");
    FALLBACK_USERS
        .iter()
        .map(|(username, password)| CredentialEntry {
            username: (*username).to_string(),
            password: (*password).to_string(),
        })
        .collect()
}

pub struct CredentialStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl CredentialStore {
    pub fn new(entries: impl IntoIterator<Item = CredentialEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|entry| (entry.username, entry.password))
            .collect::<BTreeMap<_, _>>();

        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Build the store from the raw configuration value.
    pub fn from_config(raw: Option<&str>) -> Self {
        let store = Self::new(resolve(raw));
        warn!(
            "credential store is memory-only: users added or removed at runtime are lost on restart"
        );
        store
    }

    /// Exact, case-sensitive credential check.
    ///
    /// The password comparison is constant-time; an unknown username is
    /// compared against an empty password so both paths do the same work.
    pub async fn verify(&self, username: &str, password: &str) -> bool {
        let entries = self.entries.read().await;
        match entries.get(username) {
            Some(expected) => constant_time_eq(expected.as_bytes(), password.as_bytes()),
            None => {
                let _ = constant_time_eq(b"", password.as_bytes());
                false
            }
        }
    }

    /// Sorted snapshot of the known usernames.
    pub async fn usernames(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn contains(&self, username: &str) -> bool {
        self.entries.read().await.contains_key(username)
    }

    pub async fn add(&self, username: &str, password: &str) -> Result<(), StoreError> {
        validate_entry(username, password)?;

        let mut entries = self.entries.write().await;
        if entries.contains_key(username) {
            return Err(StoreError::Conflict(username.to_string()));
        }
        entries.insert(username.to_string(), password.to_string());

        info!(username, total = entries.len(), "user added");
        warn!(username, "user exists in memory only and will be lost on restart");
        Ok(())
    }

    pub async fn remove(&self, username: &str) -> Result<(), StoreError> {
        if username == ADMIN_USERNAME {
            return Err(StoreError::Protected(username.to_string()));
        }

        let mut entries = self.entries.write().await;
        if entries.remove(username).is_none() {
            return Err(StoreError::NotFound(username.to_string()));
        }

        info!(username, total = entries.len(), "user removed");
        warn!(
            username,
            "removal is in memory only; the user returns on restart if still configured"
        );
        Ok(())
    }
}

fn validate_entry(username: &str, password: &str) -> Result<(), StoreError> {
    if username.trim().is_empty() {
        return Err(StoreError::Invalid("username must not be empty"));
    }
    if username != username.trim() {
        return Err(StoreError::Invalid("username must not have surrounding whitespace"));
    }
    if username.contains(':') || username.contains(',') {
        return Err(StoreError::Invalid("username must not contain ':' or ','"));
    }
    if password.is_empty() {
        return Err(StoreError::Invalid("password must not be empty"));
    }
    Ok(())
}

/// Compare through HMAC tag verification, which `hmac` performs in constant time.
fn constant_time_eq(expected: &[u8], candidate: &[u8]) -> bool {
    let key = b"credential-compare";
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(expected);
    let tag = mac.finalize().into_bytes();

    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(candidate);
    mac.verify_slice(&tag).is_ok()
}
