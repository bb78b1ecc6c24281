use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64_URL;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::{debug, info};

use crate::credentials::{CredentialStore, ADMIN_USERNAME};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("session expired")]
    Expired,
    #[error("malformed session token")]
    Malformed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.subject == ADMIN_USERNAME
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Issues and checks `base64url(claims).base64url(hmac_sha256(secret, claims))`
/// tokens. Nothing is kept server side.
#[derive(Clone)]
pub struct SessionAuthenticator {
    store: Arc<CredentialStore>,
    secret: Arc<Vec<u8>>,
    ttl: Duration,
}

impl SessionAuthenticator {
    pub fn new(store: Arc<CredentialStore>, secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            store,
            secret: Arc::new(secret.as_ref().to_vec()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Check the credentials and issue a signed token for the subject.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, Session), AuthError> {
        if !self.store.verify(username, password).await {
            info!("login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.issue(username)?;
        info!(subject = %username, expires_at = %issued.1.expires_at, "session issued");
        Ok(issued)
    }

    /// Sign a fresh token for `subject` without checking credentials.
    pub fn issue(&self, subject: &str) -> Result<(String, Session), AuthError> {
        self.issue_at(subject, Utc::now())
    }

    pub fn validate(&self, token: &str) -> Result<Session, AuthError> {
        self.validate_at(token, Utc::now())
    }

    fn issue_at(&self, subject: &str, now: DateTime<Utc>) -> Result<(String, Session), AuthError> {
        let ttl = i64::try_from(self.ttl.as_secs()).map_err(|_| AuthError::Malformed)?;
        let claims = Claims {
            sub: subject.to_string(),
            iat: now.timestamp(),
            exp: now.timestamp().saturating_add(ttl),
        };

        let payload = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;
        let encoded = BASE64_URL.encode(payload);
        let signature = BASE64_URL.encode(self.sign(encoded.as_bytes())?);

        let session = session_from_claims(claims)?;
        Ok((format!("{encoded}.{signature}"), session))
    }

    fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<Session, AuthError> {
        let (encoded, signature) = token.trim().split_once('.').ok_or(AuthError::Malformed)?;
        let signature = BASE64_URL
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;

        let mut mac = self.mac()?;
        mac.update(encoded.as_bytes());
        mac.verify_slice(&signature).map_err(|_| {
            debug!("session token signature mismatch");
            AuthError::Malformed
        })?;

        let payload = BASE64_URL.decode(encoded).map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| AuthError::Malformed)?;

        if now.timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }

        session_from_claims(claims)
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AuthError> {
        let mut mac = self.mac()?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::Malformed)
    }
}

fn session_from_claims(claims: Claims) -> Result<Session, AuthError> {
    let issued_at = Utc
        .timestamp_opt(claims.iat, 0)
        .single()
        .ok_or(AuthError::Malformed)?;
    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or(AuthError::Malformed)?;

    Ok(Session {
        subject: claims.sub,
        issued_at,
        expires_at,
    })
}
