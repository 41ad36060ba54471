//! Temporary AWS credentials supplied by the execution environment.
//!
//! Read once at run start and passed by value to the signer and the AWS
//! clients; nothing deeper reads the environment.

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use std::fmt;

/// An access key pair plus the session token of an assumed role.
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Validates and wraps a credential triple. Role credentials are rejected
    /// upstream without the session token, so an empty one is refused here.
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> SyncResult<Self> {
        let creds = Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: session_token.into(),
            expires_at: None,
        };

        if creds.access_key_id.is_empty() {
            return Err(SyncError::Signing("access key id is missing".into()));
        }
        if creds.secret_access_key.is_empty() {
            return Err(SyncError::Signing("secret access key is missing".into()));
        }
        if creds.session_token.is_empty() {
            return Err(SyncError::Signing("session token is missing".into()));
        }
        Ok(creds)
    }

    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Reads `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`,
    /// plus the optional RFC 3339 `AWS_CREDENTIAL_EXPIRATION`.
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> SyncResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let creds = Self::new(
            lookup("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            lookup("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
            lookup("AWS_SESSION_TOKEN").unwrap_or_default(),
        )?;

        match lookup("AWS_CREDENTIAL_EXPIRATION").filter(|v| !v.trim().is_empty()) {
            Some(raw) => {
                let expires_at = DateTime::parse_from_rfc3339(raw.trim()).map_err(|e| {
                    SyncError::Signing(format!("AWS_CREDENTIAL_EXPIRATION is not RFC 3339: {e}"))
                })?;
                Ok(creds.with_expiry(expires_at.with_timezone(&Utc)))
            }
            None => Ok(creds),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }

    /// Credentials in the form the AWS SDK clients take.
    pub fn to_sdk(&self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            &self.access_key_id,
            &self.secret_access_key,
            Some(self.session_token.clone()),
            self.expires_at.map(Into::into),
            "rdslogs-env",
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
