//! Music service credential persistence
//!
//! Credentials are kept in a small JSON file. Obtaining a token (the OAuth
//! dance) happens elsewhere; this module only stores what it is given and
//! answers whether a usable bearer token is on hand.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Credentials for the Spotify Web API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpotifyCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Token expiry (None = unknown, treated as not expired)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SpotifyCredentials {
    /// Check the client registration fields
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::InvalidInput("client_id is empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(Error::InvalidInput("client_secret is empty".to_string()));
        }
        if !(self.redirect_uri.starts_with("http://") || self.redirect_uri.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "redirect_uri '{}' is not an http(s) URL",
                self.redirect_uri
            )));
        }
        Ok(())
    }

    /// Access token when present, non-empty and not yet expired at `now`
    pub fn bearer_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.trim().is_empty())?;
        match self.expires_at {
            Some(expiry) if expiry <= now => None,
            _ => Some(token),
        }
    }
}

/// JSON file holding [`SpotifyCredentials`]
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load stored credentials; a missing file is `Ok(None)`
    pub fn load(&self) -> Result<Option<SpotifyCredentials>> {
        if !self.path.exists() {
            debug!("No credentials file at {}", self.path.display());
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let credentials = serde_json::from_str(&content)?;
        Ok(Some(credentials))
    }

    /// Write credentials, creating the parent directory if needed
    pub fn save(&self, credentials: &SpotifyCredentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&self.path, json)?;
        info!("Saved credentials to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn registered() -> SpotifyCredentials {
        SpotifyCredentials {
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8888/callback".to_string(),
            access_token: None,
            expires_at: None,
        }
    }

    fn with_token(token: &str, expires_at: Option<DateTime<Utc>>) -> SpotifyCredentials {
        SpotifyCredentials {
            access_token: Some(token.to_string()),
            expires_at,
            ..registered()
        }
    }

    #[test]
    fn test_validate() {
        assert!(registered().validate().is_ok());

        let mut creds = registered();
        creds.client_id = " ".to_string();
        assert!(creds.validate().is_err());

        let mut creds = registered();
        creds.redirect_uri = "localhost:8888".to_string();
        assert!(creds.validate().is_err());
    }

    #[test]
    fn test_bearer_token_respects_expiry() {
        let now = Utc::now();
        assert_eq!(registered().bearer_token(now), None);

        let creds = with_token("tok", Some(now + Duration::minutes(5)));
        assert_eq!(creds.bearer_token(now), Some("tok"));

        let creds = with_token("tok", Some(now - Duration::minutes(5)));
        assert_eq!(creds.bearer_token(now), None);

        let creds = with_token("tok", None);
        assert_eq!(creds.bearer_token(now), Some("tok"));

        let creds = with_token("", None);
        assert_eq!(creds.bearer_token(now), None);
    }
}
