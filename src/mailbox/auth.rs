//! OAuth for the Gmail API — installed-app flow with a local token cache.
//!
//! First run walks the user through the consent flow on the console;
//! later runs refresh the cached token silently. Any failure here is
//! fatal at startup — the pipeline never runs unauthenticated.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::AuthError;

const GMAIL_SCOPE: &str = "https://www.googleapis.com/auth/gmail.readonly";
const REDIRECT_URI: &str = "http://localhost";

/// Seconds of slack before nominal expiry at which we refresh anyway.
const EXPIRY_SLACK_SECS: i64 = 60;

/// `installed` block of a Google OAuth client credentials file.
#[derive(Debug, Clone, Deserialize)]
struct ClientCredentials {
    client_id: String,
    client_secret: String,
    #[serde(default = "default_auth_uri")]
    auth_uri: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: ClientCredentials,
}

/// Cached authorization token, persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_SLACK_SECS) >= self.expires_at
    }
}

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Supplies valid access tokens, refreshing the cache in place.
pub struct Authenticator {
    creds: ClientCredentials,
    cache_path: PathBuf,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl Authenticator {
    /// Load client credentials and any cached token from disk.
    pub fn from_files(
        credentials_path: &Path,
        cache_path: &Path,
    ) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(credentials_path).map_err(|e| {
            AuthError::Credentials {
                path: credentials_path.display().to_string(),
                reason: e.to_string(),
            }
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&raw).map_err(|e| AuthError::Credentials {
                path: credentials_path.display().to_string(),
                reason: e.to_string(),
            })?;

        let cached = match std::fs::read_to_string(cache_path) {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| AuthError::TokenCache(e.to_string()))
                .map(Some)?,
            Err(_) => None,
        };

        Ok(Self {
            creds: file.installed,
            cache_path: cache_path.to_path_buf(),
            client: reqwest::Client::new(),
            token: Mutex::new(cached),
        })
    }

    /// Ensure a usable token exists, running the consent flow if needed.
    ///
    /// Called once at startup; errors here abort the process.
    pub async fn authenticate(&self) -> Result<(), AuthError> {
        let token = self.access_token().await?;
        debug!(token_len = token.len(), "Mailbox authentication complete");
        Ok(())
    }

    /// A currently valid access token, refreshing or re-consenting first
    /// if the cached one is missing or expired.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let mut guard = self.token.lock().await;

        if let Some(tok) = guard.as_ref() {
            if !tok.is_expired() {
                return Ok(tok.access_token.clone());
            }
        }

        let refreshed = match guard.as_ref().and_then(|t| t.refresh_token.clone()) {
            Some(refresh_token) => self.refresh(&refresh_token).await?,
            None => self.interactive_consent().await?,
        };

        self.write_cache(&refreshed)?;
        let access = refreshed.access_token.clone();
        *guard = Some(refreshed);
        Ok(access)
    }

    /// Exchange a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<CachedToken, AuthError> {
        let params = [
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let resp = self
            .client
            .post(&self.creds.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Refresh(format!("{status}: {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Refresh(e.to_string()))?;

        info!("Access token refreshed");
        Ok(CachedToken {
            access_token: token.access_token,
            // Refresh responses usually omit the refresh token; keep the old one.
            refresh_token: token
                .refresh_token
                .or_else(|| Some(refresh_token.to_string())),
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    /// First-run consent: print the authorization URL, read the code from
    /// the console, exchange it for tokens.
    async fn interactive_consent(&self) -> Result<CachedToken, AuthError> {
        let auth_url = format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            self.creds.auth_uri, self.creds.client_id, REDIRECT_URI, GMAIL_SCOPE
        );

        eprintln!("Open this URL in a browser and authorize access:");
        eprintln!("  {auth_url}");
        eprint!("Paste the authorization code here: ");
        std::io::stderr().flush().ok();

        let mut code = String::new();
        std::io::stdin()
            .read_line(&mut code)
            .map_err(|e| AuthError::Consent(e.to_string()))?;
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::Consent("no authorization code given".to_string()));
        }

        let params = [
            ("client_id", self.creds.client_id.as_str()),
            ("client_secret", self.creds.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
            ("grant_type", "authorization_code"),
        ];

        let resp = self
            .client
            .post(&self.creds.token_uri)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::Consent(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::Consent(format!("{status}: {body}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::Consent(e.to_string()))?;

        info!("Consent flow complete");
        Ok(CachedToken {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in),
        })
    }

    /// Persist the token cache, refreshed in place.
    fn write_cache(&self, token: &CachedToken) -> Result<(), AuthError> {
        let raw = serde_json::to_string_pretty(token)
            .map_err(|e| AuthError::TokenCache(e.to_string()))?;
        std::fs::write(&self.cache_path, raw)?;
        debug!(path = %self.cache_path.display(), "Token cache written");
        Ok(())
    }
}
