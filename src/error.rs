//! Error types for inbox-triage.

/// Errors a pipeline cycle can surface.
///
/// Only store and mailbox failures propagate this far: configuration and
/// auth problems are handled at startup, classifier failures become
/// `Category::Error` values, and notification failures are logged and
/// swallowed.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Mailbox (Gmail API) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox request failed: {0}")]
    Request(String),

    #[error("Mailbox returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected mailbox response: {0}")]
    InvalidResponse(String),

    #[error("Attachment decode failed: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for MailboxError {
    fn from(e: reqwest::Error) -> Self {
        MailboxError::Request(e.to_string())
    }
}

/// Classification oracle errors.
///
/// These never propagate out of the pipeline — the classifier adapter
/// converts them into `Category::Error` values.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Empty response from model")]
    EmptyResponse,
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        ClassifierError::Request(e.to_string())
    }
}

/// Notification transport errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Telegram returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl From<reqwest::Error> for NotifyError {
    fn from(e: reqwest::Error) -> Self {
        NotifyError::SendFailed(e.to_string())
    }
}

/// OAuth / token cache errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Failed to read credentials file {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("Token cache error: {0}")]
    TokenCache(String),

    #[error("Token refresh failed: {0}")]
    Refresh(String),

    #[error("Consent flow failed: {0}")]
    Consent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
