//! Progress notifications — Telegram transport plus the bar renderer.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::error::NotifyError;

/// Fire-and-forget notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Telegram Bot API notifier — POSTs `{chat_id, text}` to `sendMessage`.
pub struct TelegramNotifier {
    bot_token: SecretString,
    chat_id: String,
    client: reqwest::Client,
}

impl TelegramNotifier {
    pub fn new(bot_token: SecretString, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token,
            chat_id: chat_id.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self) -> String {
        format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.bot_token.expose_secret()
        )
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });

        let resp = self.client.post(self.api_url()).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(NotifyError::Status { status, body });
        }

        debug!(chat_id = %self.chat_id, "Progress notification sent");
        Ok(())
    }
}

// ── Progress reporting ──────────────────────────────────────────────

const BAR_SLOTS: usize = 10;

/// Emits coarse percentage-complete notifications through a notifier.
pub struct ProgressReporter<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        Self { notifier }
    }

    /// Send one progress message. Callers must never pass `total == 0`.
    ///
    /// Transport failures are logged and swallowed — a dropped progress
    /// bar must not affect the batch.
    pub async fn report(&self, current: usize, total: usize) {
        let text = render_progress(current, total);
        if let Err(e) = self.notifier.send(&text).await {
            warn!(error = %e, current, total, "Failed to send progress notification");
        }
    }
}

/// Render the 10-slot bar and percentage for a progress message.
pub fn render_progress(current: usize, total: usize) -> String {
    let filled = current * BAR_SLOTS / total;
    let percent = current * 100 / total;
    let bar: String = "█".repeat(filled) + &"░".repeat(BAR_SLOTS - filled);
    format!("Processing emails...\n[{bar}] {percent}% completed.")
}
