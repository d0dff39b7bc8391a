//! Gmail REST implementation of the `Mailbox` trait.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::MailboxError;

use super::{Mailbox, Message, MessagePage, auth::Authenticator};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail mailbox accessed over the REST API with a bearer token.
pub struct GmailMailbox {
    auth: Arc<Authenticator>,
    client: reqwest::Client,
}

/// Attachment body response shape.
#[derive(Debug, Deserialize)]
struct AttachmentBody {
    #[serde(default)]
    data: String,
}

impl GmailMailbox {
    pub fn new(auth: Arc<Authenticator>) -> Self {
        Self {
            auth,
            client: reqwest::Client::new(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, MailboxError> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        let resp = self
            .client
            .get(url)
            .query(query)
            .bearer_auth(token)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::Status { status, body });
        }

        resp.json()
            .await
            .map_err(|e| MailboxError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Mailbox for GmailMailbox {
    async fn list_messages(
        &self,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage, MailboxError> {
        let query = list_query(page_token, max_results);
        let page: MessagePage = self
            .get_json(&format!("{API_BASE}/messages"), &query)
            .await?;
        debug!(count = page.messages.len(), "Listed inbox messages");
        Ok(page)
    }

    async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
        self.get_json(
            &format!("{API_BASE}/messages/{id}"),
            &[("format", "full".to_string())],
        )
        .await
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError> {
        let body: AttachmentBody = self
            .get_json(
                &format!("{API_BASE}/messages/{message_id}/attachments/{attachment_id}"),
                &[],
            )
            .await?;
        decode_attachment_data(&body.data)
    }

    async fn move_to_spam(&self, id: &str) -> Result<(), MailboxError> {
        let token = self
            .auth
            .access_token()
            .await
            .map_err(|e| MailboxError::Request(e.to_string()))?;

        let resp = self
            .client
            .post(format!("{API_BASE}/messages/{id}/modify"))
            .bearer_auth(token)
            .json(&serde_json::json!({
                "addLabelIds": ["SPAM"],
                "removeLabelIds": ["INBOX"],
            }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailboxError::Status { status, body });
        }

        info!(id, "Message moved to spam");
        Ok(())
    }
}

/// Query pairs for the inbox list call. The continuation token is opaque
/// provider data and goes through reqwest's query encoder untouched.
fn list_query(page_token: Option<&str>, max_results: u32) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("labelIds", "INBOX".to_string()),
        ("maxResults", max_results.to_string()),
    ];
    if let Some(token) = page_token {
        query.push(("pageToken", token.to_string()));
    }
    query
}

/// Decode the base64url attachment payload Gmail returns.
fn decode_attachment_data(data: &str) -> Result<Vec<u8>, MailboxError> {
    // Gmail pads inconsistently; strip padding and decode without it.
    URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .map_err(|e| MailboxError::Decode(e.to_string()))
}
