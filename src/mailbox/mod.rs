//! Mailbox abstraction — the seam between the pipeline and Gmail.
//!
//! The pipeline only sees the `Mailbox` trait and the wire-shaped types
//! below; `GmailMailbox` is the production implementation.

pub mod auth;
pub mod gmail;

pub use auth::Authenticator;
pub use gmail::GmailMailbox;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::MailboxError;

/// A message reference from a list call — id only.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageRef {
    pub id: String,
}

/// One bounded page of candidate messages, in provider order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    #[serde(default)]
    pub messages: Vec<MessageRef>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// A message header as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Body of a message part. Large bodies carry an attachment id instead
/// of inline data.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// One structural part of a message payload. Parts nest.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A full message as fetched by id.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

impl Message {
    /// Value of the first header literally named "Subject", if any.
    pub fn subject(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name == "Subject")
                .map(|h| h.value.as_str())
        })
    }

    /// Whether any part of the payload declares a PDF MIME type.
    ///
    /// Structural inspection of declared types, not a substring scan of
    /// the raw payload.
    pub fn has_pdf_part(&self) -> bool {
        fn walk(part: &MessagePart) -> bool {
            part.mime_type == "application/pdf" || part.parts.iter().any(walk)
        }
        self.payload.as_ref().is_some_and(walk)
    }

    /// Parts that carry both a filename and a fetchable attachment id.
    pub fn attachment_parts(&self) -> Vec<&MessagePart> {
        fn walk<'a>(part: &'a MessagePart, out: &mut Vec<&'a MessagePart>) {
            let has_attachment = !part.filename.is_empty()
                && part
                    .body
                    .as_ref()
                    .and_then(|b| b.attachment_id.as_ref())
                    .is_some();
            if has_attachment {
                out.push(part);
            }
            for child in &part.parts {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        if let Some(payload) = &self.payload {
            walk(payload, &mut out);
        }
        out
    }
}

/// Deterministic deep link to a message in the Gmail web UI.
pub fn deep_link(message_id: &str) -> String {
    format!("https://mail.google.com/mail/u/0/#inbox/{message_id}")
}

/// Read access to a mailbox, plus the spam-label utility.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List a bounded page of inbox messages. `page_token` is the
    /// provider-defined continuation token for where the fetch starts.
    async fn list_messages(
        &self,
        page_token: Option<&str>,
        max_results: u32,
    ) -> Result<MessagePage, MailboxError>;

    /// Fetch a full message by id.
    async fn get_message(&self, id: &str) -> Result<Message, MailboxError>;

    /// Fetch attachment bytes (decoded) for a message part.
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<Vec<u8>, MailboxError>;

    /// Move a message to the spam label and off the inbox label.
    ///
    /// Manual utility — the pipeline never calls this.
    async fn move_to_spam(&self, id: &str) -> Result<(), MailboxError>;
}
