//! Attachment extraction — pulls filename-bearing parts to local disk.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::MailboxError;
use crate::mailbox::{Mailbox, Message};

/// Writes message attachments into a fixed local directory.
///
/// Files are stored under their original filename; an existing file of
/// the same name is overwritten silently.
pub struct AttachmentExtractor {
    dir: PathBuf,
}

impl AttachmentExtractor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Save every fetchable attachment of `message`. Returns the saved
    /// filenames. Per-attachment failures are logged and skipped; only
    /// an unusable attachments directory is an error.
    pub async fn extract(
        &self,
        mailbox: &dyn Mailbox,
        message: &Message,
    ) -> Result<Vec<String>, MailboxError> {
        let parts = message.attachment_parts();
        if parts.is_empty() {
            return Ok(Vec::new());
        }

        std::fs::create_dir_all(&self.dir).map_err(|e| {
            MailboxError::Request(format!(
                "cannot create attachments dir {}: {e}",
                self.dir.display()
            ))
        })?;

        let mut saved = Vec::new();
        for part in parts {
            let Some(attachment_id) = part
                .body
                .as_ref()
                .and_then(|b| b.attachment_id.as_deref())
            else {
                continue;
            };

            let bytes = match mailbox.get_attachment(&message.id, attachment_id).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        filename = %part.filename,
                        error = %e,
                        "Failed to fetch attachment"
                    );
                    continue;
                }
            };

            let path = self.dir.join(&part.filename);
            if let Err(e) = std::fs::write(&path, &bytes) {
                warn!(path = %path.display(), error = %e, "Failed to write attachment");
                continue;
            }

            info!(path = %path.display(), bytes = bytes.len(), "Saved attachment");
            saved.push(part.filename.clone());
        }

        Ok(saved)
    }
}
