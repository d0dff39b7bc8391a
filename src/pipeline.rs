//! Ingestion pipeline — fetch, classify, persist, report, repeat.
//!
//! One `run_cycle()` is a full batch: read the cursor, fetch a bounded
//! page, classify each message, commit its record and cursor entry, and
//! emit progress. `run()` repeats cycles forever with the configured
//! sleep inserted AFTER each cycle completes, so a slow batch delays the
//! next one instead of overlapping it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::attachments::AttachmentExtractor;
use crate::classifier::Classifier;
use crate::error::Result;
use crate::mailbox::{Mailbox, deep_link};
use crate::notify::{Notifier, ProgressReporter};
use crate::store::ClassificationStore;

/// Sentinel subject for messages without a "Subject" header.
const NO_SUBJECT: &str = "No Subject";

/// Sentinel body for messages without provider preview text.
const NO_CONTENT: &str = "No content available.";

/// Progress is reported after every Nth message and after the last.
const REPORT_EVERY: usize = 10;

/// Outcome of a single cycle.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Messages in the fetched page.
    pub fetched: usize,
    /// Messages classified and recorded this cycle.
    pub processed: usize,
    /// Messages skipped because their id was already in the cursor log.
    pub skipped: usize,
}

/// The orchestrator. All collaborators are injected behind traits so a
/// cycle can run against fakes in tests.
pub struct Pipeline {
    store: ClassificationStore,
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<dyn Classifier>,
    notifier: Arc<dyn Notifier>,
    extractor: AttachmentExtractor,
    fetch_page_size: u32,
    poll_interval: Duration,
}

impl Pipeline {
    pub fn new(
        store: ClassificationStore,
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<dyn Classifier>,
        notifier: Arc<dyn Notifier>,
        extractor: AttachmentExtractor,
        fetch_page_size: u32,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            mailbox,
            classifier,
            notifier,
            extractor,
            fetch_page_size,
            poll_interval,
        }
    }

    /// Run cycles until the shutdown flag is set.
    ///
    /// A failed cycle is logged and ends early; work committed before the
    /// failure stays committed and the next cycle starts after the normal
    /// sleep. This delayed full-cycle re-attempt is the only retry.
    pub async fn run(&self, shutdown: Arc<AtomicBool>) {
        info!(
            interval_secs = self.poll_interval.as_secs(),
            "Pipeline started"
        );

        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            match self.run_cycle().await {
                Ok(summary) => {
                    if summary.processed > 0 {
                        info!(
                            fetched = summary.fetched,
                            processed = summary.processed,
                            skipped = summary.skipped,
                            "Cycle complete"
                        );
                    }
                }
                Err(e) => error!(error = %e, "Cycle failed; will retry after interval"),
            }

            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        info!("Pipeline stopped");
    }

    /// One full batch. Errors from listing or fetching a full message end
    /// the cycle; per-message classification and attachment problems do not.
    pub async fn run_cycle(&self) -> Result<CycleSummary> {
        let cursor = self.store.latest_cursor()?;
        debug!(cursor = cursor.as_deref().unwrap_or("<none>"), "Cycle start");

        // The stored cursor doubles as the continuation token for the next
        // fetch. If the provider rejects or misinterprets it, the watermark
        // check below still prevents duplicate records.
        let page = self
            .mailbox
            .list_messages(cursor.as_deref(), self.fetch_page_size)
            .await?;

        if page.messages.is_empty() {
            debug!("No new emails found");
            return Ok(CycleSummary::default());
        }

        let total = page.messages.len();
        info!(total, "Found new emails");

        let progress = ProgressReporter::new(self.notifier.as_ref());
        progress.report(0, total).await;

        let mut summary = CycleSummary {
            fetched: total,
            ..CycleSummary::default()
        };

        for (i, msg_ref) in page.messages.iter().enumerate() {
            let current = i + 1;

            if self.store.is_processed(&msg_ref.id)? {
                debug!(id = %msg_ref.id, "Already processed; skipping");
                summary.skipped += 1;
            } else {
                self.process_message(&msg_ref.id).await?;
                summary.processed += 1;
            }

            if current % REPORT_EVERY == 0 || current == total {
                progress.report(current, total).await;
            }
        }

        Ok(summary)
    }

    /// Classify and commit a single message: record first, cursor second,
    /// attachments last. A classification failure is recorded as an
    /// `Error` category; an attachment failure is logged after the cursor
    /// has already advanced.
    async fn process_message(&self, id: &str) -> Result<()> {
        let message = self.mailbox.get_message(id).await?;

        let subject = message.subject().unwrap_or(NO_SUBJECT).to_string();
        let snippet = message
            .snippet
            .clone()
            .unwrap_or_else(|| NO_CONTENT.to_string());

        let category = self.classifier.classify(&subject, &snippet).await;
        debug!(id, category = %category, "Message classified");

        self.store
            .record_classification(&subject, &category, &deep_link(id))?;
        self.store.append_cursor(id)?;

        if message.has_pdf_part() {
            if let Err(e) = self.extractor.extract(self.mailbox.as_ref(), &message).await {
                warn!(id, error = %e, "Attachment extraction failed");
            }
        }

        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::category::Category;
    use crate::error::{Error, MailboxError, NotifyError};
    use crate::mailbox::{Message, MessagePage, MessageRef};
    use crate::store::Database;

    // ── Fakes ───────────────────────────────────────────────────────

    #[derive(Default)]
    struct FakeMailbox {
        messages: Vec<Message>,
        /// Message ids whose full fetch fails.
        failing_ids: Vec<String>,
        /// Page tokens seen by list_messages, for resume assertions.
        list_tokens: Mutex<Vec<Option<String>>>,
        attachments: HashMap<String, Vec<u8>>,
    }

    impl FakeMailbox {
        fn with_messages(messages: Vec<Message>) -> Self {
            Self {
                messages,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl Mailbox for FakeMailbox {
        async fn list_messages(
            &self,
            page_token: Option<&str>,
            max_results: u32,
        ) -> Result<MessagePage, MailboxError> {
            self.list_tokens
                .lock()
                .unwrap()
                .push(page_token.map(str::to_string));
            let refs = self
                .messages
                .iter()
                .take(max_results as usize)
                .map(|m| MessageRef { id: m.id.clone() })
                .collect();
            Ok(MessagePage {
                messages: refs,
                next_page_token: None,
            })
        }

        async fn get_message(&self, id: &str) -> Result<Message, MailboxError> {
            if self.failing_ids.iter().any(|f| f == id) {
                return Err(MailboxError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.messages
                .iter()
                .find(|m| m.id == id)
                .cloned()
                .ok_or_else(|| MailboxError::InvalidResponse(format!("unknown id {id}")))
        }

        async fn get_attachment(
            &self,
            _message_id: &str,
            attachment_id: &str,
        ) -> Result<Vec<u8>, MailboxError> {
            self.attachments
                .get(attachment_id)
                .cloned()
                .ok_or_else(|| MailboxError::Status {
                    status: 404,
                    body: "missing".to_string(),
                })
        }

        async fn move_to_spam(&self, _id: &str) -> Result<(), MailboxError> {
            Ok(())
        }
    }

    /// Classifier replaying scripted oracle text per subject.
    struct ScriptedClassifier {
        responses: HashMap<String, String>,
        /// Subjects for which the oracle call "fails".
        failing_subjects: Vec<String>,
    }

    #[async_trait]
    impl Classifier for ScriptedClassifier {
        async fn classify(&self, subject: &str, _snippet: &str) -> Category {
            if self.failing_subjects.iter().any(|s| s == subject) {
                return Category::Error("connection reset".to_string());
            }
            match self.responses.get(subject) {
                Some(text) => Category::from_oracle(text),
                None => Category::GeneralInformation,
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, text: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    // ── Builders ────────────────────────────────────────────────────

    fn plain_message(id: &str, subject: Option<&str>, snippet: Option<&str>) -> Message {
        let headers = match subject {
            Some(s) => format!(r#"[{{"name": "Subject", "value": "{s}"}}]"#),
            None => "[]".to_string(),
        };
        let snippet_field = match snippet {
            Some(s) => format!(r#""snippet": "{s}","#),
            None => String::new(),
        };
        serde_json::from_str(&format!(
            r#"{{"id": "{id}", {snippet_field}
                "payload": {{"mimeType": "text/plain", "headers": {headers}}}}}"#
        ))
        .unwrap()
    }

    fn pdf_message(id: &str, subject: &str, filename: &str, attachment_id: &str) -> Message {
        serde_json::from_str(&format!(
            r#"{{"id": "{id}",
                "snippet": "see attached",
                "payload": {{
                    "mimeType": "multipart/mixed",
                    "headers": [{{"name": "Subject", "value": "{subject}"}}],
                    "parts": [
                        {{"mimeType": "text/plain"}},
                        {{"mimeType": "application/pdf", "filename": "{filename}",
                          "body": {{"attachmentId": "{attachment_id}"}}}}
                    ]
                }}}}"#
        ))
        .unwrap()
    }

    struct Harness {
        pipeline: Pipeline,
        notifier: Arc<RecordingNotifier>,
        db: Arc<Database>,
        _tmp: tempfile::TempDir,
    }

    fn harness(
        mailbox: FakeMailbox,
        classifier: ScriptedClassifier,
        db: Option<Arc<Database>>,
    ) -> Harness {
        let tmp = tempfile::tempdir().unwrap();
        let db = db.unwrap_or_else(|| Arc::new(Database::open_in_memory().unwrap()));
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(
            ClassificationStore::new(Arc::clone(&db)),
            Arc::new(mailbox),
            Arc::new(classifier),
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            AttachmentExtractor::new(tmp.path().join("attachments")),
            500,
            Duration::from_secs(300),
        );
        Harness {
            pipeline,
            notifier,
            db,
            _tmp: tmp,
        }
    }

    fn no_script() -> ScriptedClassifier {
        ScriptedClassifier {
            responses: HashMap::new(),
            failing_subjects: Vec::new(),
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .unwrap()
    }

    // ── Cycle behavior ──────────────────────────────────────────────

    #[tokio::test]
    async fn empty_fetch_writes_nothing_and_reports_nothing() {
        let h = harness(FakeMailbox::default(), no_script(), None);
        let summary = h.pipeline.run_cycle().await.unwrap();

        assert_eq!(summary, CycleSummary::default());
        assert_eq!(count(&h.db, "emails"), 0);
        assert_eq!(count(&h.db, "cursor_log"), 0);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_message_gets_one_record_and_one_cursor_entry() {
        let messages = vec![
            plain_message("m1", Some("Interview"), Some("We'd like to talk")),
            plain_message("m2", None, None),
            plain_message("m3", Some("Sale!"), Some("Buy now")),
        ];
        let classifier = ScriptedClassifier {
            responses: HashMap::from([
                ("Interview".to_string(), "Job Opportunity".to_string()),
                ("Sale!".to_string(), "Spam / Promotion".to_string()),
            ]),
            failing_subjects: Vec::new(),
        };
        let h = harness(FakeMailbox::with_messages(messages), classifier, None);

        let summary = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(count(&h.db, "emails"), 3);
        assert_eq!(count(&h.db, "cursor_log"), 3);

        let store = ClassificationStore::new(Arc::clone(&h.db));
        assert_eq!(store.latest_cursor().unwrap(), Some("m3".to_string()));

        let recent = store.recent_classifications(10).unwrap();
        // Newest first: m3, m2, m1.
        assert_eq!(recent[0].category, "Spam / Promotion");
        assert_eq!(recent[1].subject, "No Subject");
        assert_eq!(recent[2].category, "Job Opportunity");
        assert_eq!(
            recent[2].link,
            "https://mail.google.com/mail/u/0/#inbox/m1"
        );
    }

    #[tokio::test]
    async fn classifier_failure_still_commits_record_and_cursor() {
        let messages = vec![plain_message("m1", Some("Weird"), Some("???"))];
        let classifier = ScriptedClassifier {
            responses: HashMap::new(),
            failing_subjects: vec!["Weird".to_string()],
        };
        let h = harness(FakeMailbox::with_messages(messages), classifier, None);

        let summary = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.processed, 1);

        let store = ClassificationStore::new(Arc::clone(&h.db));
        let recent = store.recent_classifications(1).unwrap();
        assert_eq!(recent[0].category, "Error: connection reset");
        assert_eq!(store.latest_cursor().unwrap(), Some("m1".to_string()));
    }

    #[tokio::test]
    async fn record_is_committed_before_cursor_append() {
        // Block cursor_log inserts so only the second half of the commit
        // pair can fail; the classification row must already be durable.
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.conn()
            .execute_batch(
                "CREATE TRIGGER cursor_log_blocked BEFORE INSERT ON cursor_log
                 BEGIN SELECT RAISE(ABORT, 'cursor log unavailable'); END;",
            )
            .unwrap();

        let messages = vec![plain_message("m1", Some("Interview"), Some("hello"))];
        let h = harness(FakeMailbox::with_messages(messages), no_script(), Some(db));

        let result = h.pipeline.run_cycle().await;
        assert!(matches!(result, Err(Error::Store(_))));

        assert_eq!(count(&h.db, "emails"), 1);
        assert_eq!(count(&h.db, "cursor_log"), 0);
    }

    #[tokio::test]
    async fn progress_reports_initial_every_tenth_and_final() {
        let messages: Vec<Message> = (0..25)
            .map(|i| plain_message(&format!("m{i}"), Some("s"), Some("b")))
            .collect();
        let h = harness(FakeMailbox::with_messages(messages), no_script(), None);

        h.pipeline.run_cycle().await.unwrap();

        let sent = h.notifier.sent.lock().unwrap();
        // (0,25), (10,25), (20,25), (25,25) → ceil(25/10) + 1 = 4.
        assert_eq!(sent.len(), 4);
        assert!(sent[0].contains("0% completed"));
        assert!(sent[1].contains("40% completed"));
        assert!(sent[2].contains("80% completed"));
        assert!(sent[3].contains("100% completed"));
    }

    #[tokio::test]
    async fn final_report_not_duplicated_on_multiple_of_ten() {
        let messages: Vec<Message> = (0..10)
            .map(|i| plain_message(&format!("m{i}"), Some("s"), Some("b")))
            .collect();
        let h = harness(FakeMailbox::with_messages(messages), no_script(), None);

        h.pipeline.run_cycle().await.unwrap();
        // (0,10) and (10,10) only.
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn small_batch_reports_twice() {
        let messages: Vec<Message> = (0..3)
            .map(|i| plain_message(&format!("m{i}"), Some("s"), Some("b")))
            .collect();
        let h = harness(FakeMailbox::with_messages(messages), no_script(), None);

        h.pipeline.run_cycle().await.unwrap();
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn mid_batch_fetch_failure_keeps_committed_work() {
        let messages = vec![
            plain_message("m1", Some("a"), Some("x")),
            plain_message("m2", Some("b"), Some("y")),
            plain_message("m3", Some("c"), Some("z")),
        ];
        let mailbox = FakeMailbox {
            failing_ids: vec!["m3".to_string()],
            ..FakeMailbox::with_messages(messages)
        };
        let h = harness(mailbox, no_script(), None);

        let result = h.pipeline.run_cycle().await;
        assert!(matches!(result, Err(Error::Mailbox(_))));

        // m1 and m2 stay committed, cursor points at m2. No rollback.
        assert_eq!(count(&h.db, "emails"), 2);
        assert_eq!(count(&h.db, "cursor_log"), 2);
        let store = ClassificationStore::new(Arc::clone(&h.db));
        assert_eq!(store.latest_cursor().unwrap(), Some("m2".to_string()));
    }

    #[tokio::test]
    async fn already_processed_ids_are_skipped_without_new_rows() {
        let messages = vec![
            plain_message("m1", Some("a"), Some("x")),
            plain_message("m2", Some("b"), Some("y")),
        ];
        let db = Arc::new(Database::open_in_memory().unwrap());
        ClassificationStore::new(Arc::clone(&db))
            .append_cursor("m1")
            .unwrap();

        let h = harness(FakeMailbox::with_messages(messages), no_script(), Some(db));
        let summary = h.pipeline.run_cycle().await.unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed, 1);
        assert_eq!(count(&h.db, "emails"), 1);
        // One pre-seeded entry plus one new.
        assert_eq!(count(&h.db, "cursor_log"), 2);
    }

    #[tokio::test]
    async fn latest_cursor_is_passed_as_continuation_token() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ClassificationStore::new(Arc::clone(&db))
            .append_cursor("m-last")
            .unwrap();

        let mailbox = Arc::new(FakeMailbox::default());
        let tmp = tempfile::tempdir().unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let pipeline = Pipeline::new(
            ClassificationStore::new(Arc::clone(&db)),
            Arc::clone(&mailbox) as Arc<dyn Mailbox>,
            Arc::new(no_script()),
            notifier as Arc<dyn Notifier>,
            AttachmentExtractor::new(tmp.path()),
            500,
            Duration::from_secs(300),
        );

        pipeline.run_cycle().await.unwrap();

        let tokens = mailbox.list_tokens.lock().unwrap();
        assert_eq!(*tokens, vec![Some("m-last".to_string())]);
    }

    #[tokio::test]
    async fn first_run_passes_no_continuation_token() {
        let mailbox = Arc::new(FakeMailbox::default());
        let tmp = tempfile::tempdir().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let pipeline = Pipeline::new(
            ClassificationStore::new(db),
            Arc::clone(&mailbox) as Arc<dyn Mailbox>,
            Arc::new(no_script()),
            Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>,
            AttachmentExtractor::new(tmp.path()),
            500,
            Duration::from_secs(300),
        );

        pipeline.run_cycle().await.unwrap();
        let tokens = mailbox.list_tokens.lock().unwrap();
        assert_eq!(*tokens, vec![None::<String>]);
    }

    #[tokio::test]
    async fn pdf_message_extracts_attachment() {
        let mut mailbox = FakeMailbox::with_messages(vec![pdf_message(
            "m1", "With CV", "cv.pdf", "att-1",
        )]);
        mailbox
            .attachments
            .insert("att-1".to_string(), b"%PDF-1.7".to_vec());

        let tmp = tempfile::tempdir().unwrap();
        let attachments_dir = tmp.path().join("attachments");
        let db = Arc::new(Database::open_in_memory().unwrap());
        let pipeline = Pipeline::new(
            ClassificationStore::new(Arc::clone(&db)),
            Arc::new(mailbox),
            Arc::new(no_script()),
            Arc::new(RecordingNotifier::default()) as Arc<dyn Notifier>,
            AttachmentExtractor::new(&attachments_dir),
            500,
            Duration::from_secs(300),
        );

        pipeline.run_cycle().await.unwrap();
        assert_eq!(
            std::fs::read(attachments_dir.join("cv.pdf")).unwrap(),
            b"%PDF-1.7"
        );
    }

    #[tokio::test]
    async fn missing_attachment_does_not_block_cursor() {
        // PDF part present but the attachment fetch 404s.
        let mailbox =
            FakeMailbox::with_messages(vec![pdf_message("m1", "Broken", "x.pdf", "gone")]);
        let h = harness(mailbox, no_script(), None);

        let summary = h.pipeline.run_cycle().await.unwrap();
        assert_eq!(summary.processed, 1);

        let store = ClassificationStore::new(Arc::clone(&h.db));
        assert_eq!(store.latest_cursor().unwrap(), Some("m1".to_string()));
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_flag_preset() {
        let h = harness(FakeMailbox::default(), no_script(), None);
        let shutdown = Arc::new(AtomicBool::new(true));
        // Returns immediately instead of sleeping 300s.
        h.pipeline.run(shutdown).await;
    }
}
