use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use inbox_triage::attachments::AttachmentExtractor;
use inbox_triage::classifier::GeminiClassifier;
use inbox_triage::config::Config;
use inbox_triage::mailbox::{Authenticator, GmailMailbox};
use inbox_triage::notify::TelegramNotifier;
use inbox_triage::pipeline::Pipeline;
use inbox_triage::store::{ClassificationStore, Database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📬 Inbox Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.gemini_model);
    eprintln!("   Database: {}", config.db_file.display());
    eprintln!("   Attachments: {}", config.attachments_dir.display());
    eprintln!("   Poll interval: {}s\n", config.poll_interval_secs);

    // ── Mailbox authentication (fatal on failure) ───────────────────────
    let auth = Arc::new(Authenticator::from_files(
        &config.oauth_credentials_file,
        &config.token_cache_file,
    )?);
    auth.authenticate().await?;
    eprintln!("   Gmail API ready.");

    // ── Components ──────────────────────────────────────────────────────
    let db = Arc::new(Database::open(&config.db_file)?);
    let store = ClassificationStore::new(db);

    let mailbox = Arc::new(GmailMailbox::new(auth));
    let classifier = Arc::new(GeminiClassifier::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ));
    let notifier = Arc::new(TelegramNotifier::new(
        config.telegram_bot_token.clone(),
        config.telegram_chat_id.clone(),
    ));
    let extractor = AttachmentExtractor::new(&config.attachments_dir);

    let pipeline = Pipeline::new(
        store,
        mailbox,
        classifier,
        notifier,
        extractor,
        config.fetch_page_size,
        Duration::from_secs(config.poll_interval_secs),
    );

    // ── Run until ctrl-c ────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
            flag.store(true, Ordering::Relaxed);
        }
    });

    pipeline.run(shutdown).await;

    Ok(())
}
