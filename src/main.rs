use std::sync::Arc;

use anyhow::Context;
use thesis_intake::channels::{Channel, ChatId, Gateway, TelegramChannel};
use thesis_intake::config::IntakeConfig;
use thesis_intake::dispatch::Dispatcher;
use thesis_intake::intake::{FileStore, IntakeManager};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Variables already set in the environment win over .env
    let _ = dotenvy::dotenv();

    let config = IntakeConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC...");
        eprintln!("  export INTAKE_REVIEWER_CHAT_ID=5407162492");
        std::process::exit(1);
    });

    let _log_guard = init_tracing(&config);

    eprintln!("📨 Thesis Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Reviewer: {}", config.reviewer_chat_id);
    eprintln!("   Uploads: {}", config.uploads_dir.display());

    // ── Storage ──────────────────────────────────────────────────────────
    let store = FileStore::new(config.uploads_dir.clone());
    store
        .ensure_dir()
        .await
        .with_context(|| format!("creating uploads dir {}", config.uploads_dir.display()))?;

    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramChannel::new(
        config.bot_token.clone(),
        config.poll_timeout,
    ));
    telegram
        .health_check()
        .await
        .context("Telegram health check failed; is TELEGRAM_BOT_TOKEN valid?")?;

    let gateway: Arc<dyn Gateway> = telegram.clone();
    let manager = Arc::new(IntakeManager::new(
        gateway,
        store,
        ChatId::new(config.reviewer_chat_id.clone()),
    ));

    let events = telegram.start().await?;
    eprintln!("   Channel: {}\n", telegram.name());
    tracing::info!("Bot is running...");

    let dispatcher = Dispatcher::new(manager, config.worker_idle_timeout);
    tokio::select! {
        _ = dispatcher.run(events) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received");
        }
    }

    telegram.shutdown().await?;
    Ok(())
}

/// Console logging, plus a daily-rolling file when a log dir is configured.
fn init_tracing(config: &IntakeConfig) -> Option<WorkerGuard> {
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter());

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "thesis-intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(env_filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry().with(console).with(file).init();
    guard
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
