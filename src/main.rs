use std::sync::Arc;

use anyhow::Context;

use cantarella::channels::TelegramChannel;
use cantarella::config::BotConfig;
use cantarella::conversation::Coordinator;
use cantarella::dispatch::Dispatcher;
use cantarella::store::MemoryStore;
use cantarella::transfer::{DisabledConnector, JobRegistry, TransferRunner};

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

    let config = BotConfig::from_env().context("invalid configuration")?;

    eprintln!("🤖 Cantarella v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Admins: {}", config.admins.len());
    eprintln!(
        "   Scratch chat: {}",
        config.scratch_chat.as_deref().unwrap_or("(none, bot fetch disabled)")
    );
    eprintln!(
        "   Batch: up to {} items, {} ms apart",
        config.transfer.max_batch,
        config.transfer.item_delay.as_millis()
    );

    if config.admins.is_empty() {
        tracing::warn!("CANTARELLA_ADMINS is empty; every turn will be ignored");
    }

    let (telegram, dispatcher) = build(&config).await.context("startup failed")?;
    let stream = telegram.start();
    dispatcher.run(stream).await;

    Ok(())
}

/// Wire the channel, store and transfer engine together.
async fn build(config: &BotConfig) -> cantarella::error::Result<(Arc<TelegramChannel>, Dispatcher)> {
    // ── Telegram ─────────────────────────────────────────────────────────
    let telegram = Arc::new(TelegramChannel::new(
        config.bot_token.clone(),
        config.admins.clone(),
        config.scratch_chat.clone(),
    ));
    telegram.health_check().await?;

    // ── User store ───────────────────────────────────────────────────────
    let store = match &config.store_seed {
        Some(path) => MemoryStore::from_seed_file(config.daily_limit, path).await?,
        None => MemoryStore::new(config.daily_limit),
    };

    // ── Transfers ────────────────────────────────────────────────────────
    let runner = Arc::new(TransferRunner::new(
        telegram.clone(),
        Arc::new(store),
        Arc::new(DisabledConnector),
        config.transfer.clone(),
    ));
    let coordinator = Arc::new(Coordinator::new(runner, JobRegistry::new()));

    Ok((telegram, Dispatcher::new(coordinator)))
}
