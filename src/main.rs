use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, error, info, warn};
use tracing_subscriber::prelude::*;

use santa_bot::config::Config;
use santa_bot::santa::{Command, Database, Notifier, SantaBot, TelegramNotifier};
use santa_bot::telegram_log::TelegramLogLayer;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "santa.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.log_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory {}: {e}", log_dir.display());
    }
    let log_file = tracing_appender::rolling::never(&log_dir, "santa.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(TelegramLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("🎄 Starting santa-bot...");
    info!("Loaded config from {}", config.config_path.display());
    info!(
        "Admin: {}, {} code name(s), {} forbidden pair(s)",
        config.admin_id,
        config.aliases.len(),
        config.forbidden_pairs.len()
    );

    let database = match Database::open(&config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {}: {e}", config.database_path().display());
            std::process::exit(1);
        }
    };

    let notifier: Arc<dyn Notifier> = if config.dry_run {
        info!("DRY RUN mode enabled");
        Arc::new(TelegramNotifier::dry_run(bot.clone()))
    } else {
        Arc::new(TelegramNotifier::new(bot.clone()))
    };

    let santa = Arc::new(SantaBot::new(
        config.santa_config(),
        database,
        notifier,
        ChaCha8Rng::from_entropy(),
    ));

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to publish command list: {e}");
    }

    spawn_pending_purge(santa.clone());

    let handler = Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
        .branch(dptree::endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![santa])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn spawn_pending_purge(santa: Arc<SantaBot>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = santa.purge_expired_edits().await;
            if purged > 0 {
                debug!("Dropped {} expired wish list prompt(s)", purged);
            }
        }
    });
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    santa: Arc<SantaBot>,
) -> ResponseResult<()> {
    let Some(ref user) = msg.from else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;
    let name = user.username.as_deref().unwrap_or(&user.first_name);
    info!("📨 {:?} from {} ({})", cmd, name, user_id);

    let reply = santa.handle_command(user_id, user.username.as_deref(), cmd).await;
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_text(bot: Bot, msg: Message, santa: Arc<SantaBot>) -> ResponseResult<()> {
    let (Some(user), Some(text)) = (msg.from.as_ref(), msg.text()) else {
        return Ok(());
    };
    let user_id = user.id.0 as i64;

    if text.starts_with('/') {
        bot.send_message(msg.chat.id, "Unknown command. Use /help to see what I understand.")
            .await?;
        return Ok(());
    }

    let reply = match santa.handle_text(user_id, text).await {
        Some(reply) => reply,
        None => {
            debug!("Ignoring message from {}", user_id);
            return Ok(());
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
