//! Forwards warnings and errors to an organizer chat.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_CHARS: usize = 4000;
const FLUSH_INTERVAL: Duration = Duration::from_secs(3);
const MAX_BATCH: usize = 20;

/// Targets never forwarded. A failing `send_message` logs under these, and
/// forwarding it would loop.
const QUIET_TARGETS: &[&str] = &["teloxide", "hyper", "reqwest", "santa_bot::telegram_log"];

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut batch: Vec<String> = Vec::new();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    line = rx.recv() => match line {
                        Some(line) => {
                            batch.push(line);
                            if batch.len() >= MAX_BATCH {
                                flush(&bot, chat_id, &mut batch).await;
                            }
                        }
                        None => {
                            flush(&bot, chat_id, &mut batch).await;
                            break;
                        }
                    },
                    _ = interval.tick() => flush(&bot, chat_id, &mut batch).await,
                }
            }
        });

        Self { tx }
    }
}

async fn flush(bot: &Bot, chat_id: ChatId, batch: &mut Vec<String>) {
    if batch.is_empty() {
        return;
    }
    let text = truncate(&batch.join("\n"));
    batch.clear();
    if let Err(e) = bot.send_message(chat_id, text).await {
        eprintln!("Failed to forward logs to Telegram: {e}");
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_MESSAGE_CHARS {
        return text.to_string();
    }
    let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
    format!("{truncated}...")
}

/// The line forwarded for an event, or `None` if it stays local.
fn forwarded_line(level: Level, target: &str, message: &str) -> Option<String> {
    if level > Level::WARN {
        return None;
    }
    if QUIET_TARGETS.iter().any(|quiet| target.starts_with(quiet)) {
        return None;
    }
    let prefix = if level == Level::ERROR { "❌" } else { "⚠️" };
    Some(format!("{prefix} {message}"))
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else if self.message.is_empty() {
            self.message = format!("{} = {value:?}", field.name());
        } else {
            self.message.push_str(&format!(", {} = {value:?}", field.name()));
        }
    }
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        if let Some(line) = forwarded_line(*metadata.level(), metadata.target(), &visitor.message)
            && self.tx.send(line).is_err()
        {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
