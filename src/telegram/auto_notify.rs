use std::sync::Arc;
use teloxide::{prelude::*, types::ParseMode};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    events::PipelineEvent,
    reclaim::batch::BatchSummary,
    telegram::formatters::{format_event, format_summary},
};

/// Forwards pipeline events to authorised Telegram chats.
///
/// Delivery failures are logged and dropped; they never reach the pipeline.
pub struct AutoNotifier {
    bot: Bot,
    chat_ids: Vec<i64>,
}

impl AutoNotifier {
    pub fn new(config: &Config) -> Option<Self> {
        let telegram_config = config.telegram.as_ref()?;
        if !telegram_config.notifications_enabled {
            info!("Telegram notifications are disabled in config");
            return None;
        }
        if telegram_config.authorized_users.is_empty() {
            info!("No authorized users configured for notifications");
            return None;
        }

        let bot = Bot::new(telegram_config.bot_token.clone());
        let chat_ids: Vec<i64> = telegram_config
            .authorized_users
            .iter()
            .map(|&id| id as i64)
            .collect();

        info!("Auto-notifier initialized for {} users", chat_ids.len());
        Some(Self { bot, chat_ids })
    }

    /// Consumes events until the bus is dropped.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<PipelineEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(message) = format_event(&event) {
                            self.send_to_all(&message).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Notifier fell behind, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Waits for a spawned notifier to drain. Returns false if it panicked.
    pub async fn finish(handle: JoinHandle<()>) -> bool {
        match handle.await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Notifier task ended abnormally");
                false
            }
        }
    }

    pub async fn notify_batch_complete(&self, summary: &BatchSummary) {
        self.send_to_all(&format_summary(summary)).await;
    }

    pub async fn notify_error(&self, error_msg: &str) {
        let message = format!(
            "⚠️ *Error Occurred*\n\n\
            {}\n\n\
            _Please check the system logs_",
            error_msg
        );
        self.send_to_all(&message).await;
    }

    async fn send_to_all(&self, message: &str) {
        for chat_id in &self.chat_ids {
            if let Err(e) = self
                .bot
                .send_message(ChatId(*chat_id), message)
                .parse_mode(ParseMode::Markdown)
                .await
            {
                error!("Failed to send notification to chat {}: {}", chat_id, e);
            } else {
                info!("Notification sent to chat {}", chat_id);
            }
        }
    }
}
