// ABOUTME: Telegram front-end built on teloxide long polling
// ABOUTME: Background poller feeds a bounded inbox; replies, typing hints and shutdown go through the Bot API

pub mod responder;
pub mod text;

pub use responder::TelegramResponder;

use crate::config::TelegramConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::requests::Request;
use teloxide::types::{
    ChatAction, ChatKind, MediaKind, MessageEntity, MessageEntityKind, MessageKind, ReplyParameters,
    UpdateKind,
};
use text::{EntityKind, TextEntity, MAX_MESSAGE_LENGTH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vacbot_core::{Frontend, FrontendError};

/// Updates received from Telegram but not yet taken by the dispatch loop
const MAX_IN_FLIGHT_UPDATES: usize = 250;

/// Long polling timeout passed to getUpdates, in seconds
const POLL_TIMEOUT_SECS: u32 = 30;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Routing data Telegram needs to answer a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramMetadata {
    pub chat_id: i64,
    /// Id of the inbound message, used to thread replies in groups
    pub message_id: i32,
    pub is_private: bool,
    pub forwarded: bool,
    /// Mentions the bot, replies to it, or carries a bot command
    pub addressed_to_bot: bool,
}

pub type TelegramMessage = vacbot_core::Message<TelegramMetadata>;

/// Who the bot is, as reported by getMe
#[derive(Debug, Clone)]
struct BotIdentity {
    id: UserId,
    username: String,
}

#[derive(Debug, Clone)]
struct Allowlist {
    users: Vec<i64>,
    chats: Vec<i64>,
}

impl Allowlist {
    fn allows(&self, user_id: i64, chat_id: i64) -> bool {
        (self.users.is_empty() || self.users.contains(&user_id))
            && (self.chats.is_empty() || self.chats.contains(&chat_id))
    }
}

// =============================================================================
// TelegramFrontend
// =============================================================================

/// Telegram front-end using teloxide with long polling
pub struct TelegramFrontend {
    bot: Bot,
    inbox: tokio::sync::Mutex<mpsc::Receiver<TelegramMessage>>,
    shutdown: CancellationToken,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl TelegramFrontend {
    /// Authenticate with Telegram and start long polling.
    ///
    /// Resolves the bot's identity via the `getMe` API call.
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        let bot = Bot::new(&config.bot_token);

        let me = bot.get_me().await.context("Failed to call Telegram getMe")?;
        let identity = BotIdentity {
            id: me.id,
            username: me.username().to_string(),
        };

        tracing::info!(
            bot_username = %identity.username,
            bot_id = identity.id.0,
            "Telegram bot authenticated"
        );

        let allowlist = Allowlist {
            users: config.allowed_users.clone(),
            chats: config.allowed_chats.clone(),
        };
        let (tx, rx) = mpsc::channel(MAX_IN_FLIGHT_UPDATES);
        let shutdown = CancellationToken::new();
        let poller = tokio::spawn(poll_updates(
            bot.clone(),
            identity,
            allowlist,
            tx,
            shutdown.clone(),
        ));

        Ok(Self {
            bot,
            inbox: tokio::sync::Mutex::new(rx),
            shutdown,
            poller: Mutex::new(Some(poller)),
        })
    }
}

#[async_trait]
impl Frontend for TelegramFrontend {
    type Metadata = TelegramMetadata;

    async fn await_next_message(&self) -> Result<TelegramMessage, FrontendError> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(FrontendError::Closed)
    }

    async fn is_message_for_bot(&self, message: &TelegramMessage) -> Result<bool, FrontendError> {
        let metadata = message.metadata();
        Ok(metadata.is_private || metadata.addressed_to_bot)
    }

    async fn send_message(&self, message: TelegramMessage) -> Result<(), FrontendError> {
        let metadata = message.metadata();
        let chat_id = ChatId(metadata.chat_id);

        for chunk in text::chunk_text(message.text(), MAX_MESSAGE_LENGTH) {
            let mut request = self.bot.send_message(chat_id, chunk);
            if !metadata.is_private {
                request = request.reply_parameters(ReplyParameters::new(
                    teloxide::types::MessageId(metadata.message_id),
                ));
            }
            request
                .await
                .map_err(|e| FrontendError::with_source("Failed to send Telegram message", e))?;
        }

        tracing::trace!(chat_id = metadata.chat_id, "Outgoing message sent");
        Ok(())
    }

    async fn notify_forthcoming_response(
        &self,
        message: &TelegramMessage,
    ) -> Result<(), FrontendError> {
        self.bot
            .send_chat_action(ChatId(message.metadata().chat_id), ChatAction::Typing)
            .await
            .map_err(|e| FrontendError::with_source("Failed to send typing action", e))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), FrontendError> {
        self.shutdown.cancel();
        let poller = self
            .poller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(poller) = poller {
            poller
                .await
                .map_err(|e| FrontendError::with_source("Telegram polling task failed", e))?;
        }
        tracing::info!(platform = "telegram", "Long polling stopped");
        Ok(())
    }
}

// =============================================================================
// Long polling
// =============================================================================

async fn poll_updates(
    bot: Bot,
    identity: BotIdentity,
    allowlist: Allowlist,
    tx: mpsc::Sender<TelegramMessage>,
    shutdown: CancellationToken,
) {
    let mut offset: i32 = 0;

    loop {
        let request = bot.get_updates().offset(offset).timeout(POLL_TIMEOUT_SECS);
        let updates = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = request.send() => match result {
                Ok(updates) => updates,
                Err(e) => {
                    tracing::warn!(
                        platform = "telegram",
                        error = %e,
                        "Long polling error, retrying in 5s"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => continue,
                    }
                }
            },
        };

        for update in &updates {
            offset = update.id.as_offset();

            let UpdateKind::Message(message) = &update.kind else {
                continue;
            };
            let Some(inbound) = convert_message(message, &identity, &allowlist) else {
                tracing::debug!(
                    platform = "telegram",
                    update_id = update.id.0,
                    "Skipping unwanted update"
                );
                continue;
            };

            // Telegram does not resend consumed updates, so wait for room instead of dropping
            tokio::select! {
                _ = shutdown.cancelled() => return,
                sent = tx.send(inbound) => {
                    if sent.is_err() {
                        tracing::warn!(platform = "telegram", "Inbox receiver dropped");
                        return;
                    }
                }
            }
        }
    }
}

/// Turn a Telegram text message into an engine message, or `None` if it should be ignored
fn convert_message(
    message: &teloxide::types::Message,
    identity: &BotIdentity,
    allowlist: &Allowlist,
) -> Option<TelegramMessage> {
    let MessageKind::Common(common) = &message.kind else {
        return None;
    };
    let MediaKind::Text(media) = &common.media_kind else {
        return None;
    };
    let from = message.from.as_ref()?;

    // Skip messages from the bot itself
    if from.id == identity.id {
        return None;
    }
    if !allowlist.allows(from.id.0 as i64, message.chat.id.0) {
        tracing::debug!(
            platform = "telegram",
            user_id = from.id.0,
            chat_id = message.chat.id.0,
            "Skipping message from non-allowed user or chat"
        );
        return None;
    }

    let entities: Vec<TextEntity> = media.entities.iter().map(to_text_entity).collect();

    let mentions_bot = media.entities.iter().any(|entity| match &entity.kind {
        MessageEntityKind::Mention => text::entity_text(&media.text, &to_text_entity(entity))
            .trim_start_matches('@')
            .eq_ignore_ascii_case(&identity.username),
        MessageEntityKind::TextMention { user } => user.id == identity.id,
        _ => false,
    });
    let has_command = entities
        .iter()
        .any(|entity| entity.kind == EntityKind::BotCommand);
    let replies_to_bot = message
        .reply_to_message()
        .and_then(|replied| replied.from.as_ref())
        .is_some_and(|user| user.id == identity.id);

    let metadata = TelegramMetadata {
        chat_id: message.chat.id.0,
        message_id: message.id.0,
        is_private: matches!(message.chat.kind, ChatKind::Private(_)),
        forwarded: message.forward_origin().is_some(),
        addressed_to_bot: mentions_bot || replies_to_bot || has_command,
    };

    Some(TelegramMessage::new(
        text::adjust_text(&media.text, &entities),
        metadata,
    ))
}

fn to_text_entity(entity: &MessageEntity) -> TextEntity {
    let kind = match entity.kind {
        MessageEntityKind::Mention => EntityKind::Mention,
        MessageEntityKind::TextMention { .. } => EntityKind::TextMention,
        MessageEntityKind::BotCommand => EntityKind::BotCommand,
        _ => EntityKind::Other,
    };
    TextEntity::new(kind, entity.offset, entity.length)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telegram_frontend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TelegramFrontend>();
    }

    #[test]
    fn test_empty_allowlist_allows_everyone() {
        let allowlist = Allowlist {
            users: vec![],
            chats: vec![],
        };
        assert!(allowlist.allows(1, -100));
    }

    #[test]
    fn test_allowlist_checks_users_and_chats() {
        let allowlist = Allowlist {
            users: vec![1],
            chats: vec![-100],
        };
        assert!(allowlist.allows(1, -100));
        assert!(!allowlist.allows(2, -100));
        assert!(!allowlist.allows(1, -200));
    }

    #[tokio::test]
    async fn test_private_and_addressed_messages_are_for_bot() {
        let (_tx, rx) = mpsc::channel(1);
        let frontend = TelegramFrontend {
            bot: Bot::new("fake_token"),
            inbox: tokio::sync::Mutex::new(rx),
            shutdown: CancellationToken::new(),
            poller: Mutex::new(None),
        };
        let metadata = TelegramMetadata {
            chat_id: -100,
            message_id: 5,
            is_private: false,
            forwarded: false,
            addressed_to_bot: false,
        };

        let group = TelegramMessage::new("hello all", metadata.clone());
        assert!(!frontend.is_message_for_bot(&group).await.unwrap());

        let addressed = TelegramMessage::new(
            "hello",
            TelegramMetadata {
                addressed_to_bot: true,
                ..metadata.clone()
            },
        );
        assert!(frontend.is_message_for_bot(&addressed).await.unwrap());

        let private = TelegramMessage::new(
            "hello",
            TelegramMetadata {
                is_private: true,
                ..metadata
            },
        );
        assert!(frontend.is_message_for_bot(&private).await.unwrap());

        frontend.close().await.unwrap();
    }
}
