// ABOUTME: Telegram-specific response policy layered over another responder
// ABOUTME: Forwarded messages get a canned refusal instead of being answered

use super::{TelegramMessage, TelegramMetadata};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use vacbot_core::{ComputationError, Responder};

const FORWARDED_RESPONSES: &[&str] = &[
    "I appreciate you forward messages to me, but I won't engage in what might be chain messages.",
    "Why are you forwarding me a message? Nevermind...",
    "Uh... No, thanks, I'm very cautious about possible chain messages.",
    "Okay, but I don't want to deal with forwarded messages.",
    "Tell me something not never seen before in a chat, please 🙂",
];

/// Declines forwarded messages and delegates everything else to `R`
pub struct TelegramResponder<R> {
    inner: R,
}

impl<R> TelegramResponder<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

fn is_forwarded_chain(message: &TelegramMessage) -> bool {
    message.metadata().forwarded && !message.is_blank()
}

#[async_trait]
impl<R> Responder<TelegramMetadata> for TelegramResponder<R>
where
    R: Responder<TelegramMetadata>,
{
    fn has_response_to(&self, message: &TelegramMessage) -> bool {
        !is_forwarded_chain(message) && self.inner.has_response_to(message)
    }

    async fn compute(
        &self,
        message: &TelegramMessage,
    ) -> Result<Option<TelegramMessage>, ComputationError> {
        if is_forwarded_chain(message) {
            let reply = FORWARDED_RESPONSES
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(FORWARDED_RESPONSES[0]);
            return Ok(Some(message.reply(reply)));
        }
        self.inner.compute(message).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Responder<TelegramMetadata> for Echo {
        async fn compute(
            &self,
            message: &TelegramMessage,
        ) -> Result<Option<TelegramMessage>, ComputationError> {
            Ok(Some(message.reply(message.text().to_string())))
        }
    }

    fn make_message(text: &str, forwarded: bool) -> TelegramMessage {
        TelegramMessage::new(
            text,
            TelegramMetadata {
                chat_id: 10,
                message_id: 3,
                is_private: true,
                forwarded,
                addressed_to_bot: false,
            },
        )
    }

    #[tokio::test]
    async fn test_forwarded_messages_get_canned_reply() {
        let responder = TelegramResponder::new(Echo);
        let message = make_message("share this with 10 friends", true);

        let reply = responder.compute(&message).await.unwrap().unwrap();

        assert!(FORWARDED_RESPONSES.contains(&reply.text()));
        assert_eq!(reply.metadata().chat_id, 10);
    }

    #[test]
    fn test_forwarded_messages_skip_typing_hint() {
        let responder = TelegramResponder::new(Echo);
        assert!(!responder.has_response_to(&make_message("share this", true)));
        assert!(responder.has_response_to(&make_message("share this", false)));
    }

    #[tokio::test]
    async fn test_other_messages_are_delegated() {
        let responder = TelegramResponder::new(Echo);
        let message = make_message("what about measles?", false);

        let reply = responder.compute(&message).await.unwrap().unwrap();

        assert_eq!(reply.text(), "what about measles?");
    }

    #[test]
    fn test_blank_forwarded_message_has_no_response() {
        let responder = TelegramResponder::new(Echo);
        assert!(!responder.has_response_to(&make_message("  ", true)));
    }
}
