// ABOUTME: Collaborator seams of the dispatch engine
// ABOUTME: Frontend (message source and sink) and Responder (response computation)

use crate::error::{ComputationError, FrontendError};
use crate::message::Message;
use async_trait::async_trait;
use std::fmt::Debug;

/// A source of inbound messages and a sink for responses.
///
/// `await_next_message` is only ever called by the single dispatch loop, but
/// every other method may be called by many workers at the same time.
/// Implementations must be cancel-safe in `await_next_message`: the dispatch
/// loop drops that future when it is interrupted.
#[async_trait]
pub trait Frontend: Send + Sync + 'static {
    /// Platform metadata attached to every message
    type Metadata: Clone + Debug + Send + Sync + 'static;

    /// Wait until the next inbound message is available
    async fn await_next_message(&self) -> Result<Message<Self::Metadata>, FrontendError>;

    /// Whether the bot is expected to answer this message
    async fn is_message_for_bot(
        &self,
        message: &Message<Self::Metadata>,
    ) -> Result<bool, FrontendError>;

    /// Deliver a response
    async fn send_message(&self, message: Message<Self::Metadata>) -> Result<(), FrontendError>;

    /// Best-effort hint that a reply to `message` is being computed
    async fn notify_forthcoming_response(
        &self,
        _message: &Message<Self::Metadata>,
    ) -> Result<(), FrontendError> {
        Ok(())
    }

    /// Release front-end resources. Called once, after the worker pool terminated.
    async fn close(&self) -> Result<(), FrontendError> {
        Ok(())
    }
}

/// Computes the response to a message.
#[async_trait]
pub trait Responder<M>: Send + Sync + 'static
where
    M: Send + Sync + 'static,
{
    /// Cheap check deciding whether a forthcoming-response hint is worth sending
    fn has_response_to(&self, message: &Message<M>) -> bool {
        !message.is_blank()
    }

    /// Compute a response; `Ok(None)` means there is nothing to say
    async fn compute(&self, message: &Message<M>) -> Result<Option<Message<M>>, ComputationError>;
}
