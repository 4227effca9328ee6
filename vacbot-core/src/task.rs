// ABOUTME: One unit of dispatch work: decide, notify, compute and send for a single message
// ABOUTME: Failures become TaskError values that the worker logs instead of propagating

use crate::error::TaskError;
use crate::message::Message;
use crate::metrics;
use crate::traits::{Frontend, Responder};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a dispatch task ended when nothing went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The front-end said the message is not addressed to the bot
    NotForBot,
    /// The responder had nothing to say
    NoResponse,
    /// A response was delivered
    Responded,
}

/// Binds an inbound message to the compute-and-send pipeline
pub struct DispatchTask<F: Frontend, R> {
    frontend: Arc<F>,
    responder: Arc<R>,
    message: Message<F::Metadata>,
}

impl<F, R> DispatchTask<F, R>
where
    F: Frontend,
    R: Responder<F::Metadata>,
{
    pub fn new(frontend: Arc<F>, responder: Arc<R>, message: Message<F::Metadata>) -> Self {
        Self {
            frontend,
            responder,
            message,
        }
    }

    pub fn message(&self) -> &Message<F::Metadata> {
        &self.message
    }

    /// Run the pipeline until it finishes or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> Result<DispatchOutcome, TaskError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TaskError::Cancelled),
            result = self.respond() => result,
        }
    }

    async fn respond(&self) -> Result<DispatchOutcome, TaskError> {
        if !self.frontend.is_message_for_bot(&self.message).await? {
            return Ok(DispatchOutcome::NotForBot);
        }

        if self.responder.has_response_to(&self.message) {
            if let Err(e) = self
                .frontend
                .notify_forthcoming_response(&self.message)
                .await
            {
                tracing::trace!(
                    message_id = %self.message.id(),
                    error = %e,
                    "Forthcoming response notification failed"
                );
            }
        }

        let Some(response) = self.responder.compute(&self.message).await? else {
            return Ok(DispatchOutcome::NoResponse);
        };

        self.frontend.send_message(response).await?;
        metrics::record_response_sent();
        Ok(DispatchOutcome::Responded)
    }

    /// Run and log the result. This is the body every worker executes.
    pub async fn execute(self, cancel: CancellationToken) {
        let message_id = self.message.id();
        match self.run(cancel).await {
            Ok(outcome) => {
                tracing::debug!(message_id = %message_id, ?outcome, "Dispatch task finished");
            }
            Err(TaskError::Cancelled) => {
                tracing::debug!(message_id = %message_id, "Dispatch task cancelled");
                metrics::record_task_failure(TaskError::Cancelled.kind());
            }
            Err(e) => {
                tracing::error!(
                    message_id = %message_id,
                    kind = e.kind(),
                    error = %e,
                    "Failed to respond to message"
                );
                metrics::record_task_failure(e.kind());
            }
        }
    }
}
